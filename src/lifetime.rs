//! Scope tags and provider lifetimes.

use std::fmt;

/// Named lifecycle phases a provider can be bound to.
///
/// - **Lifespan**: opened when the server starts (or a CLI command begins) and
///   closed at shutdown. Holds process-wide resources such as the database
///   engine.
/// - **Request**: opened around one HTTP request or one CLI command body.
///   Holds per-unit-of-work resources such as the database session.
///
/// # Examples
///
/// ```rust
/// use scopewire::Scope;
///
/// assert_eq!(Scope::Lifespan.as_str(), "lifespan");
/// assert_eq!(Scope::Request.to_string(), "request");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Lifespan,
    Request,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Lifespan => "lifespan",
            Scope::Request => "request",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider lifetimes controlling instance caching behavior
///
/// # Examples
///
/// ```rust
/// use scopewire::{Lifetime, Scope};
///
/// assert_eq!(Lifetime::Scoped(Scope::Request).scope(), Some(Scope::Request));
/// assert_eq!(Lifetime::Constant.scope(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// One value for the life of the container
    ///
    /// Used for configuration such as `Settings`: built on first request and
    /// handed out unchanged afterwards, inside or outside any scope.
    Constant,
    /// One value per instance of the given scope
    ///
    /// The value is cached in the nearest enclosing instance whose tag
    /// matches. Its teardown runs when that instance closes.
    Scoped(Scope),
    /// New value per resolution, never cached
    Transient,
}

impl Lifetime {
    /// The scope tag this lifetime is bound to, if any.
    pub fn scope(&self) -> Option<Scope> {
        match self {
            Lifetime::Scoped(scope) => Some(*scope),
            Lifetime::Constant | Lifetime::Transient => None,
        }
    }
}

/// How the body bracketed by a scope instance ended.
///
/// Teardowns receive this instead of inspecting errors themselves, so a
/// session can choose between commit and rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeExit {
    Completed,
    Failed,
}

impl ScopeExit {
    /// `Completed` for `Ok`, `Failed` for `Err`.
    pub fn of<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            ScopeExit::Completed
        } else {
            ScopeExit::Failed
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ScopeExit::Failed)
    }
}
