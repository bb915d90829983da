//! Provider key types for the container.

use std::any::TypeId;

/// Key for provider storage and lookup.
///
/// A key identifies the type a provider produces. Equality and hashing use
/// only the `TypeId`; the name rides along for diagnostics.
///
/// # Examples
///
/// ```rust
/// use scopewire::{key_of_type, Key};
///
/// let key: Key = key_of_type::<String>();
/// assert_eq!(key.display_name(), "alloc::string::String");
/// assert_eq!(key, key_of_type::<String>());
/// assert_ne!(key, key_of_type::<u32>());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Key {
    id: TypeId,
    name: &'static str,
}

impl Key {
    /// Get the type name for display
    pub fn display_name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Key {
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Key {}

impl std::hash::Hash for Key {
    #[inline(always)]
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Helper function for creating type keys
#[inline(always)]
pub fn key_of_type<T: 'static>() -> Key {
    Key {
        id: TypeId::of::<T>(),
        name: std::any::type_name::<T>(),
    }
}
