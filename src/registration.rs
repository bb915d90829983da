//! Provider registration types.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use ahash::AHashMap;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::{BoxError, DiError, DiResult};
use crate::internal::Teardown;
use crate::key::Key;
use crate::lifetime::{Lifetime, ScopeExit};
use crate::settings::Profile;

// ResolverContext is defined in provider module
pub(crate) use crate::provider::ResolverContext;

// Type-erased Arc for storage
pub(crate) type AnyArc = Arc<dyn Any + Send + Sync>;

/// Type-erased async constructor.
pub(crate) type Ctor = Arc<dyn Fn(ResolverContext) -> BoxFuture<'static, DiResult<Provided>> + Send + Sync>;

type TypedTeardown<T> = Box<dyn FnOnce(Arc<T>, ScopeExit) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

/// What a factory hands back: the value plus an optional teardown.
///
/// The teardown runs when the scope instance caching the value closes and
/// receives the [`ScopeExit`] of the body that scope bracketed.
///
/// # Examples
///
/// ```rust
/// use scopewire::{Provision, ScopeExit};
///
/// struct Pool;
///
/// let plain = Provision::new(Pool);
/// let managed = Provision::with_teardown(Pool, |_pool, exit: ScopeExit| async move {
///     println!("closing pool after {exit:?}");
///     Ok(())
/// });
/// # let _ = (plain, managed);
/// ```
pub struct Provision<T> {
    value: Arc<T>,
    teardown: Option<TypedTeardown<T>>,
}

impl<T: Send + Sync + 'static> Provision<T> {
    /// A value with no cleanup.
    pub fn new(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// An already shared value with no cleanup.
    pub fn from_arc(value: Arc<T>) -> Self {
        Self { value, teardown: None }
    }

    /// A value whose `teardown` runs when its scope instance closes.
    pub fn with_teardown<F, Fut>(value: T, teardown: F) -> Self
    where
        F: FnOnce(Arc<T>, ScopeExit) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            value: Arc::new(value),
            teardown: Some(Box::new(move |value, exit| teardown(value, exit).boxed())),
        }
    }

    /// The value this provision carries.
    pub fn value(&self) -> &Arc<T> {
        &self.value
    }

    pub(crate) fn into_provided(self) -> Provided {
        let teardown = self.teardown.map(|hook| {
            let value = self.value.clone();
            Box::new(move |exit| hook(value, exit)) as Teardown
        });
        Provided {
            value: self.value,
            teardown,
        }
    }
}

/// Type-erased factory output.
pub(crate) struct Provided {
    pub(crate) value: AnyArc,
    pub(crate) teardown: Option<Teardown>,
}

/// Provider registration with lifetime and constructor
pub(crate) struct Registration {
    pub(crate) lifetime: Lifetime,
    pub(crate) ctor: Ctor,
}

impl Registration {
    /// A constant: the same value on every resolution.
    pub(crate) fn constant<T: Send + Sync + 'static>(value: T) -> Self {
        let value: AnyArc = Arc::new(value);
        let ctor = move |_: ResolverContext| -> BoxFuture<'static, DiResult<Provided>> {
            let value = value.clone();
            async move { Ok(Provided { value, teardown: None }) }.boxed()
        };
        Self {
            lifetime: Lifetime::Constant,
            ctor: Arc::new(ctor),
        }
    }

    /// Wraps a typed async factory.
    pub(crate) fn factory<T, F, Fut>(lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Provision<T>, BoxError>> + Send + 'static,
    {
        let service = std::any::type_name::<T>();
        let ctor = move |ctx: ResolverContext| -> BoxFuture<'static, DiResult<Provided>> {
            let fut = factory(ctx);
            async move {
                match fut.await {
                    Ok(provision) => Ok(provision.into_provided()),
                    // Resolution failures inside a factory keep their identity
                    Err(err) => match err.downcast::<DiError>() {
                        Ok(di) => Err(*di),
                        Err(other) => Err(DiError::factory(service, other)),
                    },
                }
            }
            .boxed()
        };
        Self {
            lifetime,
            ctor: Arc::new(ctor),
        }
    }
}

/// One default slot plus one slot per profile.
#[derive(Default)]
struct Slots {
    default: Option<Registration>,
    profiles: Vec<(Profile, Registration)>,
}

/// Provider registry holding all registrations
#[derive(Default)]
pub(crate) struct Registry {
    entries: AHashMap<Key, Slots>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts a registration, rejecting a second one for the same slot.
    pub(crate) fn insert(
        &mut self,
        key: Key,
        profile: Option<Profile>,
        registration: Registration,
    ) -> DiResult<()> {
        let slots = self.entries.entry(key).or_default();
        let duplicate = DiError::DuplicateProvider {
            service: key.display_name(),
            profile,
        };
        match profile {
            None => {
                if slots.default.is_some() {
                    return Err(duplicate);
                }
                slots.default = Some(registration);
            }
            Some(profile) => {
                if slots.profiles.iter().any(|(p, _)| *p == profile) {
                    return Err(duplicate);
                }
                slots.profiles.push((profile, registration));
            }
        }
        Ok(())
    }

    /// Checks if a key has any registration
    pub(crate) fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Picks, per key, the registration for `profile`, falling back to the
    /// profile-less one. Keys bound only to other profiles are left out.
    pub(crate) fn select(self, profile: Option<Profile>) -> AHashMap<Key, Arc<Registration>> {
        let mut selected = AHashMap::with_capacity(self.entries.len());
        for (key, slots) in self.entries {
            let Slots { default, profiles } = slots;
            let chosen = profile
                .and_then(|active| {
                    profiles
                        .into_iter()
                        .find(|(p, _)| *p == active)
                        .map(|(_, reg)| reg)
                })
                .or(default);
            if let Some(reg) = chosen {
                selected.insert(key, Arc::new(reg));
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key_of_type;

    #[test]
    fn test_duplicate_slot_rejected() {
        let mut registry = Registry::new();
        let key = key_of_type::<u32>();
        registry.insert(key, None, Registration::constant(1u32)).unwrap();
        registry
            .insert(key, Some(Profile::Development), Registration::constant(2u32))
            .unwrap();

        assert!(matches!(
            registry.insert(key, None, Registration::constant(3u32)),
            Err(DiError::DuplicateProvider { profile: None, .. })
        ));
        assert!(matches!(
            registry.insert(key, Some(Profile::Development), Registration::constant(4u32)),
            Err(DiError::DuplicateProvider {
                profile: Some(Profile::Development),
                ..
            })
        ));
    }

    #[test]
    fn test_select_prefers_active_profile() {
        let mut registry = Registry::new();
        let shared = key_of_type::<u32>();
        let dev_only = key_of_type::<u64>();
        registry.insert(shared, None, Registration::constant(1u32)).unwrap();
        registry
            .insert(shared, Some(Profile::Production), Registration::constant(2u32))
            .unwrap();
        registry
            .insert(dev_only, Some(Profile::Development), Registration::constant(3u64))
            .unwrap();

        let selected = registry.select(Some(Profile::Production));
        assert!(selected.contains_key(&shared));
        assert!(!selected.contains_key(&dev_only));
    }
}
