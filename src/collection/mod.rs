//! Provider registration.
//!
//! A [`ProviderRegistry`] collects declarations during bootstrap and is then
//! frozen into a [`Container`] with [`build`](ProviderRegistry::build).

use std::future::Future;

use crate::error::{BoxError, DiResult};
use crate::key::key_of_type;
use crate::lifetime::{Lifetime, Scope};
use crate::provider::{Container, ResolverContext};
use crate::registration::{Provision, Registration, Registry};
use crate::settings::Profile;

pub mod module_system;

pub use module_system::ProviderModule;

/// Collection of provider declarations.
///
/// Each type may have one profile-less provider and at most one provider per
/// [`Profile`]. A second declaration for an occupied slot is rejected on the
/// spot with [`DiError::DuplicateProvider`](crate::DiError::DuplicateProvider).
///
/// # Examples
///
/// ```rust
/// use scopewire::{DiError, Profile, Provision, ProviderRegistry, Resolver, Scope};
///
/// struct Mailer(&'static str);
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = ProviderRegistry::new();
/// registry.add_transient(|_| async { Ok(Provision::new(Mailer("console"))) })?;
/// registry
///     .for_profile(Profile::Production)
///     .add_transient(|_| async { Ok(Provision::new(Mailer("smtp"))) })?;
///
/// // the profile-less slot is already taken
/// assert!(matches!(
///     registry.add_transient(|_| async { Ok(Provision::new(Mailer("other"))) }),
///     Err(DiError::DuplicateProvider { .. })
/// ));
///
/// let container = registry.build(Some(Profile::Production));
/// assert_eq!(container.get::<Mailer>().await?.0, "smtp");
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct ProviderRegistry {
    registry: Registry,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// Registers a constant value.
    pub fn add_constant<T: Send + Sync + 'static>(&mut self, value: T) -> DiResult<&mut Self> {
        self.insert::<T>(None, Registration::constant(value))
    }

    /// Registers a factory that runs on every resolution.
    pub fn add_transient<T, F, Fut>(&mut self, factory: F) -> DiResult<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Provision<T>, BoxError>> + Send + 'static,
    {
        self.insert::<T>(None, Registration::factory(Lifetime::Transient, factory))
    }

    /// Registers a factory whose value is memoized once per instance of
    /// `scope`, with its teardown run when that instance closes.
    pub fn add_scoped<T, F, Fut>(&mut self, scope: Scope, factory: F) -> DiResult<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Provision<T>, BoxError>> + Send + 'static,
    {
        self.insert::<T>(None, Registration::factory(Lifetime::Scoped(scope), factory))
    }

    /// Registrar binding providers to one profile.
    pub fn for_profile(&mut self, profile: Profile) -> ProfileRegistrar<'_> {
        ProfileRegistrar {
            registry: self,
            profile,
        }
    }

    /// Whether any provider has been declared for `T`.
    pub fn contains<T: 'static>(&self) -> bool {
        self.registry.contains_key(&key_of_type::<T>())
    }

    /// Freezes the declarations, keeping for each type the provider bound to
    /// `profile` or, failing that, the profile-less one.
    pub fn build(self, profile: Option<Profile>) -> Container {
        Container::from_registry(self.registry, profile)
    }

    fn insert<T: 'static>(&mut self, profile: Option<Profile>, registration: Registration) -> DiResult<&mut Self> {
        self.registry.insert(key_of_type::<T>(), profile, registration)?;
        Ok(self)
    }
}

/// Registers providers for a single [`Profile`].
///
/// Returned by [`ProviderRegistry::for_profile`].
pub struct ProfileRegistrar<'a> {
    registry: &'a mut ProviderRegistry,
    profile: Profile,
}

impl ProfileRegistrar<'_> {
    pub fn add_constant<T: Send + Sync + 'static>(self, value: T) -> DiResult<Self> {
        self.insert::<T>(Registration::constant(value))
    }

    pub fn add_transient<T, F, Fut>(self, factory: F) -> DiResult<Self>
    where
        T: Send + Sync + 'static,
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Provision<T>, BoxError>> + Send + 'static,
    {
        self.insert::<T>(Registration::factory(Lifetime::Transient, factory))
    }

    pub fn add_scoped<T, F, Fut>(self, scope: Scope, factory: F) -> DiResult<Self>
    where
        T: Send + Sync + 'static,
        F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Provision<T>, BoxError>> + Send + 'static,
    {
        self.insert::<T>(Registration::factory(Lifetime::Scoped(scope), factory))
    }

    fn insert<T: 'static>(self, registration: Registration) -> DiResult<Self> {
        self.registry
            .registry
            .insert(key_of_type::<T>(), Some(self.profile), registration)?;
        Ok(self)
    }
}
