//! Pre-reified descriptors backed by values or closures.
//!
//! An [`AbstractActiveDescriptor`] carries everything reification would
//! otherwise compute, so it can bind services that have no
//! [`ServiceClass`](crate::foundation::class::ServiceClass): constants,
//! shared trait objects and closures.
//!
//! ```rust,ignore
//! config.bind_active(
//!     AbstractActiveDescriptor::constant(Settings::default())
//!         .named("settings")
//!         .ranked(5),
//! );
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::scopes;
use crate::creation::{ActiveCreator, CreateFn, DisposeFn};
use crate::error::BoxError;
use crate::foundation::descriptor::Descriptor;
use crate::foundation::types::{ContractType, NAMED, Qualifier, ServiceArc, TypeKey, into_view};
use crate::locator::handle::ServiceHandle;

/// A descriptor that is already reified.
#[derive(Clone)]
pub struct AbstractActiveDescriptor {
    descriptor: Descriptor,
    implementation: TypeKey,
    contracts: Vec<ContractType>,
    qualifiers: Vec<Qualifier>,
    constant: Option<ServiceArc>,
    create: Option<CreateFn>,
    dispose: Option<DisposeFn>,
}

impl AbstractActiveDescriptor {
    fn with_contract_type(implementation: TypeKey, contract: ContractType, scope: &str) -> Self {
        let descriptor = Descriptor::builder(implementation.name())
            .to(contract.name())
            .in_scope(scope)
            .build();
        Self {
            descriptor,
            implementation,
            contracts: vec![contract],
            qualifiers: Vec::new(),
            constant: None,
            create: None,
            dispose: None,
        }
    }

    /// Binds `value` as a singleton constant.
    pub fn constant<T: Send + Sync + 'static>(value: T) -> Self {
        Self::constant_arc(Arc::new(value))
    }

    /// Binds an already shared value as a singleton constant.
    pub fn constant_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        let mut active = Self::with_contract_type(TypeKey::of::<T>(), ContractType::of::<T>(), scopes::SINGLETON);
        active.constant = Some(value as ServiceArc);
        active
    }

    /// Binds a shared trait object as a singleton constant of contract `C`.
    ///
    /// Further contracts cannot be added to a shared binding.
    pub fn shared<C: ?Sized + Send + Sync + 'static>(value: Arc<C>) -> Self {
        let mut active =
            Self::with_contract_type(TypeKey::of::<C>(), ContractType::prepackaged::<C>(), scopes::SINGLETON);
        active.constant = Some(into_view(value));
        active
    }

    /// Binds a closure that creates a new `T` on every lookup.
    ///
    /// Use [`in_scope`](Self::in_scope) to cache instances instead.
    pub fn from_fn<T, F>(create: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceHandle) -> Result<Arc<T>, BoxError> + Send + Sync + 'static,
    {
        let mut active = Self::with_contract_type(TypeKey::of::<T>(), ContractType::of::<T>(), scopes::PER_LOOKUP);
        active.create = Some(Arc::new(move |root| create(root).map(|t| t as ServiceArc)));
        active
    }

    /// Adds a contract the raw instance can be viewed as.
    pub fn with_contract(mut self, contract: ContractType) -> Self {
        self.descriptor.advertised_contracts.insert(contract.name().to_string());
        self.contracts.push(contract);
        self
    }

    /// Adds contract `C`, viewed through an upcast from `T`.
    pub fn contract<T, C>(self, cast: fn(Arc<T>) -> Arc<C>) -> Self
    where
        T: Send + Sync + 'static,
        C: ?Sized + Send + Sync + 'static,
    {
        self.with_contract(ContractType::upcast::<T, C>(cast))
    }

    /// Sets the service name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.qualifiers.retain(|q| !q.is_named());
        self.qualifiers.push(Qualifier::named(name.clone()));
        self.descriptor.name = Some(name);
        self.descriptor.qualifiers.insert(NAMED.to_string());
        self
    }

    /// Adds a qualifier.
    pub fn qualified_by(mut self, qualifier: Qualifier) -> Self {
        self.descriptor.qualifiers.insert(qualifier.name().to_string());
        self.qualifiers.push(qualifier);
        self
    }

    /// Sets the scope.
    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.descriptor.scope = Some(scope.into());
        self
    }

    /// Sets the ranking.
    pub fn ranked(mut self, ranking: i32) -> Self {
        self.descriptor.ranking = ranking;
        self
    }

    /// Restricts visibility to the owning locator.
    pub fn local_only(mut self) -> Self {
        self.descriptor.visibility = crate::foundation::descriptor::DescriptorVisibility::Local;
        self
    }

    /// Appends a metadata value.
    pub fn has(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor
            .metadata
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Sets the proxy policy explicitly.
    pub fn proxy(mut self, proxiable: bool) -> Self {
        self.descriptor.proxiable = Some(proxiable);
        self
    }

    /// Called with the raw instance when the service is destroyed.
    pub fn on_dispose<F>(mut self, dispose: F) -> Self
    where
        F: Fn(&ServiceArc) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.dispose = Some(Arc::new(dispose));
        self
    }

    /// Returns the descriptor this binding commits as.
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub(crate) fn implementation(&self) -> TypeKey {
        self.implementation
    }

    pub(crate) fn contracts(&self) -> &[ContractType] {
        &self.contracts
    }

    pub(crate) fn qualifiers(&self) -> &[Qualifier] {
        &self.qualifiers
    }

    pub(crate) fn constant_value(&self) -> Option<&ServiceArc> {
        self.constant.as_ref()
    }

    pub(crate) fn creator(&self) -> ActiveCreator {
        ActiveCreator::new(
            self.descriptor.implementation.clone(),
            self.constant.clone(),
            self.create.clone(),
            self.dispose.clone(),
        )
    }
}

impl fmt::Debug for AbstractActiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbstractActiveDescriptor")
            .field("descriptor", &self.descriptor)
            .field("constant", &self.constant.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {}
    struct English;
    impl Greeter for English {}

    #[test]
    fn test_constant_defaults() {
        let active = AbstractActiveDescriptor::constant(7_u32).named("seven").ranked(2);
        let d = active.descriptor();
        assert_eq!(d.scope.as_deref(), Some(scopes::SINGLETON));
        assert_eq!(d.name.as_deref(), Some("seven"));
        assert!(d.advertises(TypeKey::of::<u32>().name()));
        assert_eq!(d.ranking, 2);
        assert!(active.constant_value().is_some());
        assert_eq!(active.qualifiers(), &[Qualifier::named("seven")]);
    }

    #[test]
    fn test_contracts_accumulate() {
        let active = AbstractActiveDescriptor::constant(English).contract::<English, dyn Greeter>(|e| e);
        assert_eq!(active.contracts().len(), 2);
        assert!(active.descriptor().advertises(TypeKey::of::<dyn Greeter>().name()));
    }

    #[test]
    fn test_from_fn_is_per_lookup() {
        let active = AbstractActiveDescriptor::from_fn(|_| Ok(Arc::new(English)));
        assert_eq!(active.descriptor().scope.as_deref(), Some(scopes::PER_LOOKUP));
        assert!(active.constant_value().is_none());
    }
}
