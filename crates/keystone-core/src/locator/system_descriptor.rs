//! Registry entries.
//!
//! A [`SystemDescriptor`] is a [`Descriptor`] after commit: it has its
//! locator-assigned ids, a mutable ranking, and the reified data that
//! reification fills in exactly once. It also carries the single-value cache
//! slot that singleton-like contexts use so repeated lookups skip the
//! context entirely.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use tracing::debug;

use crate::analysis::{DEFAULT_ANALYZER, InjectionPlan};
use crate::context::scopes;
use crate::creation::Creator;
use crate::creation::class_creator::ClassCreator;
use crate::creation::factory::FactoryCreator;
use crate::error::{Collector, ErrorType, LocatorError, LocatorResult};
use crate::foundation::class::ServiceClass;
use crate::foundation::descriptor::{Descriptor, DescriptorType, DescriptorVisibility};
use crate::foundation::injectee::Injectee;
use crate::foundation::types::{ContractType, NAMED, Qualifier, ServiceArc, TypeKey};
use crate::locator::ServiceLocator;
use crate::locator::active::AbstractActiveDescriptor;
use crate::locator::handle::ServiceHandle;

/// The identity of a bound descriptor: its locator id and service id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorKey {
    locator_id: u64,
    service_id: u64,
}

impl DescriptorKey {
    /// Creates a key.
    pub fn new(locator_id: u64, service_id: u64) -> Self {
        Self {
            locator_id,
            service_id,
        }
    }

    /// Returns the locator id.
    pub fn locator_id(&self) -> u64 {
        self.locator_id
    }

    /// Returns the service id.
    pub fn service_id(&self) -> u64 {
        self.service_id
    }
}

impl fmt::Display for DescriptorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.locator_id, self.service_id)
    }
}

/// Where a descriptor's class-level details come from.
pub(crate) enum Source {
    /// Loaded through a class loader at reification.
    Declared,
    /// Already known, for unmanaged creation.
    Class(Arc<ServiceClass>),
    /// Supplied pre-reified by the user.
    Active(AbstractActiveDescriptor),
}

struct Reified {
    class: Option<Arc<ServiceClass>>,
    implementation: TypeKey,
    contracts: Vec<ContractType>,
    scope: String,
    qualifiers: Vec<Qualifier>,
    creator: Arc<dyn Creator>,
}

/// A descriptor bound into a locator.
pub struct SystemDescriptor {
    base: Descriptor,
    key: DescriptorKey,
    ranking: AtomicI32,
    locator: Weak<ServiceLocator>,
    self_ref: Weak<SystemDescriptor>,
    source: Source,
    factory: Option<DescriptorKey>,
    reified: OnceLock<Reified>,
    reifying: ReentrantMutex<Cell<bool>>,
    cache: Mutex<Option<ServiceArc>>,
}

impl SystemDescriptor {
    pub(crate) fn new(
        mut base: Descriptor,
        key: DescriptorKey,
        locator: Weak<ServiceLocator>,
        source: Source,
        factory: Option<DescriptorKey>,
    ) -> Arc<Self> {
        base.locator_id = Some(key.locator_id);
        base.service_id = Some(key.service_id);
        let constant = match &source {
            Source::Active(active) => active.constant_value().cloned(),
            _ => None,
        };
        Arc::new_cyclic(|self_ref| Self {
            ranking: AtomicI32::new(base.ranking),
            base,
            key,
            locator,
            self_ref: self_ref.clone(),
            source,
            factory,
            reified: OnceLock::new(),
            reifying: ReentrantMutex::new(Cell::new(false)),
            cache: Mutex::new(constant),
        })
    }

    /// Returns the descriptor as it was bound, ids included.
    ///
    /// The ranking here is the one it was bound with; see
    /// [`ranking`](Self::ranking) for the current value.
    pub fn descriptor(&self) -> &Descriptor {
        &self.base
    }

    /// Returns a copy of the descriptor carrying the current ranking.
    pub fn to_descriptor(&self) -> Descriptor {
        Descriptor {
            ranking: self.ranking(),
            ..self.base.clone()
        }
    }

    /// Returns the descriptor's ids.
    pub fn key(&self) -> DescriptorKey {
        self.key
    }

    /// Returns the id of the owning locator.
    pub fn locator_id(&self) -> u64 {
        self.key.locator_id
    }

    /// Returns the service id.
    pub fn service_id(&self) -> u64 {
        self.key.service_id
    }

    /// Returns the implementation identifier.
    pub fn implementation(&self) -> &str {
        &self.base.implementation
    }

    /// Returns the service name.
    pub fn name(&self) -> Option<&str> {
        self.base.name.as_deref()
    }

    /// Returns the current ranking.
    pub fn ranking(&self) -> i32 {
        self.ranking.load(Ordering::Acquire)
    }

    pub(crate) fn set_ranking(&self, ranking: i32) -> i32 {
        self.ranking.swap(ranking, Ordering::AcqRel)
    }

    /// Returns the descriptor kind.
    pub fn descriptor_type(&self) -> DescriptorType {
        self.base.descriptor_type
    }

    /// Returns the visibility.
    pub fn visibility(&self) -> DescriptorVisibility {
        self.base.visibility
    }

    /// Returns the scope: the reified scope once known, otherwise the
    /// declared one, otherwise per-lookup.
    pub fn scope(&self) -> &str {
        self.reified
            .get()
            .map(|r| r.scope.as_str())
            .or(self.base.scope.as_deref())
            .unwrap_or(scopes::PER_LOOKUP)
    }

    /// Returns the key of the factory service for provide-method
    /// descriptors.
    pub fn factory_key(&self) -> Option<DescriptorKey> {
        self.factory
    }

    /// Returns `true` once reification has succeeded.
    pub fn is_reified(&self) -> bool {
        self.reified.get().is_some()
    }

    /// Returns the reified contracts; empty until reified.
    pub fn contract_types(&self) -> &[ContractType] {
        self.reified.get().map(|r| r.contracts.as_slice()).unwrap_or_default()
    }

    /// Returns the reified contract for `key`.
    pub fn contract_type(&self, key: TypeKey) -> Option<&ContractType> {
        self.contract_types().iter().find(|c| c.key() == key)
    }

    /// Returns the reified qualifier annotations; empty until reified.
    pub fn qualifier_annotations(&self) -> &[Qualifier] {
        self.reified.get().map(|r| r.qualifiers.as_slice()).unwrap_or_default()
    }

    /// Returns the reified implementation type.
    pub fn implementation_type(&self) -> Option<TypeKey> {
        self.reified.get().map(|r| r.implementation)
    }

    /// Returns the reified implementation class, if instances come from one.
    pub fn implementation_class(&self) -> Option<Arc<ServiceClass>> {
        self.reified.get().and_then(|r| r.class.clone())
    }

    /// Returns every injection point; empty until reified.
    pub fn injectees(&self) -> Vec<Injectee> {
        self.reified
            .get()
            .map(|r| r.creator.injectees())
            .unwrap_or_default()
    }

    /// Returns `true` if the descriptor carries `qualifier`.
    ///
    /// A `Named` qualifier matches on the service name.
    pub fn has_qualifier(&self, qualifier: &Qualifier) -> bool {
        if qualifier.is_named() {
            return match qualifier.value() {
                Some(value) => self.name() == Some(value),
                None => self.name().is_some(),
            };
        }
        self.qualifier_annotations().iter().any(|q| {
            q.name() == qualifier.name() && (qualifier.value().is_none() || q.value() == qualifier.value())
        })
    }

    /// Returns `true` if this reified descriptor can satisfy `injectee`.
    pub fn satisfies(&self, injectee: &Injectee) -> bool {
        self.contract_type(injectee.required_type()).is_some()
            && injectee.required_qualifiers().iter().all(|q| self.has_qualifier(q))
            && injectee
                .point()
                .unqualified_restriction()
                .is_none_or(|u| u.permits(self.qualifier_annotations()))
    }

    /// Views a raw instance as contract `key`.
    pub fn view(&self, key: TypeKey, raw: &ServiceArc) -> LocatorResult<ServiceArc> {
        let contract = self.contract_type(key).ok_or_else(|| {
            LocatorError::illegal_argument(format!("{self} does not provide {key}"))
        })?;
        contract.view(raw)
    }

    /// Returns the instance held in the single-value cache.
    pub fn cached_value(&self) -> Option<ServiceArc> {
        self.cache.lock().clone()
    }

    pub(crate) fn set_cache(&self, value: ServiceArc) {
        *self.cache.lock() = Some(value);
    }

    pub(crate) fn clear_cache(&self) {
        if !matches!(&self.source, Source::Active(active) if active.constant_value().is_some()) {
            self.cache.lock().take();
        }
    }

    pub(crate) fn visible_to(&self, locator_id: u64) -> bool {
        self.base.visibility == DescriptorVisibility::Normal || self.key.locator_id == locator_id
    }

    pub(crate) fn locator(&self) -> Option<Arc<ServiceLocator>> {
        self.locator.upgrade()
    }

    fn owning_locator(&self) -> LocatorResult<Arc<ServiceLocator>> {
        self.locator
            .upgrade()
            .ok_or_else(|| LocatorError::illegal_state(format!("locator of {self} has been dropped")).into())
    }

    fn creator(&self) -> LocatorResult<Arc<dyn Creator>> {
        self.reify()?;
        self.reified
            .get()
            .map(|r| r.creator.clone())
            .ok_or_else(|| LocatorError::reification(self.implementation(), "not reified").into())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Creates one instance through the reified creator.
    pub(crate) fn create(&self, root: &ServiceHandle) -> LocatorResult<ServiceArc> {
        let creator = self.creator()?;
        match creator.create(root) {
            Ok(instance) => Ok(instance),
            Err(errors) if errors.is_reported() => Err(errors),
            Err(errors) => match self.locator() {
                Some(locator) => Err(locator.report(ErrorType::ServiceCreationFailure, Some(self), None, errors)),
                None => Err(errors),
            },
        }
    }

    /// Destroys one instance through the reified creator.
    pub(crate) fn dispose(&self, instance: &ServiceArc) -> LocatorResult<()> {
        let creator = self.creator()?;
        creator.dispose(instance).map_err(|errors| match self.locator() {
            Some(locator) => locator.report(ErrorType::ServiceDestructionFailure, Some(self), None, errors),
            None => errors,
        })
    }

    /// Reifies the descriptor. Successful reification happens once; failures
    /// are reported and retried on the next call.
    pub(crate) fn reify(&self) -> LocatorResult<()> {
        if self.is_reified() {
            return Ok(());
        }
        let guard = self.reifying.lock();
        if self.is_reified() {
            return Ok(());
        }
        if guard.replace(true) {
            return Err(LocatorError::reification(
                self.implementation(),
                "reification requires the descriptor being reified",
            )
            .into());
        }

        let locator = self.owning_locator();
        let result = match &locator {
            Ok(locator) => self.build(locator),
            Err(errors) => Err(errors.clone()),
        };
        guard.set(false);

        match result {
            Ok(reified) => {
                debug!(descriptor = %self, scope = %reified.scope, "Reified descriptor");
                // Only this thread can be here while holding the guard.
                let _ = self.reified.set(reified);
                Ok(())
            }
            Err(errors) => match locator {
                Ok(locator) => Err(locator.report(ErrorType::FailureToReify, Some(self), None, errors)),
                Err(_) => Err(errors),
            },
        }
    }

    fn build(&self, locator: &ServiceLocator) -> LocatorResult<Reified> {
        let reified = match &self.source {
            Source::Active(active) => self.build_active(active)?,
            Source::Class(class) => self.build_class(locator, class.clone())?,
            Source::Declared => {
                let class = locator.load_class(&self.base)?;
                match self.base.descriptor_type {
                    DescriptorType::Class => self.build_class(locator, class)?,
                    DescriptorType::ProvideMethod => self.build_provide_method(class)?,
                }
            }
        };

        if self.base.proxiable == Some(true)
            && let Some(info) = locator.scope_info(&reified.scope)
            && info.unproxiable
        {
            return Err(LocatorError::reification(
                self.implementation(),
                format!("scope {} is unproxiable but the descriptor asks to be proxied", reified.scope),
            )
            .into());
        }
        Ok(reified)
    }

    fn build_active(&self, active: &AbstractActiveDescriptor) -> LocatorResult<Reified> {
        let mut qualifiers = active.qualifiers().to_vec();
        self.add_declared_qualifiers(&mut qualifiers);
        Ok(Reified {
            class: None,
            implementation: active.implementation(),
            contracts: active.contracts().to_vec(),
            scope: self.base.scope.clone().unwrap_or_else(|| scopes::PER_LOOKUP.to_string()),
            qualifiers,
            creator: Arc::new(active.creator()),
        })
    }

    fn build_class(&self, locator: &ServiceLocator, class: Arc<ServiceClass>) -> LocatorResult<Reified> {
        let mut collector = Collector::new();
        let contracts = self.resolve_contracts(class.contracts(), class.name(), &mut collector);

        let analyzer_name = self
            .base
            .class_analysis_name
            .as_deref()
            .unwrap_or(DEFAULT_ANALYZER);
        let plan = locator
            .class_analyzer(analyzer_name)
            .and_then(|analyzer| InjectionPlan::analyze(analyzer.as_ref(), &class));
        let plan = match plan {
            Ok(plan) => Some(plan),
            Err(errors) => {
                collector.add_all(errors);
                None
            }
        };
        collector.throw_if_errors()?;

        let plan = plan.ok_or_else(|| LocatorError::analysis(class.name(), "no injection plan"))?;
        let creator = ClassCreator::new(locator.weak(), self.self_ref.clone(), class.clone(), plan)?;

        let mut qualifiers = class.qualifiers().to_vec();
        self.add_declared_qualifiers(&mut qualifiers);
        Ok(Reified {
            implementation: class.key(),
            contracts,
            scope: self
                .base
                .scope
                .clone()
                .or_else(|| class.scope().map(str::to_string))
                .unwrap_or_else(|| scopes::PER_LOOKUP.to_string()),
            qualifiers,
            creator: Arc::new(creator),
            class: Some(class),
        })
    }

    fn build_provide_method(&self, class: Arc<ServiceClass>) -> LocatorResult<Reified> {
        let product = class.product().ok_or_else(|| {
            LocatorError::reification(self.implementation(), format!("{} is not a factory", class.name()))
        })?;
        let factory = self.factory.ok_or_else(|| {
            LocatorError::reification(self.implementation(), "provide method is not linked to a factory")
        })?;

        let mut collector = Collector::new();
        let contracts = self.resolve_contracts(product.contracts(), class.name(), &mut collector);
        collector.throw_if_errors()?;

        let mut qualifiers = product.qualifiers().to_vec();
        self.add_declared_qualifiers(&mut qualifiers);
        Ok(Reified {
            class: None,
            implementation: product.key(),
            contracts,
            scope: self
                .base
                .scope
                .clone()
                .or_else(|| product.scope().map(str::to_string))
                .unwrap_or_else(|| scopes::PER_LOOKUP.to_string()),
            qualifiers,
            creator: Arc::new(FactoryCreator::new(
                self.locator.clone(),
                self.self_ref.clone(),
                factory,
                self.implementation(),
            )),
        })
    }

    /// Maps every advertised contract name to the class's contract of that
    /// name. The implementation's own contract is always included.
    fn resolve_contracts(
        &self,
        available: &[ContractType],
        class: &str,
        collector: &mut Collector,
    ) -> Vec<ContractType> {
        let mut contracts = Vec::with_capacity(self.base.advertised_contracts.len() + 1);
        for name in &self.base.advertised_contracts {
            match available.iter().find(|c| c.name() == name) {
                Some(contract) => contracts.push(contract.clone()),
                None if name == class || name == self.implementation() => {}
                None => collector.add(LocatorError::reification(
                    self.implementation(),
                    format!("{class} does not provide contract {name}"),
                )),
            }
        }
        if let Some(own) = available.first()
            && !contracts.iter().any(|c| c.key() == own.key())
        {
            contracts.push(own.clone());
        }
        contracts
    }

    fn add_declared_qualifiers(&self, qualifiers: &mut Vec<Qualifier>) {
        if let Some(name) = &self.base.name
            && !qualifiers.iter().any(Qualifier::is_named)
        {
            qualifiers.push(Qualifier::named(name.clone()));
        }
        for declared in &self.base.qualifiers {
            if declared != NAMED && !qualifiers.iter().any(|q| q.name() == declared) {
                qualifiers.push(Qualifier::new(declared.clone()));
            }
        }
    }
}

impl fmt::Display for SystemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.base, f)
    }
}

impl fmt::Debug for SystemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("descriptor", &self.base)
            .field("ranking", &self.ranking())
            .field("reified", &self.is_reified())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unbound(descriptor: Descriptor, service_id: u64) -> Arc<SystemDescriptor> {
        SystemDescriptor::new(
            descriptor,
            DescriptorKey::new(1, service_id),
            Weak::new(),
            Source::Declared,
            None,
        )
    }

    #[test]
    fn test_ids_assigned_and_visible() {
        let d = unbound(Descriptor::builder("app::A").local_only().build(), 4);
        assert_eq!(d.descriptor().service_id, Some(4));
        assert_eq!(d.descriptor().locator_id, Some(1));
        assert_eq!(d.to_string(), "app::A[1.4]");
        assert!(d.visible_to(1));
        assert!(!d.visible_to(2));
    }

    #[test]
    fn test_scope_defaults_before_reification() {
        let d = unbound(Descriptor::builder("app::A").build(), 0);
        assert_eq!(d.scope(), scopes::PER_LOOKUP);
        let s = unbound(Descriptor::builder("app::A").in_scope(scopes::SINGLETON).build(), 1);
        assert_eq!(s.scope(), scopes::SINGLETON);
    }

    #[test]
    fn test_named_qualifier_matches_name() {
        let d = unbound(Descriptor::builder("app::A").named("front").build(), 0);
        assert!(d.has_qualifier(&Qualifier::named("front")));
        assert!(!d.has_qualifier(&Qualifier::named("rear")));
    }

    #[test]
    fn test_ranking_is_mutable() {
        let d = unbound(Descriptor::builder("app::A").ranked(3).build(), 0);
        assert_eq!(d.set_ranking(9), 3);
        assert_eq!(d.ranking(), 9);
        assert_eq!(d.descriptor().ranking, 3);
        assert_eq!(d.to_descriptor().ranking, 9);
    }

    #[test]
    fn test_reify_without_locator_fails() {
        let d = unbound(Descriptor::builder("app::A").build(), 0);
        assert!(d.reify().is_err());
        assert!(!d.is_reified());
    }
}
