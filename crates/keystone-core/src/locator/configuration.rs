//! Dynamic configuration transactions.
//!
//! A [`DynamicConfiguration`] accumulates binds, unbind filters, idempotent
//! filters and two-phase resources, then applies all of them in one
//! [`commit`](DynamicConfiguration::commit):
//!
//! 1. idempotent filters are checked against the current registry;
//! 2. new descriptors get their ids, unbind filters pick what goes away;
//! 3. validators may veto individual binds and unbinds;
//! 4. two-phase resources prepare, rolling back in reverse on failure;
//! 5. the new registry snapshot is swapped in;
//! 6. resources activate, hook lists are rebuilt, removed services are
//!    destroyed and every configuration listener is notified once.
//!
//! Readers never see a partial commit.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{ErrorType, LocatorError, LocatorResult, MultiError};
use crate::foundation::class::ServiceClass;
use crate::foundation::descriptor::{Descriptor, DescriptorType, FactoryDescriptors};
use crate::foundation::filter::Filter;
use crate::locator::ServiceLocator;
use crate::locator::active::AbstractActiveDescriptor;
use crate::locator::hooks::{HookKinds, Operation, TwoPhaseResource, TwoPhaseTransactionData};
use crate::locator::system_descriptor::{Source, SystemDescriptor};

/// Lifecycle of a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigurationState {
    /// Accepting changes.
    Open,
    /// Committed; further use is an error.
    Committed,
}

enum PendingBind {
    Descriptor(Descriptor),
    Active(AbstractActiveDescriptor),
    Factory(FactoryDescriptors),
}

/// Everything one commit applies.
#[derive(Default)]
pub(crate) struct PendingChanges {
    binds: Vec<PendingBind>,
    classes: Vec<Arc<ServiceClass>>,
    unbind_filters: Vec<Arc<dyn Filter>>,
    idempotent_filters: Vec<Arc<dyn Filter>>,
    resources: Vec<Arc<dyn TwoPhaseResource>>,
}

/// A batch of registry changes applied atomically.
pub struct DynamicConfiguration {
    locator: Arc<ServiceLocator>,
    state: ConfigurationState,
    changes: PendingChanges,
}

impl DynamicConfiguration {
    pub(crate) fn new(locator: Arc<ServiceLocator>) -> Self {
        Self {
            locator,
            state: ConfigurationState::Open,
            changes: PendingChanges::default(),
        }
    }

    fn check_open(&self) -> LocatorResult<()> {
        match self.state {
            ConfigurationState::Open => Ok(()),
            ConfigurationState::Committed => {
                Err(LocatorError::illegal_state("configuration has already been committed").into())
            }
        }
    }

    /// Returns the state.
    pub fn state(&self) -> ConfigurationState {
        self.state
    }

    /// Binds a descriptor. Provide-method descriptors must be bound with
    /// [`bind_factory`](Self::bind_factory).
    pub fn bind(&mut self, descriptor: Descriptor) -> LocatorResult<()> {
        self.check_open()?;
        if descriptor.descriptor_type == DescriptorType::ProvideMethod {
            return Err(LocatorError::illegal_argument(format!(
                "{descriptor} is a provide method; bind it together with its factory"
            ))
            .into());
        }
        self.changes.binds.push(PendingBind::Descriptor(descriptor.without_ids()));
        Ok(())
    }

    /// Binds a pre-reified descriptor.
    pub fn bind_active(&mut self, active: AbstractActiveDescriptor) -> LocatorResult<()> {
        self.check_open()?;
        self.changes.binds.push(PendingBind::Active(active));
        Ok(())
    }

    /// Binds a factory and its provide method as a linked pair.
    pub fn bind_factory(&mut self, pair: FactoryDescriptors) -> LocatorResult<()> {
        self.check_open()?;
        if pair.factory_as_factory.descriptor_type != DescriptorType::ProvideMethod {
            return Err(LocatorError::illegal_argument(format!(
                "{} is not a provide-method descriptor",
                pair.factory_as_factory
            ))
            .into());
        }
        self.changes.binds.push(PendingBind::Factory(FactoryDescriptors {
            factory_as_service: pair.factory_as_service.without_ids(),
            factory_as_factory: pair.factory_as_factory.without_ids(),
        }));
        Ok(())
    }

    /// Registers `class` with the locator and binds `descriptor` for it.
    pub fn bind_class(&mut self, class: Arc<ServiceClass>, descriptor: Descriptor) -> LocatorResult<()> {
        self.check_open()?;
        self.changes.classes.push(class);
        self.bind(descriptor)
    }

    /// Registers `class` and binds it with a descriptor built from its
    /// contracts, scope and qualifiers.
    pub fn add_class(&mut self, class: Arc<ServiceClass>) -> LocatorResult<()> {
        let descriptor = class.descriptor_builder().build();
        self.bind_class(class, descriptor)
    }

    /// Registers a factory class and binds it with its provide method.
    pub fn add_factory(&mut self, class: Arc<ServiceClass>) -> LocatorResult<()> {
        self.check_open()?;
        let pair = class.factory_descriptors().ok_or_else(|| {
            LocatorError::illegal_argument(format!("{} does not declare a product", class.name()))
        })?;
        self.changes.classes.push(class);
        self.bind_factory(pair)
    }

    /// Removes every current descriptor of this locator matching `filter`.
    pub fn add_unbind_filter(&mut self, filter: impl Filter + 'static) -> LocatorResult<()> {
        self.check_open()?;
        self.changes.unbind_filters.push(Arc::new(filter));
        Ok(())
    }

    /// Fails the commit if any current descriptor matches `filter`.
    pub fn add_idempotent_filter(&mut self, filter: impl Filter + 'static) -> LocatorResult<()> {
        self.check_open()?;
        self.changes.idempotent_filters.push(Arc::new(filter));
        Ok(())
    }

    /// Enlists a resource in this commit only.
    pub fn register_two_phase_resource(&mut self, resource: Arc<dyn TwoPhaseResource>) -> LocatorResult<()> {
        self.check_open()?;
        self.changes.resources.push(resource);
        Ok(())
    }

    /// Applies every change atomically and returns the added descriptors in
    /// bind order. A factory pair adds the factory, then its products.
    pub fn commit(&mut self) -> LocatorResult<Vec<Arc<SystemDescriptor>>> {
        self.check_open()?;
        self.state = ConfigurationState::Committed;
        let changes = std::mem::take(&mut self.changes);
        self.locator.commit(changes)
    }
}

impl fmt::Debug for DynamicConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicConfiguration")
            .field("locator", &self.locator.name())
            .field("state", &self.state)
            .field("binds", &self.changes.binds.len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Commit
// =============================================================================

impl ServiceLocator {
    pub(crate) fn commit(&self, changes: PendingChanges) -> LocatorResult<Vec<Arc<SystemDescriptor>>> {
        self.check_running()?;
        let commit_guard = self.commit_lock.lock();
        let current = self.registry.read().clone();

        for filter in &changes.idempotent_filters {
            if let Some(existing) = current.all().iter().find(|d| filter.matches(d)) {
                let error = MultiError::from(LocatorError::DuplicateService {
                    descriptor: Box::new(existing.to_descriptor()),
                });
                return Err(self.report(ErrorType::DynamicConfigurationFailure, None, None, error));
            }
        }

        let mut added = Vec::with_capacity(changes.binds.len());
        for bind in changes.binds {
            match bind {
                PendingBind::Descriptor(descriptor) => {
                    added.push(self.new_descriptor(descriptor, Source::Declared, None));
                }
                PendingBind::Active(active) => {
                    let descriptor = active.descriptor().clone();
                    added.push(self.new_descriptor(descriptor, Source::Active(active), None));
                }
                PendingBind::Factory(pair) => {
                    let service = self.new_descriptor(pair.factory_as_service, Source::Declared, None);
                    let provide = self.new_descriptor(pair.factory_as_factory, Source::Declared, Some(service.key()));
                    added.push(service);
                    added.push(provide);
                }
            }
        }
        let mut removed: Vec<_> = current
            .all()
            .iter()
            .filter(|d| d.locator_id() == self.id())
            .filter(|d| changes.unbind_filters.iter().any(|f| f.matches(d)))
            .cloned()
            .collect();

        added.retain(|d| self.validate(Operation::Bind, d, None));
        removed.retain(|d| self.validate(Operation::Unbind, d, None));

        let data = TwoPhaseTransactionData { added, removed };
        let mut prepared: Vec<&Arc<dyn TwoPhaseResource>> = Vec::with_capacity(changes.resources.len());
        for resource in &changes.resources {
            if let Err(e) = resource.prepare(&data) {
                for done in prepared.iter().rev() {
                    if let Err(e) = done.rollback(&data) {
                        warn!(locator = %self.name(), error = %e, "Two-phase rollback failed");
                    }
                }
                let error = MultiError::from(LocatorError::DynamicConfiguration(e.to_string()));
                return Err(self.report(ErrorType::DynamicConfigurationFailure, None, None, error));
            }
            prepared.push(resource);
        }

        for class in changes.classes {
            self.classes.register(class);
        }
        let removed_keys: HashSet<_> = data.removed.iter().map(|d| d.key()).collect();
        let next = Arc::new(current.with_changes(&data.added, &removed_keys));
        let size = next.len();
        *self.registry.write() = next;
        drop(commit_guard);

        info!(
            locator = %self.name(),
            added = data.added.len(),
            removed = data.removed.len(),
            size,
            "Committed configuration"
        );

        for resource in &changes.resources {
            if let Err(e) = resource.activate(&data) {
                warn!(locator = %self.name(), error = %e, "Two-phase activation failed");
            }
        }

        let kinds = HookKinds::of(data.added.iter().chain(&data.removed));
        if kinds.any() {
            self.reup(kinds);
        }

        for descriptor in &data.removed {
            self.destroy_removed(descriptor);
        }

        for listener in self.hooks().listeners.iter() {
            if let Err(e) = listener.configuration_changed() {
                warn!(locator = %self.name(), error = %e, "Configuration listener failed");
            }
        }
        Ok(data.added)
    }

    fn new_descriptor(
        &self,
        descriptor: Descriptor,
        source: Source,
        factory: Option<crate::locator::system_descriptor::DescriptorKey>,
    ) -> Arc<SystemDescriptor> {
        let key = self.next_key();
        SystemDescriptor::new(descriptor, key, self.weak(), source, factory)
    }

    fn destroy_removed(&self, descriptor: &Arc<SystemDescriptor>) {
        if !descriptor.is_reified() {
            return;
        }
        debug!(descriptor = %descriptor, "Destroying unbound service");
        self.destroy_in_context(descriptor);
        descriptor.clear_cache();
    }

    /// Re-sorts the registry after `descriptor`'s ranking changes and returns
    /// the previous ranking.
    pub fn set_ranking(&self, descriptor: &SystemDescriptor, ranking: i32) -> LocatorResult<i32> {
        self.check_running()?;
        if descriptor.locator_id() != self.id() {
            return Err(LocatorError::illegal_argument(format!(
                "{descriptor} is not registered in locator {}",
                self.name()
            ))
            .into());
        }
        let _commit = self.commit_lock.lock();
        let reranked = Arc::new(self.registry.read().reranked(descriptor.key(), ranking));
        let mut registry = self.registry.write();
        let previous = descriptor.set_ranking(ranking);
        *registry = reranked;
        drop(registry);
        debug!(descriptor = %descriptor, previous, ranking, "Changed ranking");
        Ok(previous)
    }
}
