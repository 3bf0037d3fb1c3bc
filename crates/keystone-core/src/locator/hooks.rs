//! Extension points the locator consults while it works.
//!
//! Every hook is an ordinary service advertising one of the traits below.
//! The locator keeps a snapshot of each hook list ([`Hooks`]) and rebuilds
//! the affected lists right after each commit, so reading a hook never has to
//! create one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::analysis::ClassAnalyzer;
use crate::aop::InterceptionService;
use crate::context::Context;
use crate::error::{BoxError, ErrorInformation};
use crate::foundation::filter::{AllFilter, Filter};
use crate::foundation::injectee::Injectee;
use crate::foundation::types::{ServiceArc, TypeKey};
use crate::locator::system_descriptor::SystemDescriptor;
use crate::resolution::InjectionResolver;

/// Receives every failure the locator reports.
pub trait ErrorService: Send + Sync {
    /// Called once per reported failure.
    ///
    /// For reification failures, an error returned here is appended to the
    /// failure the caller sees. Otherwise it is logged and dropped.
    fn on_failure(&self, info: &ErrorInformation) -> Result<(), BoxError>;
}

// =============================================================================
// Validation
// =============================================================================

/// The operation a validator is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// A descriptor is being added.
    Bind,
    /// A descriptor is being removed.
    Unbind,
    /// A descriptor is about to be returned by a lookup.
    Lookup,
}

/// What a validator is asked to approve.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInformation<'a> {
    operation: Operation,
    candidate: &'a SystemDescriptor,
    injectee: Option<&'a Injectee>,
}

impl<'a> ValidationInformation<'a> {
    pub(crate) fn new(operation: Operation, candidate: &'a SystemDescriptor, injectee: Option<&'a Injectee>) -> Self {
        Self {
            operation,
            candidate,
            injectee,
        }
    }

    /// Returns the operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Returns the descriptor under validation.
    pub fn candidate(&self) -> &'a SystemDescriptor {
        self.candidate
    }

    /// Returns the injection point a lookup is for, if any.
    pub fn injectee(&self) -> Option<&'a Injectee> {
        self.injectee
    }
}

/// Approves or vetoes one operation.
pub trait Validator: Send + Sync {
    /// Returns `Ok(false)` to veto. An error also vetoes and is reported.
    fn validate(&self, info: &ValidationInformation<'_>) -> Result<bool, BoxError>;
}

/// A validator plus the descriptors whose lookups it checks.
pub trait ValidationService: Send + Sync {
    /// Selects descriptors whose lookups are validated. Binds and unbinds are
    /// always validated.
    fn lookup_filter(&self) -> &dyn Filter;

    /// Returns the validator.
    fn validator(&self) -> &dyn Validator;
}

// =============================================================================
// Configuration
// =============================================================================

/// Notified once after every successful commit.
pub trait DynamicConfigurationListener: Send + Sync {
    /// Called after the new registry is visible. Errors are logged.
    fn configuration_changed(&self) -> Result<(), BoxError>;
}

/// The descriptors a commit adds and removes.
#[derive(Debug, Clone, Default)]
pub struct TwoPhaseTransactionData {
    pub(crate) added: Vec<Arc<SystemDescriptor>>,
    pub(crate) removed: Vec<Arc<SystemDescriptor>>,
}

impl TwoPhaseTransactionData {
    /// Descriptors being added.
    pub fn added(&self) -> &[Arc<SystemDescriptor>] {
        &self.added
    }

    /// Descriptors being removed.
    pub fn removed(&self) -> &[Arc<SystemDescriptor>] {
        &self.removed
    }
}

/// A participant in a commit that may veto it.
pub trait TwoPhaseResource: Send + Sync {
    /// Called before the registry changes. An error aborts the commit.
    fn prepare(&self, data: &TwoPhaseTransactionData) -> Result<(), BoxError>;

    /// Called after the registry changed.
    fn activate(&self, _data: &TwoPhaseTransactionData) -> Result<(), BoxError> {
        Ok(())
    }

    /// Called when a later resource's prepare failed.
    fn rollback(&self, _data: &TwoPhaseTransactionData) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Gets a last chance to bind something when an injection point has no match.
pub trait JustInTimeInjectionResolver: Send + Sync {
    /// Returns `true` if it committed descriptors that may now satisfy
    /// `injectee`.
    fn just_in_time_resolution(&self, injectee: &Injectee) -> Result<bool, BoxError>;
}

// =============================================================================
// Instance Lifecycle
// =============================================================================

/// When an instance lifecycle event fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEventType {
    /// Before a service is created.
    PreProduction,
    /// After a service was created.
    PostProduction,
    /// Before a service is destroyed.
    PreDestruction,
}

/// One instance lifecycle event.
#[derive(Debug, Clone, Copy)]
pub struct InstanceLifecycleEvent<'a> {
    event_type: LifecycleEventType,
    descriptor: &'a Arc<SystemDescriptor>,
    instance: Option<&'a ServiceArc>,
}

impl<'a> InstanceLifecycleEvent<'a> {
    pub(crate) fn new(
        event_type: LifecycleEventType,
        descriptor: &'a Arc<SystemDescriptor>,
        instance: Option<&'a ServiceArc>,
    ) -> Self {
        Self {
            event_type,
            descriptor,
            instance,
        }
    }

    /// Returns the event type.
    pub fn event_type(&self) -> LifecycleEventType {
        self.event_type
    }

    /// Returns the descriptor of the service.
    pub fn descriptor(&self) -> &'a Arc<SystemDescriptor> {
        self.descriptor
    }

    /// Returns the raw instance; absent for pre-production.
    pub fn instance(&self) -> Option<&'a ServiceArc> {
        self.instance
    }
}

/// Observes creation and destruction of services.
pub trait InstanceLifecycleListener: Send + Sync {
    /// Selects the descriptors this listener hears about.
    fn filter(&self) -> &dyn Filter {
        &AllFilter
    }

    /// Called for every event on a selected descriptor.
    fn lifecycle_event(&self, event: &InstanceLifecycleEvent<'_>);
}

// =============================================================================
// Hook Snapshot
// =============================================================================

/// The hook lists of one locator, in registry order.
#[derive(Clone, Default)]
pub(crate) struct Hooks {
    pub(crate) error_services: Vec<Arc<dyn ErrorService>>,
    pub(crate) validation: Vec<Arc<dyn ValidationService>>,
    pub(crate) listeners: Vec<Arc<dyn DynamicConfigurationListener>>,
    pub(crate) jit: Vec<Arc<dyn JustInTimeInjectionResolver>>,
    pub(crate) interception: Vec<Arc<dyn InterceptionService>>,
    pub(crate) lifecycle: Vec<Arc<dyn InstanceLifecycleListener>>,
    pub(crate) resolvers: HashMap<String, Arc<dyn InjectionResolver>>,
    pub(crate) analyzers: HashMap<String, Arc<dyn ClassAnalyzer>>,
}

/// Which hook lists a change touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct HookKinds {
    pub(crate) error_services: bool,
    pub(crate) validation: bool,
    pub(crate) listeners: bool,
    pub(crate) jit: bool,
    pub(crate) interception: bool,
    pub(crate) lifecycle: bool,
    pub(crate) resolvers: bool,
    pub(crate) analyzers: bool,
    pub(crate) contexts: bool,
}

fn advertises<C: ?Sized + 'static>(descriptor: &SystemDescriptor) -> bool {
    descriptor.descriptor().advertises(TypeKey::of::<C>().name())
}

impl HookKinds {
    pub(crate) fn all() -> Self {
        Self {
            error_services: true,
            validation: true,
            listeners: true,
            jit: true,
            interception: true,
            lifecycle: true,
            resolvers: true,
            analyzers: true,
            contexts: true,
        }
    }

    pub(crate) fn of<'a>(descriptors: impl IntoIterator<Item = &'a Arc<SystemDescriptor>>) -> Self {
        let mut kinds = Self::default();
        for d in descriptors {
            kinds.error_services |= advertises::<dyn ErrorService>(d);
            kinds.validation |= advertises::<dyn ValidationService>(d);
            kinds.listeners |= advertises::<dyn DynamicConfigurationListener>(d);
            kinds.jit |= advertises::<dyn JustInTimeInjectionResolver>(d);
            kinds.interception |= advertises::<dyn InterceptionService>(d);
            kinds.lifecycle |= advertises::<dyn InstanceLifecycleListener>(d);
            kinds.resolvers |= advertises::<dyn InjectionResolver>(d);
            kinds.analyzers |= advertises::<dyn ClassAnalyzer>(d);
            kinds.contexts |= advertises::<dyn Context>(d);
        }
        kinds
    }

    pub(crate) fn any(&self) -> bool {
        *self != Self::default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use super::*;
    use crate::foundation::descriptor::Descriptor;
    use crate::locator::system_descriptor::{DescriptorKey, Source};

    #[test]
    fn test_hook_kinds_follow_advertised_contracts() {
        let listener = SystemDescriptor::new(
            Descriptor::builder("app::Watcher")
                .to_type::<dyn DynamicConfigurationListener>()
                .build(),
            DescriptorKey::new(0, 0),
            Weak::new(),
            Source::Declared,
            None,
        );
        let plain = SystemDescriptor::new(
            Descriptor::builder("app::Plain").to("app::Plain").build(),
            DescriptorKey::new(0, 1),
            Weak::new(),
            Source::Declared,
            None,
        );

        let kinds = HookKinds::of([&listener, &plain]);
        assert!(kinds.listeners);
        assert!(!kinds.error_services);
        assert!(kinds.any());
        assert!(!HookKinds::of([&plain]).any());
    }
}
