//! Factory-backed creation.

use std::sync::{Arc, Weak};

use tracing::trace;

use crate::context::scopes;
use crate::creation::Creator;
use crate::error::{BoxError, CreationPhase, LocatorError, LocatorResult, MultiError};
use crate::foundation::injectee::Injectee;
use crate::foundation::types::{ServiceArc, TypeKey, downcast_view};
use crate::locator::ServiceLocator;
use crate::locator::handle::ServiceHandle;
use crate::locator::hooks::LifecycleEventType;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};

/// A service that produces instances of another service.
///
/// A factory is bound as a [`FactoryDescriptors`] pair: the factory itself is
/// an ordinary class service in its own scope, and its products are
/// described by a provide-method descriptor.
///
/// [`FactoryDescriptors`]: crate::foundation::descriptor::FactoryDescriptors
pub trait Factory: Send + Sync {
    /// Produces one instance.
    fn provide(&self) -> Result<ServiceArc, BoxError>;

    /// Releases an instance produced by [`provide`](Self::provide).
    fn dispose(&self, instance: ServiceArc) -> Result<(), BoxError> {
        let _ = instance;
        Ok(())
    }
}

/// Creates instances by calling a [`Factory`] service.
pub struct FactoryCreator {
    locator: Weak<ServiceLocator>,
    owner: Weak<SystemDescriptor>,
    factory: DescriptorKey,
    implementation: String,
}

impl FactoryCreator {
    pub(crate) fn new(
        locator: Weak<ServiceLocator>,
        owner: Weak<SystemDescriptor>,
        factory: DescriptorKey,
        implementation: impl Into<String>,
    ) -> Self {
        Self {
            locator,
            owner,
            factory,
            implementation: implementation.into(),
        }
    }

    /// Returns the key of the factory service's descriptor.
    pub fn factory_key(&self) -> DescriptorKey {
        self.factory
    }

    fn locator(&self) -> LocatorResult<Arc<ServiceLocator>> {
        self.locator
            .upgrade()
            .ok_or_else(|| LocatorError::illegal_state("locator has been dropped").into())
    }

    fn factory_descriptor(&self, locator: &ServiceLocator) -> LocatorResult<Arc<SystemDescriptor>> {
        locator.descriptor_by_key(self.factory).ok_or_else(|| {
            LocatorError::illegal_state(format!(
                "factory {} of {} is no longer registered",
                self.factory, self.implementation
            ))
            .into()
        })
    }

    fn factory_instance(
        &self,
        locator: &ServiceLocator,
        descriptor: &Arc<SystemDescriptor>,
        root: &ServiceHandle,
    ) -> LocatorResult<Arc<dyn Factory>> {
        locator.reify(descriptor)?;
        let raw = locator.create_in_context(descriptor, root, false)?;
        as_factory(descriptor, &raw)
    }

    /// Wraps `errors` in a new, unreported failure of this creation.
    fn fail(&self, phase: CreationPhase, errors: MultiError) -> MultiError {
        let mut failed = MultiError::new();
        failed.extend(errors);
        failed.push(LocatorError::CreationFailed {
            phase,
            implementation: self.implementation.clone(),
        });
        failed
    }
}

fn as_factory(descriptor: &SystemDescriptor, raw: &ServiceArc) -> LocatorResult<Arc<dyn Factory>> {
    let contract = descriptor
        .contract_type(TypeKey::of::<dyn Factory>())
        .ok_or_else(|| {
            LocatorError::reification(
                descriptor.implementation(),
                "factory service does not advertise the Factory contract",
            )
        })?;
    let view = contract.view(raw)?;
    downcast_view::<dyn Factory>(&view).ok_or_else(|| {
        LocatorError::illegal_state(format!("{} is not a Factory", descriptor.implementation())).into()
    })
}

impl Creator for FactoryCreator {
    fn injectees(&self) -> Vec<Injectee> {
        Vec::new()
    }

    fn create(&self, root: &ServiceHandle) -> LocatorResult<ServiceArc> {
        let locator = self.locator()?;
        let factory_descriptor = self.factory_descriptor(&locator)?;

        // A factory whose own creation needs its product can never finish.
        let _marker = root.trace().enter_factory(&factory_descriptor)?;

        let factory = self
            .factory_instance(&locator, &factory_descriptor, root)
            .map_err(|e| self.fail(CreationPhase::Provide, e))?;

        let owner = self.owner.upgrade();
        if let Some(owner) = &owner {
            locator.notify_lifecycle(LifecycleEventType::PreProduction, owner, None);
        }

        trace!(product = %self.implementation, factory = %factory_descriptor.key(), "Calling provide");
        let instance = factory.provide().map_err(|e| {
            self.fail(
                CreationPhase::Provide,
                LocatorError::construction(CreationPhase::Provide, &self.implementation, e).into(),
            )
        })?;

        if let Some(owner) = &owner {
            locator.notify_lifecycle(LifecycleEventType::PostProduction, owner, Some(&instance));
        }
        Ok(instance)
    }

    fn dispose(&self, instance: &ServiceArc) -> LocatorResult<()> {
        let locator = self.locator()?;
        if let Some(owner) = self.owner.upgrade() {
            locator.notify_lifecycle(LifecycleEventType::PreDestruction, &owner, Some(instance));
        }

        let factory_descriptor = self.factory_descriptor(&locator)?;
        let handle = locator.handle_for(&factory_descriptor);
        let factory = as_factory(&factory_descriptor, &handle.service()?)?;
        let result = factory
            .dispose(instance.clone())
            .map_err(|e| LocatorError::destruction(&self.implementation, e).into());

        // A per-lookup factory was created just for this call.
        if factory_descriptor.scope() == scopes::PER_LOOKUP {
            handle.destroy();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter;

    impl Factory for Counter {
        fn provide(&self) -> Result<ServiceArc, BoxError> {
            Ok(Arc::new(1_u32))
        }
    }

    #[test]
    fn test_default_dispose_is_noop() {
        let factory = Counter;
        let instance = factory.provide().unwrap();
        assert!(factory.dispose(instance).is_ok());
    }
}
