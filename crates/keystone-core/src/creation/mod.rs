//! Creators: how a reified descriptor turns into instances.
//!
//! - [`ClassCreator`](class_creator::ClassCreator) constructs from a
//!   [`ServiceClass`](crate::foundation::class::ServiceClass) and its
//!   injection plan.
//! - [`FactoryCreator`](factory::FactoryCreator) delegates to a
//!   [`Factory`](factory::Factory) service.
//! - [`ActiveCreator`] runs the closures of a pre-reified
//!   [`AbstractActiveDescriptor`](crate::locator::active::AbstractActiveDescriptor).

pub mod class_creator;
pub mod factory;
pub mod injected;

use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, CreationPhase, LocatorError, LocatorResult};
use crate::foundation::injectee::Injectee;
use crate::foundation::types::ServiceArc;
use crate::locator::handle::ServiceHandle;

/// Creates and destroys the instances of one descriptor.
pub trait Creator: Send + Sync {
    /// Returns every injection point, in resolution order.
    fn injectees(&self) -> Vec<Injectee>;

    /// Creates a fully initialized instance.
    fn create(&self, root: &ServiceHandle) -> LocatorResult<ServiceArc>;

    /// Releases an instance previously returned by [`create`](Self::create).
    fn dispose(&self, instance: &ServiceArc) -> LocatorResult<()>;
}

pub(crate) type CreateFn = Arc<dyn Fn(&ServiceHandle) -> Result<ServiceArc, BoxError> + Send + Sync>;
pub(crate) type DisposeFn = Arc<dyn Fn(&ServiceArc) -> Result<(), BoxError> + Send + Sync>;

/// Creator backed by user closures, or by a constant instance.
pub(crate) struct ActiveCreator {
    implementation: String,
    constant: Option<ServiceArc>,
    create: Option<CreateFn>,
    dispose: Option<DisposeFn>,
}

impl ActiveCreator {
    pub(crate) fn new(
        implementation: String,
        constant: Option<ServiceArc>,
        create: Option<CreateFn>,
        dispose: Option<DisposeFn>,
    ) -> Self {
        Self {
            implementation,
            constant,
            create,
            dispose,
        }
    }
}

impl Creator for ActiveCreator {
    fn injectees(&self) -> Vec<Injectee> {
        Vec::new()
    }

    fn create(&self, root: &ServiceHandle) -> LocatorResult<ServiceArc> {
        if let Some(constant) = &self.constant {
            return Ok(constant.clone());
        }
        match &self.create {
            Some(create) => create(root).map_err(|e| {
                LocatorError::construction(CreationPhase::Create, &self.implementation, e).into()
            }),
            None => Err(LocatorError::illegal_state(format!(
                "{} has neither a constant nor a creation function",
                self.implementation
            ))
            .into()),
        }
    }

    fn dispose(&self, instance: &ServiceArc) -> LocatorResult<()> {
        match &self.dispose {
            Some(dispose) => dispose(instance)
                .map_err(|e| LocatorError::destruction(&self.implementation, e).into()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ActiveCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveCreator")
            .field("implementation", &self.implementation)
            .field("constant", &self.constant.is_some())
            .finish_non_exhaustive()
    }
}
