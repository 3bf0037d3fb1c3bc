//! Enabling the optional scopes.
//!
//! Each function binds the context of one scope into a locator. Calling it
//! again returns what the first call bound.

use std::sync::Arc;

use tracing::info;

use crate::context::immediate::{ImmediateContext, ImmediateController};
use crate::context::per_thread::{InheritableThreadContext, PerThreadContext};
use crate::context::{Context, scopes};
use crate::error::LocatorResult;
use crate::foundation::filter;
use crate::locator::ServiceLocator;
use crate::locator::active::AbstractActiveDescriptor;
use crate::locator::hooks::DynamicConfigurationListener;

fn bound<T: Send + Sync + 'static>(locator: &ServiceLocator) -> LocatorResult<Option<Arc<T>>> {
    match locator.local_descriptors(&filter::contract_of::<T>()).into_iter().next() {
        Some(descriptor) => locator.handle_for(&descriptor).service_as::<T>().map(Some),
        None => Ok(None),
    }
}

fn enable_thread_scope<T>(locator: &ServiceLocator, scope: &str, context: impl FnOnce() -> T) -> LocatorResult<Arc<T>>
where
    T: Context + 'static,
{
    if let Some(existing) = bound::<T>(locator)? {
        return Ok(existing);
    }
    let context = Arc::new(context());
    let mut config = locator.configuration()?;
    config.bind_active(
        AbstractActiveDescriptor::constant_arc(context.clone())
            .contract::<T, dyn Context>(|c| c)
            .named(scope),
    )?;
    config.commit()?;
    info!(locator = %locator.name(), scope, "Enabled scope");
    Ok(context)
}

/// Binds the [`PER_THREAD`](scopes::PER_THREAD) context.
pub fn enable_per_thread_scope(locator: &ServiceLocator) -> LocatorResult<Arc<PerThreadContext>> {
    enable_thread_scope(locator, scopes::PER_THREAD, PerThreadContext::new)
}

/// Binds the [`INHERITABLE_THREAD`](scopes::INHERITABLE_THREAD) context.
pub fn enable_inheritable_thread_scope(locator: &ServiceLocator) -> LocatorResult<Arc<InheritableThreadContext>> {
    enable_thread_scope(locator, scopes::INHERITABLE_THREAD, InheritableThreadContext::new)
}

/// Binds the [`IMMEDIATE`](scopes::IMMEDIATE) context and its controller.
///
/// Immediate services already bound are created as part of this call's
/// commit.
pub fn enable_immediate_scope(locator: &ServiceLocator) -> LocatorResult<Arc<ImmediateController>> {
    if let Some(existing) = bound::<ImmediateController>(locator)? {
        return Ok(existing);
    }
    let context = Arc::new(ImmediateContext::new(locator.weak()));
    let controller = ImmediateController::new(locator.weak(), context.clone());

    let mut config = locator.configuration()?;
    config.bind_active(
        AbstractActiveDescriptor::constant_arc(context)
            .contract::<ImmediateContext, dyn Context>(|c| c)
            .named(scopes::IMMEDIATE),
    )?;
    config.bind_active(
        AbstractActiveDescriptor::constant_arc(controller.clone())
            .contract::<ImmediateController, dyn DynamicConfigurationListener>(|c| c),
    )?;
    config.commit()?;
    info!(locator = %locator.name(), scope = scopes::IMMEDIATE, "Enabled scope");
    Ok(controller)
}
