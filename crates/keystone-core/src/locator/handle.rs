//! Service handles and the resolution trace.
//!
//! A [`ServiceHandle`] is a lazily-resolving reference to one descriptor's
//! service. Handles created while resolving a consumer share one
//! [`ResolutionTrace`], the stack of descriptors currently being created on
//! behalf of the outermost lookup. Re-entering a descriptor already on the
//! stack is a circular dependency.
//!
//! Per-lookup instances created for a consumer are attached to the consumer's
//! handle as sub-handles and destroyed with it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::context::scopes;
use crate::error::{LocatorError, LocatorResult};
use crate::foundation::injectee::Injectee;
use crate::foundation::types::{ServiceArc, TypeKey, downcast_view};
use crate::locator::ServiceLocator;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};

// =============================================================================
// Resolution Trace
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TraceKey {
    Service(DescriptorKey),
    Factory(DescriptorKey),
}

/// The creation stack of one resolution.
#[derive(Debug, Default)]
pub(crate) struct ResolutionTrace {
    stack: Mutex<Vec<(TraceKey, String)>>,
}

impl ResolutionTrace {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pushes `descriptor` while its service is being created.
    pub(crate) fn enter(self: &Arc<Self>, descriptor: &SystemDescriptor) -> Result<TraceGuard, LocatorError> {
        self.push(TraceKey::Service(descriptor.key()), descriptor.to_string())
    }

    /// Pushes `factory` while its provide method is running.
    pub(crate) fn enter_factory(self: &Arc<Self>, factory: &SystemDescriptor) -> Result<TraceGuard, LocatorError> {
        self.push(TraceKey::Factory(factory.key()), format!("{factory}::provide"))
    }

    fn push(self: &Arc<Self>, key: TraceKey, label: String) -> Result<TraceGuard, LocatorError> {
        let mut stack = self.stack.lock();
        if let Some(start) = stack.iter().position(|(k, _)| *k == key) {
            let mut path: Vec<&str> = stack[start..].iter().map(|(_, l)| l.as_str()).collect();
            path.push(&label);
            return Err(LocatorError::CircularDependency {
                path: path.join(" -> "),
                descriptor: label,
            });
        }
        stack.push((key, label));
        Ok(TraceGuard {
            trace: self.clone(),
            key,
        })
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.lock().len()
    }
}

/// Pops its entry off the trace when dropped.
pub(crate) struct TraceGuard {
    trace: Arc<ResolutionTrace>,
    key: TraceKey,
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        let mut stack = self.trace.stack.lock();
        if let Some(index) = stack.iter().rposition(|(k, _)| *k == self.key) {
            stack.remove(index);
        }
    }
}

// =============================================================================
// Service Handle
// =============================================================================

struct HandleInner {
    locator: Weak<ServiceLocator>,
    descriptor: Arc<SystemDescriptor>,
    injectee: Option<Injectee>,
    instance: Mutex<Option<ServiceArc>>,
    sub_handles: Mutex<Vec<ServiceHandle>>,
    destroyed: AtomicBool,
    trace: Arc<ResolutionTrace>,
}

/// A lazily-resolving reference to one service.
#[derive(Clone)]
pub struct ServiceHandle {
    inner: Arc<HandleInner>,
}

impl ServiceHandle {
    fn with(
        locator: Weak<ServiceLocator>,
        descriptor: Arc<SystemDescriptor>,
        injectee: Option<Injectee>,
        instance: Option<ServiceArc>,
        trace: Arc<ResolutionTrace>,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                locator,
                descriptor,
                injectee,
                instance: Mutex::new(instance),
                sub_handles: Mutex::new(Vec::new()),
                destroyed: AtomicBool::new(false),
                trace,
            }),
        }
    }

    /// A handle starting a fresh resolution.
    pub(crate) fn root(
        locator: Weak<ServiceLocator>,
        descriptor: Arc<SystemDescriptor>,
        injectee: Option<Injectee>,
    ) -> Self {
        Self::with(locator, descriptor, injectee, None, ResolutionTrace::new())
    }

    /// A handle for a dependency created within this handle's resolution.
    pub(crate) fn child_root(&self, descriptor: &Arc<SystemDescriptor>) -> Self {
        Self::with(
            self.inner.locator.clone(),
            descriptor.clone(),
            None,
            None,
            self.inner.trace.clone(),
        )
    }

    /// A handle around an instance that was already created.
    pub(crate) fn created(&self, descriptor: Arc<SystemDescriptor>, instance: ServiceArc) -> Self {
        Self::with(
            self.inner.locator.clone(),
            descriptor,
            None,
            Some(instance),
            self.inner.trace.clone(),
        )
    }

    fn locator(&self) -> LocatorResult<Arc<ServiceLocator>> {
        self.inner
            .locator
            .upgrade()
            .ok_or_else(|| LocatorError::illegal_state("locator behind a service handle has been dropped").into())
    }

    /// Returns the descriptor this handle resolves.
    pub fn descriptor(&self) -> &Arc<SystemDescriptor> {
        &self.inner.descriptor
    }

    /// Returns the injection point the handle was created for, if any.
    pub fn injectee(&self) -> Option<&Injectee> {
        self.inner.injectee.as_ref()
    }

    /// Returns the raw service, creating it on first use.
    ///
    /// The raw instance is a [`ProxyHandle`](crate::aop::proxy::ProxyHandle)
    /// when the service is proxied; use [`service_as`](Self::service_as) to
    /// get a contract view.
    pub fn service(&self) -> LocatorResult<ServiceArc> {
        if self.is_destroyed() {
            return Err(LocatorError::illegal_state(format!(
                "handle for {} has been destroyed",
                self.inner.descriptor
            ))
            .into());
        }
        if let Some(instance) = self.inner.instance.lock().clone() {
            return Ok(instance);
        }

        let locator = self.locator()?;
        let (raw, _) = locator.obtain_owned(&self.inner.descriptor, self.inner.injectee.as_ref(), self)?;
        let mut slot = self.inner.instance.lock();
        Ok(slot.get_or_insert(raw).clone())
    }

    /// Returns the service viewed as contract `C`.
    pub fn service_as<C: ?Sized + 'static>(&self) -> LocatorResult<Arc<C>> {
        let raw = self.service()?;
        let view = self.inner.descriptor.view(TypeKey::of::<C>(), &raw)?;
        downcast_view::<C>(&view).ok_or_else(|| {
            LocatorError::illegal_argument(format!(
                "{} cannot be viewed as {}",
                self.inner.descriptor,
                std::any::type_name::<C>()
            ))
            .into()
        })
    }

    /// Returns `true` if the service has been created and not destroyed.
    pub fn is_active(&self) -> bool {
        if self.is_destroyed() {
            return false;
        }
        if self.inner.instance.lock().is_some() {
            return true;
        }
        self.inner
            .locator
            .upgrade()
            .is_some_and(|locator| locator.context_contains(&self.inner.descriptor))
    }

    /// Returns `true` once [`destroy`](Self::destroy) has run.
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::Acquire)
    }

    /// Returns the number of dependent handles attached to this one.
    pub fn sub_handle_count(&self) -> usize {
        self.inner.sub_handles.lock().len()
    }

    /// Destroys the service this handle obtained, then every sub-handle.
    ///
    /// Per-lookup services are disposed directly; services of other scopes
    /// are removed from their context. Only the first call has an effect.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let descriptor = &self.inner.descriptor;
        if let Some(instance) = self.inner.instance.lock().take() {
            if descriptor.scope() == scopes::PER_LOOKUP {
                if let Err(e) = descriptor.dispose(&instance) {
                    warn!(descriptor = %descriptor, error = %e, "Failed to dispose per-lookup service");
                }
            } else if let Some(locator) = self.inner.locator.upgrade() {
                locator.destroy_instance_in_context(descriptor, &instance);
            }
        }
        self.release_sub_handles();
        trace!(descriptor = %descriptor, "Destroyed service handle");
    }

    pub(crate) fn trace(&self) -> &Arc<ResolutionTrace> {
        &self.inner.trace
    }

    pub(crate) fn add_sub_handle(&self, handle: ServiceHandle) {
        self.inner.sub_handles.lock().push(handle);
    }

    /// Destroys every sub-handle, most recent first.
    pub(crate) fn release_sub_handles(&self) {
        self.release_sub_handles_since(0);
    }

    /// Marks the current end of the sub-handle list.
    pub(crate) fn sub_handle_mark(&self) -> usize {
        self.inner.sub_handles.lock().len()
    }

    /// Destroys the sub-handles added after `mark`, most recent first.
    pub(crate) fn release_sub_handles_since(&self, mark: usize) {
        let subs = {
            let mut subs = self.inner.sub_handles.lock();
            let mark = mark.min(subs.len());
            subs.split_off(mark)
        };
        for sub in subs.into_iter().rev() {
            sub.destroy();
        }
    }
}

impl fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("descriptor", &self.inner.descriptor.to_string())
            .field("destroyed", &self.is_destroyed())
            .field("sub_handles", &self.sub_handle_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::descriptor::Descriptor;
    use crate::locator::system_descriptor::Source;

    fn descriptor(implementation: &str, service_id: u64) -> Arc<SystemDescriptor> {
        SystemDescriptor::new(
            Descriptor::builder(implementation).build(),
            DescriptorKey::new(0, service_id),
            Weak::new(),
            Source::Declared,
            None,
        )
    }

    #[test]
    fn test_trace_detects_cycle_with_path() {
        let a = descriptor("A", 0);
        let b = descriptor("B", 1);
        let trace = ResolutionTrace::new();

        let _a = trace.enter(&a).unwrap();
        let _b = trace.enter(&b).unwrap();
        let err = trace.enter(&a).err().unwrap();
        match err {
            LocatorError::CircularDependency { path, .. } => {
                assert_eq!(path, "A[0.0] -> B[0.1] -> A[0.0]");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trace_guard_pops_on_drop() {
        let a = descriptor("A", 0);
        let trace = ResolutionTrace::new();
        {
            let _guard = trace.enter(&a).unwrap();
            assert_eq!(trace.depth(), 1);
        }
        assert_eq!(trace.depth(), 0);
        assert!(trace.enter(&a).is_ok());
    }

    #[test]
    fn test_factory_and_service_entries_are_distinct() {
        let f = descriptor("F", 0);
        let trace = ResolutionTrace::new();
        let _service = trace.enter(&f).unwrap();
        let _provide = trace.enter_factory(&f).unwrap();
        assert!(trace.enter_factory(&f).is_err());
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let handle = ServiceHandle::root(Weak::new(), descriptor("A", 0), None);
        let sub = handle.created(descriptor("B", 1), Arc::new(()));
        handle.add_sub_handle(sub.clone());

        handle.destroy();
        handle.destroy();
        assert!(handle.is_destroyed());
        assert!(sub.is_destroyed());
        assert_eq!(handle.sub_handle_count(), 0);
        assert!(handle.service().is_err());
    }
}
