//! The immediate scope.
//!
//! Services in the [`IMMEDIATE`](scopes::IMMEDIATE) scope are created as soon
//! as they are bound, on a background worker, and destroyed as soon as they
//! are unbound. The [`ImmediateController`] listens for configuration changes
//! and reconciles the bound immediate descriptors against the instances the
//! [`ImmediateContext`] holds.
//!
//! Nobody waits on an eager creation, so its failures go to the
//! [`ImmediateErrorHandler`] services instead of a caller.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::context::singleton::{CreationCache, Entry};
use crate::context::{Context, ScopeInfo, scopes};
use crate::error::{BoxError, LocatorResult, MultiError};
use crate::foundation::filter;
use crate::foundation::types::ServiceArc;
use crate::locator::handle::ServiceHandle;
use crate::locator::hooks::DynamicConfigurationListener;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};
use crate::locator::{LocatorState, ServiceLocator};

/// How long an idle worker waits for more work before it exits.
pub const DEFAULT_THREAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(20);

/// Told about failures of eager creation and destruction.
pub trait ImmediateErrorHandler: Send + Sync {
    /// An immediate service could not be created.
    fn post_construct_failed(&self, descriptor: &SystemDescriptor, error: &MultiError);

    /// An immediate service could not be destroyed.
    fn pre_destroy_failed(&self, descriptor: &SystemDescriptor, error: &MultiError);
}

/// Runs the reconcile worker.
pub trait Executor: Send + Sync {
    /// Runs `job` in the background.
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) -> Result<(), BoxError>;
}

/// Runs every job on a new named thread.
#[derive(Debug, Default)]
pub struct ThreadExecutor {
    spawned: AtomicUsize,
}

impl Executor for ThreadExecutor {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) -> Result<(), BoxError> {
        let n = self.spawned.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(format!("keystone-immediate-{n}"))
            .spawn(job)?;
        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// Context for the [`IMMEDIATE`](scopes::IMMEDIATE) scope.
pub struct ImmediateContext {
    locator: Weak<ServiceLocator>,
    cache: CreationCache,
    active: AtomicBool,
}

impl ImmediateContext {
    pub(crate) fn new(locator: Weak<ServiceLocator>) -> Self {
        Self {
            locator,
            cache: CreationCache::default(),
            active: AtomicBool::new(true),
        }
    }

    /// Returns the number of live immediate services.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if no immediate service is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handlers(&self) -> Vec<Arc<dyn ImmediateErrorHandler>> {
        let Some(locator) = self.locator.upgrade() else {
            return Vec::new();
        };
        locator
            .all_services::<dyn ImmediateErrorHandler>(&[])
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to load immediate error handlers");
                Vec::new()
            })
    }

    fn creation_failed(&self, descriptor: &SystemDescriptor, error: &MultiError) {
        warn!(descriptor = %descriptor, error = %error, "Failed to create immediate service");
        for handler in self.handlers() {
            handler.post_construct_failed(descriptor, error);
        }
    }

    fn destroy_entry(&self, entry: Entry) {
        let descriptor = entry.descriptor.clone();
        if let Err(e) = entry.destroy() {
            warn!(descriptor = %descriptor, error = %e, "Failed to destroy immediate service");
            for handler in self.handlers() {
                handler.pre_destroy_failed(&descriptor, &e);
            }
        }
    }

    fn destroy_key(&self, key: DescriptorKey) {
        if let Some(entry) = self.cache.remove(key) {
            self.destroy_entry(entry);
        }
    }
}

impl Context for ImmediateContext {
    fn scope(&self) -> ScopeInfo {
        ScopeInfo::new(scopes::IMMEDIATE)
    }

    fn find_or_create(&self, descriptor: &Arc<SystemDescriptor>, root: &ServiceHandle) -> LocatorResult<ServiceArc> {
        self.cache.find_or_create(descriptor, root)
    }

    fn contains_key(&self, descriptor: &SystemDescriptor) -> bool {
        self.cache.contains(descriptor.key())
    }

    fn destroy_one(&self, descriptor: &SystemDescriptor) {
        self.destroy_key(descriptor.key());
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        for entry in self.cache.drain() {
            self.destroy_entry(entry);
        }
    }
}

impl fmt::Debug for ImmediateContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmediateContext")
            .field("live", &self.cache.len())
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// Controller
// =============================================================================

/// Whether the controller reacts to configuration changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImmediateState {
    /// Changes are ignored until the state is set back to running.
    Suspended,
    /// Every change triggers a reconcile.
    Running,
}

#[derive(Debug, Default)]
struct Worker {
    alive: bool,
    dirty: bool,
    busy: bool,
}

/// Creates and destroys immediate services as their descriptors come and go.
pub struct ImmediateController {
    self_ref: Weak<ImmediateController>,
    locator: Weak<ServiceLocator>,
    context: Arc<ImmediateContext>,
    executor: RwLock<Arc<dyn Executor>>,
    timeout: Mutex<Duration>,
    state: Mutex<ImmediateState>,
    worker: Mutex<Worker>,
    wake: Condvar,
    idle: Condvar,
}

impl ImmediateController {
    pub(crate) fn new(locator: Weak<ServiceLocator>, context: Arc<ImmediateContext>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            locator,
            context,
            executor: RwLock::new(Arc::new(ThreadExecutor::default())),
            timeout: Mutex::new(DEFAULT_THREAD_INACTIVITY_TIMEOUT),
            state: Mutex::new(ImmediateState::Running),
            worker: Mutex::new(Worker::default()),
            wake: Condvar::new(),
            idle: Condvar::new(),
        })
    }

    /// Returns the context holding the immediate instances.
    pub fn context(&self) -> &Arc<ImmediateContext> {
        &self.context
    }

    /// Replaces the executor used for the next worker.
    pub fn set_executor(&self, executor: Arc<dyn Executor>) {
        *self.executor.write() = executor;
    }

    /// Returns the executor.
    pub fn executor(&self) -> Arc<dyn Executor> {
        self.executor.read().clone()
    }

    /// Sets how long an idle worker lingers before exiting.
    pub fn set_thread_inactivity_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    /// Returns the worker inactivity timeout.
    pub fn thread_inactivity_timeout(&self) -> Duration {
        *self.timeout.lock()
    }

    /// Returns the state.
    pub fn state(&self) -> ImmediateState {
        *self.state.lock()
    }

    /// Changes the state. Resuming triggers a reconcile.
    pub fn set_state(&self, state: ImmediateState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            info!(?state, "Immediate scope state changed");
        }
        if state == ImmediateState::Running && previous != ImmediateState::Running {
            self.schedule();
        }
    }

    /// Blocks until no reconcile is pending or running, or `timeout` passes.
    /// Returns `true` if the controller went idle.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut worker = self.worker.lock();
        while worker.dirty || worker.busy {
            if self.idle.wait_until(&mut worker, deadline).timed_out() {
                return !(worker.dirty || worker.busy);
            }
        }
        true
    }

    fn schedule(&self) {
        if self.state() == ImmediateState::Suspended {
            return;
        }
        let mut worker = self.worker.lock();
        worker.dirty = true;
        if worker.alive {
            self.wake.notify_one();
            return;
        }
        let Some(this) = self.self_ref.upgrade() else {
            worker.dirty = false;
            return;
        };
        worker.alive = true;
        drop(worker);

        if let Err(e) = self.executor().execute(Box::new(move || this.run())) {
            warn!(error = %e, "Failed to start immediate worker");
            let mut worker = self.worker.lock();
            worker.alive = false;
            worker.dirty = false;
            self.idle.notify_all();
        }
    }

    fn run(&self) {
        debug!("Immediate worker started");
        loop {
            let mut worker = self.worker.lock();
            let deadline = Instant::now() + self.thread_inactivity_timeout();
            while !worker.dirty && self.context.is_active() {
                if self.wake.wait_until(&mut worker, deadline).timed_out() {
                    break;
                }
            }
            if !worker.dirty || !self.context.is_active() {
                worker.alive = false;
                worker.dirty = false;
                self.idle.notify_all();
                debug!("Immediate worker exiting");
                return;
            }
            worker.dirty = false;
            worker.busy = true;
            drop(worker);

            self.reconcile();

            let mut worker = self.worker.lock();
            worker.busy = false;
            if !worker.dirty {
                self.idle.notify_all();
            }
        }
    }

    /// Destroys instances whose descriptor is gone and creates the missing
    /// ones. Failures are reported and never stop the sweep.
    fn reconcile(&self) {
        let Some(locator) = self.locator.upgrade() else {
            return;
        };
        if locator.state() != LocatorState::Running || !self.context.is_active() {
            return;
        }

        let wanted = locator.local_descriptors(&filter::in_scope(scopes::IMMEDIATE));
        let wanted_keys: HashSet<DescriptorKey> = wanted.iter().map(|d| d.key()).collect();

        for key in self.context.cache.keys() {
            if !wanted_keys.contains(&key) {
                debug!(descriptor = %key, "Destroying unbound immediate service");
                self.context.destroy_key(key);
            }
        }

        for descriptor in wanted {
            if self.context.contains_key(&descriptor) {
                continue;
            }
            let handle = locator.handle_for(&descriptor);
            match handle.service() {
                Ok(_) => debug!(descriptor = %descriptor, "Created immediate service"),
                Err(e) => self.context.creation_failed(&descriptor, &e),
            }
        }
    }
}

impl DynamicConfigurationListener for ImmediateController {
    fn configuration_changed(&self) -> Result<(), BoxError> {
        self.schedule();
        Ok(())
    }
}

impl fmt::Debug for ImmediateController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImmediateController")
            .field("state", &self.state())
            .field("timeout", &self.thread_inactivity_timeout())
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_executor_runs_job() {
        let (tx, rx) = std::sync::mpsc::channel();
        ThreadExecutor::default()
            .execute(Box::new(move || {
                let name = thread::current().name().map(str::to_string);
                tx.send(name).unwrap();
            }))
            .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("keystone-immediate-0"));
    }

    #[test]
    fn test_suspended_controller_stays_idle() {
        let context = Arc::new(ImmediateContext::new(Weak::new()));
        let controller = ImmediateController::new(Weak::new(), context);
        controller.set_state(ImmediateState::Suspended);
        controller.configuration_changed().unwrap();
        assert!(controller.wait_until_idle(Duration::from_millis(10)));
        assert_eq!(controller.state(), ImmediateState::Suspended);
    }
}
