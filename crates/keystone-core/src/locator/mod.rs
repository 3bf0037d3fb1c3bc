//! The service locator.
//!
//! A [`ServiceLocator`] owns a registry of [`SystemDescriptor`]s, resolves
//! lookups against it (and its parent's), and creates services through the
//! context of each descriptor's scope. All changes go through a
//! [`DynamicConfiguration`]; lookups read an immutable snapshot and never
//! block on a commit.
//!
//! # Example
//!
//! ```rust,ignore
//! let locator = LocatorBuilder::new("app").build()?;
//!
//! let mut config = locator.configuration()?;
//! config.add_class(engine_class())?;
//! config.add_class(car_class())?;
//! config.commit()?;
//!
//! let car = locator.require_service::<Car>()?;
//! ```

pub mod active;
pub mod builder;
pub mod configuration;
pub mod factory;
pub mod handle;
pub mod hooks;
mod lookup;
pub mod registry;
mod resolve;
pub mod system_descriptor;
pub mod utilities;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::{debug, info};

use crate::aop::proxy::ProxyFactory;
use crate::context::{Context, scopes};
use crate::error::{LocatorError, LocatorResult};
use crate::foundation::class::{ClassLoader, ClassRegistry};
use crate::foundation::filter;
use crate::foundation::injectee::{Injectee, InjectionPoint};
use crate::foundation::types::Qualifier;
use crate::locator::configuration::DynamicConfiguration;
use crate::locator::handle::ServiceHandle;
use crate::locator::hooks::Hooks;
use crate::locator::registry::Registry;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};

pub use builder::LocatorBuilder;

static NEXT_LOCATOR_ID: AtomicU64 = AtomicU64::new(0);

/// Lifecycle of a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LocatorState {
    /// Serving lookups.
    Running = 0,
    /// Destroying services; lookups made by destructors still work.
    ShuttingDown = 1,
    /// Every operation fails.
    Shutdown = 2,
}

impl LocatorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::ShuttingDown,
            _ => Self::Shutdown,
        }
    }
}

/// A registry of services plus the machinery to create them.
pub struct ServiceLocator {
    id: u64,
    name: String,
    parent: Option<Arc<ServiceLocator>>,
    self_ref: Weak<ServiceLocator>,
    state: AtomicU8,
    registry: RwLock<Arc<Registry>>,
    commit_lock: Mutex<()>,
    next_service_id: AtomicU64,
    classes: Arc<ClassRegistry>,
    class_loader: Option<Arc<dyn ClassLoader>>,
    proxy_factory: Option<Arc<dyn ProxyFactory>>,
    hooks: RwLock<Arc<Hooks>>,
    reup_lock: ReentrantMutex<()>,
    contexts: RwLock<HashMap<String, Arc<dyn Context>>>,
    children: Mutex<Vec<Weak<ServiceLocator>>>,
}

impl ServiceLocator {
    pub(crate) fn new(
        self_ref: Weak<ServiceLocator>,
        name: String,
        parent: Option<Arc<ServiceLocator>>,
        classes: Arc<ClassRegistry>,
        class_loader: Option<Arc<dyn ClassLoader>>,
        proxy_factory: Option<Arc<dyn ProxyFactory>>,
    ) -> Self {
        Self {
            id: NEXT_LOCATOR_ID.fetch_add(1, Ordering::Relaxed),
            name,
            parent,
            self_ref,
            state: AtomicU8::new(LocatorState::Running as u8),
            registry: RwLock::new(Arc::new(Registry::default())),
            commit_lock: Mutex::new(()),
            next_service_id: AtomicU64::new(0),
            classes,
            class_loader,
            proxy_factory,
            hooks: RwLock::new(Arc::new(Hooks::default())),
            reup_lock: ReentrantMutex::new(()),
            contexts: RwLock::new(HashMap::new()),
            children: Mutex::new(Vec::new()),
        }
    }

    /// Returns the locator id. Later locators have higher ids.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the locator name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the parent locator.
    pub fn parent(&self) -> Option<&Arc<ServiceLocator>> {
        self.parent.as_ref()
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> LocatorState {
        LocatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` once shutdown has finished.
    pub fn is_shutdown(&self) -> bool {
        self.state() == LocatorState::Shutdown
    }

    /// Returns the in-memory class registry.
    pub fn classes(&self) -> &Arc<ClassRegistry> {
        &self.classes
    }

    /// Returns the number of descriptors registered in this locator.
    pub fn size(&self) -> usize {
        self.registry.read().len()
    }

    pub(crate) fn weak(&self) -> Weak<ServiceLocator> {
        self.self_ref.clone()
    }

    pub(crate) fn arc(&self) -> LocatorResult<Arc<ServiceLocator>> {
        self.self_ref
            .upgrade()
            .ok_or_else(|| LocatorError::illegal_state(format!("locator '{}' is being dropped", self.name)).into())
    }

    pub(crate) fn check_running(&self) -> LocatorResult<()> {
        match self.state() {
            LocatorState::Shutdown => Err(LocatorError::Shutdown(self.name.clone()).into()),
            _ => Ok(()),
        }
    }

    pub(crate) fn next_key(&self) -> DescriptorKey {
        DescriptorKey::new(self.id, self.next_service_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn hooks(&self) -> Arc<Hooks> {
        self.hooks.read().clone()
    }

    pub(crate) fn proxy_factory(&self) -> Option<Arc<dyn ProxyFactory>> {
        self.proxy_factory.clone()
    }

    pub(crate) fn add_child(&self, child: &Arc<ServiceLocator>) {
        let mut children = self.children.lock();
        children.retain(|c| c.strong_count() > 0);
        children.push(Arc::downgrade(child));
    }

    fn remove_child(&self, id: u64) {
        self.children
            .lock()
            .retain(|c| c.upgrade().is_some_and(|child| child.id != id));
    }

    /// Starts a new configuration transaction.
    pub fn configuration(&self) -> LocatorResult<DynamicConfiguration> {
        self.check_running()?;
        Ok(DynamicConfiguration::new(self.arc()?))
    }

    /// Creates a child locator whose lookups fall back to this one.
    pub fn create_child(&self, name: impl Into<String>) -> LocatorResult<Arc<ServiceLocator>> {
        self.check_running()?;
        let mut builder = LocatorBuilder::new(name).parent(self.arc()?);
        builder = match &self.proxy_factory {
            Some(factory) => builder.proxy_factory(factory.clone()),
            None => builder.without_proxies(),
        };
        builder.build()
    }

    // =========================================================================
    // Typed Lookups
    // =========================================================================

    fn lookup_injectee<C: ?Sized + 'static>(qualifiers: &[Qualifier]) -> Injectee {
        let point = qualifiers
            .iter()
            .cloned()
            .fold(InjectionPoint::of::<C>(), InjectionPoint::qualified_by);
        Injectee::for_lookup(point)
    }

    /// Returns the best service advertising `C` carrying every qualifier.
    pub fn get_qualified_service<C: ?Sized + 'static>(&self, qualifiers: &[Qualifier]) -> LocatorResult<Option<Arc<C>>> {
        match self.service_handle::<C>(qualifiers)? {
            Some(handle) => handle.service_as::<C>().map(Some),
            None => Ok(None),
        }
    }

    /// Returns the best service advertising `C`.
    pub fn get_service<C: ?Sized + 'static>(&self) -> LocatorResult<Option<Arc<C>>> {
        self.get_qualified_service::<C>(&[])
    }

    /// Returns the best service advertising `C` named `name`.
    pub fn get_named_service<C: ?Sized + 'static>(&self, name: impl Into<String>) -> LocatorResult<Option<Arc<C>>> {
        self.get_qualified_service::<C>(&[Qualifier::named(name)])
    }

    /// Returns the best service advertising `C`, failing if there is none.
    pub fn require_service<C: ?Sized + 'static>(&self) -> LocatorResult<Arc<C>> {
        let injectee = Self::lookup_injectee::<C>(&[]);
        self.get_service::<C>()?
            .ok_or_else(|| LocatorError::unsatisfied(&injectee).into())
    }

    /// Returns every service advertising `C` in registry order.
    ///
    /// Every service is attempted; failures are reported together.
    pub fn all_services<C: ?Sized + 'static>(&self, qualifiers: &[Qualifier]) -> LocatorResult<Vec<Arc<C>>> {
        let mut collector = crate::error::Collector::new();
        let mut services = Vec::new();
        for handle in self.all_service_handles::<C>(qualifiers)? {
            match handle.service_as::<C>() {
                Ok(service) => services.push(service),
                Err(errors) => collector.add_all(errors),
            }
        }
        collector.into_result(services)
    }

    /// Returns a handle to the best service advertising `C`.
    pub fn service_handle<C: ?Sized + 'static>(&self, qualifiers: &[Qualifier]) -> LocatorResult<Option<ServiceHandle>> {
        let injectee = Self::lookup_injectee::<C>(qualifiers);
        Ok(self
            .injectee_descriptor(&injectee)?
            .map(|descriptor| self.root_handle(descriptor, Some(injectee))))
    }

    /// Returns handles to every service advertising `C` in registry order.
    pub fn all_service_handles<C: ?Sized + 'static>(&self, qualifiers: &[Qualifier]) -> LocatorResult<Vec<ServiceHandle>> {
        let injectee = Self::lookup_injectee::<C>(qualifiers);
        Ok(self
            .matching_descriptors(&injectee)?
            .into_iter()
            .map(|descriptor| self.root_handle(descriptor, Some(injectee.clone())))
            .collect())
    }

    /// Returns a handle for a specific descriptor.
    pub fn handle_for(&self, descriptor: &Arc<SystemDescriptor>) -> ServiceHandle {
        self.root_handle(descriptor.clone(), None)
    }

    pub(crate) fn root_handle(&self, descriptor: Arc<SystemDescriptor>, injectee: Option<Injectee>) -> ServiceHandle {
        ServiceHandle::root(self.weak(), descriptor, injectee)
    }

    /// Reifies `descriptor`, reporting failures to the error services.
    pub fn reify(&self, descriptor: &SystemDescriptor) -> LocatorResult<()> {
        self.check_running()?;
        descriptor.reify()
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Shuts the locator down: children first, then every context of this
    /// locator (immediate first, singleton last). Only the first call has an
    /// effect.
    pub fn shutdown(&self) {
        if self
            .state
            .compare_exchange(
                LocatorState::Running as u8,
                LocatorState::ShuttingDown as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.shutdown();
        }

        let mut contexts: Vec<(String, Arc<dyn Context>)> = self
            .local_descriptors(&filter::contract_of::<dyn Context>())
            .into_iter()
            .filter_map(|d| {
                let view = d.cached_value()?;
                let context = self.view_as::<dyn Context>(&d, &view).ok()?;
                Some((d.name().unwrap_or_default().to_string(), context))
            })
            .collect();
        contexts.sort_by_key(|(name, _)| match name.as_str() {
            scopes::IMMEDIATE => 0,
            scopes::SINGLETON => 2,
            _ => 1,
        });
        for (name, context) in contexts {
            debug!(locator = %self.name, scope = %name, "Shutting down context");
            context.shutdown();
        }

        self.contexts.write().clear();
        *self.hooks.write() = Arc::new(Hooks::default());
        *self.registry.write() = Arc::new(Registry::default());
        self.state.store(LocatorState::Shutdown as u8, Ordering::Release);
        if let Some(parent) = &self.parent {
            parent.remove_child(self.id);
        }
        info!(locator = %self.name, "Locator shut down");
    }
}

impl fmt::Debug for ServiceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceLocator")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}
