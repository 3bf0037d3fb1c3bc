//! Locator construction.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::analysis::default::DefaultClassAnalyzer;
use crate::analysis::{ClassAnalyzer, DEFAULT_ANALYZER};
use crate::aop::proxy::{DispatchProxyFactory, ProxyFactory};
use crate::context::per_lookup::PerLookupContext;
use crate::context::singleton::SingletonContext;
use crate::context::{Context, scopes};
use crate::error::{BoxError, LocatorResult};
use crate::foundation::class::{ClassLoader, ClassRegistry};
use crate::locator::ServiceLocator;
use crate::locator::active::AbstractActiveDescriptor;
use crate::resolution::standard::StandardInjectionResolver;
use crate::resolution::{INJECT, InjectionResolver};

/// Builds a [`ServiceLocator`].
///
/// Every locator starts with the singleton and per-lookup contexts, the
/// default class analyzer, the standard injection resolver and a
/// per-lookup binding of the locator itself.
///
/// ```rust,ignore
/// let root = LocatorBuilder::new("root").build()?;
/// let child = LocatorBuilder::new("request").parent(root.clone()).build()?;
/// ```
pub struct LocatorBuilder {
    name: String,
    parent: Option<Arc<ServiceLocator>>,
    class_loader: Option<Arc<dyn ClassLoader>>,
    classes: Option<Arc<ClassRegistry>>,
    proxy_factory: Option<Arc<dyn ProxyFactory>>,
}

impl LocatorBuilder {
    /// Starts a builder for a locator named `name`, using the
    /// [`DispatchProxyFactory`].
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            class_loader: None,
            classes: None,
            proxy_factory: Some(Arc::new(DispatchProxyFactory)),
        }
    }

    /// Makes lookups fall back to `parent`.
    pub fn parent(mut self, parent: Arc<ServiceLocator>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Consults `loader` for classes that are not in the class registry.
    pub fn class_loader(mut self, loader: Arc<dyn ClassLoader>) -> Self {
        self.class_loader = Some(loader);
        self
    }

    /// Uses a shared class registry instead of a fresh one.
    pub fn class_registry(mut self, classes: Arc<ClassRegistry>) -> Self {
        self.classes = Some(classes);
        self
    }

    /// Uses `factory` for lazy and intercepting proxies.
    pub fn proxy_factory(mut self, factory: Arc<dyn ProxyFactory>) -> Self {
        self.proxy_factory = Some(factory);
        self
    }

    /// Disables proxying. Descriptors that need a proxy fail to resolve.
    pub fn without_proxies(mut self) -> Self {
        self.proxy_factory = None;
        self
    }

    /// Creates the locator and commits its bootstrap services.
    pub fn build(self) -> LocatorResult<Arc<ServiceLocator>> {
        if let Some(parent) = &self.parent {
            parent.check_running()?;
        }
        let Self {
            name,
            parent,
            class_loader,
            classes,
            proxy_factory,
        } = self;

        let locator = Arc::new_cyclic(|weak| {
            ServiceLocator::new(
                weak.clone(),
                name,
                parent.clone(),
                classes.unwrap_or_default(),
                class_loader,
                proxy_factory,
            )
        });
        let weak = Arc::downgrade(&locator);

        let singleton: Arc<dyn Context> = Arc::new(SingletonContext::new(weak.clone()));
        let per_lookup: Arc<dyn Context> = Arc::new(PerLookupContext);
        let analyzer: Arc<dyn ClassAnalyzer> = Arc::new(DefaultClassAnalyzer::new(weak.clone()));
        let resolver: Arc<dyn InjectionResolver> = Arc::new(StandardInjectionResolver::new(weak.clone()));
        let itself = weak.clone();

        let mut config = locator.configuration()?;
        config.bind_active(AbstractActiveDescriptor::shared(singleton).named(scopes::SINGLETON))?;
        config.bind_active(AbstractActiveDescriptor::shared(per_lookup).named(scopes::PER_LOOKUP))?;
        config.bind_active(AbstractActiveDescriptor::shared(analyzer).named(DEFAULT_ANALYZER))?;
        config.bind_active(AbstractActiveDescriptor::shared(resolver).named(INJECT))?;
        config.bind_active(AbstractActiveDescriptor::from_fn(move |_| {
            itself
                .upgrade()
                .ok_or_else(|| BoxError::from("the locator has been dropped"))
        }))?;
        config.commit()?;

        if let Some(parent) = &parent {
            parent.add_child(&locator);
        }
        info!(
            locator = %locator.name(),
            id = locator.id(),
            parent = parent.as_ref().map(|p| p.name()),
            "Created locator"
        );
        Ok(locator)
    }
}

impl fmt::Debug for LocatorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorBuilder")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("proxies", &self.proxy_factory.is_some())
            .finish_non_exhaustive()
    }
}
