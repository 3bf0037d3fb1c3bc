//! Bootstrapping a locator tree from configuration.
//!
//! ```rust,ignore
//! use keystone_runtime::KeystoneRuntime;
//!
//! // Defaults, keystone.toml and KEYSTONE_* variables
//! let runtime = KeystoneRuntime::load()?;
//!
//! // Or with an explicit file and profile
//! let runtime = KeystoneRuntime::builder()
//!     .config_file("config/keystone.toml")
//!     .profile("production")
//!     .build()?;
//!
//! let mut config = runtime.locator().configuration()?;
//! config.add_class(engine_class())?;
//! config.commit()?;
//! ```

use std::path::Path;
use std::sync::Arc;

use keystone_core::{
    ImmediateController, ImmediateState, LocatorBuilder, LocatorFactory, ServiceLocator, enable_immediate_scope,
    enable_inheritable_thread_scope, enable_per_thread_scope,
};
use tracing::{debug, info, warn};

use crate::config::{ConfigLoader, ExecutorKind, ImmediateConfig, KeystoneConfig};
use crate::error::RuntimeResult;
use crate::executor::TokioExecutor;
use crate::logging;

/// A root locator built from [`KeystoneConfig`], plus the factory that owns
/// it and any children created through the runtime.
pub struct KeystoneRuntime {
    config: KeystoneConfig,
    factory: Arc<LocatorFactory>,
    locator: Arc<ServiceLocator>,
    immediate: Option<Arc<ImmediateController>>,
}

impl KeystoneRuntime {
    /// Loads configuration from the default locations and builds a runtime.
    pub fn load() -> RuntimeResult<Self> {
        Self::builder().build()
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Builds a runtime with a private [`LocatorFactory`].
    pub fn from_config(config: KeystoneConfig) -> RuntimeResult<Self> {
        Self::with_factory(config, Arc::new(LocatorFactory::new()))
    }

    /// Builds a runtime whose locators are registered in `factory`.
    ///
    /// Installs the global subscriber first unless logging is disabled.
    pub fn with_factory(config: KeystoneConfig, factory: Arc<LocatorFactory>) -> RuntimeResult<Self> {
        logging::init_from_config(&config.logging);

        let locator = factory.create_with(&config.locator.name, Self::locator_builder(&config, &config.locator.name))?;

        if config.scopes.per_thread {
            enable_per_thread_scope(&locator)?;
        }
        if config.scopes.inheritable_thread {
            enable_inheritable_thread_scope(&locator)?;
        }
        let immediate = if config.scopes.immediate {
            let controller = enable_immediate_scope(&locator)?;
            Self::configure_immediate(&controller, &config.immediate);
            Some(controller)
        } else {
            None
        };

        info!(
            locator = %locator.name(),
            proxies = config.locator.proxies,
            per_thread = config.scopes.per_thread,
            inheritable_thread = config.scopes.inheritable_thread,
            immediate = config.scopes.immediate,
            "Keystone runtime started"
        );

        Ok(Self {
            config,
            factory,
            locator,
            immediate,
        })
    }

    fn locator_builder(config: &KeystoneConfig, name: &str) -> LocatorBuilder {
        let builder = LocatorBuilder::new(name);
        if config.locator.proxies {
            builder
        } else {
            builder.without_proxies()
        }
    }

    fn configure_immediate(controller: &ImmediateController, config: &ImmediateConfig) {
        controller.set_thread_inactivity_timeout(config.thread_inactivity_timeout());
        if config.executor == ExecutorKind::Tokio {
            match TokioExecutor::current() {
                Some(executor) => {
                    debug!("Immediate scope runs on the tokio blocking pool");
                    controller.set_executor(Arc::new(executor));
                }
                None => warn!("Tokio executor requested outside a tokio runtime, using threads"),
            }
        }
        if config.start_suspended {
            controller.set_state(ImmediateState::Suspended);
        }
    }

    /// Returns the configuration the runtime was built from.
    pub fn config(&self) -> &KeystoneConfig {
        &self.config
    }

    /// Returns the root locator.
    pub fn locator(&self) -> &Arc<ServiceLocator> {
        &self.locator
    }

    /// Returns the factory holding every locator of this runtime.
    pub fn factory(&self) -> &Arc<LocatorFactory> {
        &self.factory
    }

    /// Returns the immediate scope controller, when that scope is enabled.
    pub fn immediate(&self) -> Option<&Arc<ImmediateController>> {
        self.immediate.as_ref()
    }

    /// Creates (or returns) a child of the root locator named `name`.
    pub fn create_child(&self, name: &str) -> RuntimeResult<Arc<ServiceLocator>> {
        let builder = Self::locator_builder(&self.config, name).parent(self.locator.clone());
        Ok(self.factory.create_with(name, builder)?)
    }

    /// Destroys every locator of the factory, children before parents.
    pub fn shutdown(&self) {
        info!(locator = %self.locator.name(), "Shutting down Keystone runtime");
        self.factory.destroy_all();
    }
}

/// Builder for [`KeystoneRuntime`] that forwards to [`ConfigLoader`].
#[derive(Default)]
pub struct RuntimeBuilder {
    loader: ConfigLoader,
    factory: Option<Arc<LocatorFactory>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from this file instead of searching.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.loader = self.loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.loader = self.loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.loader = self.loader.without_env();
        self
    }

    /// Merges programmatic overrides below files and environment.
    pub fn merge(mut self, config: KeystoneConfig) -> Self {
        self.loader = self.loader.merge(config);
        self
    }

    /// Registers the runtime's locators in `factory`, e.g.
    /// [`LocatorFactory::global`].
    pub fn factory(mut self, factory: Arc<LocatorFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Loads the configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<KeystoneRuntime> {
        let config = self.loader.load()?;
        match self.factory {
            Some(factory) => KeystoneRuntime::with_factory(config, factory),
            None => KeystoneRuntime::from_config(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use keystone_core::{ServiceClass, filter, scopes};

    use super::*;
    use crate::config::ScopesConfig;

    fn quiet(mut config: KeystoneConfig) -> KeystoneConfig {
        config.logging.enabled = false;
        config
    }

    #[test]
    fn test_default_runtime() {
        let runtime = KeystoneRuntime::from_config(quiet(KeystoneConfig::default())).unwrap();
        assert_eq!(runtime.locator().name(), "default");
        assert!(runtime.immediate().is_none());
        assert!(Arc::ptr_eq(&runtime.factory().find("default").unwrap(), runtime.locator()));
        assert!(runtime.locator().descriptors(&filter::named(scopes::PER_THREAD)).is_empty());
    }

    #[test]
    fn test_configured_scopes_are_enabled() {
        let mut config = quiet(KeystoneConfig::default());
        config.scopes = ScopesConfig {
            per_thread: true,
            inheritable_thread: true,
            immediate: true,
        };
        config.immediate.start_suspended = true;

        let runtime = KeystoneRuntime::from_config(config).unwrap();
        let locator = runtime.locator();
        assert_eq!(locator.descriptors(&filter::named(scopes::PER_THREAD)).len(), 1);
        assert_eq!(locator.descriptors(&filter::named(scopes::INHERITABLE_THREAD)).len(), 1);
        let immediate = runtime.immediate().unwrap();
        assert_eq!(immediate.state(), ImmediateState::Suspended);
        assert_eq!(immediate.thread_inactivity_timeout(), runtime.config().immediate.thread_inactivity_timeout());
        runtime.shutdown();
    }

    #[test]
    fn test_children_resolve_through_root() {
        struct Clock;

        let runtime = KeystoneRuntime::from_config(quiet(KeystoneConfig::default())).unwrap();
        let mut config = runtime.locator().configuration().unwrap();
        config
            .add_class(
                ServiceClass::builder::<Clock>()
                    .in_scope(scopes::SINGLETON)
                    .default_constructor(|| Clock)
                    .build(),
            )
            .unwrap();
        config.commit().unwrap();

        let child = runtime.create_child("request").unwrap();
        assert!(Arc::ptr_eq(child.parent().unwrap(), runtime.locator()));
        let from_child = child.require_service::<Clock>().unwrap();
        let from_root = runtime.locator().require_service::<Clock>().unwrap();
        assert!(Arc::ptr_eq(&from_child, &from_root));

        assert!(Arc::ptr_eq(&runtime.create_child("request").unwrap(), &child));
    }

    #[test]
    fn test_shutdown_destroys_every_locator() {
        let runtime = KeystoneRuntime::from_config(quiet(KeystoneConfig::default())).unwrap();
        let child = runtime.create_child("child").unwrap();
        runtime.shutdown();
        assert!(runtime.locator().is_shutdown());
        assert!(child.is_shutdown());
        assert!(runtime.factory().names().is_empty());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = KeystoneConfig::default();
        config.locator.name = String::new();
        let result = KeystoneRuntime::builder().merge(config).without_env().build();
        assert!(matches!(result, Err(crate::RuntimeError::Config(_))));
    }
}
