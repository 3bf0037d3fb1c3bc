//! Named locators.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::LocatorResult;
use crate::locator::{LocatorBuilder, ServiceLocator};

static GLOBAL: OnceLock<LocatorFactory> = OnceLock::new();

/// Told when a [`LocatorFactory`] adds or destroys a locator.
pub trait LocatorListener: Send + Sync {
    /// A locator was created.
    fn locator_added(&self, _locator: &Arc<ServiceLocator>) {}

    /// A locator was shut down and removed.
    fn locator_destroyed(&self, _locator: &Arc<ServiceLocator>) {}
}

/// A registry of locators by name.
#[derive(Default)]
pub struct LocatorFactory {
    locators: RwLock<HashMap<String, Arc<ServiceLocator>>>,
    listeners: RwLock<Vec<Arc<dyn LocatorListener>>>,
}

impl LocatorFactory {
    /// Creates an empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide factory.
    pub fn global() -> &'static LocatorFactory {
        GLOBAL.get_or_init(LocatorFactory::new)
    }

    /// Returns the locator named `name`, creating it under `parent` if there
    /// is none.
    pub fn create(&self, name: &str, parent: Option<Arc<ServiceLocator>>) -> LocatorResult<Arc<ServiceLocator>> {
        let mut builder = LocatorBuilder::new(name);
        if let Some(parent) = parent {
            builder = builder.parent(parent);
        }
        self.create_with(name, builder)
    }

    /// Returns the locator named `name`, building it with `builder` if there
    /// is none.
    pub fn create_with(&self, name: &str, builder: LocatorBuilder) -> LocatorResult<Arc<ServiceLocator>> {
        if let Some(existing) = self.find(name) {
            debug!(locator = %name, "Locator already exists");
            return Ok(existing);
        }

        let locator = builder.build()?;
        let mut locators = self.locators.write();
        if let Some(existing) = locators.get(name).filter(|l| !l.is_shutdown()).cloned() {
            // Lost a race with another creator.
            drop(locators);
            locator.shutdown();
            return Ok(existing);
        }
        locators.insert(name.to_string(), locator.clone());
        drop(locators);

        for listener in self.listeners() {
            listener.locator_added(&locator);
        }
        Ok(locator)
    }

    /// Returns the running locator named `name`.
    pub fn find(&self, name: &str) -> Option<Arc<ServiceLocator>> {
        let locators = self.locators.read();
        locators.get(name).filter(|l| !l.is_shutdown()).cloned()
    }

    /// Returns the names of every registered locator.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.locators.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Shuts down and removes the locator named `name`. Returns `false` if
    /// there was none.
    pub fn destroy(&self, name: &str) -> bool {
        let Some(locator) = self.locators.write().remove(name) else {
            return false;
        };
        locator.shutdown();
        info!(locator = %name, "Destroyed locator");
        for listener in self.listeners() {
            listener.locator_destroyed(&locator);
        }
        true
    }

    /// Destroys every locator, most recently created first so children go
    /// before their parents.
    pub fn destroy_all(&self) {
        let mut all: Vec<_> = self
            .locators
            .read()
            .iter()
            .map(|(name, locator)| (name.clone(), locator.id()))
            .collect();
        all.sort_by(|a, b| b.1.cmp(&a.1));
        for (name, _) in all {
            self.destroy(&name);
        }
    }

    /// Registers a listener.
    pub fn add_listener(&self, listener: Arc<dyn LocatorListener>) {
        self.listeners.write().push(listener);
    }

    /// Removes a listener previously added.
    pub fn remove_listener(&self, listener: &Arc<dyn LocatorListener>) {
        self.listeners.write().retain(|l| !Arc::ptr_eq(l, listener));
    }

    fn listeners(&self) -> Vec<Arc<dyn LocatorListener>> {
        self.listeners.read().clone()
    }
}

impl fmt::Debug for LocatorFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocatorFactory")
            .field("locators", &self.names())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct Counting {
        added: AtomicUsize,
        destroyed: AtomicUsize,
    }

    impl LocatorListener for Counting {
        fn locator_added(&self, _locator: &Arc<ServiceLocator>) {
            self.added.fetch_add(1, Ordering::SeqCst);
        }

        fn locator_destroyed(&self, _locator: &Arc<ServiceLocator>) {
            self.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_create_is_idempotent_by_name() {
        let factory = LocatorFactory::new();
        let a = factory.create("app", None).unwrap();
        let b = factory.create("app", None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.names(), vec!["app".to_string()]);
    }

    #[test]
    fn test_destroy_notifies_and_shuts_down() {
        let factory = LocatorFactory::new();
        let counting = Arc::new(Counting::default());
        factory.add_listener(counting.clone());

        let locator = factory.create("app", None).unwrap();
        assert!(factory.destroy("app"));
        assert!(!factory.destroy("app"));
        assert!(locator.is_shutdown());
        assert!(factory.find("app").is_none());
        assert_eq!(counting.added.load(Ordering::SeqCst), 1);
        assert_eq!(counting.destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_all_children_first() {
        let factory = LocatorFactory::new();
        let root = factory.create("root", None).unwrap();
        let child = factory.create("child", Some(root.clone())).unwrap();
        factory.destroy_all();
        assert!(root.is_shutdown());
        assert!(child.is_shutdown());
        assert!(factory.names().is_empty());
    }
}
