//! The singleton context, and the creation cache it shares with the
//! immediate context.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::context::{Context, ScopeInfo, scopes};
use crate::error::{LocatorError, LocatorResult, MultiError};
use crate::foundation::filter;
use crate::foundation::types::ServiceArc;
use crate::locator::ServiceLocator;
use crate::locator::handle::ServiceHandle;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};

enum Slot {
    Creating(ThreadId),
    Ready(Entry),
}

/// A cached instance.
pub(crate) struct Entry {
    pub(crate) descriptor: Arc<SystemDescriptor>,
    pub(crate) instance: ServiceArc,
    pub(crate) generation: u64,
    pub(crate) root: ServiceHandle,
}

impl Entry {
    /// Disposes the instance, then releases what was created for it.
    pub(crate) fn destroy(self) -> LocatorResult<()> {
        self.descriptor.clear_cache();
        let result = self.descriptor.dispose(&self.instance);
        self.root.release_sub_handles();
        result
    }
}

/// Which thread creates which entry, and which entry each blocked thread
/// waits for. Shared by every cache so waits across locators are seen.
#[derive(Default)]
struct WaitGraph {
    creating: HashMap<DescriptorKey, (ThreadId, String)>,
    waiting: HashMap<ThreadId, DescriptorKey>,
}

impl WaitGraph {
    fn global() -> &'static Mutex<WaitGraph> {
        static GRAPH: OnceLock<Mutex<WaitGraph>> = OnceLock::new();
        GRAPH.get_or_init(Mutex::default)
    }

    /// Follows owners and their waits from `key`. Returns the labels along
    /// the way when the chain ends at `current`.
    fn cycle_from(&self, key: DescriptorKey, current: ThreadId) -> Option<Vec<&str>> {
        let mut labels = Vec::new();
        let mut next = key;
        for _ in 0..=self.waiting.len() {
            let (owner, label) = self.creating.get(&next)?;
            labels.push(label.as_str());
            if *owner == current {
                return Some(labels);
            }
            next = *self.waiting.get(owner)?;
        }
        None
    }
}

/// One instance per descriptor, created at most once.
///
/// A caller racing the creating thread waits for it to finish. The creating
/// thread re-entering its own slot is a circular dependency, and so is a
/// wait that would close a loop of threads waiting on each other.
#[derive(Default)]
pub(crate) struct CreationCache {
    slots: Mutex<HashMap<DescriptorKey, Slot>>,
    ready: Condvar,
    generation: AtomicU64,
}

impl CreationCache {
    pub(crate) fn find_or_create(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        root: &ServiceHandle,
    ) -> LocatorResult<ServiceArc> {
        let key = descriptor.key();
        let current = thread::current().id();

        let mut slots = self.slots.lock();
        loop {
            match slots.get(&key) {
                Some(Slot::Ready(entry)) => return Ok(entry.instance.clone()),
                Some(Slot::Creating(thread)) if *thread == current => {
                    return Err(LocatorError::CircularDependency {
                        descriptor: descriptor.to_string(),
                        path: format!("{descriptor} -> {descriptor}"),
                    }
                    .into());
                }
                Some(Slot::Creating(_)) => {
                    let mut graph = WaitGraph::global().lock();
                    if let Some(labels) = graph.cycle_from(key, current) {
                        let path = match labels.last() {
                            Some(last) => format!("{last} -> {}", labels.join(" -> ")),
                            None => descriptor.to_string(),
                        };
                        return Err(LocatorError::CircularDependency {
                            descriptor: descriptor.to_string(),
                            path,
                        }
                        .into());
                    }
                    graph.waiting.insert(current, key);
                    drop(graph);
                    self.ready.wait(&mut slots);
                    WaitGraph::global().lock().waiting.remove(&current);
                }
                None => break,
            }
        }
        slots.insert(key, Slot::Creating(current));
        WaitGraph::global()
            .lock()
            .creating
            .insert(key, (current, descriptor.to_string()));
        drop(slots);

        let result = descriptor.create(root);

        let mut slots = self.slots.lock();
        WaitGraph::global().lock().creating.remove(&key);
        let outcome = match result {
            Ok(instance) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                descriptor.set_cache(instance.clone());
                slots.insert(
                    key,
                    Slot::Ready(Entry {
                        descriptor: descriptor.clone(),
                        instance: instance.clone(),
                        generation,
                        root: root.clone(),
                    }),
                );
                trace!(descriptor = %descriptor, generation, "Cached instance");
                Ok(instance)
            }
            Err(errors) => {
                slots.remove(&key);
                Err(errors)
            }
        };
        drop(slots);
        self.ready.notify_all();
        outcome
    }

    pub(crate) fn contains(&self, key: DescriptorKey) -> bool {
        matches!(self.slots.lock().get(&key), Some(Slot::Ready(_)))
    }

    pub(crate) fn keys(&self) -> Vec<DescriptorKey> {
        self.slots
            .lock()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| *key)
            .collect()
    }

    pub(crate) fn remove(&self, key: DescriptorKey) -> Option<Entry> {
        let mut slots = self.slots.lock();
        match slots.get(&key) {
            Some(Slot::Ready(_)) => match slots.remove(&key) {
                Some(Slot::Ready(entry)) => Some(entry),
                _ => None,
            },
            _ => None,
        }
    }

    /// Removes every entry, most recently created first.
    pub(crate) fn drain(&self) -> Vec<Entry> {
        let mut slots = self.slots.lock();
        let keys: Vec<_> = slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(key, _)| *key)
            .collect();
        let mut entries: Vec<Entry> = keys
            .into_iter()
            .filter_map(|key| match slots.remove(&key) {
                Some(Slot::Ready(entry)) => Some(entry),
                _ => None,
            })
            .collect();
        entries.sort_by(|a, b| b.generation.cmp(&a.generation));
        entries
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }
}

/// Context for the [`SINGLETON`](scopes::SINGLETON) scope.
pub struct SingletonContext {
    locator: Weak<ServiceLocator>,
    cache: CreationCache,
    active: AtomicBool,
}

impl SingletonContext {
    pub(crate) fn new(locator: Weak<ServiceLocator>) -> Self {
        Self {
            locator,
            cache: CreationCache::default(),
            active: AtomicBool::new(true),
        }
    }

    /// Returns the number of cached instances.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Disposes singleton constants bound in the owning locator. They never
    /// pass through the cache.
    fn dispose_constants(&self, errors: &mut MultiError) {
        let Some(locator) = self.locator.upgrade() else {
            return;
        };
        for descriptor in locator.local_descriptors(&filter::in_scope(scopes::SINGLETON)) {
            if let Some(instance) = descriptor.cached_value()
                && let Err(e) = descriptor.dispose(&instance)
            {
                errors.extend(e);
            }
        }
    }
}

impl Context for SingletonContext {
    fn scope(&self) -> ScopeInfo {
        ScopeInfo::new(scopes::SINGLETON)
    }

    fn find_or_create(&self, descriptor: &Arc<SystemDescriptor>, root: &ServiceHandle) -> LocatorResult<ServiceArc> {
        if let Some(cached) = descriptor.cached_value() {
            return Ok(cached);
        }
        self.cache.find_or_create(descriptor, root)
    }

    fn contains_key(&self, descriptor: &SystemDescriptor) -> bool {
        self.cache.contains(descriptor.key())
    }

    fn destroy_one(&self, descriptor: &SystemDescriptor) {
        if let Some(entry) = self.cache.remove(descriptor.key())
            && let Err(e) = entry.destroy()
        {
            warn!(descriptor = %descriptor, error = %e, "Failed to destroy singleton");
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    fn shutdown(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        let entries = self.cache.drain();
        debug!(count = entries.len(), "Destroying singletons");

        let mut errors = MultiError::new();
        for entry in entries {
            if let Err(e) = entry.destroy() {
                errors.extend(e);
            }
        }
        self.dispose_constants(&mut errors);
        if !errors.is_empty() {
            warn!(error = %errors, "Singleton shutdown finished with errors");
        }
    }
}

impl fmt::Debug for SingletonContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonContext")
            .field("cached", &self.cache.len())
            .field("active", &self.is_active())
            .finish()
    }
}
