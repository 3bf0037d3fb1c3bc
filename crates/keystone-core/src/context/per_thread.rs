//! Thread-bound contexts.
//!
//! Both contexts key their caches by [`ThreadLineage`]. Every thread gets its
//! own lineage on first use; a thread started with [`spawn_inheriting`] (or
//! one that [`adopts`](ThreadLineage::adopt) a child lineage) also sees the
//! instances its ancestors created in the inheritable-thread scope.
//!
//! A lineage's instances are destroyed once its thread has exited and no
//! lineage inheriting from it is left.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::{Context, ScopeInfo, scopes};
use crate::error::LocatorResult;
use crate::foundation::types::ServiceArc;
use crate::locator::handle::ServiceHandle;
use crate::locator::system_descriptor::{DescriptorKey, SystemDescriptor};

static NEXT_LINEAGE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT: RefCell<Option<ThreadLineage>> = const { RefCell::new(None) };
}

type LineageMaps = Mutex<HashMap<u64, HashMap<DescriptorKey, ThreadEntry>>>;

struct LineageNode {
    id: u64,
    parent: Option<Arc<LineageNode>>,
    /// Caches holding instances for this lineage.
    caches: Mutex<Vec<Weak<LineageMaps>>>,
}

impl LineageNode {
    fn new(parent: Option<Arc<LineageNode>>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_LINEAGE_ID.fetch_add(1, Ordering::Relaxed),
            parent,
            caches: Mutex::new(Vec::new()),
        })
    }
}

impl Drop for LineageNode {
    fn drop(&mut self) {
        for cache in self.caches.get_mut().drain(..) {
            let Some(maps) = cache.upgrade() else {
                continue;
            };
            let Some(entries) = maps.lock().remove(&self.id) else {
                continue;
            };
            debug!(lineage = self.id, count = entries.len(), "Releasing services of an exited thread");
            for entry in entries.into_values() {
                entry.destroy();
            }
        }
    }
}

impl fmt::Debug for LineageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineageNode")
            .field("id", &self.id)
            .field("parent", &self.parent.as_ref().map(|p| p.id))
            .finish()
    }
}

/// Identifies a thread, and the threads it inherits thread-scoped
/// instances from.
#[derive(Debug, Clone)]
pub struct ThreadLineage {
    node: Arc<LineageNode>,
}

impl ThreadLineage {
    fn root() -> Self {
        Self {
            node: LineageNode::new(None),
        }
    }

    /// Returns the lineage of the calling thread.
    ///
    /// While the thread is being torn down this is a fresh lineage that
    /// nothing inherits from.
    pub fn current() -> Self {
        CURRENT
            .try_with(|current| current.borrow_mut().get_or_insert_with(Self::root).clone())
            .unwrap_or_else(|_| Self::root())
    }

    /// Returns a new lineage that inherits from this one.
    pub fn child(&self) -> Self {
        Self {
            node: LineageNode::new(Some(self.node.clone())),
        }
    }

    /// Makes this the lineage of the calling thread.
    pub fn adopt(self) {
        // The replaced lineage may release services; not while borrowed.
        let previous = CURRENT.with(|current| current.borrow_mut().replace(self));
        drop(previous);
    }

    /// Returns the id of this lineage.
    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Returns this lineage's id followed by the ids of its ancestors.
    pub fn ancestry(&self) -> impl Iterator<Item = u64> + '_ {
        std::iter::successors(Some(&self.node), |node| node.parent.as_ref()).map(|node| node.id)
    }
}

/// Spawns a thread that inherits the calling thread's inheritable-thread
/// instances.
pub fn spawn_inheriting<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let lineage = ThreadLineage::current().child();
    std::thread::spawn(move || {
        lineage.adopt();
        f()
    })
}

struct ThreadEntry {
    descriptor: Arc<SystemDescriptor>,
    instance: ServiceArc,
    root: ServiceHandle,
}

impl ThreadEntry {
    fn destroy(self) {
        if let Err(e) = self.descriptor.dispose(&self.instance) {
            warn!(descriptor = %self.descriptor, error = %e, "Failed to destroy thread-scoped service");
        }
        self.root.release_sub_handles();
    }
}

/// Per-lineage instance maps.
#[derive(Default)]
struct ThreadCache {
    lineages: Arc<LineageMaps>,
}

impl ThreadCache {
    fn find(&self, lineage: &ThreadLineage, key: DescriptorKey, inherit: bool) -> Option<ServiceArc> {
        let lineages = self.lineages.lock();
        let lookup = |id: u64| lineages.get(&id).and_then(|m| m.get(&key)).map(|e| e.instance.clone());
        if inherit {
            lineage.ancestry().find_map(lookup)
        } else {
            lookup(lineage.id())
        }
    }

    fn find_or_create(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        root: &ServiceHandle,
        inherit: bool,
    ) -> LocatorResult<ServiceArc> {
        let lineage = ThreadLineage::current();
        let key = descriptor.key();
        if let Some(found) = self.find(&lineage, key, inherit) {
            return Ok(found);
        }

        // Only the calling thread creates into its own lineage map.
        let instance = descriptor.create(root)?;
        let mut lineages = self.lineages.lock();
        let map = lineages.entry(lineage.id()).or_insert_with(|| {
            lineage.node.caches.lock().push(Arc::downgrade(&self.lineages));
            HashMap::new()
        });
        let entry = map
            .entry(key)
            .or_insert_with(|| ThreadEntry {
                descriptor: descriptor.clone(),
                instance: instance.clone(),
                root: root.clone(),
            });
        Ok(entry.instance.clone())
    }

    fn contains(&self, key: DescriptorKey, inherit: bool) -> bool {
        self.find(&ThreadLineage::current(), key, inherit).is_some()
    }

    fn remove_descriptor(&self, key: DescriptorKey) -> Vec<ThreadEntry> {
        let mut lineages = self.lineages.lock();
        lineages.values_mut().filter_map(|m| m.remove(&key)).collect()
    }

    /// Removes the entry holding `instance`, or else the calling thread's
    /// own entry when `instance` is not cached as is.
    fn remove_instance(&self, key: DescriptorKey, instance: &ServiceArc) -> Option<ThreadEntry> {
        let own = ThreadLineage::current().id();
        let mut lineages = self.lineages.lock();
        let owner = lineages
            .iter()
            .find(|(_, m)| m.get(&key).is_some_and(|e| Arc::ptr_eq(&e.instance, instance)))
            .map_or(own, |(id, _)| *id);
        lineages.get_mut(&owner).and_then(|m| m.remove(&key))
    }

    fn remove_lineage(&self, id: u64) -> Vec<ThreadEntry> {
        self.lineages
            .lock()
            .remove(&id)
            .map(|m| m.into_values().collect())
            .unwrap_or_default()
    }

    fn drain(&self) -> Vec<ThreadEntry> {
        let drained = std::mem::take(&mut *self.lineages.lock());
        drained.into_values().flat_map(HashMap::into_values).collect()
    }

    fn len(&self) -> usize {
        self.lineages.lock().values().map(HashMap::len).sum()
    }
}

macro_rules! thread_context {
    ($(#[$meta:meta])* $name:ident, $scope:expr, $inherit:expr) => {
        $(#[$meta])*
        #[derive(Default)]
        pub struct $name {
            cache: ThreadCache,
            inactive: AtomicBool,
        }

        impl $name {
            /// Creates an empty context.
            pub fn new() -> Self {
                Self::default()
            }

            /// Destroys every instance the calling thread created in this
            /// scope. Call it before a pooled thread is reused.
            pub fn release_current_thread(&self) {
                let entries = self.cache.remove_lineage(ThreadLineage::current().id());
                debug!(scope = $scope, count = entries.len(), "Releasing thread-scoped services");
                for entry in entries {
                    entry.destroy();
                }
            }

            /// Returns the number of cached instances across every thread.
            pub fn len(&self) -> usize {
                self.cache.len()
            }

            /// Returns `true` if nothing is cached.
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }

        impl Context for $name {
            fn scope(&self) -> ScopeInfo {
                ScopeInfo::new($scope).proxiable()
            }

            fn find_or_create(
                &self,
                descriptor: &Arc<SystemDescriptor>,
                root: &ServiceHandle,
            ) -> LocatorResult<ServiceArc> {
                self.cache.find_or_create(descriptor, root, $inherit)
            }

            fn contains_key(&self, descriptor: &SystemDescriptor) -> bool {
                self.cache.contains(descriptor.key(), $inherit)
            }

            fn destroy_one(&self, descriptor: &SystemDescriptor) {
                for entry in self.cache.remove_descriptor(descriptor.key()) {
                    entry.destroy();
                }
            }

            fn destroy_instance(&self, descriptor: &SystemDescriptor, instance: &ServiceArc) {
                if let Some(entry) = self.cache.remove_instance(descriptor.key(), instance) {
                    entry.destroy();
                }
            }

            fn is_active(&self) -> bool {
                !self.inactive.load(Ordering::Acquire)
            }

            fn shutdown(&self) {
                if self.inactive.swap(true, Ordering::AcqRel) {
                    return;
                }
                for entry in self.cache.drain() {
                    entry.destroy();
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name))
                    .field("cached", &self.cache.len())
                    .field("active", &self.is_active())
                    .finish()
            }
        }
    };
}

thread_context!(
    /// Context for the [`PER_THREAD`](scopes::PER_THREAD) scope: one
    /// instance per thread.
    PerThreadContext,
    scopes::PER_THREAD,
    false
);

thread_context!(
    /// Context for the [`INHERITABLE_THREAD`](scopes::INHERITABLE_THREAD)
    /// scope: one instance per thread, visible to the threads it spawns with
    /// [`spawn_inheriting`].
    InheritableThreadContext,
    scopes::INHERITABLE_THREAD,
    true
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lineage_is_stable_per_thread() {
        let a = ThreadLineage::current();
        let b = ThreadLineage::current();
        assert_eq!(a.id(), b.id());

        let other = std::thread::spawn(|| ThreadLineage::current().id()).join().unwrap();
        assert_ne!(other, a.id());
    }

    #[test]
    fn test_spawn_inheriting_links_parent() {
        let parent = ThreadLineage::current().id();
        let ancestry: Vec<u64> = spawn_inheriting(|| ThreadLineage::current().ancestry().collect())
            .join()
            .unwrap();
        assert_eq!(ancestry.len(), 2);
        assert_eq!(ancestry[1], parent);
    }

    #[test]
    fn test_thread_scopes_are_proxiable() {
        assert!(PerThreadContext::new().scope().proxiable);
        assert!(InheritableThreadContext::new().scope().proxiable);
        assert_eq!(InheritableThreadContext::new().scope().name, scopes::INHERITABLE_THREAD);
    }
}
