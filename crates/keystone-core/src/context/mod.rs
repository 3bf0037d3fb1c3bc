//! Scopes and the contexts that manage their instances.
//!
//! Every scope has one [`Context`], registered as a singleton service that
//! advertises `dyn Context` under the scope's name. The locator asks the
//! context of a descriptor's scope to find or create its instance, and to
//! destroy it again when the descriptor is unbound or the locator shuts down.
//!
//! | Scope | Context | Caches | Proxiable |
//! |-------|---------|--------|-----------|
//! | [`SINGLETON`](scopes::SINGLETON) | [`SingletonContext`] | per locator | no |
//! | [`PER_LOOKUP`](scopes::PER_LOOKUP) | [`PerLookupContext`] | never | never |
//! | [`PER_THREAD`](scopes::PER_THREAD) | [`PerThreadContext`] | per thread | yes |
//! | [`INHERITABLE_THREAD`](scopes::INHERITABLE_THREAD) | [`InheritableThreadContext`] | per thread lineage | yes |
//! | [`IMMEDIATE`](scopes::IMMEDIATE) | [`ImmediateContext`] | per locator, eager | no |

pub mod immediate;
pub mod per_lookup;
pub mod per_thread;
pub mod singleton;

use std::sync::Arc;

use crate::error::LocatorResult;
use crate::foundation::types::ServiceArc;
use crate::locator::handle::ServiceHandle;
use crate::locator::system_descriptor::SystemDescriptor;

pub use immediate::{Executor, ImmediateContext, ImmediateController, ImmediateErrorHandler, ImmediateState, ThreadExecutor};
pub use per_lookup::PerLookupContext;
pub use per_thread::{InheritableThreadContext, PerThreadContext, ThreadLineage, spawn_inheriting};
pub use singleton::SingletonContext;

/// Names of the built-in scopes.
pub mod scopes {
    /// One instance per locator.
    pub const SINGLETON: &str = "Singleton";
    /// A new instance for every lookup.
    pub const PER_LOOKUP: &str = "PerLookup";
    /// One instance per thread.
    pub const PER_THREAD: &str = "PerThread";
    /// One instance per thread, shared with threads it spawns.
    pub const INHERITABLE_THREAD: &str = "InheritableThread";
    /// One instance per locator, created as soon as it is bound.
    pub const IMMEDIATE: &str = "Immediate";
}

/// What a scope says about proxying its services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeInfo {
    /// Scope name.
    pub name: String,
    /// Whether services of this scope are proxied unless their descriptor
    /// says otherwise.
    pub proxiable: bool,
    /// Whether a proxy is also used when the consumer is in the same scope.
    pub proxy_for_same_scope: bool,
    /// Whether services of this scope must never be proxied.
    pub unproxiable: bool,
}

impl ScopeInfo {
    /// A scope whose services are not proxied by default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            proxiable: false,
            proxy_for_same_scope: true,
            unproxiable: false,
        }
    }

    /// Proxies services of this scope by default.
    pub fn proxiable(mut self) -> Self {
        self.proxiable = true;
        self
    }

    /// Skips the proxy when the consumer is in the same scope.
    pub fn not_for_same_scope(mut self) -> Self {
        self.proxy_for_same_scope = false;
        self
    }

    /// Forbids proxying services of this scope.
    pub fn unproxiable(mut self) -> Self {
        self.unproxiable = true;
        self.proxiable = false;
        self
    }
}

/// Manages the instances of one scope.
///
/// Implementations must create at most one instance per cache slot even
/// under concurrent callers, and must not keep a slot for a failed creation.
pub trait Context: Send + Sync {
    /// Describes the scope this context manages.
    fn scope(&self) -> ScopeInfo;

    /// Returns the cached instance of `descriptor`, creating it if needed.
    ///
    /// `root` is the handle the instance is created for; dependencies with
    /// per-lookup lifetimes are attached to it.
    fn find_or_create(&self, descriptor: &Arc<SystemDescriptor>, root: &ServiceHandle) -> LocatorResult<ServiceArc>;

    /// Returns `true` if an instance of `descriptor` is cached.
    fn contains_key(&self, descriptor: &SystemDescriptor) -> bool;

    /// Destroys the cached instance of `descriptor`, if any.
    fn destroy_one(&self, descriptor: &SystemDescriptor);

    /// Destroys `instance`, the service a handle obtained for `descriptor`.
    ///
    /// Contexts holding one instance per descriptor destroy that one.
    /// Contexts holding several leave the others alone.
    fn destroy_instance(&self, descriptor: &SystemDescriptor, _instance: &ServiceArc) {
        self.destroy_one(descriptor);
    }

    /// Returns `false` once the context has been shut down.
    fn is_active(&self) -> bool;

    /// Destroys every cached instance and deactivates the context.
    fn shutdown(&self);
}
