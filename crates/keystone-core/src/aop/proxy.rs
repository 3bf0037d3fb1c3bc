//! Proxies.
//!
//! A [`ProxyHandle`] stands in for a service instance in two situations:
//!
//! - **Interception**: the real instance exists and calls to its
//!   interceptable methods are routed through interceptor chains first.
//! - **Lazy scope binding**: the instance is looked up in its context on
//!   every call, so a long-lived consumer always reaches the instance that is
//!   current for its scope.
//!
//! Rust has no runtime subclassing, so typed callers reach a proxy through a
//! per-contract adapter registered on the
//! [`ContractType`](crate::foundation::types::ContractType): a small type
//! implementing the contract by forwarding to [`ProxyHandle::invoke`] or to
//! [`ProxyHandle::target_as`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::aop::{MethodInterceptor, MethodInvocation, Value};
use crate::error::{BoxError, LocatorError, LocatorResult};
use crate::foundation::class::ServiceClass;
use crate::foundation::types::ServiceArc;
use crate::locator::ServiceLocator;
use crate::locator::system_descriptor::SystemDescriptor;

/// Where a proxy's calls end up.
#[derive(Clone)]
pub enum ProxyTarget {
    /// A created instance whose methods are intercepted.
    Instance(ServiceArc),
    /// An instance looked up in its context on every call.
    Lazy(Weak<ServiceLocator>),
}

/// Everything a [`ProxyFactory`] needs to build one proxy.
pub struct ProxySpec {
    pub(crate) descriptor: Arc<SystemDescriptor>,
    pub(crate) class: Option<Arc<ServiceClass>>,
    pub(crate) target: ProxyTarget,
    pub(crate) interceptors: HashMap<String, Vec<Arc<dyn MethodInterceptor>>>,
}

impl ProxySpec {
    pub(crate) fn intercepted(
        descriptor: Arc<SystemDescriptor>,
        class: Arc<ServiceClass>,
        instance: ServiceArc,
        interceptors: HashMap<String, Vec<Arc<dyn MethodInterceptor>>>,
    ) -> Self {
        Self {
            descriptor,
            class: Some(class),
            target: ProxyTarget::Instance(instance),
            interceptors,
        }
    }

    pub(crate) fn lazy(descriptor: Arc<SystemDescriptor>, locator: Weak<ServiceLocator>) -> Self {
        let class = descriptor.implementation_class();
        Self {
            descriptor,
            class,
            target: ProxyTarget::Lazy(locator),
            interceptors: HashMap::new(),
        }
    }

    /// Returns the proxied descriptor.
    pub fn descriptor(&self) -> &Arc<SystemDescriptor> {
        &self.descriptor
    }

    /// Returns `true` for context-bound lazy proxies.
    pub fn is_lazy(&self) -> bool {
        matches!(self.target, ProxyTarget::Lazy(_))
    }

    /// Returns the names of the intercepted methods.
    pub fn intercepted_methods(&self) -> impl Iterator<Item = &str> {
        self.interceptors.keys().map(String::as_str)
    }
}

/// Builds proxies.
pub trait ProxyFactory: Send + Sync {
    /// Creates a proxy from its specification.
    fn create_proxy(&self, spec: ProxySpec) -> Result<ProxyHandle, BoxError>;
}

/// The built-in proxy factory: proxies dispatch by method name.
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchProxyFactory;

impl ProxyFactory for DispatchProxyFactory {
    fn create_proxy(&self, spec: ProxySpec) -> Result<ProxyHandle, BoxError> {
        Ok(ProxyHandle::new(spec))
    }
}

// =============================================================================
// ProxyHandle
// =============================================================================

struct ProxyInner {
    descriptor: Arc<SystemDescriptor>,
    class: Option<Arc<ServiceClass>>,
    target: ProxyTarget,
    interceptors: HashMap<String, Vec<Arc<dyn MethodInterceptor>>>,
}

/// A proxy, carrying a back-reference to what it proxies.
#[derive(Clone)]
pub struct ProxyHandle {
    inner: Arc<ProxyInner>,
}

impl ProxyHandle {
    /// Creates a proxy directly from its specification.
    pub fn new(spec: ProxySpec) -> Self {
        Self {
            inner: Arc::new(ProxyInner {
                descriptor: spec.descriptor,
                class: spec.class,
                target: spec.target,
                interceptors: spec.interceptors,
            }),
        }
    }

    /// Returns the descriptor this is a proxy for.
    pub fn descriptor(&self) -> &Arc<SystemDescriptor> {
        &self.inner.descriptor
    }

    /// Returns `true` for context-bound lazy proxies.
    pub fn is_lazy(&self) -> bool {
        matches!(self.inner.target, ProxyTarget::Lazy(_))
    }

    /// Returns `true` if calls to `method` pass through interceptors.
    pub fn intercepts(&self, method: &str) -> bool {
        self.inner.interceptors.contains_key(method)
    }

    /// Resolves the instance behind the proxy.
    ///
    /// For lazy proxies this goes through the descriptor's context on every
    /// call. The result may itself be an intercepting proxy.
    pub fn target(&self) -> LocatorResult<ServiceArc> {
        match &self.inner.target {
            ProxyTarget::Instance(instance) => Ok(instance.clone()),
            ProxyTarget::Lazy(locator) => {
                let locator = locator.upgrade().ok_or_else(|| {
                    LocatorError::illegal_state("locator behind a proxy has been dropped")
                })?;
                locator.proxy_target(&self.inner.descriptor)
            }
        }
    }

    /// Resolves the instance behind the proxy, through any nested proxies,
    /// as `T`.
    pub fn target_as<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, BoxError> {
        let target = self.target()?;
        if let Some(inner) = target.downcast_ref::<ProxyHandle>() {
            return inner.target_as::<T>();
        }
        target.downcast::<T>().map_err(|_| {
            format!(
                "proxy target of {} is not a {}",
                self.inner.descriptor.implementation(),
                std::any::type_name::<T>()
            )
            .into()
        })
    }

    /// Calls an interceptable method through its interceptor chain.
    pub fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value, BoxError> {
        let target = self.target()?;
        if let Some(inner) = target.downcast_ref::<ProxyHandle>() {
            return inner.invoke(method, arguments);
        }

        let class = self.inner.class.as_ref().ok_or_else(|| {
            format!(
                "{} has no class to dispatch {method} on",
                self.inner.descriptor.implementation()
            )
        })?;
        let interceptable = class.interceptable_method(method).ok_or_else(|| {
            format!("{} has no interceptable method {method}", class.name())
        })?;
        let chain = self
            .inner
            .interceptors
            .get(method)
            .map(Vec::as_slice)
            .unwrap_or_default();
        MethodInvocation::new(interceptable, &*target, arguments, chain).proceed()
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("descriptor", &self.inner.descriptor.implementation())
            .field("lazy", &self.is_lazy())
            .field("intercepted", &self.inner.interceptors.keys().collect::<Vec<_>>())
            .finish()
    }
}
