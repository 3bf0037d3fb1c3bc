//! Runtime type identity, contract views and qualifiers.
//!
//! Service instances are stored type-erased as [`ServiceArc`]. A descriptor
//! advertises contracts by name; once reified, each contract is backed by a
//! [`ContractType`] that knows how to turn the raw instance into a *view*:
//! an erased `Arc<Arc<C>>` that [`downcast_view`] turns back into `Arc<C>`,
//! for concrete types and trait objects alike.
//!
//! ```rust,ignore
//! let contract = ContractType::upcast::<V8, dyn Engine>(|e| e);
//! let view = contract.view(&raw)?;
//! let engine: Arc<dyn Engine> = downcast_view(&view).unwrap();
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aop::proxy::ProxyHandle;
use crate::error::{LocatorError, LocatorResult};

/// A type-erased, shareable service instance.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

/// Recovers `Arc<C>` from a contract view.
pub fn downcast_view<C: ?Sized + 'static>(view: &ServiceArc) -> Option<Arc<C>> {
    view.downcast_ref::<Arc<C>>().cloned()
}

/// Wraps an `Arc<C>` into a contract view.
pub fn into_view<C: ?Sized + Send + Sync + 'static>(value: Arc<C>) -> ServiceArc {
    Arc::new(value)
}

// =============================================================================
// TypeKey
// =============================================================================

/// Runtime identity of a type, including unsized trait-object types.
#[derive(Clone, Copy)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key of `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the type name, which is also the contract name used by
    /// descriptors.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

// =============================================================================
// ContractType
// =============================================================================

type CastFn = Arc<dyn Fn(&ServiceArc) -> Option<ServiceArc> + Send + Sync>;
type AdapterFn = Arc<dyn Fn(ProxyHandle) -> ServiceArc + Send + Sync>;

/// A reified contract: how a raw instance is viewed as `C`.
///
/// When the raw instance is a [`ProxyHandle`], a registered proxy adapter
/// takes precedence so calls keep flowing through the proxy. Without an
/// adapter the proxy's target is resolved and viewed directly.
#[derive(Clone)]
pub struct ContractType {
    key: TypeKey,
    cast: CastFn,
    adapter: Option<AdapterFn>,
}

impl ContractType {
    /// Views a raw `Arc<T>` instance as `T` itself.
    pub fn of<T: Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<T>(),
            cast: Arc::new(|raw: &ServiceArc| {
                raw.clone()
                    .downcast::<T>()
                    .ok()
                    .map(|t| Arc::new(t) as ServiceArc)
            }),
            adapter: None,
        }
    }

    /// Views a raw `Arc<T>` instance as `C` through an upcast.
    pub fn upcast<T, C>(cast: fn(Arc<T>) -> Arc<C>) -> Self
    where
        T: Send + Sync + 'static,
        C: ?Sized + Send + Sync + 'static,
    {
        Self {
            key: TypeKey::of::<C>(),
            cast: Arc::new(move |raw: &ServiceArc| {
                raw.clone()
                    .downcast::<T>()
                    .ok()
                    .map(|t| Arc::new(cast(t)) as ServiceArc)
            }),
            adapter: None,
        }
    }

    /// For instances that are stored already packaged as a view of `C`.
    pub fn prepackaged<C: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            key: TypeKey::of::<C>(),
            cast: Arc::new(|raw: &ServiceArc| raw.downcast_ref::<Arc<C>>().map(|_| raw.clone())),
            adapter: None,
        }
    }

    /// Registers the adapter that implements `C` on top of a proxy.
    ///
    /// The adapter is ignored if `C` is not this contract's type.
    pub fn with_adapter<C, F>(mut self, adapter: F) -> Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(ProxyHandle) -> Arc<C> + Send + Sync + 'static,
    {
        if TypeKey::of::<C>() != self.key {
            tracing::warn!(
                contract = self.key.name(),
                adapter = std::any::type_name::<C>(),
                "Proxy adapter type does not match contract, ignoring"
            );
            return self;
        }
        self.adapter = Some(Arc::new(move |proxy| into_view(adapter(proxy))));
        self
    }

    /// Returns the contract's type key.
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Returns the contract name.
    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    /// Returns `true` if a proxy adapter is registered.
    pub fn has_adapter(&self) -> bool {
        self.adapter.is_some()
    }

    /// Produces the view of `raw` as this contract.
    pub fn view(&self, raw: &ServiceArc) -> LocatorResult<ServiceArc> {
        if let Some(proxy) = raw.downcast_ref::<ProxyHandle>() {
            if let Some(adapter) = &self.adapter {
                return Ok(adapter(proxy.clone()));
            }
            let target = proxy.target()?;
            return self.view(&target);
        }
        (self.cast)(raw).ok_or_else(|| {
            LocatorError::illegal_argument(format!(
                "instance cannot be viewed as {}",
                self.key.name()
            ))
            .into()
        })
    }
}

impl fmt::Debug for ContractType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractType")
            .field("key", &self.key)
            .field("has_adapter", &self.adapter.is_some())
            .finish()
    }
}

// =============================================================================
// Qualifiers
// =============================================================================

/// Name of the qualifier that carries a service name.
pub const NAMED: &str = "Named";

/// A qualifier annotation instance: a name plus an optional value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Qualifier {
    name: String,
    value: Option<String>,
}

impl Qualifier {
    /// Creates a marker qualifier without a value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Creates a qualifier carrying a value.
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Creates the `Named` qualifier.
    pub fn named(value: impl Into<String>) -> Self {
        Self::with_value(NAMED, value)
    }

    /// Returns the qualifier name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the qualifier value.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns `true` for the `Named` qualifier.
    pub fn is_named(&self) -> bool {
        self.name == NAMED
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "@{}(\"{value}\")", self.name),
            None => write!(f, "@{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    #[test]
    fn test_type_key_identity() {
        assert_eq!(TypeKey::of::<English>(), TypeKey::of::<English>());
        assert_ne!(TypeKey::of::<English>(), TypeKey::of::<dyn Greeter>());
        assert!(TypeKey::of::<dyn Greeter>().name().contains("Greeter"));
    }

    #[test]
    fn test_views() {
        let raw: ServiceArc = Arc::new(English);

        let own = ContractType::of::<English>().view(&raw).unwrap();
        assert!(downcast_view::<English>(&own).is_some());

        let contract = ContractType::upcast::<English, dyn Greeter>(|e| e);
        let view = contract.view(&raw).unwrap();
        let greeter = downcast_view::<dyn Greeter>(&view).unwrap();
        assert_eq!(greeter.greet(), "hello");
    }

    #[test]
    fn test_view_of_wrong_type_fails() {
        let raw: ServiceArc = Arc::new(42_u32);
        assert!(ContractType::of::<English>().view(&raw).is_err());
    }

    #[test]
    fn test_prepackaged() {
        let raw = into_view::<dyn Greeter>(Arc::new(English));
        let view = ContractType::prepackaged::<dyn Greeter>().view(&raw).unwrap();
        assert_eq!(downcast_view::<dyn Greeter>(&view).unwrap().greet(), "hello");
    }

    #[test]
    fn test_qualifier_display() {
        assert_eq!(Qualifier::named("front").to_string(), "@Named(\"front\")");
        assert_eq!(Qualifier::new("Blue").to_string(), "@Blue");
        assert!(Qualifier::named("x").is_named());
    }
}
