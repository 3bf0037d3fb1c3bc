//! Resolved injection values.
//!
//! Every injection point resolves to an [`Injected`] before any constructor
//! runs. Constructors and setters read them back through typed accessors.

use std::fmt;
use std::sync::Arc;

use crate::aop::proxy::ProxyHandle;
use crate::error::BoxError;
use crate::foundation::types::{ServiceArc, downcast_view, into_view};
use crate::locator::system_descriptor::SystemDescriptor;
use crate::resolution::provider::{IterableProvider, ProviderCore};

#[derive(Clone)]
enum InjectedValue {
    Service {
        view: ServiceArc,
        proxy: Option<ProxyHandle>,
    },
    Absent,
    Provider(ProviderCore),
    Descriptor(Arc<SystemDescriptor>),
}

/// The resolved value of one injection point.
#[derive(Clone)]
pub struct Injected {
    value: InjectedValue,
}

impl Injected {
    /// Wraps a plain value, for custom injection resolvers.
    pub fn value<V: Send + Sync + 'static>(value: V) -> Self {
        Self::shared(Arc::new(value))
    }

    /// Wraps a shared value, for custom injection resolvers.
    pub fn shared<C: ?Sized + Send + Sync + 'static>(value: Arc<C>) -> Self {
        Self::service(into_view(value), None)
    }

    /// The value of an optional point with no matching service.
    pub fn absent() -> Self {
        Self {
            value: InjectedValue::Absent,
        }
    }

    pub(crate) fn service(view: ServiceArc, proxy: Option<ProxyHandle>) -> Self {
        Self {
            value: InjectedValue::Service { view, proxy },
        }
    }

    pub(crate) fn provider_value(core: ProviderCore) -> Self {
        Self {
            value: InjectedValue::Provider(core),
        }
    }

    pub(crate) fn descriptor_value(descriptor: Arc<SystemDescriptor>) -> Self {
        Self {
            value: InjectedValue::Descriptor(descriptor),
        }
    }

    /// Returns `true` if nothing was injected.
    pub fn is_absent(&self) -> bool {
        matches!(self.value, InjectedValue::Absent)
    }

    /// Returns the service as `C`.
    pub fn get<C: ?Sized + 'static>(&self) -> Result<Arc<C>, BoxError> {
        match &self.value {
            InjectedValue::Service { view, .. } => downcast_view::<C>(view).ok_or_else(|| {
                format!("injected value is not a {}", std::any::type_name::<C>()).into()
            }),
            InjectedValue::Absent => {
                Err(format!("no {} was injected", std::any::type_name::<C>()).into())
            }
            InjectedValue::Provider(_) => Err("injected value is a provider".into()),
            InjectedValue::Descriptor(_) => Err("injected value is a descriptor".into()),
        }
    }

    /// Returns the service as `C`, or `None` if the point was left empty.
    pub fn optional<C: ?Sized + 'static>(&self) -> Result<Option<Arc<C>>, BoxError> {
        if self.is_absent() {
            return Ok(None);
        }
        self.get::<C>().map(Some)
    }

    /// Returns the provider of `C`.
    pub fn provider<C: ?Sized + 'static>(&self) -> Result<IterableProvider<C>, BoxError> {
        match &self.value {
            InjectedValue::Provider(core) => Ok(IterableProvider::new(core.clone())),
            _ => Err("injected value is not a provider".into()),
        }
    }

    /// Returns the descriptor of the service being constructed.
    pub fn self_descriptor(&self) -> Result<Arc<SystemDescriptor>, BoxError> {
        match &self.value {
            InjectedValue::Descriptor(descriptor) => Ok(descriptor.clone()),
            _ => Err("injected value is not a descriptor".into()),
        }
    }

    /// Returns the proxy standing in for the service, if one was injected.
    pub fn proxy(&self) -> Option<&ProxyHandle> {
        match &self.value {
            InjectedValue::Service { proxy, .. } => proxy.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for Injected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.value {
            InjectedValue::Service { proxy: Some(_), .. } => "proxy",
            InjectedValue::Service { .. } => "service",
            InjectedValue::Absent => "absent",
            InjectedValue::Provider(_) => "provider",
            InjectedValue::Descriptor(_) => "descriptor",
        };
        f.debug_tuple("Injected").field(&kind).finish()
    }
}

/// The resolved arguments of a constructor or initializer method.
#[derive(Debug, Clone, Default)]
pub struct InjectionArgs {
    values: Vec<Injected>,
}

impl InjectionArgs {
    /// Creates arguments from resolved values in parameter order.
    pub fn new(values: Vec<Injected>) -> Self {
        Self { values }
    }

    /// Returns the raw value at `index`.
    pub fn injected(&self, index: usize) -> Result<&Injected, BoxError> {
        self.values.get(index).ok_or_else(|| {
            format!(
                "argument {index} requested but only {} were resolved",
                self.values.len()
            )
            .into()
        })
    }

    /// Returns argument `index` as `C`.
    pub fn get<C: ?Sized + 'static>(&self, index: usize) -> Result<Arc<C>, BoxError> {
        self.injected(index)?.get::<C>()
    }

    /// Returns argument `index` as `C`, if present.
    pub fn optional<C: ?Sized + 'static>(&self, index: usize) -> Result<Option<Arc<C>>, BoxError> {
        self.injected(index)?.optional::<C>()
    }

    /// Returns argument `index` as a provider of `C`.
    pub fn provider<C: ?Sized + 'static>(&self, index: usize) -> Result<IterableProvider<C>, BoxError> {
        self.injected(index)?.provider::<C>()
    }

    /// Returns argument `index` as the owner's descriptor.
    pub fn self_descriptor(&self, index: usize) -> Result<Arc<SystemDescriptor>, BoxError> {
        self.injected(index)?.self_descriptor()
    }

    /// Returns the number of arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Plain(&'static str);

    impl Named for Plain {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_value_round_trips() {
        let injected = Injected::value(7_u32);
        assert_eq!(*injected.get::<u32>().unwrap(), 7);
        assert!(injected.get::<String>().is_err());
        assert!(injected.proxy().is_none());
    }

    #[test]
    fn test_shared_trait_object() {
        let injected = Injected::shared::<dyn Named>(Arc::new(Plain("x")));
        assert_eq!(injected.get::<dyn Named>().unwrap().name(), "x");
    }

    #[test]
    fn test_absent() {
        let injected = Injected::absent();
        assert!(injected.is_absent());
        assert!(injected.optional::<u32>().unwrap().is_none());
        assert!(injected.get::<u32>().is_err());
    }

    #[test]
    fn test_args_indexing() {
        let args = InjectionArgs::new(vec![Injected::value(1_i64), Injected::absent()]);
        assert_eq!(args.len(), 2);
        assert_eq!(*args.get::<i64>(0).unwrap(), 1);
        assert!(args.optional::<i64>(1).unwrap().is_none());
        assert!(args.get::<i64>(5).is_err());
    }
}
