//! Method and constructor interception.
//!
//! An [`InterceptionService`] selects descriptors with a filter and supplies
//! interceptor chains per interceptable method and for the constructor.
//! Chains run in the order they are returned; each interceptor decides
//! whether and when to call [`MethodInvocation::proceed`], and the last
//! `proceed` performs the real call.
//!
//! ```rust,ignore
//! struct Timing;
//!
//! impl MethodInterceptor for Timing {
//!     fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, BoxError> {
//!         let start = Instant::now();
//!         let result = invocation.proceed();
//!         debug!(method = invocation.method(), elapsed = ?start.elapsed());
//!         result
//!     }
//! }
//! ```

pub mod proxy;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::creation::injected::InjectionArgs;
use crate::error::BoxError;
use crate::foundation::class::{ConstructorInfo, InterceptableMethod, RawInstance, ServiceClass};
use crate::foundation::filter::Filter;
use crate::foundation::types::ServiceArc;

/// Arguments and return values of interceptable methods.
pub type Value = ServiceArc;

/// Wraps a plain value as a [`Value`].
pub fn value<V: Send + Sync + 'static>(value: V) -> Value {
    Arc::new(value)
}

/// Reads a [`Value`] back as `V`.
pub fn value_as<V: Clone + 'static>(value: &Value) -> Result<V, BoxError> {
    value
        .downcast_ref::<V>()
        .cloned()
        .ok_or_else(|| format!("value is not a {}", std::any::type_name::<V>()).into())
}

/// Intercepts calls to interceptable methods.
pub trait MethodInterceptor: Send + Sync {
    /// Handles one call; call [`MethodInvocation::proceed`] to continue.
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, BoxError>;
}

/// Intercepts construction.
pub trait ConstructorInterceptor: Send + Sync {
    /// Handles one construction; call [`ConstructorInvocation::proceed`] to
    /// continue.
    fn construct(&self, invocation: &mut ConstructorInvocation<'_>) -> Result<RawInstance, BoxError>;
}

/// Supplies interceptors for the descriptors its filter selects.
pub trait InterceptionService: Send + Sync {
    /// Selects the descriptors this service intercepts.
    fn descriptor_filter(&self) -> &dyn Filter;

    /// Returns the chain for one interceptable method.
    fn method_interceptors(&self, class: &ServiceClass, method: &str) -> Vec<Arc<dyn MethodInterceptor>>;

    /// Returns the chain for the constructor.
    fn constructor_interceptors(&self, class: &ServiceClass) -> Vec<Arc<dyn ConstructorInterceptor>> {
        let _ = class;
        Vec::new()
    }
}

/// The interceptor chains that apply to one descriptor.
#[derive(Clone, Default)]
pub struct Interception {
    pub(crate) constructor: Vec<Arc<dyn ConstructorInterceptor>>,
    pub(crate) methods: HashMap<String, Vec<Arc<dyn MethodInterceptor>>>,
}

impl Interception {
    /// Returns `true` if no chain applies.
    pub fn is_empty(&self) -> bool {
        self.constructor.is_empty() && self.methods.is_empty()
    }

    /// Returns `true` if any method chain applies.
    pub fn intercepts_methods(&self) -> bool {
        !self.methods.is_empty()
    }

    pub(crate) fn merge(&mut self, service: &dyn InterceptionService, class: &ServiceClass) {
        self.constructor.extend(service.constructor_interceptors(class));
        for method in class.interceptable_methods() {
            let chain = service.method_interceptors(class, method.name());
            if !chain.is_empty() {
                self.methods
                    .entry(method.name().to_string())
                    .or_default()
                    .extend(chain);
            }
        }
    }
}

impl fmt::Debug for Interception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interception")
            .field("constructor", &self.constructor.len())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

// =============================================================================
// Invocations
// =============================================================================

/// One intercepted method call travelling down its chain.
pub struct MethodInvocation<'a> {
    method: &'a InterceptableMethod,
    target: &'a (dyn Any + Send + Sync),
    arguments: Vec<Value>,
    chain: &'a [Arc<dyn MethodInterceptor>],
    index: usize,
}

impl<'a> MethodInvocation<'a> {
    pub(crate) fn new(
        method: &'a InterceptableMethod,
        target: &'a (dyn Any + Send + Sync),
        arguments: Vec<Value>,
        chain: &'a [Arc<dyn MethodInterceptor>],
    ) -> Self {
        Self {
            method,
            target,
            arguments,
            chain,
            index: 0,
        }
    }

    /// Returns the method name.
    pub fn method(&self) -> &str {
        self.method.name()
    }

    /// Returns the call arguments.
    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Returns the call arguments for modification.
    pub fn arguments_mut(&mut self) -> &mut Vec<Value> {
        &mut self.arguments
    }

    /// Returns the real target.
    pub fn target(&self) -> &(dyn Any + Send + Sync) {
        self.target
    }

    /// Returns the real target as `T`.
    pub fn target_as<T: 'static>(&self) -> Option<&T> {
        self.target.downcast_ref::<T>()
    }

    /// Calls the next interceptor, or the method itself at the end of the
    /// chain.
    pub fn proceed(&mut self) -> Result<Value, BoxError> {
        let Some(next) = self.chain.get(self.index).cloned() else {
            return self.method.invoke(self.target, &self.arguments);
        };
        self.index += 1;
        let result = next.invoke(self);
        self.index -= 1;
        result
    }
}

/// One intercepted construction travelling down its chain.
pub struct ConstructorInvocation<'a> {
    class: &'a ServiceClass,
    constructor: &'a ConstructorInfo,
    arguments: &'a InjectionArgs,
    chain: &'a [Arc<dyn ConstructorInterceptor>],
    index: usize,
}

impl<'a> ConstructorInvocation<'a> {
    pub(crate) fn new(
        class: &'a ServiceClass,
        constructor: &'a ConstructorInfo,
        arguments: &'a InjectionArgs,
        chain: &'a [Arc<dyn ConstructorInterceptor>],
    ) -> Self {
        Self {
            class,
            constructor,
            arguments,
            chain,
            index: 0,
        }
    }

    /// Returns the class being constructed.
    pub fn class(&self) -> &ServiceClass {
        self.class
    }

    /// Returns the resolved constructor arguments.
    pub fn arguments(&self) -> &InjectionArgs {
        self.arguments
    }

    /// Calls the next interceptor, or the constructor at the end of the
    /// chain.
    pub fn proceed(&mut self) -> Result<RawInstance, BoxError> {
        let Some(next) = self.chain.get(self.index).cloned() else {
            return self.constructor.construct(self.arguments);
        };
        self.index += 1;
        let result = next.construct(self);
        self.index -= 1;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Greeter {
        greeting: String,
    }

    fn greeter_class() -> Arc<ServiceClass> {
        ServiceClass::builder::<Greeter>()
            .default_constructor(|| Greeter {
                greeting: "hello".into(),
            })
            .interceptable("greet", |g, args| {
                let name = value_as::<String>(&args[0])?;
                Ok(value(format!("{} {name}", g.greeting)))
            })
            .build()
    }

    struct Recording {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl MethodInterceptor for Recording {
        fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, BoxError> {
            self.log.lock().push(self.tag);
            invocation.proceed()
        }
    }

    struct Shout;

    impl MethodInterceptor for Shout {
        fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, BoxError> {
            let result = invocation.proceed()?;
            Ok(value(value_as::<String>(&result)?.to_uppercase()))
        }
    }

    #[test]
    fn test_chain_runs_in_order_then_target() {
        let class = greeter_class();
        let target = Greeter {
            greeting: "hi".into(),
        };
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn MethodInterceptor>> = vec![
            Arc::new(Recording { tag: "first", log: log.clone() }),
            Arc::new(Recording { tag: "second", log: log.clone() }),
            Arc::new(Shout),
        ];

        let method = class.interceptable_method("greet").unwrap();
        let mut invocation = MethodInvocation::new(method, &target, vec![value(String::from("bob"))], &chain);
        let result = invocation.proceed().unwrap();

        assert_eq!(value_as::<String>(&result).unwrap(), "HI BOB");
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    struct Veto;

    impl ConstructorInterceptor for Veto {
        fn construct(&self, _: &mut ConstructorInvocation<'_>) -> Result<RawInstance, BoxError> {
            Err("construction vetoed".into())
        }
    }

    struct PassThrough(Arc<Mutex<usize>>);

    impl ConstructorInterceptor for PassThrough {
        fn construct(&self, invocation: &mut ConstructorInvocation<'_>) -> Result<RawInstance, BoxError> {
            *self.0.lock() += 1;
            invocation.proceed()
        }
    }

    #[test]
    fn test_constructor_chain() {
        let class = greeter_class();
        let args = InjectionArgs::default();
        let calls = Arc::new(Mutex::new(0));

        let chain: Vec<Arc<dyn ConstructorInterceptor>> = vec![Arc::new(PassThrough(calls.clone()))];
        let raw = ConstructorInvocation::new(&class, &class.constructors()[0], &args, &chain)
            .proceed()
            .unwrap();
        assert_eq!(raw.downcast_ref::<Greeter>().unwrap().greeting, "hello");
        assert_eq!(*calls.lock(), 1);

        let vetoing: Vec<Arc<dyn ConstructorInterceptor>> = vec![Arc::new(Veto)];
        assert!(
            ConstructorInvocation::new(&class, &class.constructors()[0], &args, &vetoing)
                .proceed()
                .is_err()
        );
    }
}
