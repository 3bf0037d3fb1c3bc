//! Interception, proxy and lifecycle hook tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use keystone_core::aop::{ConstructorInvocation, MethodInvocation, Value, value, value_as};
use keystone_core::foundation::class::RawInstance;
use keystone_core::foundation::filter::IndexFilter;
use keystone_core::{
    AbstractActiveDescriptor, BoxError, ConstructorInterceptor, Filter, InstanceLifecycleEvent,
    InstanceLifecycleListener, InterceptionService, LifecycleEventType, LocatorBuilder, MethodInterceptor,
    ProxyHandle, ServiceClass, ServiceLocator, filter, scopes,
};
use parking_lot::Mutex;

trait Calculator: Send + Sync {
    fn add(&self, a: i64, b: i64) -> i64;
}

struct Adder;

impl Calculator for Adder {
    fn add(&self, a: i64, b: i64) -> i64 {
        a + b
    }
}

/// Implements `Calculator` on a proxy by dispatching through its chains.
struct CalculatorProxy(ProxyHandle);

impl Calculator for CalculatorProxy {
    fn add(&self, a: i64, b: i64) -> i64 {
        let result = self.0.invoke("add", vec![value(a), value(b)]).unwrap();
        value_as::<i64>(&result).unwrap()
    }
}

fn as_calculator(adder: Arc<Adder>) -> Arc<dyn Calculator> {
    adder
}

fn adder_class() -> Arc<ServiceClass> {
    ServiceClass::builder::<Adder>()
        .in_scope(scopes::SINGLETON)
        .contract_with_adapter::<dyn Calculator, _>(as_calculator, |proxy| {
            Arc::new(CalculatorProxy(proxy)) as Arc<dyn Calculator>
        })
        .default_constructor(|| Adder)
        .interceptable("add", |adder, args| {
            Ok(value(adder.add(value_as::<i64>(&args[0])?, value_as::<i64>(&args[1])?)))
        })
        .build()
}

struct Doubling;

impl MethodInterceptor for Doubling {
    fn invoke(&self, invocation: &mut MethodInvocation<'_>) -> Result<Value, BoxError> {
        let result = value_as::<i64>(&invocation.proceed()?)?;
        Ok(value(result * 2))
    }
}

struct Counting(Arc<AtomicUsize>);

impl ConstructorInterceptor for Counting {
    fn construct(&self, invocation: &mut ConstructorInvocation<'_>) -> Result<RawInstance, BoxError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        invocation.proceed()
    }
}

struct AdderInterception {
    filter: IndexFilter,
    constructions: Arc<AtomicUsize>,
}

impl InterceptionService for AdderInterception {
    fn descriptor_filter(&self) -> &dyn Filter {
        &self.filter
    }

    fn method_interceptors(&self, _class: &ServiceClass, method: &str) -> Vec<Arc<dyn MethodInterceptor>> {
        match method {
            "add" => vec![Arc::new(Doubling)],
            _ => Vec::new(),
        }
    }

    fn constructor_interceptors(&self, _class: &ServiceClass) -> Vec<Arc<dyn ConstructorInterceptor>> {
        vec![Arc::new(Counting(self.constructions.clone()))]
    }
}

fn locator(name: &str) -> Arc<ServiceLocator> {
    LocatorBuilder::new(name).build().unwrap()
}

#[test]
fn test_method_and_constructor_interception() {
    let locator = locator("interception");
    let constructions = Arc::new(AtomicUsize::new(0));
    let service: Arc<dyn InterceptionService> = Arc::new(AdderInterception {
        filter: filter::contract_of::<Adder>(),
        constructions: constructions.clone(),
    });

    let mut config = locator.configuration().unwrap();
    config.bind_active(AbstractActiveDescriptor::shared(service)).unwrap();
    config.add_class(adder_class()).unwrap();
    config.commit().unwrap();

    let calculator = locator.require_service::<dyn Calculator>().unwrap();
    assert_eq!(calculator.add(2, 3), 10);

    // Viewing the implementation itself bypasses the chain.
    let adder = locator.require_service::<Adder>().unwrap();
    assert_eq!(adder.add(2, 3), 5);
    assert_eq!(constructions.load(Ordering::SeqCst), 1);
}

#[test]
fn test_no_interception_without_service() {
    let locator = locator("plain");
    let mut config = locator.configuration().unwrap();
    config.add_class(adder_class()).unwrap();
    config.commit().unwrap();

    let calculator = locator.require_service::<dyn Calculator>().unwrap();
    assert_eq!(calculator.add(2, 3), 5);
}

// =============================================================================
// Lifecycle
// =============================================================================

struct Journal {
    filter: IndexFilter,
    events: Mutex<Vec<LifecycleEventType>>,
}

impl InstanceLifecycleListener for Journal {
    fn filter(&self) -> &dyn Filter {
        &self.filter
    }

    fn lifecycle_event(&self, event: &InstanceLifecycleEvent<'_>) {
        assert_eq!(event.instance().is_some(), event.event_type() != LifecycleEventType::PreProduction);
        self.events.lock().push(event.event_type());
    }
}

#[test]
fn test_lifecycle_listener_sees_creation_and_destruction() {
    let locator = locator("lifecycle");
    let journal = Arc::new(Journal {
        filter: filter::contract_of::<Adder>(),
        events: Mutex::new(Vec::new()),
    });

    let mut config = locator.configuration().unwrap();
    config
        .bind_active(AbstractActiveDescriptor::shared(journal.clone() as Arc<dyn InstanceLifecycleListener>))
        .unwrap();
    config.add_class(adder_class()).unwrap();
    config.commit().unwrap();

    locator.require_service::<Adder>().unwrap();
    locator.require_service::<Adder>().unwrap();
    locator.shutdown();

    assert_eq!(
        *journal.events.lock(),
        vec![
            LifecycleEventType::PreProduction,
            LifecycleEventType::PostProduction,
            LifecycleEventType::PreDestruction,
        ]
    );
}
