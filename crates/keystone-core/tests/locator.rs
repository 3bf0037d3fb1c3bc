//! Locator lookup, creation and configuration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

use keystone_core::{
    AbstractActiveDescriptor, BoxError, Descriptor, ErrorInformation, ErrorService, ErrorType, Factory,
    InjectionPoint, JustInTimeInjectionResolver, LocatorBuilder, LocatorError, LocatorState, Qualifier, ServiceArc,
    ServiceClass, ServiceLocator, TwoPhaseResource, TwoPhaseTransactionData, filter, scopes,
};
use keystone_core::{Injectee, Operation, ValidationInformation, ValidationService, Validator};
use parking_lot::Mutex;

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct Plain(&'static str);

impl Greeter for Plain {
    fn greet(&self) -> String {
        self.0.to_string()
    }
}

fn greeter(word: &'static str) -> AbstractActiveDescriptor {
    AbstractActiveDescriptor::constant(Plain(word)).contract::<Plain, dyn Greeter>(|g| g)
}

fn locator(name: &str) -> Arc<ServiceLocator> {
    LocatorBuilder::new(name).build().unwrap()
}

fn bind(locator: &ServiceLocator, actives: Vec<AbstractActiveDescriptor>) {
    let mut config = locator.configuration().unwrap();
    for active in actives {
        config.bind_active(active).unwrap();
    }
    config.commit().unwrap();
}

fn greetings(locator: &ServiceLocator) -> Vec<String> {
    locator
        .all_services::<dyn Greeter>(&[])
        .unwrap()
        .iter()
        .map(|g| g.greet())
        .collect()
}

// =============================================================================
// Ordering and Visibility
// =============================================================================

#[test]
fn test_lookup_follows_ranking_then_service_id() {
    let locator = locator("ranking");
    bind(
        &locator,
        vec![greeter("low").ranked(-1), greeter("first"), greeter("high").ranked(10), greeter("second")],
    );

    assert_eq!(greetings(&locator), vec!["high", "first", "second", "low"]);
    let best = locator.get_service::<dyn Greeter>().unwrap().unwrap();
    assert_eq!(best.greet(), "high");
}

#[test]
fn test_set_ranking_reorders() {
    let locator = locator("reranking");
    bind(&locator, vec![greeter("a"), greeter("b")]);

    let b = locator
        .descriptors(&filter::contract_of::<dyn Greeter>())
        .into_iter()
        .nth(1)
        .unwrap();
    assert_eq!(locator.set_ranking(&b, 5).unwrap(), 0);
    assert_eq!(greetings(&locator), vec!["b", "a"]);
}

#[test]
fn test_child_sees_parent_but_not_its_local_services() {
    let parent = locator("visibility-parent");
    bind(&parent, vec![greeter("shared"), greeter("private").ranked(100).local_only()]);
    let child = parent.create_child("visibility-child").unwrap();
    bind(&child, vec![greeter("child")]);

    assert_eq!(greetings(&parent), vec!["private", "shared"]);
    // Equal rankings favour the newer locator.
    assert_eq!(greetings(&child), vec!["child", "shared"]);
}

#[test]
fn test_named_and_qualified_lookup() {
    let locator = locator("named");
    bind(
        &locator,
        vec![
            greeter("front").named("front"),
            greeter("rear").named("rear").qualified_by(Qualifier::new("Spare")),
        ],
    );

    let rear = locator.get_named_service::<dyn Greeter>("rear").unwrap().unwrap();
    assert_eq!(rear.greet(), "rear");
    let spare = locator
        .get_qualified_service::<dyn Greeter>(&[Qualifier::new("Spare")])
        .unwrap()
        .unwrap();
    assert_eq!(spare.greet(), "rear");
    assert!(locator.get_named_service::<dyn Greeter>("side").unwrap().is_none());
}

// =============================================================================
// Creation
// =============================================================================

struct Engine {
    serial: usize,
}

struct Car {
    engine: Arc<Engine>,
}

fn garage(scope: &str) -> (Arc<ServiceLocator>, Arc<AtomicUsize>) {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let engine = ServiceClass::builder::<Engine>()
        .default_constructor(move || Engine {
            serial: counter.fetch_add(1, Ordering::SeqCst),
        })
        .build();
    let car = ServiceClass::builder::<Car>()
        .in_scope(scope)
        .inject_constructor(vec![InjectionPoint::of::<Engine>()], |args| {
            Ok(Car {
                engine: args.get::<Engine>(0)?,
            })
        })
        .build();

    let locator = locator("garage");
    let mut config = locator.configuration().unwrap();
    config.add_class(engine).unwrap();
    config.add_class(car).unwrap();
    config.commit().unwrap();
    (locator, built)
}

#[test]
fn test_singleton_car_keeps_its_engine() {
    let (locator, built) = garage(scopes::SINGLETON);

    let first = locator.require_service::<Car>().unwrap();
    let second = locator.require_service::<Car>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.engine.serial, 0);
    assert_eq!(built.load(Ordering::SeqCst), 1);

    let loose = locator.require_service::<Engine>().unwrap();
    assert_eq!(loose.serial, 1);
}

#[test]
fn test_per_lookup_creates_every_time() {
    let (locator, built) = garage(scopes::PER_LOOKUP);

    let first = locator.require_service::<Car>().unwrap();
    let second = locator.require_service::<Car>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_ne!(first.engine.serial, second.engine.serial);
    assert_eq!(built.load(Ordering::SeqCst), 2);
}

#[test]
fn test_singleton_created_once_across_threads() {
    let (locator, built) = garage(scopes::SINGLETON);
    let barrier = Arc::new(Barrier::new(8));

    let cars: Vec<Arc<Car>> = (0..8)
        .map(|_| {
            let locator = locator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                locator.require_service::<Car>().unwrap()
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    assert!(cars.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[derive(Debug)]
struct Chicken;
struct Egg;

#[test]
fn test_cycle_is_reported() {
    let chicken = ServiceClass::builder::<Chicken>()
        .inject_constructor(vec![InjectionPoint::of::<Egg>()], |args| {
            args.get::<Egg>(0)?;
            Ok(Chicken)
        })
        .build();
    let egg = ServiceClass::builder::<Egg>()
        .inject_constructor(vec![InjectionPoint::of::<Chicken>()], |args| {
            args.get::<Chicken>(0)?;
            Ok(Egg)
        })
        .build();

    let locator = locator("cycle");
    let mut config = locator.configuration().unwrap();
    config.add_class(chicken).unwrap();
    config.add_class(egg).unwrap();
    config.commit().unwrap();

    let error = locator.require_service::<Chicken>().unwrap_err();
    assert!(error.any(LocatorError::is_circular));
}

#[test]
fn test_cars_share_singleton_engine() {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let engine = ServiceClass::builder::<Engine>()
        .in_scope(scopes::SINGLETON)
        .default_constructor(move || Engine {
            serial: counter.fetch_add(1, Ordering::SeqCst),
        })
        .build();
    let car = ServiceClass::builder::<Car>()
        .inject_constructor(vec![InjectionPoint::of::<Engine>()], |args| {
            Ok(Car {
                engine: args.get::<Engine>(0)?,
            })
        })
        .build();

    let locator = locator("showroom");
    let mut config = locator.configuration().unwrap();
    config.add_class(engine).unwrap();
    config.add_class(car).unwrap();
    config.commit().unwrap();

    let first = locator.require_service::<Car>().unwrap();
    let second = locator.require_service::<Car>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.engine, &second.engine));
    assert!(Arc::ptr_eq(&first.engine, &locator.require_service::<Engine>().unwrap()));
    assert_eq!(built.load(Ordering::SeqCst), 1);
}

#[derive(Debug)]
struct Hen;
#[derive(Debug)]
struct Rooster;
struct Coop;

fn henhouse(name: &str, slow_coop: bool) -> Arc<ServiceLocator> {
    let coop = ServiceClass::builder::<Coop>()
        .default_constructor(move || {
            if slow_coop {
                thread::sleep(Duration::from_millis(300));
            }
            Coop
        })
        .build();
    let hen = ServiceClass::builder::<Hen>()
        .in_scope(scopes::SINGLETON)
        .inject_constructor(vec![InjectionPoint::of::<Coop>(), InjectionPoint::of::<Rooster>()], |args| {
            args.get::<Rooster>(1)?;
            Ok(Hen)
        })
        .build();
    let rooster = ServiceClass::builder::<Rooster>()
        .in_scope(scopes::SINGLETON)
        .inject_constructor(vec![InjectionPoint::of::<Hen>()], |args| {
            args.get::<Hen>(0)?;
            Ok(Rooster)
        })
        .build();

    let locator = locator(name);
    let mut config = locator.configuration().unwrap();
    config.add_class(coop).unwrap();
    config.add_class(hen).unwrap();
    config.add_class(rooster).unwrap();
    config.commit().unwrap();
    locator
}

#[test]
fn test_singleton_cycle_is_reported() {
    let locator = henhouse("singleton-cycle", false);

    let error = locator.require_service::<Hen>().unwrap_err();
    assert!(error.any(LocatorError::is_circular));
    let error = locator.require_service::<Rooster>().unwrap_err();
    assert!(error.any(LocatorError::is_circular));
}

#[test]
fn test_singleton_cycle_entered_from_two_threads() {
    let locator = henhouse("singleton-cycle-threads", true);
    let (tx, rx) = mpsc::channel();

    let (hens, done) = (locator.clone(), tx.clone());
    thread::spawn(move || {
        let result = hens.require_service::<Hen>();
        done.send(result.is_err_and(|e| e.any(LocatorError::is_circular))).unwrap();
    });
    thread::sleep(Duration::from_millis(100));
    let roosters = locator.clone();
    thread::spawn(move || {
        let result = roosters.require_service::<Rooster>();
        tx.send(result.is_err_and(|e| e.any(LocatorError::is_circular))).unwrap();
    });

    for _ in 0..2 {
        assert!(rx.recv_timeout(Duration::from_secs(10)).unwrap());
    }
}

#[test]
fn test_failed_creation_releases_per_lookup_dependencies() {
    struct Part;
    struct Broken;

    let released = Arc::new(AtomicUsize::new(0));
    let seen = released.clone();
    let part = ServiceClass::builder::<Part>()
        .default_constructor(|| Part)
        .pre_destroy("release", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();
    let broken = ServiceClass::builder::<Broken>()
        .in_scope(scopes::SINGLETON)
        .inject_constructor(vec![InjectionPoint::of::<Part>()], |_| Err("no assembly".into()))
        .build();

    let locator = locator("failed-release");
    let mut config = locator.configuration().unwrap();
    config.add_class(part).unwrap();
    config.add_class(broken).unwrap();
    config.commit().unwrap();

    assert!(locator.require_service::<Broken>().is_err());
    assert_eq!(released.load(Ordering::SeqCst), 1);
    locator.shutdown();
    assert_eq!(released.load(Ordering::SeqCst), 1);
}

struct Wheels;

#[test]
fn test_every_unsatisfied_dependency_is_reported() {
    #[derive(Debug)]
    struct Truck;
    let truck = ServiceClass::builder::<Truck>()
        .inject_constructor(vec![InjectionPoint::of::<Engine>(), InjectionPoint::of::<Wheels>()], |_| {
            Ok(Truck)
        })
        .build();

    let locator = locator("unsatisfied");
    let mut config = locator.configuration().unwrap();
    config.add_class(truck).unwrap();
    config.commit().unwrap();

    let error = locator.require_service::<Truck>().unwrap_err();
    assert_eq!(error.count(LocatorError::is_unsatisfied), 2);
}

#[test]
fn test_optional_and_provider_injection() {
    struct Dashboard {
        engine: Option<Arc<Engine>>,
        greeters: keystone_core::IterableProvider<dyn Greeter>,
    }
    let dashboard = ServiceClass::builder::<Dashboard>()
        .inject_constructor(
            vec![InjectionPoint::optional_of::<Engine>(), InjectionPoint::iterable_of::<dyn Greeter>()],
            |args| {
                Ok(Dashboard {
                    engine: args.optional::<Engine>(0)?,
                    greeters: args.provider::<dyn Greeter>(1)?,
                })
            },
        )
        .build();

    let locator = locator("deferred");
    let mut config = locator.configuration().unwrap();
    config.add_class(dashboard).unwrap();
    config.commit().unwrap();

    let dashboard = locator.require_service::<Dashboard>().unwrap();
    assert!(dashboard.engine.is_none());
    assert_eq!(dashboard.greeters.size().unwrap(), 0);

    // Providers query the registry on every access.
    bind(&locator, vec![greeter("later")]);
    assert_eq!(dashboard.greeters.size().unwrap(), 1);
    assert_eq!(dashboard.greeters.require().unwrap().greet(), "later");
}

#[test]
fn test_factory_products() {
    struct Ticket(usize);
    struct TicketMachine {
        issued: AtomicUsize,
    }

    impl Factory for TicketMachine {
        fn provide(&self) -> Result<ServiceArc, BoxError> {
            Ok(Arc::new(Ticket(self.issued.fetch_add(1, Ordering::SeqCst))))
        }
    }

    let machine = ServiceClass::builder::<TicketMachine>()
        .default_constructor(|| TicketMachine {
            issued: AtomicUsize::new(0),
        })
        .produces::<Ticket>()
        .build();

    let locator = locator("factory");
    let mut config = locator.configuration().unwrap();
    config.add_factory(machine).unwrap();
    config.commit().unwrap();

    let first = locator.require_service::<Ticket>().unwrap();
    let second = locator.require_service::<Ticket>().unwrap();
    assert_eq!((first.0, second.0), (0, 1));
}

#[test]
fn test_unmanaged_creation_and_injection() {
    struct Report {
        engine: Option<Arc<Engine>>,
    }
    let (locator, _) = garage(scopes::SINGLETON);
    let class = ServiceClass::builder::<Report>()
        .default_constructor(|| Report { engine: None })
        .field("engine", InjectionPoint::of::<Engine>(), |report, value| {
            report.engine = Some(value.get::<Engine>()?);
            Ok(())
        })
        .build();

    let report = locator.create_and_initialize_as::<Report>(&class).unwrap();
    assert!(report.engine.is_some());

    let mut manual = Report { engine: None };
    locator.inject(&mut manual, &class).unwrap();
    assert!(manual.engine.is_some());
    // Unmanaged classes never become registered services.
    assert!(locator.get_service::<Report>().unwrap().is_none());
}

// =============================================================================
// Configuration
// =============================================================================

struct Veto;

impl TwoPhaseResource for Veto {
    fn prepare(&self, _data: &TwoPhaseTransactionData) -> Result<(), BoxError> {
        Err("not today".into())
    }
}

#[test]
fn test_commit_is_all_or_nothing() {
    let locator = locator("atomic");
    let before = locator.size();

    let mut config = locator.configuration().unwrap();
    config.bind_active(greeter("a")).unwrap();
    config.bind_active(greeter("b")).unwrap();
    config.register_two_phase_resource(Arc::new(Veto)).unwrap();
    assert!(config.commit().is_err());

    assert_eq!(locator.size(), before);
    assert!(greetings(&locator).is_empty());
}

#[test]
fn test_failed_commit_registers_no_classes() {
    struct Ghost;
    let ghost = ServiceClass::builder::<Ghost>().default_constructor(|| Ghost).build();
    let name = ghost.name().to_string();

    let locator = locator("atomic-classes");
    let mut config = locator.configuration().unwrap();
    config.add_class(ghost).unwrap();
    config.register_two_phase_resource(Arc::new(Veto)).unwrap();
    assert!(config.commit().is_err());

    assert!(locator.classes().get(&name).is_none());
    assert!(locator.get_service::<Ghost>().unwrap().is_none());
}

#[test]
fn test_configuration_commits_once() {
    let locator = locator("once");
    let mut config = locator.configuration().unwrap();
    config.bind_active(greeter("a")).unwrap();
    config.commit().unwrap();
    assert!(config.commit().is_err());
    assert!(config.bind_active(greeter("b")).is_err());
}

#[test]
fn test_idempotent_filter_rejects_duplicates() {
    let locator = locator("idempotent");
    bind(&locator, vec![greeter("a").named("a")]);

    let mut config = locator.configuration().unwrap();
    config.bind_active(greeter("again").named("a")).unwrap();
    config.add_idempotent_filter(filter::named("a")).unwrap();
    let error = config.commit().unwrap_err();
    assert!(error.any(LocatorError::is_duplicate));
    assert_eq!(greetings(&locator), vec!["a"]);
}

#[test]
fn test_unbind_destroys_singleton() {
    struct Lamp;
    let destroyed = Arc::new(AtomicUsize::new(0));
    let seen = destroyed.clone();
    let lamp = ServiceClass::builder::<Lamp>()
        .in_scope(scopes::SINGLETON)
        .default_constructor(|| Lamp)
        .pre_destroy("off", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();

    let locator = locator("unbind");
    let mut config = locator.configuration().unwrap();
    config.add_class(lamp).unwrap();
    config.commit().unwrap();
    locator.require_service::<Lamp>().unwrap();

    let mut config = locator.configuration().unwrap();
    config.add_unbind_filter(filter::contract_of::<Lamp>()).unwrap();
    config.commit().unwrap();

    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(locator.get_service::<Lamp>().unwrap().is_none());
}

#[test]
fn test_descriptor_round_trips_through_json() {
    let descriptor = Descriptor::builder("app::Mailer")
        .to("app::Sender")
        .in_scope(scopes::SINGLETON)
        .named("primary")
        .ranked(3)
        .has("region", "eu")
        .build();
    let json = serde_json::to_string(&descriptor).unwrap();
    let back: Descriptor = serde_json::from_str(&json).unwrap();
    assert_eq!(back, descriptor);
}

#[test]
fn test_bound_descriptor_round_trips_through_lookup() {
    let descriptor = Descriptor::builder("app::Mailer")
        .to("app::Sender")
        .in_scope(scopes::SINGLETON)
        .named("primary")
        .qualified_by("app::Urgent")
        .ranked(3)
        .build();

    let locator = locator("round-trip");
    let mut config = locator.configuration().unwrap();
    config.bind(descriptor.clone()).unwrap();
    config.commit().unwrap();

    let found = locator
        .best_descriptor(&filter::contract_named("app::Sender", "primary"))
        .unwrap()
        .to_descriptor();
    assert!(found.service_id.is_some());
    assert_eq!(found.locator_id, Some(locator.id()));
    assert_eq!(found.advertised_contracts, descriptor.advertised_contracts);
    assert_eq!(found.scope, descriptor.scope);
    assert_eq!(found.qualifiers, descriptor.qualifiers);
    assert_eq!(found.without_ids(), descriptor.without_ids());
}

// =============================================================================
// Hooks
// =============================================================================

#[derive(Default)]
struct Recording {
    seen: Mutex<Vec<(ErrorType, String)>>,
}

impl Recording {
    fn types(&self) -> Vec<ErrorType> {
        self.seen.lock().iter().map(|(kind, _)| *kind).collect()
    }
}

impl ErrorService for Recording {
    fn on_failure(&self, info: &ErrorInformation) -> Result<(), BoxError> {
        let implementation = info.descriptor().map(|d| d.implementation.clone()).unwrap_or_default();
        self.seen.lock().push((info.error_type(), implementation));
        Ok(())
    }
}

fn recorded(locator: &ServiceLocator) -> Arc<Recording> {
    let recording = Arc::new(Recording::default());
    bind(
        locator,
        vec![AbstractActiveDescriptor::shared(recording.clone() as Arc<dyn ErrorService>)],
    );
    recording
}

#[test]
fn test_error_service_hears_creation_failures() {
    struct Broken;
    let broken = ServiceClass::builder::<Broken>()
        .inject_constructor(Vec::new(), |_| Err("boom".into()))
        .build();

    let locator = locator("errors");
    let recording = recorded(&locator);
    let mut config = locator.configuration().unwrap();
    config.add_class(broken).unwrap();
    config.commit().unwrap();

    assert!(locator.require_service::<Broken>().is_err());
    assert_eq!(recording.types(), vec![ErrorType::ServiceCreationFailure]);
}

#[test]
fn test_consumer_failure_reported_after_its_dependency() {
    struct Bad;
    struct Missing;
    #[derive(Debug)]
    struct Outer;
    let bad = ServiceClass::builder::<Bad>()
        .inject_constructor(Vec::new(), |_| Err("boom".into()))
        .build();
    let outer = ServiceClass::builder::<Outer>()
        .inject_constructor(vec![InjectionPoint::of::<Bad>(), InjectionPoint::of::<Missing>()], |_| {
            Ok(Outer)
        })
        .build();

    let locator = locator("errors-nested");
    let recording = recorded(&locator);
    let mut config = locator.configuration().unwrap();
    config.add_class(bad).unwrap();
    config.add_class(outer).unwrap();
    config.commit().unwrap();

    let error = locator.require_service::<Outer>().unwrap_err();
    assert_eq!(error.count(LocatorError::is_unsatisfied), 1);
    assert_eq!(
        *recording.seen.lock(),
        vec![
            (ErrorType::ServiceCreationFailure, std::any::type_name::<Bad>().to_string()),
            (ErrorType::ServiceCreationFailure, std::any::type_name::<Outer>().to_string()),
        ]
    );
}

struct Binder {
    locator: std::sync::Weak<ServiceLocator>,
}

impl JustInTimeInjectionResolver for Binder {
    fn just_in_time_resolution(&self, injectee: &Injectee) -> Result<bool, BoxError> {
        if injectee.required_type().name() != std::any::type_name::<dyn Greeter>() {
            return Ok(false);
        }
        let locator = self.locator.upgrade().ok_or("locator dropped")?;
        let mut config = locator.configuration()?;
        config.bind_active(greeter("just in time"))?;
        config.commit()?;
        Ok(true)
    }
}

#[test]
fn test_just_in_time_resolution() {
    let locator = locator("jit");
    let binder: Arc<dyn JustInTimeInjectionResolver> = Arc::new(Binder {
        locator: Arc::downgrade(&locator),
    });
    bind(&locator, vec![AbstractActiveDescriptor::shared(binder)]);

    let greeter = locator.require_service::<dyn Greeter>().unwrap();
    assert_eq!(greeter.greet(), "just in time");
}

struct HideRear;

impl Validator for HideRear {
    fn validate(&self, info: &ValidationInformation<'_>) -> Result<bool, BoxError> {
        Ok(info.operation() != Operation::Lookup || info.candidate().name() != Some("rear"))
    }
}

impl ValidationService for HideRear {
    fn lookup_filter(&self) -> &dyn keystone_core::Filter {
        &keystone_core::foundation::filter::AllFilter
    }

    fn validator(&self) -> &dyn Validator {
        self
    }
}

#[test]
fn test_validation_vetoes_lookups() {
    let locator = locator("validation");
    let service: Arc<dyn ValidationService> = Arc::new(HideRear);
    bind(
        &locator,
        vec![
            AbstractActiveDescriptor::shared(service),
            greeter("front").named("front"),
            greeter("rear").named("rear"),
        ],
    );

    assert_eq!(greetings(&locator), vec!["front"]);
    assert!(locator.get_named_service::<dyn Greeter>("rear").unwrap().is_none());
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_shutdown_destroys_and_disables() {
    #[derive(Debug)]
    struct Socket;
    let closed = Arc::new(AtomicUsize::new(0));
    let seen = closed.clone();
    let socket = ServiceClass::builder::<Socket>()
        .in_scope(scopes::SINGLETON)
        .default_constructor(|| Socket)
        .pre_destroy("close", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();

    let parent = locator("shutdown");
    let child = parent.create_child("shutdown-child").unwrap();
    let mut config = parent.configuration().unwrap();
    config.add_class(socket).unwrap();
    config.commit().unwrap();
    parent.require_service::<Socket>().unwrap();

    parent.shutdown();
    parent.shutdown();

    assert_eq!(closed.load(Ordering::SeqCst), 1);
    assert_eq!(parent.state(), LocatorState::Shutdown);
    assert!(child.is_shutdown());
    let error = parent.get_service::<Socket>().unwrap_err();
    assert!(error.any(|e| matches!(e, LocatorError::Shutdown(_))));
    assert!(parent.configuration().is_err());
}
