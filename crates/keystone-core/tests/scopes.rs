//! Thread-bound and immediate scope tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use keystone_core::{
    ImmediateState, LocatorBuilder, ServiceClass, ServiceLocator, enable_immediate_scope,
    enable_inheritable_thread_scope, enable_per_thread_scope, filter, scopes, spawn_inheriting,
};

fn locator(name: &str) -> Arc<ServiceLocator> {
    LocatorBuilder::new(name).build().unwrap()
}

struct Session {
    id: usize,
}

fn bind_session(locator: &ServiceLocator, scope: &str) -> Arc<AtomicUsize> {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let session = ServiceClass::builder::<Session>()
        .in_scope(scope)
        .default_constructor(move || Session {
            id: counter.fetch_add(1, Ordering::SeqCst),
        })
        .build();
    let mut config = locator.configuration().unwrap();
    config.add_class(session).unwrap();
    config.commit().unwrap();
    created
}

#[test]
fn test_per_thread_instance_per_thread() {
    let locator = locator("per-thread");
    enable_per_thread_scope(&locator).unwrap();
    let created = bind_session(&locator, scopes::PER_THREAD);

    let here = locator.require_service::<Session>().unwrap();
    let again = locator.require_service::<Session>().unwrap();
    assert!(Arc::ptr_eq(&here, &again));

    let remote = locator.clone();
    let there = thread::spawn(move || remote.require_service::<Session>().unwrap().id)
        .join()
        .unwrap();
    assert_ne!(there, here.id);
    assert_eq!(created.load(Ordering::SeqCst), 2);
}

fn bind_closing_session(locator: &ServiceLocator) -> Arc<AtomicUsize> {
    let closed = Arc::new(AtomicUsize::new(0));
    let seen = closed.clone();
    let session = ServiceClass::builder::<Session>()
        .in_scope(scopes::PER_THREAD)
        .default_constructor(|| Session { id: 0 })
        .pre_destroy("close", move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();
    let mut config = locator.configuration().unwrap();
    config.add_class(session).unwrap();
    config.commit().unwrap();
    closed
}

#[test]
fn test_per_thread_services_released_when_thread_exits() {
    let locator = locator("per-thread-exit");
    let context = enable_per_thread_scope(&locator).unwrap();
    let closed = bind_closing_session(&locator);

    let remote = locator.clone();
    thread::spawn(move || {
        remote.require_service::<Session>().unwrap();
    })
    .join()
    .unwrap();

    assert!(context.is_empty());
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_handle_destroy_keeps_other_threads_instances() {
    let locator = locator("per-thread-handle");
    let context = enable_per_thread_scope(&locator).unwrap();
    let closed = bind_closing_session(&locator);
    let barrier = Arc::new(Barrier::new(2));

    let (remote, gate) = (locator.clone(), barrier.clone());
    let worker = thread::spawn(move || {
        let mine = remote.require_service::<Session>().unwrap();
        gate.wait();
        gate.wait();
        // Still the same instance after the other thread's destroy.
        Arc::ptr_eq(&mine, &remote.require_service::<Session>().unwrap())
    });

    let handle = locator.service_handle::<Session>(&[]).unwrap().unwrap();
    handle.service().unwrap();
    barrier.wait();
    assert_eq!(context.len(), 2);

    handle.destroy();
    assert_eq!(context.len(), 1);
    assert_eq!(closed.load(Ordering::SeqCst), 1);

    barrier.wait();
    assert!(worker.join().unwrap());
    assert!(context.is_empty());
    assert_eq!(closed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_enable_scope_is_idempotent() {
    let locator = locator("enable-twice");
    let first = enable_per_thread_scope(&locator).unwrap();
    let second = enable_per_thread_scope(&locator).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(locator.descriptors(&filter::named(scopes::PER_THREAD)).len(), 1);
}

#[test]
fn test_inheritable_thread_scope_follows_spawns() {
    let locator = locator("inheritable");
    enable_inheritable_thread_scope(&locator).unwrap();
    bind_session(&locator, scopes::INHERITABLE_THREAD);

    let parent = locator.require_service::<Session>().unwrap();

    let inheriting = locator.clone();
    let inherited = spawn_inheriting(move || inheriting.require_service::<Session>().unwrap().id)
        .join()
        .unwrap();
    assert_eq!(inherited, parent.id);

    let unrelated = locator.clone();
    let fresh = thread::spawn(move || unrelated.require_service::<Session>().unwrap().id)
        .join()
        .unwrap();
    assert_ne!(fresh, parent.id);
}

#[test]
fn test_thread_scope_is_proxied_into_singletons() {
    struct Gateway {
        session: Arc<Session>,
    }

    let locator = locator("proxied");
    enable_per_thread_scope(&locator).unwrap();
    bind_session(&locator, scopes::PER_THREAD);
    let gateway = ServiceClass::builder::<Gateway>()
        .in_scope(scopes::SINGLETON)
        .inject_constructor(vec![keystone_core::InjectionPoint::of::<Session>()], |args| {
            Ok(Gateway {
                session: args.get::<Session>(0)?,
            })
        })
        .build();
    let mut config = locator.configuration().unwrap();
    config.add_class(gateway).unwrap();
    config.commit().unwrap();

    let gateway = locator.require_service::<Gateway>().unwrap();
    let session = locator.require_service::<Session>().unwrap();
    assert_eq!(gateway.session.id, session.id);
}

#[test]
fn test_immediate_services_follow_configuration() {
    struct Warmup;

    let locator = locator("immediate");
    let controller = enable_immediate_scope(&locator).unwrap();
    controller.set_thread_inactivity_timeout(Duration::from_millis(200));

    let started = Arc::new(AtomicUsize::new(0));
    let stopped = Arc::new(AtomicUsize::new(0));
    let (on_start, on_stop) = (started.clone(), stopped.clone());
    let warmup = ServiceClass::builder::<Warmup>()
        .in_scope(scopes::IMMEDIATE)
        .default_constructor(|| Warmup)
        .post_construct("start", move |_| {
            on_start.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .pre_destroy("stop", move |_| {
            on_stop.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .build();

    let mut config = locator.configuration().unwrap();
    config.add_class(warmup).unwrap();
    config.commit().unwrap();

    // Created without anyone looking it up.
    assert!(controller.wait_until_idle(Duration::from_secs(5)));
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(controller.context().len(), 1);

    let mut config = locator.configuration().unwrap();
    config.add_unbind_filter(filter::contract_of::<Warmup>()).unwrap();
    config.commit().unwrap();

    assert!(controller.wait_until_idle(Duration::from_secs(5)));
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert!(controller.context().is_empty());
}

#[test]
fn test_suspended_immediate_scope_waits_for_resume() {
    struct Beacon;

    let locator = locator("immediate-suspended");
    let controller = enable_immediate_scope(&locator).unwrap();
    controller.set_thread_inactivity_timeout(Duration::from_millis(200));
    assert!(controller.wait_until_idle(Duration::from_secs(5)));
    controller.set_state(ImmediateState::Suspended);

    let beacon = ServiceClass::builder::<Beacon>()
        .in_scope(scopes::IMMEDIATE)
        .default_constructor(|| Beacon)
        .build();
    let mut config = locator.configuration().unwrap();
    config.add_class(beacon).unwrap();
    config.commit().unwrap();
    assert!(controller.wait_until_idle(Duration::from_secs(5)));
    assert!(controller.context().is_empty());

    controller.set_state(ImmediateState::Running);
    assert!(controller.wait_until_idle(Duration::from_secs(5)));
    assert_eq!(controller.context().len(), 1);
}
