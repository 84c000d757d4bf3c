use std::rc::Rc;

use avbus_core::{
    shared, Clock, EventBus, Handler, ManualClock, ManualScheduler, PublishOptions, Scheduler, Shared,
    Subscription, Topic,
};

const ALTITUDE: Topic<f64> = Topic::new("altitude");
const GEAR: Topic<String> = Topic::new("gear");
const TICKS: Topic<i64> = Topic::new("ticks");

fn setup() -> (EventBus, Rc<ManualClock>) {
    let clock = Rc::new(ManualClock::new(0));
    (EventBus::with_clock(clock.clone()), clock)
}

#[test]
fn test_at_frequency_forwards_on_period_boundaries() {
    let (bus, clock) = setup();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let _sub = bus
        .subscriber()
        .on(&TICKS)
        .at_frequency(2.0, true)
        .handle(move |t: &i64| s.borrow_mut().push(*t));

    for t in [0, 100, 400, 600, 1000] {
        clock.set(t);
        bus.publish(&TICKS, t);
    }
    assert_eq!(*seen.borrow(), vec![0, 600, 1000]);
}

#[test]
fn test_at_frequency_driven_by_scheduler() {
    let scheduler = Rc::new(ManualScheduler::new());
    let bus = EventBus::with_clock(scheduler.clock());
    let seen = shared(Vec::new());
    let s = seen.clone();
    let _sub = bus
        .subscriber()
        .on(&TICKS)
        .at_frequency(10.0, true)
        .handle(move |t: &i64| s.borrow_mut().push(*t));

    // A 40 Hz producer
    fn produce(bus: EventBus, scheduler: Rc<ManualScheduler>, n: i64) {
        bus.publish(&TICKS, scheduler.clock().now_ms());
        if n > 0 {
            let next = scheduler.clone();
            scheduler.after(25, Box::new(move || produce(bus, next, n - 1)));
        }
    }
    produce(bus.clone(), scheduler.clone(), 12);
    scheduler.advance(300);

    assert_eq!(*seen.borrow(), vec![0, 100, 200, 300]);
}

#[test]
fn test_when_changed_delivers_repeated_value_once() {
    let (bus, _) = setup();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let _sub = bus
        .subscriber()
        .on(&GEAR)
        .when_changed()
        .handle(move |g: &String| s.borrow_mut().push(g.clone()));

    for _ in 0..5 {
        bus.publish(&GEAR, "down".to_string());
    }
    assert_eq!(*seen.borrow(), vec!["down".to_string()]);
}

#[test]
fn test_when_changed_by_threshold() {
    let (bus, _) = setup();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let _sub = bus
        .subscriber()
        .on(&ALTITUDE)
        .when_changed_by(5.0)
        .handle(move |a: &f64| s.borrow_mut().push(*a));

    for a in [0.0, 3.0, 6.0, 11.0] {
        bus.publish(&ALTITUDE, a);
    }
    assert_eq!(*seen.borrow(), vec![0.0, 6.0, 11.0]);
}

#[test]
fn test_only_after_keeps_periodic_windows() {
    let (bus, clock) = setup();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let _sub = bus
        .subscriber()
        .on(&TICKS)
        .only_after(100)
        .handle(move |t: &i64| s.borrow_mut().push(*t));

    for t in [50, 120, 190, 210, 330] {
        clock.set(t);
        bus.publish(&TICKS, t);
    }
    assert_eq!(*seen.borrow(), vec![120, 210, 330]);
}

#[test]
fn test_same_handler_twice_gives_independent_subscriptions() {
    let (bus, _) = setup();
    let count = shared(0);
    let c = count.clone();
    let handler = Handler::new(move |_: &f64| *c.borrow_mut() += 1);
    let consumer = bus.subscriber().on(&ALTITUDE).when_changed_by(1.0);

    let first = consumer.handle_with(&handler, false);
    let second = consumer.handle_with(&handler, false);
    assert_eq!(consumer.registration_count(), 2);

    bus.publish(&ALTITUDE, 100.0);
    assert_eq!(*count.borrow(), 2);

    first.destroy();
    assert!(second.is_alive());
    assert_eq!(consumer.registration_count(), 1);

    bus.publish(&ALTITUDE, 200.0);
    assert_eq!(*count.borrow(), 3);
}

#[test]
fn test_filter_state_is_not_shared_between_handles() {
    let (bus, _) = setup();
    let consumer = bus.subscriber().on(&ALTITUDE).when_changed();
    let a = shared(Vec::new());
    let b = shared(Vec::new());

    let sa = a.clone();
    let _first = consumer.handle(move |v: &f64| sa.borrow_mut().push(*v));
    bus.publish(&ALTITUDE, 1.0);

    let sb = b.clone();
    let _second = consumer.handle(move |v: &f64| sb.borrow_mut().push(*v));
    bus.publish(&ALTITUDE, 1.0);

    assert_eq!(*a.borrow(), vec![1.0]);
    assert_eq!(*b.borrow(), vec![1.0]);
}

#[test]
fn test_legacy_off_removes_oldest_registration() {
    let (bus, _) = setup();
    let count = shared(0);
    let c = count.clone();
    let handler = Handler::new(move |_: &f64| *c.borrow_mut() += 1);
    let consumer = bus.subscriber().on(&ALTITUDE);

    let first = consumer.handle_with(&handler, false);
    let second = consumer.handle_with(&handler, false);

    consumer.off(&handler);
    assert!(!first.is_alive());
    assert!(second.is_alive());

    consumer.off(&handler);
    assert!(!second.is_alive());
    assert_eq!(consumer.registration_count(), 0);
    assert_eq!(bus.topic_subscriber_count("altitude"), 0);

    // Nothing left to remove
    consumer.off(&handler);
    bus.publish(&ALTITUDE, 1.0);
    assert_eq!(*count.borrow(), 0);
}

#[test]
fn test_paused_consumer_resume_delivers_cached_value_once() {
    let (bus, _) = setup();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let sub = bus
        .subscriber()
        .on(&ALTITUDE)
        .when_changed()
        .handle_paused(move |a: &f64| s.borrow_mut().push(*a));

    bus.publish_with(&ALTITUDE, 500.0, PublishOptions::default().with_cache(true));
    bus.publish_with(&ALTITUDE, 600.0, PublishOptions::default().with_cache(true));
    assert!(seen.borrow().is_empty());
    assert!(sub.can_initial_notify());

    sub.resume(true);
    assert_eq!(*seen.borrow(), vec![600.0]);

    // Resumed value bypassed the chain, so the first live value still passes
    bus.publish(&ALTITUDE, 600.0);
    bus.publish(&ALTITUDE, 600.0);
    assert_eq!(*seen.borrow(), vec![600.0, 600.0]);
}

#[test]
fn test_resume_on_active_subscription_is_noop() {
    let (bus, _) = setup();
    bus.publish_with(&ALTITUDE, 1.0, PublishOptions::default().with_cache(true));
    let seen = shared(Vec::new());
    let s = seen.clone();
    let sub = bus
        .subscriber()
        .on(&ALTITUDE)
        .handle(move |a: &f64| s.borrow_mut().push(*a));

    sub.resume(true);
    assert_eq!(*seen.borrow(), vec![1.0]);
}

#[test]
fn test_destroyed_consumer_subscription_stays_destroyed() {
    let (bus, _) = setup();
    let count = shared(0);
    let c = count.clone();
    let consumer = bus.subscriber().on(&ALTITUDE).with_precision(0);
    let sub = consumer.handle(move |_: &f64| *c.borrow_mut() += 1);

    sub.destroy();
    sub.destroy();
    sub.resume(true);
    bus.publish(&ALTITUDE, 1.0);

    assert_eq!(*count.borrow(), 0);
    assert_eq!(consumer.registration_count(), 0);
}

#[test]
fn test_at_frequency_fractional_rate() {
    let (bus, clock) = setup();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let _sub = bus
        .subscriber()
        .on(&TICKS)
        .at_frequency(3.0, true)
        .handle(move |t: &i64| s.borrow_mut().push(*t));

    for t in [0, 300, 334, 600, 667, 1001] {
        clock.set(t);
        bus.publish(&TICKS, t);
    }
    assert_eq!(*seen.borrow(), vec![0, 334, 667, 1001]);
}

#[test]
fn test_at_frequency_with_very_high_rate() {
    let (bus, clock) = setup();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let _sub = bus
        .subscriber()
        .on(&TICKS)
        .at_frequency(1e300, true)
        .handle(move |t: &i64| s.borrow_mut().push(*t));

    for t in [0, 0, 3, 3, 10_000_000] {
        clock.set(t);
        bus.publish(&TICKS, t);
    }
    assert_eq!(*seen.borrow(), vec![0, 3, 10_000_000]);
}

#[test]
fn test_filtered_handler_republishing_on_its_own_topic() {
    let (bus, _) = setup();
    let seen = shared(Vec::new());
    let (s, b) = (seen.clone(), bus.clone());
    let _sub = bus
        .subscriber()
        .on(&ALTITUDE)
        .with_precision(0)
        .handle(move |a: &f64| {
            s.borrow_mut().push(*a);
            // Clamp to the service ceiling
            if *a > 40000.0 {
                b.publish(&ALTITUDE, 40000.0);
            }
        });

    bus.publish(&ALTITUDE, 41000.4);
    assert_eq!(*seen.borrow(), vec![41000.0, 40000.0]);
}

#[test]
fn test_handler_removed_during_initial_notify_leaves_no_registration() {
    let (bus, _) = setup();
    bus.publish_with(&ALTITUDE, 1200.0, PublishOptions::default().with_cache(true));
    let consumer = bus.subscriber().on(&ALTITUDE);
    let seen = shared(Vec::new());

    let slot: Shared<Option<Handler<f64>>> = shared(None);
    let (s, c, me) = (seen.clone(), consumer.clone(), slot.clone());
    let handler = Handler::new(move |a: &f64| {
        s.borrow_mut().push(*a);
        let current = me.borrow().clone();
        if let Some(h) = current {
            c.off(&h);
        }
    });
    *slot.borrow_mut() = Some(handler.clone());

    let sub = consumer.handle_with(&handler, false);
    assert_eq!(*seen.borrow(), vec![1200.0]);
    assert!(!sub.is_alive());
    assert_eq!(consumer.registration_count(), 0);
    assert_eq!(bus.topic_subscriber_count("altitude"), 0);

    bus.publish(&ALTITUDE, 1300.0);
    assert_eq!(*seen.borrow(), vec![1200.0]);
}
