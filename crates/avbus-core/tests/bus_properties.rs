use std::cell::RefCell;
use std::rc::Rc;

use avbus_core::{
    shared, EventBus, HandlerSubscription, ManualClock, PublishOptions, Subject, Subscription,
    Topic,
};

const HEADING: Topic<i32> = Topic::new("heading");

fn bus() -> EventBus {
    EventBus::with_clock(Rc::new(ManualClock::new(0)))
}

#[test]
fn test_faulting_handler_does_not_stop_dispatch() {
    let bus = bus();
    let seen = shared(Vec::new());

    let s = seen.clone();
    let _h1 = bus.on(&HEADING, move |v: &i32| s.borrow_mut().push(("h1", *v)));
    let _h2 = bus.on(&HEADING, |_: &i32| panic!("instrument failed"));
    let s = seen.clone();
    let _h3 = bus.on(&HEADING, move |v: &i32| s.borrow_mut().push(("h3", *v)));

    bus.publish(&HEADING, 90);
    bus.publish(&HEADING, 180);

    assert_eq!(
        *seen.borrow(),
        vec![("h1", 90), ("h3", 90), ("h1", 180), ("h3", 180)]
    );
}

#[test]
fn test_delivery_follows_subscription_order() {
    let bus = bus();
    let order = shared(Vec::new());
    let subs: Vec<_> = (0..5)
        .map(|i| {
            let order = order.clone();
            bus.on(&HEADING, move |_: &i32| order.borrow_mut().push(i))
        })
        .collect();

    bus.publish(&HEADING, 1);
    assert_eq!(*order.borrow(), vec![0, 1, 2, 3, 4]);

    // Removing one keeps the relative order of the rest
    subs[2].destroy();
    order.borrow_mut().clear();
    bus.publish(&HEADING, 2);
    assert_eq!(*order.borrow(), vec![0, 1, 3, 4]);
}

#[test]
fn test_subscribe_during_dispatch_waits_for_next_publish() {
    let bus = bus();
    let late = shared(Vec::new());
    let added = shared(false);

    let inner_bus = bus.clone();
    let l = late.clone();
    let a = added.clone();
    let keep: Rc<RefCell<Vec<HandlerSubscription<dyn std::any::Any>>>> = shared(Vec::new());
    let k = keep.clone();
    let _adder = bus.on(&HEADING, move |_: &i32| {
        if !*a.borrow() {
            *a.borrow_mut() = true;
            let l = l.clone();
            k.borrow_mut()
                .push(inner_bus.on(&HEADING, move |v: &i32| l.borrow_mut().push(*v)));
        }
    });

    bus.publish(&HEADING, 1);
    assert!(late.borrow().is_empty());
    bus.publish(&HEADING, 2);
    assert_eq!(*late.borrow(), vec![2]);
}

#[test]
fn test_unsubscribe_during_dispatch_skips_removed_handler() {
    let bus = bus();
    let seen = shared(Vec::new());
    let victim: Rc<RefCell<Option<HandlerSubscription<dyn std::any::Any>>>> = shared(None);

    let v = victim.clone();
    let _killer = bus.on(&HEADING, move |_: &i32| {
        if let Some(sub) = v.borrow().as_ref() {
            sub.destroy();
        }
    });
    let s = seen.clone();
    *victim.borrow_mut() = Some(bus.on(&HEADING, move |v: &i32| s.borrow_mut().push(*v)));

    bus.publish(&HEADING, 1);
    assert!(seen.borrow().is_empty());
    assert_eq!(bus.topic_subscriber_count("heading"), 1);
}

#[test]
fn test_paused_subscription_then_resume_with_cached_value() {
    let bus = bus();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let sub = bus.on(&HEADING, move |v: &i32| s.borrow_mut().push(*v));

    sub.pause();
    bus.publish_with(&HEADING, 10, PublishOptions::default().with_cache(true));
    bus.publish_with(&HEADING, 20, PublishOptions::default().with_cache(true));
    assert!(seen.borrow().is_empty());

    sub.resume(true);
    assert_eq!(*seen.borrow(), vec![20]);

    bus.publish(&HEADING, 30);
    assert_eq!(*seen.borrow(), vec![20, 30]);
}

#[test]
fn test_resume_without_cache_delivers_nothing() {
    let bus = bus();
    let seen = shared(Vec::new());
    let s = seen.clone();
    let sub = bus.on_paused(&HEADING, move |v: &i32| s.borrow_mut().push(*v));
    assert!(!sub.can_initial_notify());

    sub.resume(true);
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_double_destroy_matches_single_destroy() {
    let bus = bus();
    let count = shared(0);

    let c = count.clone();
    let once = bus.on(&HEADING, move |_: &i32| *c.borrow_mut() += 1);
    let c = count.clone();
    let twice = bus.on(&HEADING, move |_: &i32| *c.borrow_mut() += 10);
    let c = count.clone();
    let _keeper = bus.on(&HEADING, move |_: &i32| *c.borrow_mut() += 100);

    once.destroy();
    twice.destroy();
    twice.destroy();
    bus.off(&twice);

    bus.publish(&HEADING, 0);
    assert_eq!(*count.borrow(), 100);
    assert_eq!(bus.topic_subscriber_count("heading"), 1);
    assert!(!once.is_alive() && !twice.is_alive());
}

#[test]
fn test_independent_buses_do_not_interact() {
    let a = bus();
    let b = bus();
    let seen = shared(0);
    let s = seen.clone();
    let _sub = b.on(&HEADING, move |_: &i32| *s.borrow_mut() += 1);

    a.publish_with(&HEADING, 1, PublishOptions::default().with_sync(true).with_cache(true));
    assert_eq!(*seen.borrow(), 0);
    assert!(b.cached(&HEADING).is_none());
}

#[test]
fn test_handler_republishing_on_its_own_topic() {
    let bus = bus();
    let normalized = shared(Vec::new());
    let displayed = shared(Vec::new());

    let (b, n) = (bus.clone(), normalized.clone());
    let _normalize = bus.on(&HEADING, move |v: &i32| {
        n.borrow_mut().push(*v);
        if *v >= 360 {
            b.publish(&HEADING, v - 360);
        }
    });
    let d = displayed.clone();
    let _display = bus.on(&HEADING, move |v: &i32| d.borrow_mut().push(*v));

    bus.publish(&HEADING, 370);

    // The nested publish completes before the outer pass reaches the display
    assert_eq!(*normalized.borrow(), vec![370, 10]);
    assert_eq!(*displayed.borrow(), vec![10, 370]);
}

#[test]
fn test_subject_setter_reentering_its_own_subscriber() {
    let heading = Subject::create(0);
    let seen = shared(Vec::new());

    let (s, h) = (seen.clone(), heading.clone());
    let _sub = heading.sub(
        move |v: &i32| {
            s.borrow_mut().push(*v);
            if *v >= 360 {
                h.set(v - 360);
            }
        },
        false,
    );

    heading.set(400);
    assert_eq!(*seen.borrow(), vec![400, 40]);
    assert_eq!(heading.get(), 40);
}
