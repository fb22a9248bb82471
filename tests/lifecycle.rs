use pushpull::{behavior::Behavior, stream::Stream};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Counters {
    activated: RwLock<u32>,
    deactivated: RwLock<u32>,
}

fn counting_producer() -> (Stream<i32>, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let stream = Stream::producer({
        let counters = counters.clone();
        move |_handle| {
            *counters.activated.write().unwrap() += 1;
            let counters = counters.clone();
            Box::new(move || *counters.deactivated.write().unwrap() += 1)
        }
    });
    (stream, counters)
}

#[test]
fn producer_activates_on_first_listener_and_deactivates_on_last() {
    let (stream, counters) = counting_producer();
    assert_eq!(*counters.activated.read().unwrap(), 0);

    let first = stream.subscribe(|_| {});
    let second = stream.subscribe(|_| {});
    assert_eq!(*counters.activated.read().unwrap(), 1);
    assert_eq!(*counters.deactivated.read().unwrap(), 0);

    first.deactivate();
    assert_eq!(*counters.deactivated.read().unwrap(), 0);
    second.deactivate();
    assert_eq!(*counters.deactivated.read().unwrap(), 1);
}

#[test]
fn reactivation_invokes_the_producer_again() {
    let (stream, counters) = counting_producer();
    stream.subscribe(|_| {}).deactivate();
    stream.subscribe(|_| {}).deactivate();
    assert_eq!(*counters.activated.read().unwrap(), 2);
    assert_eq!(*counters.deactivated.read().unwrap(), 2);
}

#[test]
fn unsubscribing_a_derived_chain_cascades_to_the_root() {
    let (stream, counters) = counting_producer();
    let derived = stream.map(|x: &i32| x + 1).filter(|x| x % 2 == 0);
    let sub = derived.subscribe(|_| {});
    assert_eq!(*counters.activated.read().unwrap(), 1);
    sub.deactivate();
    assert_eq!(*counters.deactivated.read().unwrap(), 1);
}

#[test]
fn behavior_producer_releases_its_source_when_idle() {
    let counters = Arc::new(Counters::default());
    let behavior = Behavior::<i32>::producer({
        let counters = counters.clone();
        move |_handle| {
            *counters.activated.write().unwrap() += 1;
            let counters = counters.clone();
            Box::new(move || *counters.deactivated.write().unwrap() += 1)
        }
    });
    let mapped = behavior.map(|x| x * 2);
    let sub = mapped.subscribe(|_| {});
    assert_eq!(*counters.activated.read().unwrap(), 1);
    sub.deactivate();
    assert_eq!(*counters.deactivated.read().unwrap(), 1);
}

#[test]
fn observer_mode_hooks_fire_on_push_pull_transitions() {
    let (stream, sink) = Stream::sink();
    let init = Behavior::of(1);
    let switcher = Behavior::switcher(&init, &stream);

    let log = Arc::new(RwLock::new(Vec::new()));
    let _sub = switcher.observe(
        {
            let log = log.clone();
            move |v: &i32| log.write().unwrap().push(format!("push {v}"))
        },
        {
            let log = log.clone();
            move || log.write().unwrap().push("begin pull".to_string())
        },
        {
            let log = log.clone();
            move || log.write().unwrap().push("end pull".to_string())
        },
    );
    assert_eq!(*log.read().unwrap(), vec!["begin pull"]);

    let (inner, _inner_sink) = Behavior::sink(2);
    sink.push(inner);
    assert_eq!(
        *log.read().unwrap(),
        vec!["begin pull", "push 2", "end pull"]
    );

    sink.push(Behavior::of(3));
    let log = log.read().unwrap();
    assert_eq!(log[3], "push 3");
    assert_eq!(log[4], "begin pull");
}
