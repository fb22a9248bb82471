use pushpull::{behavior::Behavior, future::Future, stream::Stream};
use std::sync::{Arc, RwLock};

fn spy<T: Clone + Send + Sync + 'static>() -> (Arc<RwLock<Vec<T>>>, impl Fn(&T) + Send + Sync) {
    let seen = Arc::new(RwLock::new(Vec::new()));
    let push = {
        let seen = seen.clone();
        move |v: &T| seen.write().unwrap().push(v.clone())
    };
    (seen, push)
}

#[test]
fn of_fires_new_listeners_immediately() {
    let f = Future::of(5);
    let (seen, push) = spy();
    let _sub = f.subscribe(push);
    assert_eq!(*seen.read().unwrap(), vec![5]);
}

#[test]
fn never_stays_silent() {
    let f = Future::<i32>::never();
    let (seen, push) = spy();
    let _sub = f.subscribe(push);
    assert!(seen.read().unwrap().is_empty());
}

#[test]
fn resolve_fires_once_and_is_terminal() {
    let (f, resolver) = Future::sink();
    let (seen, push) = spy();
    let _sub = f.subscribe(push);
    resolver.resolve(1);
    resolver.resolve(2);
    assert_eq!(*seen.read().unwrap(), vec![1]);

    // A listener arriving after resolution replays the stored value.
    let (late, late_push) = spy();
    let _late_sub = f.subscribe(late_push);
    assert_eq!(*late.read().unwrap(), vec![1]);
}

#[test]
fn combine_resolves_with_the_earliest() {
    let (f1, r1) = Future::sink();
    let (f2, r2) = Future::sink();
    let combined = f1.combine(&f2);
    let (seen, push) = spy();
    let _sub = combined.subscribe(push);
    r2.resolve("b");
    r1.resolve("a");
    assert_eq!(*seen.read().unwrap(), vec!["b"]);
}

#[test]
fn combine_replays_when_a_parent_is_already_done() {
    let (f1, _r1) = Future::<&str>::sink();
    let combined = f1.combine(&Future::of("done"));
    let (seen, push) = spy();
    let _sub = combined.subscribe(push);
    assert_eq!(*seen.read().unwrap(), vec!["done"]);
}

#[test]
fn map_transforms_the_resolution() {
    let (f, resolver) = Future::sink();
    let (seen, push) = spy();
    let _sub = f.map(|n: &i32| n * 10).subscribe(push);
    resolver.resolve(4);
    assert_eq!(*seen.read().unwrap(), vec![40]);
}

#[test]
fn map_to_replaces_the_resolution() {
    let f = Future::of(1).map_to("ready");
    let (seen, push) = spy();
    let _sub = f.subscribe(push);
    assert_eq!(*seen.read().unwrap(), vec!["ready"]);
}

#[test]
fn lift2_waits_for_both_resolutions() {
    let (x, rx) = Future::sink();
    let (y, ry) = Future::sink();
    let both = Future::lift2(|a: &i32, b: &i32| a + b, &x, &y);
    let (seen, push) = spy();
    let _sub = both.subscribe(push);
    ry.resolve(10);
    assert!(seen.read().unwrap().is_empty());
    rx.resolve(1);
    assert_eq!(*seen.read().unwrap(), vec![11]);
}

#[test]
fn lift3_combines_three_resolutions() {
    let both = Future::lift3(
        |a: &i32, b: &i32, c: &i32| a + b + c,
        &Future::of(1),
        &Future::of(2),
        &Future::of(3),
    );
    let (seen, push) = spy();
    let _sub = both.subscribe(push);
    assert_eq!(*seen.read().unwrap(), vec![6]);
}

#[test]
fn flat_map_resolves_through_the_derived_future() {
    let (outer, resolve_outer) = Future::sink();
    let (inner, resolve_inner) = Future::sink();
    let chained = outer.flat_map(move |prefix: &String| {
        let prefix = prefix.clone();
        inner.map(move |suffix: &String| format!("{prefix}{suffix}"))
    });
    let (seen, push) = spy();
    let _sub = chained.subscribe(push);
    resolve_outer.resolve("a".to_string());
    assert!(seen.read().unwrap().is_empty());
    resolve_inner.resolve("b".to_string());
    assert_eq!(*seen.read().unwrap(), vec!["ab".to_string()]);
}

#[test]
fn next_occurrence_resolves_strictly_after_the_sample() {
    let (s, sink) = Stream::sink();
    let next = Future::next_occurrence(&s);
    let first = next.at();
    let (seen1, push1) = spy();
    let _sub1 = first.subscribe(push1);
    sink.push(7);
    assert_eq!(*seen1.read().unwrap(), vec![7]);

    let second = next.at();
    let (seen2, push2) = spy();
    let _sub2 = second.subscribe(push2);
    sink.push(8);
    // The first future already resolved; only the second sees the new push.
    assert_eq!(*seen1.read().unwrap(), vec![7]);
    assert_eq!(*seen2.read().unwrap(), vec![8]);
}

#[test]
fn switch_to_with_an_already_done_future_switches_at_subscribe() {
    let target = Behavior::of(2);
    let sw = Behavior::switch_to(&Behavior::of(1), &Future::of(target));
    assert_eq!(sw.at(), 1);
    let (seen, push) = spy();
    let _sub = sw.subscribe(push);
    assert_eq!(sw.at(), 2);
    assert_eq!(*seen.read().unwrap(), vec![2]);
}

#[tokio::test]
async fn streams_bridge_into_async_streams() {
    use futures::StreamExt;
    let (s, sink) = Stream::sink();
    let (mut rx, sub) = s.to_async();
    sink.push(1);
    sink.push(2);
    assert_eq!(rx.next().await, Some(1));
    assert_eq!(rx.next().await, Some(2));
    sub.deactivate();
    assert_eq!(rx.next().await, None);
}

#[tokio::test]
async fn from_future_resolves_through_the_executor() {
    _ = any_spawner::Executor::init_tokio();
    let f = Future::from_future(async { 5 });
    let (seen, push) = spy();
    let _sub = f.subscribe(push);
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(*seen.read().unwrap(), vec![5]);
}
