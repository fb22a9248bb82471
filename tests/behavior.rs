use pushpull::{
    behavior::{at, Behavior},
    stream::Stream,
    SampleError,
};
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
fn of_and_from_fn_sample_without_observers() {
    assert_eq!(Behavior::of(7).at(), 7);
    let calls = Arc::new(RwLock::new(0));
    let b = Behavior::from_fn({
        let calls = calls.clone();
        move || {
            *calls.write().unwrap() += 1;
            "fresh"
        }
    });
    assert_eq!(b.at(), "fresh");
    assert_eq!(b.at(), "fresh");
    assert_eq!(*calls.read().unwrap(), 2);
}

#[test]
fn sink_behavior_holds_its_latest_value() {
    let (b, sink) = Behavior::sink(1);
    assert_eq!(b.at(), 1);
    sink.publish(2);
    assert_eq!(b.at(), 2);
    assert_eq!(at(&b), 2);
}

#[test]
fn subscribing_to_a_push_behavior_fires_the_current_value() {
    let (b, sink) = Behavior::sink("a");
    let (seen, push) = spy();
    let _sub = b.subscribe(push);
    sink.publish("b");
    assert_eq!(*seen.read().unwrap(), vec!["a", "b"]);
}

#[test]
fn map_over_a_push_parent_fires_the_mapped_current_value() {
    let (b, sink) = Behavior::sink("Hello".to_string());
    let lengths = b.map(|s: &String| s.len());
    let (seen, push) = spy();
    let _sub = lengths.subscribe(push);
    sink.publish("Hi".to_string());
    assert_eq!(*seen.read().unwrap(), vec![5, 2]);
    assert_eq!(lengths.at(), 2);
}

#[test]
fn map_over_a_pull_parent_samples_through() {
    let b = Behavior::from_fn(|| 10).map(|n| n + 1);
    assert_eq!(b.at(), 11);
}

#[test]
fn lift2_reevaluates_on_either_parent_push() {
    let (x, x_sink) = Behavior::sink(1);
    let (y, y_sink) = Behavior::sink(10);
    let sum = Behavior::lift2(|a, b| a + b, &x, &y);
    let (seen, push) = spy();
    let _sub = sum.subscribe(push);
    x_sink.publish(2);
    y_sink.publish(20);
    assert_eq!(*seen.read().unwrap(), vec![11, 12, 22]);
    assert_eq!(sum.at(), 22);
}

#[test]
fn lift3_combines_three_parents() {
    let (x, _) = Behavior::sink(1);
    let y = Behavior::of(2);
    let z = Behavior::from_fn(|| 3);
    let total = Behavior::lift3(|a, b, c| a + b + c, &x, &y, &z);
    assert_eq!(total.at(), 6);
}

#[test]
fn ap_applies_the_function_behavior() {
    let (n, n_sink) = Behavior::sink(4);
    let double = |x: &i32| x * 2;
    let (f, f_sink) = Behavior::sink(double as fn(&i32) -> i32);
    let applied = n.ap(&f);
    assert_eq!(applied.at(), 8);
    f_sink.publish((|x: &i32| x + 1) as fn(&i32) -> i32);
    assert_eq!(applied.at(), 5);
    n_sink.publish(10);
    assert_eq!(applied.at(), 11);
}

#[test]
fn stepper_snapshot_sees_the_pre_occurrence_value() {
    let (s, sink) = Stream::sink();
    let b = Behavior::stepper(0, &s);
    let snap = s.snapshot(&b);
    let (seen, push) = spy();
    let _sub = snap.subscribe(push);
    sink.push(1);
    sink.push(2);
    assert_eq!(*seen.read().unwrap(), vec![0, 1]);
}

#[test]
fn stepper_adopts_occurrences_between_ticks() {
    let (s, sink) = Stream::sink();
    let b = Behavior::stepper(0, &s);
    let _keepalive = b.subscribe(|_| {});
    assert_eq!(b.at(), 0);
    sink.push(5);
    assert_eq!(b.at(), 5);
    sink.push(6);
    sink.push(7);
    assert_eq!(b.at(), 7);
}

#[test]
fn scan_instances_accumulate_independently() {
    let (s, sink) = Stream::sink();
    let scanned = Behavior::scan(|n: &i32, acc: &i32| n + acc, 1, &s);
    let b1 = scanned.at();
    let (seen, push) = spy();
    let _sub = b1.subscribe(push);
    sink.push(2);
    let b2 = scanned.at();
    sink.push(4);
    assert_eq!(b1.at(), 7);
    assert_eq!(b2.at(), 5);
    assert_eq!(*seen.read().unwrap(), vec![1, 3, 7]);
}

#[test]
fn switcher_follows_each_selected_behavior() {
    let (stream, sink) = Stream::sink();
    let init = Behavior::of(1);
    let sw = Behavior::switcher(&init, &stream);
    let (seen, push) = spy();
    let _sub = sw.subscribe(push);
    let (inner, inner_sink) = Behavior::sink(2);
    sink.push(inner);
    inner_sink.publish(3);
    assert_eq!(*seen.read().unwrap(), vec![1, 2, 3]);
    assert_eq!(sw.at(), 3);
}

#[test]
fn switcher_detaches_from_the_previous_inner() {
    let (stream, sink) = Stream::sink();
    let (first, first_sink) = Behavior::sink(1);
    let sw = Behavior::switcher(&first, &stream);
    let (seen, push) = spy();
    let _sub = sw.subscribe(push);
    let (second, _second_sink) = Behavior::sink(10);
    sink.push(second);
    first_sink.publish(2);
    assert_eq!(*seen.read().unwrap(), vec![1, 10]);
}

#[test]
fn switch_to_switches_once_on_resolution() {
    let (future, resolver) = pushpull::future::Future::sink();
    let init = Behavior::of("before");
    let sw = Behavior::switch_to(&init, &future);
    let (seen, push) = spy();
    let _sub = sw.subscribe(push);
    let (after, after_sink) = Behavior::sink("after");
    resolver.resolve(after);
    after_sink.publish("later");
    assert_eq!(*seen.read().unwrap(), vec!["before", "after", "later"]);
}

#[test]
fn chain_reselects_on_outer_push_and_ignores_the_old_inner() {
    let (outer, outer_sink) = Behavior::sink(false);
    let (on_true, true_sink) = Behavior::sink(1);
    let (on_false, false_sink) = Behavior::sink(10);
    let chained = outer.chain(move |flag| {
        if *flag {
            on_true.clone()
        } else {
            on_false.clone()
        }
    });
    let (seen, push) = spy();
    let _sub = chained.subscribe(push);
    false_sink.publish(11);
    true_sink.publish(2);
    outer_sink.publish(true);
    true_sink.publish(3);
    false_sink.publish(12);
    assert_eq!(*seen.read().unwrap(), vec![10, 11, 2, 3]);
    assert_eq!(chained.at(), 3);
}

#[test]
fn moment_retargets_its_dependencies_each_run() {
    let (flag, flag_sink) = Behavior::sink(true);
    let (a, a_sink) = Behavior::sink(1);
    let (b, b_sink) = Behavior::sink(10);
    let m = {
        let flag = flag.clone();
        let a = a.clone();
        let b = b.clone();
        Behavior::moment(move |ctx| {
            if ctx.sample(&flag) {
                ctx.sample(&a)
            } else {
                ctx.sample(&b)
            }
        })
    };
    let (seen, push) = spy();
    let _sub = m.subscribe(push);
    a_sink.publish(2);
    b_sink.publish(20);
    flag_sink.publish(false);
    a_sink.publish(3);
    b_sink.publish(30);
    assert_eq!(*seen.read().unwrap(), vec![1, 2, 20, 30]);
}

#[test]
fn moment_samples_without_observers() {
    let a = Behavior::of(2);
    let b = Behavior::of(3);
    let m = Behavior::moment(move |ctx| ctx.sample(&a) * ctx.sample(&b));
    assert_eq!(m.at(), 6);
}

#[test]
fn integrate_starts_at_zero_and_grows_monotonically() {
    let b = Behavior::of(2.0);
    let area = b.integrate();
    assert_eq!(area.at(), 0.0);
    let first = area.at();
    let second = area.at();
    assert!(first <= second);
    let flat = Behavior::of(0.0).integrate();
    flat.at();
    assert_eq!(flat.at(), 0.0);
}

#[test]
fn producer_behavior_errors_before_its_first_push() {
    let b = Behavior::<i32>::producer(|_handle| Box::new(|| {}));
    let sub = b.subscribe(|_| {});
    assert_eq!(b.try_at(), Err(SampleError::NoValue));
    sub.deactivate();
}

#[test]
fn producer_behavior_pushes_while_active() {
    let handle_cell = Arc::new(RwLock::new(None));
    let b = Behavior::<i32>::producer({
        let handle_cell = handle_cell.clone();
        move |handle| {
            *handle_cell.write().unwrap() = Some(handle);
            Box::new(|| {})
        }
    });
    let (seen, push) = spy();
    let _sub = b.subscribe(push);
    let handle = handle_cell.read().unwrap().clone().unwrap();
    handle.push(1);
    handle.push(2);
    assert_eq!(*seen.read().unwrap(), vec![1, 2]);
    assert_eq!(b.at(), 2);
}
