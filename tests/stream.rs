use pushpull::{behavior::Behavior, stream::Stream};
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
fn sink_map_subscribe() {
    let (s, sink) = Stream::sink();
    let doubled = s.map(|x: &i32| x * 2);
    let (seen, push) = spy();
    let _sub = doubled.subscribe(push);
    sink.push(3);
    sink.push(5);
    assert_eq!(*seen.read().unwrap(), vec![6, 10]);
}

#[test]
fn map_identity_and_composition_are_observably_equal() {
    let (s, sink) = Stream::sink();
    let (direct, push_direct) = spy();
    let (via_id, push_id) = spy();
    let (composed, push_composed) = spy();
    let (nested, push_nested) = spy();

    let _a = s.subscribe(push_direct);
    let _b = s.map(|x: &i32| *x).subscribe(push_id);
    let _c = s.map(|x: &i32| (x + 1) * 3).subscribe(push_composed);
    let _d = s.map(|x: &i32| x + 1).map(|x| x * 3).subscribe(push_nested);

    for v in [1, 2, 7] {
        sink.push(v);
    }
    assert_eq!(*direct.read().unwrap(), *via_id.read().unwrap());
    assert_eq!(*composed.read().unwrap(), *nested.read().unwrap());
}

#[test]
fn filter_keeps_matching_occurrences() {
    let (s, sink) = Stream::sink();
    let (seen, push) = spy();
    let _sub = s.filter(|x: &i32| x % 2 == 0).subscribe(push);
    for v in 1..=6 {
        sink.push(v);
    }
    assert_eq!(*seen.read().unwrap(), vec![2, 4, 6]);
}

#[test]
fn map_to_replaces_values() {
    let (s, sink) = Stream::sink();
    let (seen, push) = spy();
    let _sub = s.map_to("tick").subscribe(push);
    sink.push(1);
    sink.push(2);
    assert_eq!(*seen.read().unwrap(), vec!["tick", "tick"]);
}

#[test]
fn scan_s_emits_each_intermediate_accumulator() {
    let (s, sink) = Stream::sink();
    let (seen, push) = spy();
    let _sub = s.scan_s(|n: &i32, acc| acc + n, 0).subscribe(push);
    sink.push(1);
    sink.push(2);
    sink.push(3);
    assert_eq!(*seen.read().unwrap(), vec![1, 3, 6]);
}

#[test]
fn merge_interleaves_in_push_order() {
    let (a, sink_a) = Stream::sink();
    let (b, sink_b) = Stream::sink();
    let (seen, push) = spy();
    let _sub = a.merge(&b).subscribe(push);
    sink_a.push(1);
    sink_b.push(2);
    sink_a.push(3);
    assert_eq!(*seen.read().unwrap(), vec![1, 2, 3]);
}

#[test]
fn combine_passes_any_parent_through() {
    let (a, sink_a) = Stream::sink();
    let (b, sink_b) = Stream::sink();
    let (c, sink_c) = Stream::sink();
    let (seen, push) = spy();
    let _sub = Stream::combine([a, b, c]).subscribe(push);
    sink_b.push("b");
    sink_c.push("c");
    sink_a.push("a");
    assert_eq!(*seen.read().unwrap(), vec!["b", "c", "a"]);
}

#[test]
fn split_partitions_by_predicate() {
    let (s, sink) = Stream::sink();
    let (evens, push_evens) = spy();
    let (odds, push_odds) = spy();
    let (even, odd) = s.split(|x: &i32| x % 2 == 0);
    let _a = even.subscribe(push_evens);
    let _b = odd.subscribe(push_odds);
    for v in 1..=5 {
        sink.push(v);
    }
    assert_eq!(*evens.read().unwrap(), vec![2, 4]);
    assert_eq!(*odds.read().unwrap(), vec![1, 3, 5]);
}

#[test]
fn snapshot_of_empty_stream_never_fires() {
    let behavior = Behavior::of(42);
    let empty = Stream::<i32>::empty();
    let (seen, push) = spy::<i32>();
    let _sub = empty.snapshot(&behavior).subscribe(push);
    assert!(seen.read().unwrap().is_empty());
}

#[test]
fn snapshot_reads_the_behavior_not_the_occurrence() {
    let (s, sink) = Stream::sink();
    let (b, b_sink) = Behavior::sink(10);
    let (seen, push) = spy();
    let _sub = s.snapshot(&b).subscribe(push);
    sink.push(1);
    b_sink.publish(20);
    sink.push(2);
    assert_eq!(*seen.read().unwrap(), vec![10, 20]);
}

#[test]
fn snapshot_with_combines_occurrence_and_behavior() {
    let (s, sink) = Stream::sink();
    let (b, b_sink) = Behavior::sink(10);
    let (seen, push) = spy();
    let _sub = s.snapshot_with(|a: &i32, b: &i32| a + b, &b).subscribe(push);
    sink.push(1);
    b_sink.publish(100);
    sink.push(2);
    assert_eq!(*seen.read().unwrap(), vec![11, 102]);
}

#[test]
fn keep_when_gates_on_the_behavior() {
    let (s, sink) = Stream::sink();
    let (gate, gate_sink) = Behavior::sink(true);
    let (seen, push) = spy();
    let _sub = s.keep_when(&gate).subscribe(push);
    sink.push(1);
    gate_sink.publish(false);
    sink.push(2);
    gate_sink.publish(true);
    sink.push(3);
    assert_eq!(*seen.read().unwrap(), vec![1, 3]);
}

#[test]
fn filter_apply_samples_the_predicate_behavior() {
    let (s, sink) = Stream::sink();
    let below = |limit: i32| move |x: &i32| *x < limit;
    let (pred, pred_sink) = Behavior::sink(below(10));
    let (seen, push) = spy();
    let _sub = s.filter_apply(&pred).subscribe(push);
    sink.push(5);
    sink.push(15);
    pred_sink.publish(below(100));
    sink.push(15);
    assert_eq!(*seen.read().unwrap(), vec![5, 15]);
}

#[test]
fn switch_stream_follows_the_selected_inner_stream() {
    let (first, first_sink) = Stream::sink();
    let (second, second_sink) = Stream::sink();
    let (selector, select) = Behavior::sink(first);
    let (seen, push) = spy();
    let _sub = Stream::switch(&selector).subscribe(push);
    first_sink.push(1);
    second_sink.push(100);
    select.publish(second);
    first_sink.push(2);
    second_sink.push(200);
    assert_eq!(*seen.read().unwrap(), vec![1, 200]);
}

#[test]
fn listener_added_during_a_tick_only_sees_later_ticks() {
    let (s, sink) = Stream::sink();
    let late_seen: Arc<RwLock<Vec<i32>>> = Arc::new(RwLock::new(Vec::new()));
    let registered = Arc::new(RwLock::new(false));

    let _sub = s.subscribe({
        let s = s.clone();
        let late_seen = late_seen.clone();
        let registered = registered.clone();
        move |_| {
            let mut registered = registered.write().unwrap();
            if !*registered {
                *registered = true;
                let late_seen = late_seen.clone();
                // Dropping the handle keeps the subscription alive.
                let _ = s.subscribe(move |v| late_seen.write().unwrap().push(*v));
            }
        }
    });

    sink.push(1);
    sink.push(2);
    assert_eq!(*late_seen.read().unwrap(), vec![2]);
}

#[test]
fn deactivated_subscription_stops_receiving() {
    let (s, sink) = Stream::sink();
    let (seen, push) = spy();
    let sub = s.subscribe(push);
    sink.push(1);
    sub.deactivate();
    sink.push(2);
    assert_eq!(*seen.read().unwrap(), vec![1]);
}
