use pushpull::{
    behavior::Behavior,
    placeholder::{BehaviorPlaceholder, StreamPlaceholder},
    stream::Stream,
    ReplaceError, SampleError,
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
fn replacing_a_behavior_placeholder_replays_through_combinators() {
    let placeholder = BehaviorPlaceholder::new();
    let lengths = placeholder.behavior().map(|s: &String| s.len());
    let (seen, push) = spy();
    let _sub = lengths.subscribe(push);
    assert!(seen.read().unwrap().is_empty());

    let (source, _sink) = Behavior::sink("Hello".to_string());
    placeholder.replace_with(&source);
    assert_eq!(*seen.read().unwrap(), vec![5]);
    assert_eq!(lengths.at(), 5);
}

#[test]
fn sampling_an_unreplaced_behavior_placeholder_is_an_error() {
    let placeholder = BehaviorPlaceholder::<i32>::new();
    assert_eq!(
        placeholder.behavior().try_at(),
        Err(SampleError::PlaceholderNotReplaced)
    );
}

#[test]
fn double_replacement_is_an_error() {
    let placeholder = StreamPlaceholder::<i32>::new();
    let (first, _) = Stream::sink();
    let (second, _) = Stream::sink();
    assert_eq!(placeholder.try_replace_with(&first), Ok(()));
    assert_eq!(
        placeholder.try_replace_with(&second),
        Err(ReplaceError::AlreadyReplaced)
    );
}

#[test]
fn combinators_over_a_placeholder_match_the_direct_wiring() {
    let (source, sink) = Stream::sink();

    let placeholder = StreamPlaceholder::new();
    let (via_placeholder, push_ph) = spy();
    let _a = placeholder.stream().map(|x: &i32| x * 2).subscribe(push_ph);
    placeholder.replace_with(&source);

    let (direct, push_direct) = spy();
    let _b = source.map(|x: &i32| x * 2).subscribe(push_direct);

    for v in [1, 2, 3] {
        sink.push(v);
    }
    assert_eq!(*via_placeholder.read().unwrap(), *direct.read().unwrap());
    assert_eq!(*via_placeholder.read().unwrap(), vec![2, 4, 6]);
}

#[test]
fn replacement_before_any_listener_also_wires_up() {
    let placeholder = StreamPlaceholder::new();
    let (source, sink) = Stream::sink();
    placeholder.replace_with(&source);
    let (seen, push) = spy();
    let _sub = placeholder.stream().subscribe(push);
    sink.push(9);
    assert_eq!(*seen.read().unwrap(), vec![9]);
}

#[test]
fn stream_placeholder_closes_a_feedback_cycle() {
    // A counter defined in terms of itself: each trigger emits the previous
    // count plus one, and the stepper holding the count is fed by the very
    // stream being defined.
    let (trigger, sink) = Stream::sink();
    let placeholder = StreamPlaceholder::new();
    let count = Behavior::stepper(0, &placeholder.stream());
    let increments = trigger.snapshot_with(|_: &(), n: &i32| n + 1, &count);
    placeholder.replace_with(&increments);

    let (seen, push) = spy();
    let _sub = increments.subscribe(push);
    sink.push(());
    sink.push(());
    sink.push(());
    assert_eq!(*seen.read().unwrap(), vec![1, 2, 3]);
    assert_eq!(count.at(), 3);
}
