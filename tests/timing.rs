use pushpull::{
    scheduler::{Scheduler, TimerHandle},
    stream::Stream,
};
use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

/// A manual clock: tasks are queued with a due time and run when the test
/// advances past it.
struct TestScheduler {
    now: RwLock<Duration>,
    next_id: RwLock<u64>,
    #[allow(clippy::type_complexity)]
    queue: Arc<RwLock<Vec<(u64, Duration, Box<dyn FnOnce() + Send + Sync>)>>>,
}

impl TestScheduler {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            now: RwLock::new(Duration::ZERO),
            next_id: RwLock::new(0),
            queue: Arc::new(RwLock::new(Vec::new())),
        })
    }

    fn pending(&self) -> usize {
        self.queue.read().unwrap().len()
    }

    fn advance(&self, by: Duration) {
        let now = {
            let mut now = self.now.write().unwrap();
            *now += by;
            *now
        };
        loop {
            let due = {
                let mut queue = self.queue.write().unwrap();
                let index = queue
                    .iter()
                    .enumerate()
                    .filter(|(_, (_, due, _))| *due <= now)
                    .min_by_key(|(_, (id, due, _))| (*due, *id))
                    .map(|(index, _)| index);
                index.map(|index| queue.remove(index))
            };
            match due {
                Some((_, _, task)) => task(),
                None => break,
            }
        }
    }
}

impl Scheduler for TestScheduler {
    fn schedule(
        &self,
        after: Duration,
        task: Box<dyn FnOnce() + Send + Sync>,
    ) -> TimerHandle {
        let id = {
            let mut next_id = self.next_id.write().unwrap();
            *next_id += 1;
            *next_id
        };
        let due = *self.now.read().unwrap() + after;
        self.queue.write().unwrap().push((id, due, task));
        let queue = self.queue.clone();
        TimerHandle::new(move || {
            queue.write().unwrap().retain(|(entry, ..)| *entry != id);
        })
    }
}

fn spy<T: Clone + Send + Sync + 'static>() -> (Arc<RwLock<Vec<T>>>, impl Fn(&T) + Send + Sync) {
    let seen = Arc::new(RwLock::new(Vec::new()));
    let push = {
        let seen = seen.clone();
        move |v: &T| seen.write().unwrap().push(v.clone())
    };
    (seen, push)
}

const STEP: Duration = Duration::from_millis(100);

#[test]
fn delay_reemits_after_the_duration() {
    let scheduler = TestScheduler::new();
    let (s, sink) = Stream::sink();
    let delayed = s.delay(STEP, scheduler.clone());
    let (seen, push) = spy();
    let _sub = delayed.subscribe(push);

    sink.push(1);
    sink.push(2);
    assert!(seen.read().unwrap().is_empty());
    scheduler.advance(STEP);
    assert_eq!(*seen.read().unwrap(), vec![1, 2]);
}

#[test]
fn throttle_silences_the_window_after_an_emission() {
    let scheduler = TestScheduler::new();
    let (s, sink) = Stream::sink();
    let throttled = s.throttle(STEP, scheduler.clone());
    let (seen, push) = spy();
    let _sub = throttled.subscribe(push);

    sink.push(1);
    sink.push(2);
    sink.push(3);
    assert_eq!(*seen.read().unwrap(), vec![1]);
    scheduler.advance(STEP);
    sink.push(4);
    assert_eq!(*seen.read().unwrap(), vec![1, 4]);
}

#[test]
fn debounce_emits_the_latest_after_quiet() {
    let scheduler = TestScheduler::new();
    let (s, sink) = Stream::sink();
    let debounced = s.debounce(STEP, scheduler.clone());
    let (seen, push) = spy();
    let _sub = debounced.subscribe(push);

    sink.push(1);
    scheduler.advance(STEP / 2);
    sink.push(2);
    scheduler.advance(STEP / 2);
    assert!(seen.read().unwrap().is_empty());
    scheduler.advance(STEP / 2);
    assert_eq!(*seen.read().unwrap(), vec![2]);
    sink.push(3);
    scheduler.advance(STEP);
    assert_eq!(*seen.read().unwrap(), vec![2, 3]);
}

#[test]
fn deactivation_cancels_pending_timers() {
    let scheduler = TestScheduler::new();
    let (s, sink) = Stream::sink();
    let delayed = s.delay(STEP, scheduler.clone());
    let (seen, push) = spy();
    let sub = delayed.subscribe(push);

    sink.push(1);
    assert_eq!(scheduler.pending(), 1);
    sub.deactivate();
    assert_eq!(scheduler.pending(), 0);
    scheduler.advance(STEP);
    assert!(seen.read().unwrap().is_empty());
}
