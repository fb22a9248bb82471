//! Step-wise accumulating behaviors: `stepper`, `scan` and `integrate`.
//!
//! Steppers and scan accumulators carry the delayed-visibility rule that
//! feedback constructions rely on: an occurrence arriving at tick `t` is
//! held *pending* and only committed to the observable value once the node
//! is sampled at a strictly later tick. A snapshot taken during `t` therefore
//! reads the pre-occurrence value, while push observers still see the new
//! value arrive.

use crate::{
    error::SampleError,
    graph::{
        broadcast, deliver_to, AnySubscriber, BehaviorSource, NodeState, Source, Subscriber,
        SubscriberKey, SubscriberSet,
    },
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

/// The committed/pending pair shared by stepper-like nodes.
struct Stepped<A> {
    last: A,
    pending: Option<(Tick, A)>,
}

impl<A: Clone> Stepped<A> {
    fn new(initial: A) -> Self {
        Self {
            last: initial,
            pending: None,
        }
    }

    /// Commits a pending occurrence older than `t`, then reads.
    fn sample(&mut self, t: Tick) -> A {
        if let Some((pt, pv)) = self.pending.take() {
            if pt < t {
                self.last = pv;
            } else {
                self.pending = Some((pt, pv));
            }
        }
        self.last.clone()
    }

    /// Records an occurrence at `t`, committing any older pending one.
    fn record(&mut self, t: Tick, value: A) {
        if let Some((pt, pv)) = self.pending.take() {
            if pt < t {
                self.last = pv;
            } else {
                self.pending = Some((pt, pv));
            }
        }
        self.pending = Some((t, value));
    }

    /// The newest value, pending or committed, for further accumulation.
    fn newest(&self) -> &A {
        match &self.pending {
            Some((_, v)) => v,
            None => &self.last,
        }
    }
}

struct StepperLink<A> {
    stream_key: Option<SubscriberKey>,
    stepped: Stepped<A>,
}

/// `stepper`: starts at `initial`, adopts each stream occurrence.
pub(crate) struct StepperBehavior<A> {
    this: Weak<Self>,
    stream: Arc<dyn Source<A>>,
    listeners: RwLock<SubscriberSet<A>>,
    link: RwLock<StepperLink<A>>,
}

impl<A: Clone + Send + Sync + 'static> StepperBehavior<A> {
    pub(crate) fn new(initial: A, stream: Arc<dyn Source<A>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            stream,
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(StepperLink {
                stream_key: None,
                stepped: Stepped::new(initial),
            }),
        })
    }
}

impl<A: Clone + Send + Sync + 'static> Subscriber<A> for StepperBehavior<A> {
    fn push(&self, t: Tick, value: &A) {
        self.link.write().or_poisoned().stepped.record(t, value.clone());
        broadcast(&self.listeners, t, value);
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A: Clone + Send + Sync + 'static> Source<A> for StepperBehavior<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, was_empty) = {
            let mut listeners = self.listeners.write().or_poisoned();
            let was_empty = listeners.is_empty();
            (listeners.subscribe(sub, t), was_empty)
        };
        if was_empty {
            let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<A>>);
            let (stream_key, _) = self.stream.add_listener(sub, t);
            self.link.write().or_poisoned().stream_key = Some(stream_key);
        }
        let current = self.link.write().or_poisoned().stepped.sample(t);
        deliver_to(&self.listeners, key, t, &current);
        (key, NodeState::Push)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        let now_empty = {
            let mut listeners = self.listeners.write().or_poisoned();
            listeners.unsubscribe(key);
            listeners.is_empty()
        };
        if now_empty {
            let stream_key = self.link.write().or_poisoned().stream_key.take();
            if let Some(stream_key) = stream_key {
                self.stream.remove_listener(stream_key);
            }
        }
    }

    fn state(&self) -> NodeState {
        if self.link.read().or_poisoned().stream_key.is_some() {
            NodeState::Push
        } else {
            NodeState::Inactive
        }
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorSource<A> for StepperBehavior<A> {
    fn sample(&self, t: Tick) -> Result<A, SampleError> {
        Ok(self.link.write().or_poisoned().stepped.sample(t))
    }
}

/// One accumulator instance spawned by sampling a `scan` behavior. Eager:
/// it subscribes to the stream at its sample tick and keeps accumulating
/// whether or not anything observes it, so two instances sampled at
/// different times fold independent histories. Unsubscribes on drop.
pub(crate) struct ActiveScan<Ev, S> {
    stream: Arc<dyn Source<Ev>>,
    f: Arc<dyn Fn(&Ev, &S) -> S + Send + Sync>,
    listeners: RwLock<SubscriberSet<S>>,
    link: RwLock<StepperLink<S>>,
}

impl<Ev, S> ActiveScan<Ev, S>
where
    Ev: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        stream: Arc<dyn Source<Ev>>,
        f: Arc<dyn Fn(&Ev, &S) -> S + Send + Sync>,
        initial: S,
        t: Tick,
    ) -> Arc<Self> {
        let scan = Arc::new(Self {
            stream: stream.clone(),
            f,
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(StepperLink {
                stream_key: None,
                stepped: Stepped::new(initial),
            }),
        });
        let sub = AnySubscriber::Value(Arc::downgrade(&scan) as Weak<dyn Subscriber<Ev>>);
        let (key, _) = stream.add_listener(sub, t);
        scan.link.write().or_poisoned().stream_key = Some(key);
        scan
    }
}

impl<Ev, S> Drop for ActiveScan<Ev, S> {
    fn drop(&mut self) {
        if let Ok(mut link) = self.link.write() {
            if let Some(key) = link.stream_key.take() {
                self.stream.remove_listener(key);
            }
        }
    }
}

impl<Ev, S> Subscriber<Ev> for ActiveScan<Ev, S>
where
    Ev: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    fn push(&self, t: Tick, value: &Ev) {
        let next = {
            let mut link = self.link.write().or_poisoned();
            let next = (self.f)(value, link.stepped.newest());
            link.stepped.record(t, next.clone());
            next
        };
        broadcast(&self.listeners, t, &next);
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<Ev, S> Source<S> for ActiveScan<Ev, S>
where
    Ev: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    fn add_listener(&self, sub: AnySubscriber<S>, t: Tick) -> (SubscriberKey, NodeState) {
        let key = self.listeners.write().or_poisoned().subscribe(sub, t);
        let current = self.link.write().or_poisoned().stepped.sample(t);
        deliver_to(&self.listeners, key, t, &current);
        (key, NodeState::Push)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        self.listeners.write().or_poisoned().unsubscribe(key);
    }

    fn state(&self) -> NodeState {
        NodeState::Push
    }
}

impl<Ev, S> BehaviorSource<S> for ActiveScan<Ev, S>
where
    Ev: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    fn sample(&self, t: Tick) -> Result<S, SampleError> {
        Ok(self.link.write().or_poisoned().stepped.sample(t))
    }
}

struct IntegrateLink {
    parent_key: Option<SubscriberKey>,
    state: NodeState,
    prev: Option<(Tick, f64)>,
    area: f64,
}

/// `integrate`: the running integral of the parent, trapezoidal over the
/// ticks at which the parent was pushed or sampled.
pub(crate) struct IntegrateBehavior {
    this: Weak<Self>,
    parent: Arc<dyn BehaviorSource<f64>>,
    listeners: RwLock<SubscriberSet<f64>>,
    link: RwLock<IntegrateLink>,
}

impl IntegrateBehavior {
    pub(crate) fn new(parent: Arc<dyn BehaviorSource<f64>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            parent,
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(IntegrateLink {
                parent_key: None,
                state: NodeState::Inactive,
                prev: None,
                area: 0.0,
            }),
        })
    }

    fn accumulate(&self, t: Tick, value: f64) -> f64 {
        let mut link = self.link.write().or_poisoned();
        if let Some((pt, pv)) = link.prev {
            link.area += t.since(pt) as f64 * (pv + value) / 2.0;
        }
        link.prev = Some((t, value));
        link.area
    }
}

impl Subscriber<f64> for IntegrateBehavior {
    fn push(&self, t: Tick, value: &f64) {
        let area = self.accumulate(t, *value);
        broadcast(&self.listeners, t, &area);
    }

    fn state_changed(&self, t: Tick, parent: NodeState) {
        let changed = {
            let mut link = self.link.write().or_poisoned();
            if link.state == parent {
                false
            } else {
                link.state = parent;
                true
            }
        };
        if changed {
            crate::graph::broadcast_state(&self.listeners, t, parent);
        }
    }
}

impl Source<f64> for IntegrateBehavior {
    fn add_listener(&self, sub: AnySubscriber<f64>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, was_empty) = {
            let mut listeners = self.listeners.write().or_poisoned();
            let was_empty = listeners.is_empty();
            (listeners.subscribe(sub, t), was_empty)
        };
        if was_empty {
            let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<f64>>);
            let (parent_key, parent_state) = self.parent.add_listener(sub, t);
            let mut link = self.link.write().or_poisoned();
            link.parent_key = Some(parent_key);
            link.state = parent_state;
        }
        let state = self.state();
        if state == NodeState::Push {
            let area = self.link.read().or_poisoned().area;
            deliver_to(&self.listeners, key, t, &area);
        }
        (key, state)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        let now_empty = {
            let mut listeners = self.listeners.write().or_poisoned();
            listeners.unsubscribe(key);
            listeners.is_empty()
        };
        if now_empty {
            let parent_key = {
                let mut link = self.link.write().or_poisoned();
                link.state = NodeState::Inactive;
                link.parent_key.take()
            };
            if let Some(key) = parent_key {
                self.parent.remove_listener(key);
            }
        }
    }

    fn state(&self) -> NodeState {
        self.link.read().or_poisoned().state
    }
}

impl BehaviorSource<f64> for IntegrateBehavior {
    fn sample(&self, t: Tick) -> Result<f64, SampleError> {
        let value = self.parent.sample(t)?;
        Ok(self.accumulate(t, value))
    }
}
