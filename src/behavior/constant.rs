//! Pull-only behaviors: constants and sampling functions.

use crate::{
    error::SampleError,
    graph::{AnySubscriber, BehaviorSource, NodeState, Source, SubscriberKey, SubscriberSet},
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock};

/// `of`: a value that never changes. Listeners are accepted (combinators
/// built on top still need a slot) but never notified.
pub(crate) struct ConstBehavior<A> {
    value: A,
    listeners: RwLock<SubscriberSet<A>>,
}

impl<A> ConstBehavior<A> {
    pub(crate) fn new(value: A) -> Arc<Self> {
        Arc::new(Self {
            value,
            listeners: RwLock::new(SubscriberSet::new()),
        })
    }
}

impl<A: Clone + Send + Sync + 'static> Source<A> for ConstBehavior<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let key = self.listeners.write().or_poisoned().subscribe(sub, t);
        (key, NodeState::OnlyPull)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        self.listeners.write().or_poisoned().unsubscribe(key);
    }

    fn state(&self) -> NodeState {
        NodeState::OnlyPull
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorSource<A> for ConstBehavior<A> {
    fn sample(&self, _t: Tick) -> Result<A, SampleError> {
        Ok(self.value.clone())
    }
}

/// `from_fn` (and the tick-aware internals built on it): every sample
/// re-evaluates the function.
pub(crate) struct FnBehavior<A> {
    f: Box<dyn Fn(Tick) -> A + Send + Sync>,
    listeners: RwLock<SubscriberSet<A>>,
}

impl<A> FnBehavior<A> {
    pub(crate) fn new(f: impl Fn(Tick) -> A + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            f: Box::new(f),
            listeners: RwLock::new(SubscriberSet::new()),
        })
    }
}

impl<A: Clone + Send + Sync + 'static> Source<A> for FnBehavior<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let key = self.listeners.write().or_poisoned().subscribe(sub, t);
        (key, NodeState::Pull)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        self.listeners.write().or_poisoned().unsubscribe(key);
    }

    fn state(&self) -> NodeState {
        NodeState::Pull
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorSource<A> for FnBehavior<A> {
    fn sample(&self, t: Tick) -> Result<A, SampleError> {
        Ok((self.f)(t))
    }
}
