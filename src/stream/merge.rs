//! Multi-parent pass-through: `merge` and `combine`.

use crate::{
    graph::{
        broadcast, AnySubscriber, NodeState, Source, Subscriber, SubscriberKey, SubscriberSet,
    },
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

pub(crate) struct MergeStream<A> {
    this: Weak<Self>,
    parents: Vec<Arc<dyn Source<A>>>,
    listeners: RwLock<SubscriberSet<A>>,
    parent_keys: RwLock<Vec<SubscriberKey>>,
}

impl<A: Clone + Send + Sync + 'static> MergeStream<A> {
    pub(crate) fn new(parents: Vec<Arc<dyn Source<A>>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            parents,
            listeners: RwLock::new(SubscriberSet::new()),
            parent_keys: RwLock::new(Vec::new()),
        })
    }

    fn activate(&self, t: Tick) {
        let sub = self.this.clone() as Weak<dyn Subscriber<A>>;
        let keys = self
            .parents
            .iter()
            .map(|parent| parent.add_listener(AnySubscriber::Value(sub.clone()), t).0)
            .collect();
        *self.parent_keys.write().or_poisoned() = keys;
    }

    fn deactivate(&self) {
        let keys = std::mem::take(&mut *self.parent_keys.write().or_poisoned());
        for (parent, key) in self.parents.iter().zip(keys) {
            parent.remove_listener(key);
        }
    }
}

impl<A: Clone + Send + Sync + 'static> Subscriber<A> for MergeStream<A> {
    fn push(&self, t: Tick, value: &A) {
        broadcast(&self.listeners, t, value);
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A: Clone + Send + Sync + 'static> Source<A> for MergeStream<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, was_empty) = {
            let mut listeners = self.listeners.write().or_poisoned();
            let was_empty = listeners.is_empty();
            (listeners.subscribe(sub, t), was_empty)
        };
        if was_empty {
            self.activate(t);
        }
        (key, NodeState::Push)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        let now_empty = {
            let mut listeners = self.listeners.write().or_poisoned();
            listeners.unsubscribe(key);
            listeners.is_empty()
        };
        if now_empty {
            self.deactivate();
        }
    }

    fn state(&self) -> NodeState {
        if self.listeners.read().or_poisoned().is_empty() {
            NodeState::Inactive
        } else {
            NodeState::Push
        }
    }
}
