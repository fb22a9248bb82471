//! The shared node behind the per-occurrence stream combinators.
//!
//! `map`, `map_to`, `filter`, `filter_apply`, `keep_when`, `scan_s`,
//! `snapshot` and `snapshot_with` all follow the same shape: on a parent
//! occurrence, evaluate a typed transform and publish its output if any. The
//! transform may read behaviors; those are held as keep-alive parents so
//! that push-accumulating behaviors (steppers, scans) keep tracking their
//! sources while only this stream observes them.

use crate::{
    graph::{
        broadcast, AnySource, AnySubscriber, ErasedSource, NodeState, Source, Subscriber,
        SubscriberKey, SubscriberSet, WakeSubscriber,
    },
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

struct Link {
    parent_key: Option<SubscriberKey>,
    keepalive_keys: Vec<(AnySource, SubscriberKey)>,
}

pub(crate) struct TransformStream<A, B> {
    this: Weak<Self>,
    parent: Arc<dyn Source<A>>,
    keepalive: Vec<AnySource>,
    #[allow(clippy::type_complexity)]
    op: Box<dyn Fn(Tick, &A) -> Option<B> + Send + Sync>,
    listeners: RwLock<SubscriberSet<B>>,
    link: RwLock<Link>,
}

impl<A, B> TransformStream<A, B>
where
    A: Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        parent: Arc<dyn Source<A>>,
        keepalive: Vec<AnySource>,
        op: impl Fn(Tick, &A) -> Option<B> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            parent,
            keepalive,
            op: Box::new(op),
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(Link {
                parent_key: None,
                keepalive_keys: Vec::new(),
            }),
        })
    }

    fn activate(&self, t: Tick) {
        let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<A>>);
        let (parent_key, _) = self.parent.add_listener(sub, t);
        let wake = self.this.clone() as Weak<dyn WakeSubscriber>;
        let keepalive_keys = self
            .keepalive
            .iter()
            .map(|src| {
                let (key, _) = src.source.attach_wake(wake.clone(), t);
                (src.clone(), key)
            })
            .collect();
        let mut link = self.link.write().or_poisoned();
        link.parent_key = Some(parent_key);
        link.keepalive_keys = keepalive_keys;
    }

    fn deactivate(&self) {
        let (parent_key, keepalive_keys) = {
            let mut link = self.link.write().or_poisoned();
            (link.parent_key.take(), std::mem::take(&mut link.keepalive_keys))
        };
        if let Some(key) = parent_key {
            self.parent.remove_listener(key);
        }
        for (src, key) in keepalive_keys {
            src.source.detach(key);
        }
    }
}

impl<A, B> Subscriber<A> for TransformStream<A, B>
where
    A: Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn push(&self, t: Tick, value: &A) {
        if let Some(out) = (self.op)(t, value) {
            broadcast(&self.listeners, t, &out);
        }
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

// Keep-alive parents only need the node to exist; their occurrences carry no
// information for this stream.
impl<A, B> WakeSubscriber for TransformStream<A, B>
where
    A: Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn wake(&self, _t: Tick) {}

    fn wake_state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A, B> Source<B> for TransformStream<A, B>
where
    A: Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn add_listener(&self, sub: AnySubscriber<B>, t: Tick) -> (SubscriberKey, NodeState) {
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
