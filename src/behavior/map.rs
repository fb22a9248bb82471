//! Mapped behaviors.

use crate::{
    error::SampleError,
    graph::{
        broadcast, broadcast_state, deliver_to, AnySubscriber, BehaviorSource, NodeState,
        PushCell, Source, Subscriber, SubscriberKey, SubscriberSet,
    },
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

struct Link<B> {
    parent_key: Option<SubscriberKey>,
    state: NodeState,
    cell: PushCell<B>,
}

/// `map`: push-mode when the parent pushes (each parent push is re-published
/// as `f(v)`), pull-mode otherwise (each sample recomputes through the
/// parent).
pub(crate) struct MapBehavior<A, B> {
    this: Weak<Self>,
    parent: Arc<dyn BehaviorSource<A>>,
    f: Arc<dyn Fn(&A) -> B + Send + Sync>,
    listeners: RwLock<SubscriberSet<B>>,
    link: RwLock<Link<B>>,
}

impl<A, B> MapBehavior<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        parent: Arc<dyn BehaviorSource<A>>,
        f: impl Fn(&A) -> B + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            parent,
            f: Arc::new(f),
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(Link {
                parent_key: None,
                state: NodeState::Inactive,
                cell: PushCell::default(),
            }),
        })
    }

    fn activate(&self, t: Tick) {
        let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<A>>);
        // The parent's synchronization handshake may push into us during
        // this call, seeding the cell before the link is filled in.
        let (parent_key, parent_state) = self.parent.add_listener(sub, t);
        let mut link = self.link.write().or_poisoned();
        link.parent_key = Some(parent_key);
        link.state = parent_state;
    }

    fn deactivate(&self) {
        let parent_key = {
            let mut link = self.link.write().or_poisoned();
            link.state = NodeState::Inactive;
            link.cell.clear();
            link.parent_key.take()
        };
        if let Some(key) = parent_key {
            self.parent.remove_listener(key);
        }
    }
}

impl<A, B> Subscriber<A> for MapBehavior<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn push(&self, t: Tick, value: &A) {
        let out = (self.f)(value);
        self.link.write().or_poisoned().cell.set(t, out.clone());
        broadcast(&self.listeners, t, &out);
    }

    fn state_changed(&self, t: Tick, parent: NodeState) {
        let changed = {
            let mut link = self.link.write().or_poisoned();
            if link.state == parent {
                false
            } else {
                link.state = parent;
                if parent != NodeState::Push {
                    link.cell.clear();
                }
                true
            }
        };
        if changed {
            broadcast_state(&self.listeners, t, parent);
        }
    }
}

impl<A, B> Source<B> for MapBehavior<A, B>
where
    A: Clone + Send + Sync + 'static,
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
        let state = self.state();
        if state == NodeState::Push {
            let handshake = self.link.read().or_poisoned().cell.handshake(t);
            if let Some(value) = handshake {
                deliver_to(&self.listeners, key, t, &value);
            }
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
            self.deactivate();
        }
    }

    fn state(&self) -> NodeState {
        self.link.read().or_poisoned().state
    }
}

impl<A, B> BehaviorSource<B> for MapBehavior<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn sample(&self, t: Tick) -> Result<B, SampleError> {
        // Recomputing through the parent keeps sampling consistent with the
        // parent's own same-tick visibility rules (a stepper parent reads as
        // its pre-occurrence value within the occurrence's tick).
        self.parent.sample(t).map(|a| (self.f)(&a))
    }
}
