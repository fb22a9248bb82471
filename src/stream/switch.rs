//! `switch_stream`: a stream that follows the stream currently held by a
//! behavior.

use crate::{
    graph::{
        broadcast, AnySubscriber, BehaviorSource, NodeState, Source, Subscriber, SubscriberKey,
        SubscriberSet, SwapSlot,
    },
    stream::Stream,
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

struct Link<A> {
    selector_key: Option<SubscriberKey>,
    slot: Option<SwapSlot<A>>,
}

pub(crate) struct SwitchStream<A> {
    this: Weak<Self>,
    selector: Arc<dyn BehaviorSource<Stream<A>>>,
    port: Arc<InnerPort<A>>,
    listeners: RwLock<SubscriberSet<A>>,
    link: RwLock<Link<A>>,
}

/// Receives occurrences from the currently-selected inner stream.
struct InnerPort<A> {
    owner: Weak<SwitchStream<A>>,
}

impl<A: Clone + Send + Sync + 'static> Subscriber<A> for InnerPort<A> {
    fn push(&self, t: Tick, value: &A) {
        if let Some(owner) = self.owner.upgrade() {
            broadcast(&owner.listeners, t, value);
        }
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A: Clone + Send + Sync + 'static> SwitchStream<A> {
    pub(crate) fn new(selector: Arc<dyn BehaviorSource<Stream<A>>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            selector,
            port: Arc::new(InnerPort {
                owner: this.clone(),
            }),
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(Link {
                selector_key: None,
                slot: None,
            }),
        })
    }

    fn port_sub(&self) -> AnySubscriber<A> {
        AnySubscriber::Value(Arc::downgrade(&self.port) as Weak<dyn Subscriber<A>>)
    }

    fn activate(&self, t: Tick) {
        let initial = crate::behavior::sample_or_unwind(&self.selector, t);
        let mut slot = SwapSlot::new(initial.node);
        slot.attach(self.port_sub(), t);
        self.link.write().or_poisoned().slot = Some(slot);
        // Subscribing to the selector last: its handshake would re-deliver
        // the stream we just sampled, which the swap no-ops on.
        let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<Stream<A>>>);
        let (key, _) = self.selector.add_listener(sub, t);
        self.link.write().or_poisoned().selector_key = Some(key);
    }

    fn deactivate(&self) {
        let (selector_key, slot) = {
            let mut link = self.link.write().or_poisoned();
            (link.selector_key.take(), link.slot.take())
        };
        if let Some(key) = selector_key {
            self.selector.remove_listener(key);
        }
        if let Some(mut slot) = slot {
            slot.detach();
        }
    }
}

impl<A: Clone + Send + Sync + 'static> Subscriber<Stream<A>> for SwitchStream<A> {
    fn push(&self, t: Tick, next: &Stream<A>) {
        // Take the slot out while calling into other nodes so a reentrant
        // propagation never finds this lock held.
        let taken = self.link.write().or_poisoned().slot.take();
        let Some(mut slot) = taken else {
            return;
        };
        slot.swap(next.node.clone(), self.port_sub(), t);
        self.link.write().or_poisoned().slot = Some(slot);
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A: Clone + Send + Sync + 'static> Source<A> for SwitchStream<A> {
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
