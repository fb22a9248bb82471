//! `chain`: monadic sequencing of behaviors.
//!
//! The node tracks the behavior produced by applying `f` to the outer
//! behavior's current value. An outer push detaches from the old inner,
//! attaches to the one `f` now selects, and republishes; an inner push is
//! forwarded. Pushes from a no-longer-selected inner go nowhere because the
//! swap removed its listener entry.

use super::Behavior;
use crate::{
    error::SampleError,
    graph::{
        broadcast, broadcast_state, deliver_to, AnySubscriber, BehaviorSource, NodeState,
        PushCell, Source, Subscriber, SubscriberKey, SubscriberSet, SwapSlot,
    },
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

struct Link<A, B> {
    outer_key: Option<SubscriberKey>,
    slot: Option<SwapSlot<B>>,
    inner: Option<Arc<dyn BehaviorSource<B>>>,
    state: NodeState,
    cell: PushCell<B>,
    _marker: std::marker::PhantomData<fn(&A)>,
}

pub(crate) struct ChainBehavior<A, B> {
    this: Weak<Self>,
    outer: Arc<dyn BehaviorSource<A>>,
    f: Box<dyn Fn(&A) -> Behavior<B> + Send + Sync>,
    port: Arc<InnerPort<A, B>>,
    listeners: RwLock<SubscriberSet<B>>,
    link: RwLock<Link<A, B>>,
}

/// Receives pushes from the currently-selected inner behavior.
struct InnerPort<A, B> {
    owner: Weak<ChainBehavior<A, B>>,
}

impl<A, B> Subscriber<B> for InnerPort<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn push(&self, t: Tick, value: &B) {
        if let Some(owner) = self.owner.upgrade() {
            owner.link.write().or_poisoned().cell.set(t, value.clone());
            broadcast(&owner.listeners, t, value);
        }
    }

    fn state_changed(&self, t: Tick, _parent: NodeState) {
        if let Some(owner) = self.owner.upgrade() {
            owner.renegotiate(t);
        }
    }
}

impl<A, B> ChainBehavior<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(
        outer: Arc<dyn BehaviorSource<A>>,
        f: impl Fn(&A) -> Behavior<B> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            outer,
            f: Box::new(f),
            port: Arc::new(InnerPort {
                owner: this.clone(),
            }),
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(Link {
                outer_key: None,
                slot: None,
                inner: None,
                state: NodeState::Inactive,
                cell: PushCell::default(),
                _marker: std::marker::PhantomData,
            }),
        })
    }

    fn port_sub(&self) -> AnySubscriber<B> {
        AnySubscriber::Value(Arc::downgrade(&self.port) as Weak<dyn Subscriber<B>>)
    }

    /// Detaches from the current inner (if any) and attaches to `next`,
    /// republishing so downstream observers see the selected value change.
    fn select(&self, next: Behavior<B>, t: Tick) {
        let taken = self.link.write().or_poisoned().slot.take();
        let mut slot = match taken {
            Some(slot) => slot,
            None => SwapSlot::new(next.node.clone() as Arc<dyn Source<B>>),
        };
        let inner_state = slot.swap(
            next.node.clone() as Arc<dyn Source<B>>,
            self.port_sub(),
            t,
        );
        if !slot.is_attached() {
            slot.attach(self.port_sub(), t);
        }
        {
            let mut link = self.link.write().or_poisoned();
            link.slot = Some(slot);
            link.inner = Some(next.node.clone());
        }
        // A push-mode inner republished via its handshake during the swap;
        // a pull-mode inner is sampled so the switch itself is observable.
        if inner_state != NodeState::Push {
            let value = super::sample_or_unwind(&next.node, t);
            self.link.write().or_poisoned().cell.set(t, value.clone());
            broadcast(&self.listeners, t, &value);
        }
        self.renegotiate(t);
    }

    fn renegotiate(&self, t: Tick) {
        let inner_state = self
            .link
            .read()
            .or_poisoned()
            .inner
            .as_ref()
            .map(|inner| inner.state());
        let next = match inner_state {
            Some(NodeState::Push) => match self.outer.state() {
                NodeState::Push | NodeState::OnlyPull => NodeState::Push,
                _ => NodeState::Pull,
            },
            Some(state) => NodeState::join_switched(state),
            None => NodeState::Inactive,
        };
        let changed = {
            let mut link = self.link.write().or_poisoned();
            if link.state == next {
                false
            } else {
                link.state = next;
                if next != NodeState::Push {
                    link.cell.clear();
                }
                true
            }
        };
        if changed {
            broadcast_state(&self.listeners, t, next);
        }
    }

    fn activate(&self, t: Tick) {
        let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<A>>);
        let (outer_key, _) = self.outer.add_listener(sub, t);
        self.link.write().or_poisoned().outer_key = Some(outer_key);
        let attached = self.link.read().or_poisoned().slot.is_some();
        if !attached {
            // The outer handshake did not fire; derive the inner by sampling.
            if let Ok(value) = self.outer.sample(t) {
                self.select((self.f)(&value), t);
            }
        } else {
            self.renegotiate(t);
        }
    }

    fn deactivate(&self) {
        let (outer_key, slot) = {
            let mut link = self.link.write().or_poisoned();
            link.state = NodeState::Inactive;
            link.cell.clear();
            link.inner = None;
            (link.outer_key.take(), link.slot.take())
        };
        if let Some(key) = outer_key {
            self.outer.remove_listener(key);
        }
        if let Some(mut slot) = slot {
            slot.detach();
        }
    }
}

impl<A, B> Subscriber<A> for ChainBehavior<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn push(&self, t: Tick, value: &A) {
        self.select((self.f)(value), t);
    }

    fn state_changed(&self, t: Tick, _parent: NodeState) {
        let (has_inner, active) = {
            let link = self.link.read().or_poisoned();
            (link.inner.is_some(), link.outer_key.is_some())
        };
        if !has_inner && active {
            // The outer became samplable after activation (a replaced
            // placeholder); derive the inner now.
            if let Ok(value) = self.outer.sample(t) {
                self.select((self.f)(&value), t);
                return;
            }
        }
        self.renegotiate(t);
    }
}

impl<A, B> Source<B> for ChainBehavior<A, B>
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

impl<A, B> BehaviorSource<B> for ChainBehavior<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn sample(&self, t: Tick) -> Result<B, SampleError> {
        let outer = self.outer.sample(t)?;
        (self.f)(&outer).node.sample(t)
    }
}
