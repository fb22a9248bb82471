//! Externally-driven behaviors: sinks and producers.

use crate::{
    error::SampleError,
    graph::{
        broadcast, deliver_to, AnySubscriber, BehaviorSource, NodeState, PushCell, Source,
        SubscriberKey, SubscriberSet,
    },
    tick::Tick,
    Deactivator,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

/// A behavior written imperatively from outside the graph. Always active and
/// always push-mode; `last` is defined from construction on.
pub(crate) struct SinkBehavior<A> {
    listeners: RwLock<SubscriberSet<A>>,
    cell: RwLock<PushCell<A>>,
}

impl<A: Clone + Send + Sync + 'static> SinkBehavior<A> {
    pub(crate) fn new(initial: A) -> Arc<Self> {
        let mut cell = PushCell::default();
        cell.set(Tick::now(), initial);
        Arc::new(Self {
            listeners: RwLock::new(SubscriberSet::new()),
            cell: RwLock::new(cell),
        })
    }
}

impl<A: Clone + Send + Sync + 'static> Source<A> for SinkBehavior<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let key = self.listeners.write().or_poisoned().subscribe(sub, t);
        let handshake = self.cell.read().or_poisoned().handshake(t);
        if let Some(value) = handshake {
            deliver_to(&self.listeners, key, t, &value);
        }
        (key, NodeState::Push)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        self.listeners.write().or_poisoned().unsubscribe(key);
    }

    fn state(&self) -> NodeState {
        NodeState::Push
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorSource<A> for SinkBehavior<A> {
    fn sample(&self, _t: Tick) -> Result<A, SampleError> {
        self.cell
            .read()
            .or_poisoned()
            .value
            .clone()
            .ok_or(SampleError::NoValue)
    }
}

/// The write half of a sink behavior.
pub struct BehaviorSink<A> {
    pub(crate) node: Arc<SinkBehavior<A>>,
}

impl<A> Clone for BehaviorSink<A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A> std::fmt::Debug for BehaviorSink<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorSink")
            .field("type", &std::any::type_name::<A>())
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorSink<A> {
    /// Publishes a new current value, fanning it out to every observer.
    pub fn publish(&self, value: A) {
        let t = Tick::advance();
        self.node.cell.write().or_poisoned().set(t, value.clone());
        broadcast(&self.node.listeners, t, &value);
    }
}

/// A behavior wrapping an external push source. Push-mode while active;
/// sampling before the source's first push is [`SampleError::NoValue`].
pub(crate) struct ProducerBehavior<A> {
    this: Weak<Self>,
    #[allow(clippy::type_complexity)]
    activate: Box<dyn Fn(BehaviorProducerHandle<A>) -> Deactivator + Send + Sync>,
    listeners: RwLock<SubscriberSet<A>>,
    cell: RwLock<PushCell<A>>,
    active: RwLock<Option<Deactivator>>,
}

impl<A: Clone + Send + Sync + 'static> ProducerBehavior<A> {
    pub(crate) fn new(
        activate: impl Fn(BehaviorProducerHandle<A>) -> Deactivator + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            activate: Box::new(activate),
            listeners: RwLock::new(SubscriberSet::new()),
            cell: RwLock::new(PushCell::default()),
            active: RwLock::new(None),
        })
    }
}

impl<A: Clone + Send + Sync + 'static> Source<A> for ProducerBehavior<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, was_empty) = {
            let mut listeners = self.listeners.write().or_poisoned();
            let was_empty = listeners.is_empty();
            (listeners.subscribe(sub, t), was_empty)
        };
        if was_empty {
            let deactivator = (self.activate)(BehaviorProducerHandle {
                node: self.this.clone(),
            });
            *self.active.write().or_poisoned() = Some(deactivator);
        }
        let handshake = self.cell.read().or_poisoned().handshake(t);
        if let Some(value) = handshake {
            deliver_to(&self.listeners, key, t, &value);
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
            let deactivator = self.active.write().or_poisoned().take();
            self.cell.write().or_poisoned().clear();
            if let Some(deactivator) = deactivator {
                deactivator();
            }
        }
    }

    fn state(&self) -> NodeState {
        if self.active.read().or_poisoned().is_some() {
            NodeState::Push
        } else {
            NodeState::Inactive
        }
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorSource<A> for ProducerBehavior<A> {
    fn sample(&self, _t: Tick) -> Result<A, SampleError> {
        self.cell
            .read()
            .or_poisoned()
            .value
            .clone()
            .ok_or(SampleError::NoValue)
    }
}

/// The push callback handed to a behavior producer's activation closure.
pub struct BehaviorProducerHandle<A> {
    node: Weak<ProducerBehavior<A>>,
}

impl<A> Clone for BehaviorProducerHandle<A> {
    fn clone(&self) -> Self {
        Self {
            node: Weak::clone(&self.node),
        }
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorProducerHandle<A> {
    /// Publishes a new current value through the producer.
    pub fn push(&self, value: A) {
        if let Some(node) = self.node.upgrade() {
            let t = Tick::advance();
            node.cell.write().or_poisoned().set(t, value.clone());
            broadcast(&node.listeners, t, &value);
        }
    }
}
