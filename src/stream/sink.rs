//! Externally-driven streams: sinks and producers.

use crate::{
    graph::{broadcast, AnySubscriber, NodeState, Source, SubscriberKey, SubscriberSet},
    tick::Tick,
    Deactivator,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

/// A stream fed imperatively from outside the graph. Always active: pushes
/// happen whether or not anyone listens, so there is nothing to activate.
pub(crate) struct SinkStream<A> {
    listeners: RwLock<SubscriberSet<A>>,
}

impl<A> SinkStream<A> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            listeners: RwLock::new(SubscriberSet::new()),
        })
    }
}

impl<A: Clone + Send + Sync + 'static> Source<A> for SinkStream<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let key = self.listeners.write().or_poisoned().subscribe(sub, t);
        (key, NodeState::Push)
    }

    fn remove_listener(&self, key: SubscriberKey) {
        self.listeners.write().or_poisoned().unsubscribe(key);
    }

    fn state(&self) -> NodeState {
        NodeState::Push
    }
}

/// The write half of a sink stream.
///
/// Each [`push`](StreamSink::push) starts a fresh tick and fans the value out
/// depth-first to the whole downstream tree before returning.
pub struct StreamSink<A> {
    pub(crate) node: Arc<SinkStream<A>>,
}

impl<A> Clone for StreamSink<A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A> std::fmt::Debug for StreamSink<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSink")
            .field("type", &std::any::type_name::<A>())
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> StreamSink<A> {
    /// Sends an occurrence into the stream.
    pub fn push(&self, value: A) {
        let t = Tick::advance();
        broadcast(&self.node.listeners, t, &value);
    }
}

/// A stream wrapping an external push source. The activation closure runs
/// when the listener count rises 0→1 and hands back a deactivator that runs
/// when it falls back to 0, never nested.
pub(crate) struct ProducerStream<A> {
    this: Weak<Self>,
    #[allow(clippy::type_complexity)]
    activate: Box<dyn Fn(StreamProducerHandle<A>) -> Deactivator + Send + Sync>,
    listeners: RwLock<SubscriberSet<A>>,
    active: RwLock<Option<Deactivator>>,
}

impl<A: Clone + Send + Sync + 'static> ProducerStream<A> {
    pub(crate) fn new(
        activate: impl Fn(StreamProducerHandle<A>) -> Deactivator + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            activate: Box::new(activate),
            listeners: RwLock::new(SubscriberSet::new()),
            active: RwLock::new(None),
        })
    }
}

impl<A: Clone + Send + Sync + 'static> Source<A> for ProducerStream<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, was_empty) = {
            let mut listeners = self.listeners.write().or_poisoned();
            let was_empty = listeners.is_empty();
            (listeners.subscribe(sub, t), was_empty)
        };
        if was_empty {
            let deactivator = (self.activate)(StreamProducerHandle {
                node: self.this.clone(),
            });
            *self.active.write().or_poisoned() = Some(deactivator);
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

/// The push callback handed to a stream producer's activation closure.
///
/// Holds the producer weakly: pushes after the producer is dropped are
/// silently discarded.
pub struct StreamProducerHandle<A> {
    node: Weak<ProducerStream<A>>,
}

impl<A> Clone for StreamProducerHandle<A> {
    fn clone(&self) -> Self {
        Self {
            node: Weak::clone(&self.node),
        }
    }
}

impl<A: Clone + Send + Sync + 'static> StreamProducerHandle<A> {
    /// Sends an occurrence into the producer stream.
    pub fn push(&self, value: A) {
        if let Some(node) = self.node.upgrade() {
            let t = Tick::advance();
            broadcast(&node.listeners, t, &value);
        }
    }
}
