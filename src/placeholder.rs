//! Deferred reactives, for building cyclic networks.
//!
//! A placeholder participates in every combinator before its concrete
//! source exists: listeners accumulate in the placeholder's own list, and
//! once [`replace_with`](StreamPlaceholder::replace_with) binds the source,
//! the placeholder subscribes itself and forwards pushes and state changes:
//! a transparent proxy that is observationally identical to having
//! subscribed to the source directly, including the push-mode
//! synchronization handshake. This is what lets a stream depend on a stepper
//! of itself: the cycle is broken at construction and closed at replacement.

use crate::{
    behavior::Behavior,
    error::{ReplaceError, SampleError},
    graph::{
        broadcast, broadcast_state, deliver_to, AnySubscriber, BehaviorSource, NodeState, Source,
        Subscriber, SubscriberKey, SubscriberSet,
    },
    stream::Stream,
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

struct Link<S> {
    source: Option<S>,
    source_key: Option<SubscriberKey>,
}

macro_rules! placeholder_node {
    ($node:ident, $source:ident) => {
        pub(crate) struct $node<A> {
            this: Weak<Self>,
            listeners: RwLock<SubscriberSet<A>>,
            link: RwLock<Link<Arc<dyn $source<A>>>>,
        }

        impl<A: Clone + Send + Sync + 'static> $node<A> {
            pub(crate) fn new() -> Arc<Self> {
                Arc::new_cyclic(|this| Self {
                    this: this.clone(),
                    listeners: RwLock::new(SubscriberSet::new()),
                    link: RwLock::new(Link {
                        source: None,
                        source_key: None,
                    }),
                })
            }

            fn attach(&self, source: &Arc<dyn $source<A>>, t: Tick) -> NodeState {
                let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<A>>);
                let (key, state) = source.add_listener(sub, t);
                self.link.write().or_poisoned().source_key = Some(key);
                state
            }

            pub(crate) fn replace(&self, source: Arc<dyn $source<A>>) -> Result<(), ReplaceError> {
                {
                    let mut link = self.link.write().or_poisoned();
                    if link.source.is_some() {
                        return Err(ReplaceError::AlreadyReplaced);
                    }
                    link.source = Some(source.clone());
                }
                if !self.listeners.read().or_poisoned().is_empty() {
                    // Replacement can push (the source's handshake flows
                    // through the proxy), so it is its own tick.
                    let t = Tick::advance();
                    let state = self.attach(&source, t);
                    broadcast_state(&self.listeners, t, state);
                }
                Ok(())
            }
        }

        impl<A: Clone + Send + Sync + 'static> Subscriber<A> for $node<A> {
            fn push(&self, t: Tick, value: &A) {
                broadcast(&self.listeners, t, value);
            }

            fn state_changed(&self, t: Tick, parent: NodeState) {
                broadcast_state(&self.listeners, t, parent);
            }
        }

        impl<A: Clone + Send + Sync + 'static> Source<A> for $node<A> {
            fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
                let (key, was_empty) = {
                    let mut listeners = self.listeners.write().or_poisoned();
                    let was_empty = listeners.is_empty();
                    (listeners.subscribe(sub, t), was_empty)
                };
                let source = self.link.read().or_poisoned().source.clone();
                match source {
                    Some(source) => {
                        if was_empty {
                            self.attach(&source, t);
                        }
                        let state = source.state();
                        if state == NodeState::Push {
                            if let Ok(value) = source.sample_for_handshake(t) {
                                deliver_to(&self.listeners, key, t, &value);
                            }
                        }
                        (key, state)
                    }
                    None => (key, NodeState::Inactive),
                }
            }

            fn remove_listener(&self, key: SubscriberKey) {
                let now_empty = {
                    let mut listeners = self.listeners.write().or_poisoned();
                    listeners.unsubscribe(key);
                    listeners.is_empty()
                };
                if now_empty {
                    let (source, source_key) = {
                        let mut link = self.link.write().or_poisoned();
                        (link.source.clone(), link.source_key.take())
                    };
                    if let (Some(source), Some(key)) = (source, source_key) {
                        source.remove_listener(key);
                    }
                }
            }

            fn state(&self) -> NodeState {
                match &self.link.read().or_poisoned().source {
                    Some(source) => source.state(),
                    None => NodeState::Inactive,
                }
            }
        }
    };
}

/// What a push-mode source hands a freshly-attached proxy listener. Streams
/// have no current value; behaviors replay theirs.
trait HandshakeSample<A> {
    fn sample_for_handshake(&self, t: Tick) -> Result<A, SampleError>;
}

impl<A> HandshakeSample<A> for Arc<dyn Source<A>> {
    fn sample_for_handshake(&self, _t: Tick) -> Result<A, SampleError> {
        Err(SampleError::NoValue)
    }
}

impl<A> HandshakeSample<A> for Arc<dyn BehaviorSource<A>> {
    fn sample_for_handshake(&self, t: Tick) -> Result<A, SampleError> {
        self.sample(t)
    }
}

placeholder_node!(StreamPlaceholderNode, Source);
placeholder_node!(BehaviorPlaceholderNode, BehaviorSource);

impl<A: Clone + Send + Sync + 'static> BehaviorSource<A> for BehaviorPlaceholderNode<A> {
    fn sample(&self, t: Tick) -> Result<A, SampleError> {
        let source = self.link.read().or_poisoned().source.clone();
        match source {
            Some(source) => source.sample(t),
            None => Err(SampleError::PlaceholderNotReplaced),
        }
    }
}

/// A stream whose source is bound later.
pub struct StreamPlaceholder<A> {
    node: Arc<StreamPlaceholderNode<A>>,
}

impl<A> std::fmt::Debug for StreamPlaceholder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamPlaceholder")
            .field("type", &std::any::type_name::<A>())
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> StreamPlaceholder<A> {
    /// An unbound stream placeholder.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            node: StreamPlaceholderNode::new(),
        }
    }

    /// The stream view. Valid in every combinator before replacement;
    /// occurrences begin flowing once the source is bound.
    pub fn stream(&self) -> Stream<A> {
        Stream::from_node(self.node.clone())
    }

    /// Binds the concrete source, attaching every accumulated listener.
    ///
    /// # Panics
    /// Panics if called twice; use
    /// [`try_replace_with`](StreamPlaceholder::try_replace_with) to handle
    /// the error instead.
    #[track_caller]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn replace_with(&self, source: &Stream<A>) {
        self.try_replace_with(source)
            .unwrap_or_else(|e| panic!("{e}"));
    }

    /// Binds the concrete source, or reports that one is already bound.
    pub fn try_replace_with(&self, source: &Stream<A>) -> Result<(), ReplaceError> {
        self.node.replace(source.node.clone())
    }
}

/// A behavior whose source is bound later. Sampling before replacement is
/// [`SampleError::PlaceholderNotReplaced`].
pub struct BehaviorPlaceholder<A> {
    node: Arc<BehaviorPlaceholderNode<A>>,
}

impl<A> std::fmt::Debug for BehaviorPlaceholder<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorPlaceholder")
            .field("type", &std::any::type_name::<A>())
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> BehaviorPlaceholder<A> {
    /// An unbound behavior placeholder.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            node: BehaviorPlaceholderNode::new(),
        }
    }

    /// The behavior view. Valid in every combinator before replacement.
    pub fn behavior(&self) -> Behavior<A> {
        Behavior::from_node(self.node.clone())
    }

    /// Binds the concrete source, attaching every accumulated listener and
    /// replaying the source's current value to them if it pushes.
    ///
    /// # Panics
    /// Panics if called twice; use
    /// [`try_replace_with`](BehaviorPlaceholder::try_replace_with) to handle
    /// the error instead.
    #[track_caller]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn replace_with(&self, source: &Behavior<A>) {
        self.try_replace_with(source)
            .unwrap_or_else(|e| panic!("{e}"));
    }

    /// Binds the concrete source, or reports that one is already bound.
    pub fn try_replace_with(&self, source: &Behavior<A>) -> Result<(), ReplaceError> {
        self.node.replace(source.node.clone())
    }
}
