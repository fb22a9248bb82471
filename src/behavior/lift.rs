//! Applied behaviors: `ap`, `lift2`, `lift3`.
//!
//! An applied node re-evaluates whenever any parent pushes, so it listens to
//! its parents with value-free wake subscriptions and samples them all at
//! the waking tick. Push-mode only when every parent pushes; pull-only
//! forever when any parent is pull-only.

use crate::{
    error::SampleError,
    graph::{
        broadcast, broadcast_state, deliver_to, AnySubscriber, BehaviorSource, NodeState,
        Source, SubscriberKey, SubscriberSet, WakeSubscriber,
    },
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

struct Link {
    parent_keys: Vec<SubscriberKey>,
    state: NodeState,
}

macro_rules! lift_behavior {
    ($name:ident, $(($param:ident, $field:ident, $value:ident)),+) => {
        pub(crate) struct $name<$($param,)+ C> {
            this: Weak<Self>,
            $($field: Arc<dyn BehaviorSource<$param>>,)+
            #[allow(clippy::type_complexity)]
            f: Box<dyn Fn($(&$param),+) -> C + Send + Sync>,
            listeners: RwLock<SubscriberSet<C>>,
            link: RwLock<Link>,
        }

        impl<$($param,)+ C> $name<$($param,)+ C>
        where
            $($param: Clone + Send + Sync + 'static,)+
            C: Clone + Send + Sync + 'static,
        {
            pub(crate) fn new(
                $($field: Arc<dyn BehaviorSource<$param>>,)+
                f: impl Fn($(&$param),+) -> C + Send + Sync + 'static,
            ) -> Arc<Self> {
                Arc::new_cyclic(|this| Self {
                    this: this.clone(),
                    $($field,)+
                    f: Box::new(f),
                    listeners: RwLock::new(SubscriberSet::new()),
                    link: RwLock::new(Link {
                        parent_keys: Vec::new(),
                        state: NodeState::Inactive,
                    }),
                })
            }

            fn recompute(&self, t: Tick) -> Result<C, SampleError> {
                $(let $value = self.$field.sample(t)?;)+
                Ok((self.f)($(&$value),+))
            }

            fn joined(&self) -> NodeState {
                NodeState::join_applied([$(self.$field.state()),+])
            }

            fn activate(&self, t: Tick) {
                let wake = self.this.clone() as Weak<dyn WakeSubscriber>;
                let parent_keys = vec![
                    $(self.$field.add_listener(AnySubscriber::Wake(wake.clone()), t).0,)+
                ];
                let state = self.joined();
                let mut link = self.link.write().or_poisoned();
                link.parent_keys = parent_keys;
                link.state = state;
            }

            fn deactivate(&self) {
                let parent_keys = {
                    let mut link = self.link.write().or_poisoned();
                    link.state = NodeState::Inactive;
                    std::mem::take(&mut link.parent_keys)
                };
                let mut keys = parent_keys.into_iter();
                $(
                    if let Some(key) = keys.next() {
                        self.$field.remove_listener(key);
                    }
                )+
            }
        }

        impl<$($param,)+ C> WakeSubscriber for $name<$($param,)+ C>
        where
            $($param: Clone + Send + Sync + 'static,)+
            C: Clone + Send + Sync + 'static,
        {
            fn wake(&self, t: Tick) {
                if let Ok(value) = self.recompute(t) {
                    broadcast(&self.listeners, t, &value);
                }
            }

            fn wake_state_changed(&self, t: Tick, _parent: NodeState) {
                let next = self.joined();
                let changed = {
                    let mut link = self.link.write().or_poisoned();
                    if link.state == next {
                        false
                    } else {
                        link.state = next;
                        true
                    }
                };
                if changed {
                    broadcast_state(&self.listeners, t, next);
                }
            }
        }

        impl<$($param,)+ C> Source<C> for $name<$($param,)+ C>
        where
            $($param: Clone + Send + Sync + 'static,)+
            C: Clone + Send + Sync + 'static,
        {
            fn add_listener(&self, sub: AnySubscriber<C>, t: Tick) -> (SubscriberKey, NodeState) {
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
                    if let Ok(value) = self.recompute(t) {
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

        impl<$($param,)+ C> BehaviorSource<C> for $name<$($param,)+ C>
        where
            $($param: Clone + Send + Sync + 'static,)+
            C: Clone + Send + Sync + 'static,
        {
            fn sample(&self, t: Tick) -> Result<C, SampleError> {
                self.recompute(t)
            }
        }
    };
}

lift_behavior!(Lift2Behavior, (A, pa, va), (B, pb, vb));
lift_behavior!(Lift3Behavior, (A, pa, va), (B, pb, vb), (D, pd, vd));
