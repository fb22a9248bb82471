//! `moment`: a behavior computed by a sampling function with dynamic
//! dependency tracking.
//!
//! Each run of the body records exactly the behaviors it sampled through the
//! [`MomentCtx`] token. The recorded set is diffed against the previous one:
//! newly-read behaviors gain a wake subscription, behaviors no longer read
//! lose theirs. Any push from a tracked dependency re-runs the body, the
//! same rule a spreadsheet uses to recalculate. This is the only node whose parent set
//! changes shape over its lifetime.

use super::Behavior;
use crate::{
    error::SampleError,
    graph::{
        broadcast, broadcast_state, deliver_to, AnySource, AnySubscriber, BehaviorSource,
        ErasedSource, NodeState, PushCell, Source, SubscriberKey, SubscriberSet, WakeSubscriber,
    },
    tick::Tick,
};
use indexmap::IndexMap;
use or_poisoned::OrPoisoned;
use rustc_hash::FxHasher;
use std::{
    hash::BuildHasherDefault,
    sync::{Arc, RwLock, Weak},
};

type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// The sample token handed to a `moment` body.
///
/// Every [`sample`](MomentCtx::sample) records the behavior as a dependency
/// of the enclosing `moment` for this evaluation.
pub struct MomentCtx {
    t: Tick,
    reads: Vec<AnySource>,
}

impl MomentCtx {
    /// Samples `behavior` at the moment's tick and records the dependency.
    ///
    /// # Panics
    /// Panics if the behavior cannot be sampled (an unreplaced placeholder,
    /// or a push source with no value yet), unwinding the tick.
    pub fn sample<B: Clone + Send + Sync + 'static>(&mut self, behavior: &Behavior<B>) -> B {
        self.reads.push(behavior.any_source());
        super::sample_or_unwind(&behavior.node, self.t)
    }
}

struct Link<A> {
    deps: FxIndexMap<usize, (AnySource, SubscriberKey)>,
    active: bool,
    state: NodeState,
    cell: PushCell<A>,
}

pub(crate) struct MomentBehavior<A> {
    this: Weak<Self>,
    body: Box<dyn Fn(&mut MomentCtx) -> A + Send + Sync>,
    listeners: RwLock<SubscriberSet<A>>,
    link: RwLock<Link<A>>,
}

impl<A: Clone + Send + Sync + 'static> MomentBehavior<A> {
    pub(crate) fn new(body: impl Fn(&mut MomentCtx) -> A + Send + Sync + 'static) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            body: Box::new(body),
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(Link {
                deps: FxIndexMap::default(),
                active: false,
                state: NodeState::Inactive,
                cell: PushCell::default(),
            }),
        })
    }

    /// Runs the body, and while active, re-targets the wake subscriptions at
    /// exactly the set of behaviors this run sampled.
    fn evaluate(&self, t: Tick) -> A {
        let mut ctx = MomentCtx {
            t,
            reads: Vec::new(),
        };
        let value = (self.body)(&mut ctx);
        if self.link.read().or_poisoned().active {
            self.retarget(ctx.reads, t);
        }
        value
    }

    fn retarget(&self, reads: Vec<AnySource>, t: Tick) {
        let wake = self.this.clone() as Weak<dyn WakeSubscriber>;
        let mut fresh: FxIndexMap<usize, AnySource> = FxIndexMap::default();
        for read in reads {
            fresh.entry(read.id).or_insert(read);
        }
        // Diff under the lock, subscribe and unsubscribe outside it.
        let (stale, missing) = {
            let link = self.link.read().or_poisoned();
            let stale: Vec<(AnySource, SubscriberKey)> = link
                .deps
                .values()
                .filter(|(src, _)| !fresh.contains_key(&src.id))
                .cloned()
                .collect();
            let missing: Vec<AnySource> = fresh
                .values()
                .filter(|src| !link.deps.contains_key(&src.id))
                .cloned()
                .collect();
            (stale, missing)
        };
        let added: Vec<(usize, AnySource, SubscriberKey)> = missing
            .into_iter()
            .map(|src| {
                let (key, _) = src.source.attach_wake(wake.clone(), t);
                (src.id, src, key)
            })
            .collect();
        {
            let mut link = self.link.write().or_poisoned();
            link.deps.retain(|id, _| fresh.contains_key(id));
            for (id, src, key) in added {
                link.deps.insert(id, (src, key));
            }
        }
        for (src, key) in stale {
            src.source.detach(key);
        }
        self.refresh_state(t);
    }

    fn refresh_state(&self, t: Tick) {
        let next = {
            let link = self.link.read().or_poisoned();
            if !link.active {
                NodeState::Inactive
            } else if link
                .deps
                .values()
                .any(|(src, _)| src.source.erased_state() == NodeState::Push)
            {
                NodeState::Push
            } else {
                NodeState::Pull
            }
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
        self.link.write().or_poisoned().active = true;
        let value = self.evaluate(t);
        let state = self.state();
        if state == NodeState::Push {
            self.link.write().or_poisoned().cell.set(t, value);
        }
    }

    fn deactivate(&self) {
        let deps = {
            let mut link = self.link.write().or_poisoned();
            link.active = false;
            link.state = NodeState::Inactive;
            link.cell.clear();
            std::mem::take(&mut link.deps)
        };
        for (_, (src, key)) in deps {
            src.source.detach(key);
        }
    }
}

impl<A: Clone + Send + Sync + 'static> WakeSubscriber for MomentBehavior<A> {
    fn wake(&self, t: Tick) {
        let value = self.evaluate(t);
        self.link.write().or_poisoned().cell.set(t, value.clone());
        broadcast(&self.listeners, t, &value);
    }

    fn wake_state_changed(&self, t: Tick, _parent: NodeState) {
        self.refresh_state(t);
    }
}

impl<A: Clone + Send + Sync + 'static> Source<A> for MomentBehavior<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
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

impl<A: Clone + Send + Sync + 'static> BehaviorSource<A> for MomentBehavior<A> {
    fn sample(&self, t: Tick) -> Result<A, SampleError> {
        Ok(self.evaluate(t))
    }
}
