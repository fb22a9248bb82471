//! Time-shifting combinators built on the external [`Scheduler`] hook.
//!
//! None of these nodes block: occurrences are handed to the scheduler and
//! re-enter the graph as fresh ticks when the platform fires the timer.
//! Pending timers are cleared when the node deactivates.

use crate::{
    graph::{
        broadcast, AnySubscriber, NodeState, Source, Subscriber, SubscriberKey, SubscriberSet,
    },
    scheduler::{Scheduler, TimerHandle},
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::{
    sync::{Arc, RwLock, Weak},
    time::Duration,
};

/// Which reshaping of the occurrence timeline a timing node applies.
pub(crate) enum TimingOp {
    /// Re-emit every occurrence after the duration.
    Delay,
    /// Emit immediately, then silence further occurrences for the duration.
    Throttle,
    /// Emit the most recent occurrence once the stream has been quiet for
    /// the duration.
    Debounce,
}

struct Link<A> {
    parent_key: Option<SubscriberKey>,
    timers: Vec<(u64, TimerHandle)>,
    next_timer: u64,
    silenced: bool,
    latest: Option<A>,
}

pub(crate) struct TimingStream<A> {
    this: Weak<Self>,
    parent: Arc<dyn Source<A>>,
    scheduler: Arc<dyn Scheduler>,
    duration: Duration,
    op: TimingOp,
    listeners: RwLock<SubscriberSet<A>>,
    link: RwLock<Link<A>>,
}

impl<A: Clone + Send + Sync + 'static> TimingStream<A> {
    pub(crate) fn new(
        parent: Arc<dyn Source<A>>,
        scheduler: Arc<dyn Scheduler>,
        duration: Duration,
        op: TimingOp,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            parent,
            scheduler,
            duration,
            op,
            listeners: RwLock::new(SubscriberSet::new()),
            link: RwLock::new(Link {
                parent_key: None,
                timers: Vec::new(),
                next_timer: 0,
                silenced: false,
                latest: None,
            }),
        })
    }

    fn schedule(
        &self,
        task: impl FnOnce(Arc<Self>) + Send + Sync + 'static,
    ) -> (u64, TimerHandle) {
        let id = {
            let mut link = self.link.write().or_poisoned();
            link.next_timer += 1;
            link.next_timer
        };
        let owner = self.this.clone();
        let handle = self.scheduler.schedule(
            self.duration,
            Box::new(move || {
                if let Some(node) = owner.upgrade() {
                    node.link
                        .write()
                        .or_poisoned()
                        .timers
                        .retain(|(timer_id, _)| *timer_id != id);
                    task(node);
                }
            }),
        );
        (id, handle)
    }

    fn activate(&self, t: Tick) {
        let sub = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<A>>);
        let (key, _) = self.parent.add_listener(sub, t);
        self.link.write().or_poisoned().parent_key = Some(key);
    }

    fn deactivate(&self) {
        let (parent_key, timers) = {
            let mut link = self.link.write().or_poisoned();
            link.silenced = false;
            link.latest = None;
            (link.parent_key.take(), std::mem::take(&mut link.timers))
        };
        if let Some(key) = parent_key {
            self.parent.remove_listener(key);
        }
        for (_, handle) in timers {
            handle.cancel();
        }
    }
}

impl<A: Clone + Send + Sync + 'static> Subscriber<A> for TimingStream<A> {
    fn push(&self, t: Tick, value: &A) {
        match self.op {
            TimingOp::Delay => {
                let value = value.clone();
                let timer = self.schedule(move |node| {
                    let t = Tick::advance();
                    broadcast(&node.listeners, t, &value);
                });
                self.link.write().or_poisoned().timers.push(timer);
            }
            TimingOp::Throttle => {
                let open = {
                    let mut link = self.link.write().or_poisoned();
                    if link.silenced {
                        false
                    } else {
                        link.silenced = true;
                        true
                    }
                };
                if open {
                    broadcast(&self.listeners, t, value);
                    let timer = self.schedule(|node| {
                        node.link.write().or_poisoned().silenced = false;
                    });
                    self.link.write().or_poisoned().timers.push(timer);
                }
            }
            TimingOp::Debounce => {
                let stale = {
                    let mut link = self.link.write().or_poisoned();
                    link.latest = Some(value.clone());
                    std::mem::take(&mut link.timers)
                };
                for (_, handle) in stale {
                    handle.cancel();
                }
                let timer = self.schedule(|node| {
                    let latest = node.link.write().or_poisoned().latest.take();
                    if let Some(latest) = latest {
                        let t = Tick::advance();
                        broadcast(&node.listeners, t, &latest);
                    }
                });
                self.link.write().or_poisoned().timers.push(timer);
            }
        }
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A: Clone + Send + Sync + 'static> Source<A> for TimingStream<A> {
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
