//! Single-occurrence reactives.
//!
//! A [`Future`] resolves at most once and is terminal afterwards: it
//! unsubscribes from its parents, and any listener that arrives later is
//! fired immediately with the stored value. Unlike a
//! [`std::future::Future`], nothing polls it: resolution pushes through the
//! graph like any other occurrence. The [`from_future`](Future::from_future)
//! bridge connects the two worlds through the process executor.

use crate::{
    behavior::Behavior,
    graph::{
        broadcast, deliver_to, AnySubscriber, NodeState, Source, Subscriber, SubscriberKey,
        SubscriberSet,
    },
    observe::{CallbackNode, Subscription},
    stream::Stream,
    tick::Tick,
};
use or_poisoned::OrPoisoned;
use std::sync::{Arc, RwLock, Weak};

/// The listener list and resolution cell shared by every future node.
struct FutureCore<A> {
    listeners: RwLock<SubscriberSet<A>>,
    resolution: RwLock<Resolution<A>>,
}

struct Resolution<A> {
    value: Option<A>,
    done: bool,
}

impl<A: Clone + Send + Sync + 'static> FutureCore<A> {
    fn new() -> Self {
        Self {
            listeners: RwLock::new(SubscriberSet::new()),
            resolution: RwLock::new(Resolution {
                value: None,
                done: false,
            }),
        }
    }

    fn pre_resolved(value: Option<A>) -> Self {
        Self {
            listeners: RwLock::new(SubscriberSet::new()),
            resolution: RwLock::new(Resolution { value, done: true }),
        }
    }

    fn is_done(&self) -> bool {
        self.resolution.read().or_poisoned().done
    }

    /// Stores the value and fans it out. Returns `false` if already done:
    /// a second resolution is silently ignored.
    fn resolve(&self, t: Tick, value: A) -> bool {
        {
            let mut resolution = self.resolution.write().or_poisoned();
            if resolution.done {
                return false;
            }
            resolution.value = Some(value.clone());
            resolution.done = true;
        }
        broadcast(&self.listeners, t, &value);
        true
    }

    fn add(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, bool) {
        let (key, was_empty) = {
            let mut listeners = self.listeners.write().or_poisoned();
            let was_empty = listeners.is_empty();
            (listeners.subscribe(sub, t), was_empty)
        };
        let replay = self.resolution.read().or_poisoned().value.clone();
        if let Some(value) = replay {
            deliver_to(&self.listeners, key, t, &value);
        }
        (key, was_empty)
    }

    fn remove(&self, key: SubscriberKey) -> bool {
        let mut listeners = self.listeners.write().or_poisoned();
        listeners.unsubscribe(key);
        listeners.is_empty()
    }

    fn state(&self, active: bool) -> NodeState {
        if self.is_done() {
            NodeState::Done
        } else if active {
            NodeState::Push
        } else {
            NodeState::Inactive
        }
    }
}

/// A sink future: resolvable from outside. Also backs `of` and `never`.
struct SinkFuture<A> {
    core: FutureCore<A>,
}

impl<A: Clone + Send + Sync + 'static> Source<A> for SinkFuture<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, _) = self.core.add(sub, t);
        (key, self.core.state(true))
    }

    fn remove_listener(&self, key: SubscriberKey) {
        self.core.remove(key);
    }

    fn state(&self) -> NodeState {
        self.core.state(true)
    }
}

/// Resolves earliest-first between two parents.
struct CombineFuture<A> {
    this: Weak<Self>,
    left: Arc<dyn Source<A>>,
    right: Arc<dyn Source<A>>,
    core: FutureCore<A>,
    keys: RwLock<(Option<SubscriberKey>, Option<SubscriberKey>)>,
}

impl<A: Clone + Send + Sync + 'static> CombineFuture<A> {
    fn new(left: Arc<dyn Source<A>>, right: Arc<dyn Source<A>>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            left,
            right,
            core: FutureCore::new(),
            keys: RwLock::new((None, None)),
        })
    }

    fn detach_parents(&self) {
        let (left_key, right_key) = {
            let mut keys = self.keys.write().or_poisoned();
            (keys.0.take(), keys.1.take())
        };
        if let Some(key) = left_key {
            self.left.remove_listener(key);
        }
        if let Some(key) = right_key {
            self.right.remove_listener(key);
        }
    }
}

impl<A: Clone + Send + Sync + 'static> Subscriber<A> for CombineFuture<A> {
    fn push(&self, t: Tick, value: &A) {
        if self.core.resolve(t, value.clone()) {
            self.detach_parents();
        }
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A: Clone + Send + Sync + 'static> Source<A> for CombineFuture<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, was_empty) = self.core.add(sub, t);
        if was_empty && !self.core.is_done() {
            let me = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<A>>);
            let (left_key, _) = self.left.add_listener(me.clone(), t);
            self.keys.write().or_poisoned().0 = Some(left_key);
            // The left handshake may already have resolved us.
            if self.core.is_done() {
                self.detach_parents();
            } else {
                let (right_key, _) = self.right.add_listener(me, t);
                self.keys.write().or_poisoned().1 = Some(right_key);
                if self.core.is_done() {
                    self.detach_parents();
                }
            }
        }
        (key, self.core.state(true))
    }

    fn remove_listener(&self, key: SubscriberKey) {
        if self.core.remove(key) && !self.core.is_done() {
            self.detach_parents();
        }
    }

    fn state(&self) -> NodeState {
        let active = self.keys.read().or_poisoned().0.is_some();
        self.core.state(active)
    }
}

/// Two-stage resolution: once the outer future produces a value, subscribe
/// to the future `f` derives from it, and resolve with that one's value.
struct FlatMapFuture<A, B> {
    this: Weak<Self>,
    outer: Arc<dyn Source<A>>,
    f: Box<dyn Fn(&A) -> Future<B> + Send + Sync>,
    port: Arc<FlatMapPort<A, B>>,
    core: FutureCore<B>,
    #[allow(clippy::type_complexity)]
    link: RwLock<(
        Option<SubscriberKey>,
        Option<(Arc<dyn Source<B>>, SubscriberKey)>,
    )>,
}

struct FlatMapPort<A, B> {
    owner: Weak<FlatMapFuture<A, B>>,
}

impl<A, B> Subscriber<B> for FlatMapPort<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn push(&self, t: Tick, value: &B) {
        if let Some(owner) = self.owner.upgrade() {
            if owner.core.resolve(t, value.clone()) {
                owner.detach_parents();
            }
        }
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A, B> FlatMapFuture<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn new(
        outer: Arc<dyn Source<A>>,
        f: impl Fn(&A) -> Future<B> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            outer,
            f: Box::new(f),
            port: Arc::new(FlatMapPort {
                owner: this.clone(),
            }),
            core: FutureCore::new(),
            link: RwLock::new((None, None)),
        })
    }

    fn detach_parents(&self) {
        let (outer_key, inner) = {
            let mut link = self.link.write().or_poisoned();
            (link.0.take(), link.1.take())
        };
        if let Some(key) = outer_key {
            self.outer.remove_listener(key);
        }
        if let Some((inner_source, key)) = inner {
            inner_source.remove_listener(key);
        }
    }
}

impl<A, B> Subscriber<A> for FlatMapFuture<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn push(&self, t: Tick, value: &A) {
        let inner = (self.f)(value);
        let sub = AnySubscriber::Value(
            Arc::downgrade(&self.port) as Weak<dyn Subscriber<B>>
        );
        let (key, _) = inner.node.add_listener(sub, t);
        if self.core.is_done() {
            // Resolved through the inner's handshake during add_listener.
            inner.node.remove_listener(key);
            self.detach_parents();
        } else {
            self.link.write().or_poisoned().1 = Some((inner.node.clone(), key));
        }
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A, B> Source<B> for FlatMapFuture<A, B>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    fn add_listener(&self, sub: AnySubscriber<B>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, was_empty) = self.core.add(sub, t);
        if was_empty && !self.core.is_done() {
            let me = AnySubscriber::Value(self.this.clone() as Weak<dyn Subscriber<A>>);
            let (outer_key, _) = self.outer.add_listener(me, t);
            if self.core.is_done() {
                self.outer.remove_listener(outer_key);
            } else {
                self.link.write().or_poisoned().0 = Some(outer_key);
            }
        }
        (key, self.core.state(true))
    }

    fn remove_listener(&self, key: SubscriberKey) {
        if self.core.remove(key) && !self.core.is_done() {
            self.detach_parents();
        }
    }

    fn state(&self) -> NodeState {
        let active = {
            let link = self.link.read().or_poisoned();
            link.0.is_some() || link.1.is_some()
        };
        self.core.state(active)
    }
}

/// Resolves on the first stream occurrence strictly after its creation
/// tick. Eager: it listens from the moment it exists, so the next
/// occurrence is caught whether or not the future itself is observed.
struct NextOccurrenceFuture<A> {
    stream: Arc<dyn Source<A>>,
    core: FutureCore<A>,
    key: RwLock<Option<SubscriberKey>>,
}

impl<A: Clone + Send + Sync + 'static> NextOccurrenceFuture<A> {
    fn new(stream: Arc<dyn Source<A>>, t: Tick) -> Arc<Self> {
        let future = Arc::new(Self {
            stream: stream.clone(),
            core: FutureCore::new(),
            key: RwLock::new(None),
        });
        let sub = AnySubscriber::Value(Arc::downgrade(&future) as Weak<dyn Subscriber<A>>);
        let (key, _) = stream.add_listener(sub, t);
        *future.key.write().or_poisoned() = Some(key);
        future
    }

    fn detach(&self) {
        let key = self.key.write().or_poisoned().take();
        if let Some(key) = key {
            self.stream.remove_listener(key);
        }
    }
}

impl<A> Drop for NextOccurrenceFuture<A> {
    fn drop(&mut self) {
        if let Ok(mut key) = self.key.write() {
            if let Some(key) = key.take() {
                self.stream.remove_listener(key);
            }
        }
    }
}

impl<A: Clone + Send + Sync + 'static> Subscriber<A> for NextOccurrenceFuture<A> {
    fn push(&self, t: Tick, value: &A) {
        if self.core.resolve(t, value.clone()) {
            self.detach();
        }
    }

    fn state_changed(&self, _t: Tick, _parent: NodeState) {}
}

impl<A: Clone + Send + Sync + 'static> Source<A> for NextOccurrenceFuture<A> {
    fn add_listener(&self, sub: AnySubscriber<A>, t: Tick) -> (SubscriberKey, NodeState) {
        let (key, _) = self.core.add(sub, t);
        (key, self.core.state(true))
    }

    fn remove_listener(&self, key: SubscriberKey) {
        self.core.remove(key);
    }

    fn state(&self) -> NodeState {
        self.core.state(true)
    }
}

/// A value that arrives at most once.
pub struct Future<A> {
    pub(crate) node: Arc<dyn Source<A>>,
}

impl<A> Clone for Future<A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A> std::fmt::Debug for Future<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("type", &std::any::type_name::<A>())
            .field("node", &(Arc::as_ptr(&self.node) as *const ()))
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> Future<A> {
    /// An already-resolved future.
    pub fn of(value: A) -> Future<A> {
        Future {
            node: Arc::new(SinkFuture {
                core: FutureCore::pre_resolved(Some(value)),
            }),
        }
    }

    /// A future that never resolves.
    pub fn never() -> Future<A> {
        Future {
            node: Arc::new(SinkFuture {
                core: FutureCore::pre_resolved(None),
            }),
        }
    }

    /// An externally-resolvable future and its resolver.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn sink() -> (Future<A>, FutureResolver<A>) {
        let node = Arc::new(SinkFuture {
            core: FutureCore::new(),
        });
        (
            Future {
                node: node.clone(),
            },
            FutureResolver { node },
        )
    }

    /// Bridges a [`std::future::Future`] into the graph via the process
    /// executor. Resolution re-enters as a fresh tick; a task that never
    /// completes simply never resolves.
    pub fn from_future(fut: impl std::future::Future<Output = A> + Send + 'static) -> Future<A> {
        let (future, resolver) = Future::sink();
        any_spawner::Executor::spawn(async move {
            resolver.resolve(fut.await);
        });
        future
    }

    /// Applies `f` to the resolution.
    pub fn map<B: Clone + Send + Sync + 'static>(
        &self,
        f: impl Fn(&A) -> B + Send + Sync + 'static,
    ) -> Future<B> {
        self.flat_map(move |a| Future::of(f(a)))
    }

    /// Replaces the resolution with `value`.
    pub fn map_to<B: Clone + Send + Sync + 'static>(&self, value: B) -> Future<B> {
        self.map(move |_| value.clone())
    }

    /// Resolves with whichever of the two resolves first; both parents are
    /// released once one wins.
    pub fn combine(&self, other: &Future<A>) -> Future<A> {
        Future {
            node: CombineFuture::new(self.node.clone(), other.node.clone()),
        }
    }

    /// Combines two futures' resolutions through `f`, resolving once both
    /// have arrived.
    pub fn lift2<X, Y, F>(f: F, x: &Future<X>, y: &Future<Y>) -> Future<A>
    where
        X: Clone + Send + Sync + 'static,
        Y: Clone + Send + Sync + 'static,
        F: Fn(&X, &Y) -> A + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let y = y.clone();
        x.flat_map(move |xv| {
            let f = Arc::clone(&f);
            let xv = X::clone(xv);
            y.map(move |yv| f(&xv, yv))
        })
    }

    /// Combines three futures' resolutions through `f`.
    pub fn lift3<X, Y, Z, F>(f: F, x: &Future<X>, y: &Future<Y>, z: &Future<Z>) -> Future<A>
    where
        X: Clone + Send + Sync + 'static,
        Y: Clone + Send + Sync + 'static,
        Z: Clone + Send + Sync + 'static,
        F: Fn(&X, &Y, &Z) -> A + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let y = y.clone();
        let z = z.clone();
        x.flat_map(move |xv| {
            let f = Arc::clone(&f);
            let z = z.clone();
            let xv = X::clone(xv);
            y.flat_map(move |yv| {
                let f = Arc::clone(&f);
                let xv = xv.clone();
                let yv = Y::clone(yv);
                z.map(move |zv| f(&xv, &yv, zv))
            })
        })
    }

    /// Resolves with the future `f` derives from this one's resolution.
    pub fn flat_map<B: Clone + Send + Sync + 'static>(
        &self,
        f: impl Fn(&A) -> Future<B> + Send + Sync + 'static,
    ) -> Future<B> {
        Future {
            node: FlatMapFuture::new(self.node.clone(), f),
        }
    }

    /// A behavior whose every sample is a future resolving on the first
    /// `stream` occurrence strictly after the sample tick.
    pub fn next_occurrence(stream: &Stream<A>) -> Behavior<Future<A>> {
        let stream = stream.node.clone();
        Behavior::from_fn_tick(move |t| Future {
            node: NextOccurrenceFuture::new(stream.clone(), t),
        })
    }

    /// Registers a callback for the resolution. If already resolved, the
    /// callback fires immediately.
    pub fn subscribe(&self, f: impl Fn(&A) + Send + Sync + 'static) -> Subscription {
        let node = CallbackNode::new(f);
        let t = Tick::now();
        let (key, _) = self.node.add_listener(AnySubscriber::Observer(node), t);
        let source = self.node.clone();
        Subscription::new(move || source.remove_listener(key))
    }
}

/// The resolving half of a sink future.
pub struct FutureResolver<A> {
    node: Arc<SinkFuture<A>>,
}

impl<A> Clone for FutureResolver<A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A> std::fmt::Debug for FutureResolver<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutureResolver")
            .field("type", &std::any::type_name::<A>())
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> FutureResolver<A> {
    /// Resolves the future. A second call is silently ignored.
    pub fn resolve(&self, value: A) {
        let t = Tick::advance();
        self.node.core.resolve(t, value);
    }
}
