//! Discrete event streams.
//!
//! A [`Stream`] is a reactive with no current value: it emits occurrences at
//! ticks, and combinators transform the occurrence timeline. Streams are
//! cheap to clone (they share the underlying node) and are inert until
//! something subscribes to them: the first listener activates the node and
//! its whole upstream chain, the last removal deactivates it again.
//!
//! ```
//! use pushpull::stream::Stream;
//!
//! let (numbers, sink) = Stream::sink();
//! let doubled = numbers.map(|n: &i32| n * 2);
//! let seen = std::sync::Arc::new(std::sync::RwLock::new(Vec::new()));
//! let sub = doubled.subscribe({
//!     let seen = seen.clone();
//!     move |n| seen.write().unwrap().push(*n)
//! });
//! sink.push(3);
//! sink.push(5);
//! assert_eq!(*seen.read().unwrap(), vec![6, 10]);
//! sub.deactivate();
//! ```

mod merge;
mod sink;
mod switch;
mod transform;
mod timing;

pub use sink::{StreamProducerHandle, StreamSink};

use crate::{
    behavior::{sample_or_unwind, Behavior},
    graph::{AnySubscriber, Source},
    observe::{CallbackNode, Subscription},
    scheduler::Scheduler,
    tick::Tick,
    Deactivator,
};
use merge::MergeStream;
use or_poisoned::OrPoisoned;
use sink::{ProducerStream, SinkStream};
use std::{
    sync::{Arc, RwLock},
    time::Duration,
};
use switch::SwitchStream;
use timing::{TimingOp, TimingStream};
use transform::TransformStream;

/// A discrete sequence of occurrences.
pub struct Stream<A> {
    pub(crate) node: Arc<dyn Source<A>>,
}

impl<A> Clone for Stream<A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A> std::fmt::Debug for Stream<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("type", &std::any::type_name::<A>())
            .field("node", &(Arc::as_ptr(&self.node) as *const ()))
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> Stream<A> {
    pub(crate) fn from_node(node: Arc<dyn Source<A>>) -> Self {
        Self { node }
    }

    /// An externally-driven stream and its write half.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn sink() -> (Stream<A>, StreamSink<A>) {
        let node = SinkStream::new();
        (
            Stream::from_node(node.clone()),
            StreamSink { node },
        )
    }

    /// A stream that never emits.
    pub fn empty() -> Stream<A> {
        Stream::from_node(SinkStream::new())
    }

    /// A stream wrapping an external push source.
    ///
    /// `activate` runs when the first listener arrives; it receives a push
    /// handle and returns the deactivator that runs when the last listener
    /// leaves.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn producer(
        activate: impl Fn(StreamProducerHandle<A>) -> Deactivator + Send + Sync + 'static,
    ) -> Stream<A> {
        Stream::from_node(ProducerStream::new(activate))
    }

    /// Applies `f` to every occurrence.
    pub fn map<B: Clone + Send + Sync + 'static>(
        &self,
        f: impl Fn(&A) -> B + Send + Sync + 'static,
    ) -> Stream<B> {
        Stream::from_node(TransformStream::new(
            self.node.clone(),
            Vec::new(),
            move |_, a| Some(f(a)),
        ))
    }

    /// Replaces every occurrence with `value`.
    pub fn map_to<B: Clone + Send + Sync + 'static>(&self, value: B) -> Stream<B> {
        self.map(move |_| value.clone())
    }

    /// Keeps the occurrences satisfying `predicate`.
    pub fn filter(&self, predicate: impl Fn(&A) -> bool + Send + Sync + 'static) -> Stream<A> {
        Stream::from_node(TransformStream::new(
            self.node.clone(),
            Vec::new(),
            move |_, a| predicate(a).then(|| a.clone()),
        ))
    }

    /// Keeps the occurrences satisfying the predicate currently held by
    /// `predicate`, sampled at the occurrence's tick.
    pub fn filter_apply<P>(&self, predicate: &Behavior<P>) -> Stream<A>
    where
        P: Fn(&A) -> bool + Clone + Send + Sync + 'static,
    {
        let node = predicate.node.clone();
        Stream::from_node(TransformStream::new(
            self.node.clone(),
            vec![predicate.any_source()],
            move |t, a| sample_or_unwind(&node, t)(a).then(|| a.clone()),
        ))
    }

    /// Keeps the occurrences arriving while `gate` holds `true`.
    pub fn keep_when(&self, gate: &Behavior<bool>) -> Stream<A> {
        let node = gate.node.clone();
        Stream::from_node(TransformStream::new(
            self.node.clone(),
            vec![gate.any_source()],
            move |t, a| sample_or_unwind(&node, t).then(|| a.clone()),
        ))
    }

    /// Folds occurrences through an accumulator, emitting each intermediate
    /// result. The accumulator lives with the stream, not per subscriber.
    pub fn scan_s<S: Clone + Send + Sync + 'static>(
        &self,
        f: impl Fn(&A, &S) -> S + Send + Sync + 'static,
        initial: S,
    ) -> Stream<S> {
        let acc = RwLock::new(initial);
        Stream::from_node(TransformStream::new(
            self.node.clone(),
            Vec::new(),
            move |_, a| {
                let mut acc = acc.write().or_poisoned();
                let next = f(a, &acc);
                *acc = next.clone();
                Some(next)
            },
        ))
    }

    /// Interleaves the occurrences of two streams.
    pub fn merge(&self, other: &Stream<A>) -> Stream<A> {
        Stream::combine([self.clone(), other.clone()])
    }

    /// Interleaves the occurrences of any number of streams.
    pub fn combine(streams: impl IntoIterator<Item = Stream<A>>) -> Stream<A> {
        let parents = streams.into_iter().map(|s| s.node).collect();
        Stream::from_node(MergeStream::new(parents))
    }

    /// Emits `behavior`'s value, sampled at each occurrence's tick. The
    /// occurrence's own value is discarded.
    pub fn snapshot<B: Clone + Send + Sync + 'static>(
        &self,
        behavior: &Behavior<B>,
    ) -> Stream<B> {
        let node = behavior.node.clone();
        Stream::from_node(TransformStream::new(
            self.node.clone(),
            vec![behavior.any_source()],
            move |t, _| Some(sample_or_unwind(&node, t)),
        ))
    }

    /// Emits `f` applied to each occurrence and `behavior`'s value at the
    /// occurrence's tick.
    pub fn snapshot_with<B, C>(
        &self,
        f: impl Fn(&A, &B) -> C + Send + Sync + 'static,
        behavior: &Behavior<B>,
    ) -> Stream<C>
    where
        B: Clone + Send + Sync + 'static,
        C: Clone + Send + Sync + 'static,
    {
        let node = behavior.node.clone();
        Stream::from_node(TransformStream::new(
            self.node.clone(),
            vec![behavior.any_source()],
            move |t, a| Some(f(a, &sample_or_unwind(&node, t))),
        ))
    }

    /// Partitions into `(matching, rest)` by `predicate`. Each occurrence
    /// appears on exactly one side.
    pub fn split(
        &self,
        predicate: impl Fn(&A) -> bool + Send + Sync + 'static,
    ) -> (Stream<A>, Stream<A>) {
        let predicate = Arc::new(predicate);
        let matching = {
            let predicate = predicate.clone();
            self.filter(move |a| predicate(a))
        };
        let rest = self.filter(move |a| !predicate(a));
        (matching, rest)
    }

    /// A stream that follows whichever stream `selector` currently holds,
    /// detaching from the old inner stream and attaching to the new one on
    /// every selector update.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn switch(selector: &Behavior<Stream<A>>) -> Stream<A> {
        Stream::from_node(SwitchStream::new(selector.node.clone()))
    }

    /// Re-emits every occurrence `after` the given duration, via the
    /// platform scheduler. Each delayed emission is a fresh tick.
    pub fn delay(&self, after: Duration, scheduler: Arc<dyn Scheduler>) -> Stream<A> {
        Stream::from_node(TimingStream::new(
            self.node.clone(),
            scheduler,
            after,
            TimingOp::Delay,
        ))
    }

    /// Emits an occurrence, then drops further occurrences for `window`.
    pub fn throttle(&self, window: Duration, scheduler: Arc<dyn Scheduler>) -> Stream<A> {
        Stream::from_node(TimingStream::new(
            self.node.clone(),
            scheduler,
            window,
            TimingOp::Throttle,
        ))
    }

    /// Emits the most recent occurrence once the stream has been quiet for
    /// `quiet`.
    pub fn debounce(&self, quiet: Duration, scheduler: Arc<dyn Scheduler>) -> Stream<A> {
        Stream::from_node(TimingStream::new(
            self.node.clone(),
            scheduler,
            quiet,
            TimingOp::Debounce,
        ))
    }

    /// Bridges into an asynchronous [`futures::Stream`].
    ///
    /// Every occurrence is forwarded into an unbounded channel; the returned
    /// receiver yields them in order. The accompanying [`Subscription`]
    /// keeps the upstream chain active and closes the channel when
    /// deactivated.
    pub fn to_async(
        &self,
    ) -> (
        futures::channel::mpsc::UnboundedReceiver<A>,
        Subscription,
    ) {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        let subscription = self.subscribe(move |value: &A| {
            _ = tx.unbounded_send(value.clone());
        });
        (rx, subscription)
    }

    /// Registers a push callback. The subscription keeps the upstream chain
    /// active until [`deactivate`](Subscription::deactivate) is called.
    pub fn subscribe(&self, f: impl Fn(&A) + Send + Sync + 'static) -> Subscription {
        let node = CallbackNode::new(f);
        let t = Tick::now();
        let (key, _) = self.node.add_listener(AnySubscriber::Observer(node), t);
        let source = self.node.clone();
        Subscription::new(move || source.remove_listener(key))
    }
}
