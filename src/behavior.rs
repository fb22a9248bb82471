//! Time-varying values.
//!
//! A [`Behavior`] always has a current value. Depending on where the value
//! comes from, the node lives in push mode (parents notify it and it holds
//! its latest value) or pull mode (sampling recomputes it on demand); the
//! runtime renegotiates the mode as the graph changes shape, and observers
//! at the boundary are told when to switch through
//! [`observe`](Behavior::observe).
//!
//! ```
//! use pushpull::{behavior::Behavior, stream::Stream};
//!
//! let (clicks, sink) = Stream::sink();
//! let count = Behavior::stepper(0, &clicks.scan_s(|_: &(), n| n + 1, 0));
//! let label = count.map(|n| format!("{n} clicks"));
//! let sub = label.subscribe(|_| {});
//! sink.push(());
//! assert_eq!(label.at(), "1 clicks");
//! sub.deactivate();
//! ```

mod chain;
mod constant;
mod lift;
mod map;
mod moment;
mod sink;
mod stepper;
mod switcher;

pub use moment::MomentCtx;
pub use sink::{BehaviorProducerHandle, BehaviorSink};

use crate::{
    error::SampleError,
    graph::{AnySource, AnySubscriber, BehaviorSource, ErasedBehavior},
    observe::{ObserverNode, Subscription},
    stream::Stream,
    tick::Tick,
    Deactivator,
};
use chain::ChainBehavior;
use constant::{ConstBehavior, FnBehavior};
use lift::{Lift2Behavior, Lift3Behavior};
use map::MapBehavior;
use moment::MomentBehavior;
use sink::{ProducerBehavior, SinkBehavior};
use std::sync::Arc;
use stepper::{ActiveScan, IntegrateBehavior, StepperBehavior};
use switcher::SwitcherBehavior;

/// Samples a behavior mid-propagation, unwinding the tick on failure.
pub(crate) fn sample_or_unwind<A: Clone + Send + Sync + 'static>(
    node: &Arc<dyn BehaviorSource<A>>,
    t: Tick,
) -> A {
    node.sample(t)
        .unwrap_or_else(|e| panic!("cannot sample behavior: {e}"))
}

/// A value that varies over time.
pub struct Behavior<A> {
    pub(crate) node: Arc<dyn BehaviorSource<A>>,
}

impl<A> Clone for Behavior<A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
        }
    }
}

impl<A> std::fmt::Debug for Behavior<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Behavior")
            .field("type", &std::any::type_name::<A>())
            .field("node", &(Arc::as_ptr(&self.node) as *const ()))
            .finish()
    }
}

impl<A: Clone + Send + Sync + 'static> Behavior<A> {
    pub(crate) fn from_node(node: Arc<dyn BehaviorSource<A>>) -> Self {
        Self { node }
    }

    pub(crate) fn any_source(&self) -> AnySource {
        AnySource {
            id: Arc::as_ptr(&self.node) as *const () as usize,
            source: Arc::new(ErasedBehavior(self.node.clone())),
        }
    }

    /// A behavior that always holds `value`. Pull-only: it can never switch
    /// to push mode.
    pub fn of(value: A) -> Behavior<A> {
        Behavior::from_node(ConstBehavior::new(value))
    }

    /// A behavior whose value is recomputed by `f` at every sample.
    pub fn from_fn(f: impl Fn() -> A + Send + Sync + 'static) -> Behavior<A> {
        Behavior::from_node(FnBehavior::new(move |_| f()))
    }

    pub(crate) fn from_fn_tick(f: impl Fn(Tick) -> A + Send + Sync + 'static) -> Behavior<A> {
        Behavior::from_node(FnBehavior::new(f))
    }

    /// An imperatively-written behavior and its write half. Always active
    /// and always push-mode.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn sink(initial: A) -> (Behavior<A>, BehaviorSink<A>) {
        let node = SinkBehavior::new(initial);
        (
            Behavior::from_node(node.clone()),
            BehaviorSink { node },
        )
    }

    /// A behavior wrapping an external push source.
    ///
    /// `activate` runs when the first listener arrives; it receives a push
    /// handle and returns the deactivator that runs when the last listener
    /// leaves. Sampling before the source's first push is
    /// [`SampleError::NoValue`].
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn producer(
        activate: impl Fn(BehaviorProducerHandle<A>) -> Deactivator + Send + Sync + 'static,
    ) -> Behavior<A> {
        Behavior::from_node(ProducerBehavior::new(activate))
    }

    /// Applies `f` to the current value.
    pub fn map<B: Clone + Send + Sync + 'static>(
        &self,
        f: impl Fn(&A) -> B + Send + Sync + 'static,
    ) -> Behavior<B> {
        Behavior::from_node(MapBehavior::new(self.node.clone(), f))
    }

    /// Applies the function currently held by `f` to this behavior's value.
    pub fn ap<B, F>(&self, f: &Behavior<F>) -> Behavior<B>
    where
        B: Clone + Send + Sync + 'static,
        F: Fn(&A) -> B + Clone + Send + Sync + 'static,
    {
        Behavior::lift2(|f, a| f(a), f, self)
    }

    /// Combines two behaviors through `f`, re-evaluating whenever either
    /// parent pushes.
    pub fn lift2<X, Y, F>(f: F, x: &Behavior<X>, y: &Behavior<Y>) -> Behavior<A>
    where
        X: Clone + Send + Sync + 'static,
        Y: Clone + Send + Sync + 'static,
        F: Fn(&X, &Y) -> A + Send + Sync + 'static,
    {
        Behavior::from_node(Lift2Behavior::new(x.node.clone(), y.node.clone(), f))
    }

    /// Combines three behaviors through `f`.
    pub fn lift3<X, Y, Z, F>(
        f: F,
        x: &Behavior<X>,
        y: &Behavior<Y>,
        z: &Behavior<Z>,
    ) -> Behavior<A>
    where
        X: Clone + Send + Sync + 'static,
        Y: Clone + Send + Sync + 'static,
        Z: Clone + Send + Sync + 'static,
        F: Fn(&X, &Y, &Z) -> A + Send + Sync + 'static,
    {
        Behavior::from_node(Lift3Behavior::new(
            x.node.clone(),
            y.node.clone(),
            z.node.clone(),
            f,
        ))
    }

    /// Monadic sequencing: follows the behavior `f` selects for the current
    /// outer value, re-selecting on every outer push.
    pub fn chain<B: Clone + Send + Sync + 'static>(
        &self,
        f: impl Fn(&A) -> Behavior<B> + Send + Sync + 'static,
    ) -> Behavior<B> {
        Behavior::from_node(ChainBehavior::new(self.node.clone(), f))
    }

    /// A behavior computed by a sampling function with dynamic dependency
    /// tracking: each run subscribes to exactly the behaviors it read.
    pub fn moment(body: impl Fn(&mut MomentCtx) -> A + Send + Sync + 'static) -> Behavior<A> {
        Behavior::from_node(MomentBehavior::new(body))
    }

    /// Starts at `initial` and adopts each stream occurrence.
    ///
    /// The adoption is delayed by one tick for sampling purposes: a snapshot
    /// taken at the exact tick of an occurrence reads the previous value,
    /// which is what makes self-referential feedback loops deterministic.
    pub fn stepper(initial: A, stream: &Stream<A>) -> Behavior<A> {
        Behavior::from_node(StepperBehavior::new(initial, stream.node.clone()))
    }

    /// Follows `initial` until `stream` produces a behavior, then that one,
    /// and so on. Each switch republishes the newly-selected value.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn switcher(initial: &Behavior<A>, stream: &Stream<Behavior<A>>) -> Behavior<A> {
        Behavior::from_node(SwitcherBehavior::new(initial.clone(), stream.node.clone()))
    }

    /// Follows `initial` until `future` resolves, then the resolved
    /// behavior: a switch that happens at most once.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn switch_to(
        initial: &Behavior<A>,
        future: &crate::future::Future<Behavior<A>>,
    ) -> Behavior<A> {
        Behavior::from_node(SwitcherBehavior::new(initial.clone(), future.node.clone()))
    }

    /// A behavior of accumulators, pure in time: every sample yields a fresh
    /// behavior that starts folding `stream` from `initial` at the sample
    /// tick. Instances sampled at different times accumulate independently.
    pub fn scan<Ev: Clone + Send + Sync + 'static>(
        f: impl Fn(&Ev, &A) -> A + Send + Sync + 'static,
        initial: A,
        stream: &Stream<Ev>,
    ) -> Behavior<Behavior<A>> {
        let stream = stream.node.clone();
        let f: Arc<dyn Fn(&Ev, &A) -> A + Send + Sync> = Arc::new(f);
        Behavior::from_node(FnBehavior::new(move |t| {
            Behavior::from_node(ActiveScan::new(
                stream.clone(),
                f.clone(),
                initial.clone(),
                t,
            ))
        }))
    }

    /// The current value.
    ///
    /// Sampling is an external entry into the graph, so it advances the tick
    /// (and thereby commits any stepper occurrence from an earlier tick).
    ///
    /// # Panics
    /// Panics on [`SampleError`]; use [`try_at`](Behavior::try_at) to handle
    /// the failure instead.
    #[track_caller]
    pub fn at(&self) -> A {
        self.try_at()
            .unwrap_or_else(|e| panic!("cannot sample behavior: {e}"))
    }

    /// The current value, or why it cannot be read.
    pub fn try_at(&self) -> Result<A, SampleError> {
        let t = Tick::advance();
        self.node.sample(t)
    }

    /// Registers a callback pushed with the current value immediately and
    /// with every subsequent published value.
    pub fn subscribe(&self, f: impl Fn(&A) + Send + Sync + 'static) -> Subscription {
        let f = Arc::new(f);
        let this = self.clone();
        let on_begin = {
            let f = f.clone();
            move || {
                if let Ok(value) = this.node.sample(Tick::now()) {
                    f(&value);
                }
            }
        };
        self.observe(move |value| f(value), on_begin, || {})
    }

    /// Registers a mode-aware observer.
    ///
    /// While the behavior pushes, `on_push` receives every value (including
    /// the current one at registration). When the behavior is in pull mode,
    /// or later drops into it, `on_begin_pull` fires and the embedder is
    /// expected to sample; `on_end_pull` fires when pushing resumes.
    pub fn observe(
        &self,
        on_push: impl Fn(&A) + Send + Sync + 'static,
        on_begin_pull: impl Fn() + Send + Sync + 'static,
        on_end_pull: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        let node = ObserverNode::new(on_push, on_begin_pull, on_end_pull);
        let t = Tick::now();
        let (key, state) = self
            .node
            .add_listener(AnySubscriber::Observer(node.clone()), t);
        if state.is_pulling() {
            node.begin_pulling();
        }
        let source = self.node.clone();
        Subscription::new(move || source.remove_listener(key))
    }
}

impl Behavior<f64> {
    /// The running integral of this behavior: at each observed tick the area
    /// is extended by the trapezoid between the previous and current sample.
    pub fn integrate(&self) -> Behavior<f64> {
        Behavior::from_node(IntegrateBehavior::new(self.node.clone()))
    }
}

/// Samples a behavior: [`Behavior::at`] as a free function.
#[track_caller]
pub fn at<A: Clone + Send + Sync + 'static>(behavior: &Behavior<A>) -> A {
    behavior.at()
}
