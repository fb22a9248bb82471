//! An implementation of a push/pull functional reactive runtime.
//!
//! The graph is built from three kinds of time-indexed value:
//! 1. **Behaviors**: values that exist at every moment, like the current
//!    mouse position. A behavior either *pushes* (parents notify it, and it
//!    republishes synchronously) or is *pulled* (observers sample it on
//!    demand); the runtime renegotiates between the two as the graph changes
//!    shape.
//! 2. **Streams**: discrete occurrences, like clicks. A stream has no
//!    current value; it only emits.
//! 3. **Futures**: occurrences that happen at most once and are terminal
//!    afterwards.
//!
//! ```rust
//! use pushpull::{behavior::Behavior, stream::Stream};
//!
//! let (keys, sink) = Stream::sink();
//! let uppercased = keys.map(|s: &String| s.to_uppercase());
//! let latest = Behavior::stepper(String::new(), &uppercased);
//!
//! let sub = latest.subscribe(|_| {});
//! sink.push("hello".to_string());
//! assert_eq!(latest.at(), "HELLO");
//! sub.deactivate();
//! ```
//!
//! ## Design principles and assumptions
//! - **Idle subgraphs are free.** A node subscribes to its parents only
//!   while something observes it; the last unsubscription cascades upstream
//!   and releases external resources (producer callbacks, platform timers).
//! - **Propagation is synchronous and depth-first.** Each external entry (a
//!   sink push, a future resolution, a timer callback) is one *tick*;
//!   the whole fan-out completes before the entry returns, visiting
//!   listeners in subscription order. There is no batching scheduler and no
//!   glitch-freedom guarantee across simultaneous roots.
//! - **Listeners never see the tick that added them.** Subscribing during a
//!   propagation defers the first delivery to the next tick, which together
//!   with the one-tick delay of [`stepper`](behavior::Behavior::stepper)
//!   makes cyclic feedback through [placeholders](placeholder) deterministic.
//! - **Single-threaded cooperative.** The types are `Send + Sync` so they
//!   can be embedded anywhere, but the runtime assumes one propagation at a
//!   time; there is no cross-thread propagation model.
//!
//! Timing combinators (`delay`, `throttle`, `debounce`) depend on an
//! embedder-supplied [`scheduler::Scheduler`]; async interop goes through
//! [`future::Future::from_future`], which spawns onto the
//! [`any_spawner`] executor.

#![deny(missing_docs)]

pub mod behavior;
mod error;
pub mod future;
mod graph;
pub mod observe;
pub mod placeholder;
pub mod scheduler;
pub mod stream;
pub mod tick;

pub use error::{ReplaceError, SampleError};
pub use graph::NodeState;

/// Cleanup returned by a producer's activation closure; runs when the
/// producer's last listener unsubscribes.
pub type Deactivator = Box<dyn FnOnce() + Send + Sync>;

/// Reexports the types needed to build and observe a reactive network.
pub mod prelude {
    pub use crate::{
        behavior::{at, Behavior, BehaviorSink},
        future::{Future, FutureResolver},
        observe::Subscription,
        placeholder::{BehaviorPlaceholder, StreamPlaceholder},
        stream::{Stream, StreamSink},
    };
}
