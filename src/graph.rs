//! The propagation graph: node states, listener storage and the switching
//! engine.

mod list;
mod node;
mod swap;

pub use list::SubscriberKey;
pub(crate) use list::{broadcast, broadcast_state, deliver_to, SubscriberSet};
pub use node::NodeState;
pub(crate) use node::{
    AnySource, AnySubscriber, BehaviorSource, ErasedBehavior, ErasedSource, PushCell, Source,
    Subscriber, WakeSubscriber,
};
pub(crate) use swap::SwapSlot;
