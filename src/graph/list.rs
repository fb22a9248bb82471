//! Listener storage: an intrusive doubly-linked list over a slot arena.
//!
//! Every reactive owns one of these. Entries are arena slots carrying
//! `prev`/`next` links, which gives O(1) keyed unlink without searching while
//! preserving insertion order, which is the order listeners are visited in
//! during a push. Fan-out snapshots the list under the lock and then walks the
//! snapshot lock-free, so listeners may subscribe or unsubscribe from inside
//! their own callbacks.

use super::node::{AnySubscriber, NodeState};
use crate::tick::Tick;
use or_poisoned::OrPoisoned;
use slotmap::{new_key_type, SlotMap};
use std::sync::RwLock;

new_key_type! {
    /// Handle to one listener entry; given to the observer for O(1) removal.
    pub struct SubscriberKey;
}

struct Entry<A> {
    sub: AnySubscriber<A>,
    added_at: Tick,
    prev: Option<SubscriberKey>,
    next: Option<SubscriberKey>,
}

/// The ordered listener list of one reactive.
pub(crate) struct SubscriberSet<A> {
    entries: SlotMap<SubscriberKey, Entry<A>>,
    head: Option<SubscriberKey>,
    tail: Option<SubscriberKey>,
}

impl<A> Default for SubscriberSet<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> SubscriberSet<A> {
    pub(crate) fn new() -> Self {
        Self {
            entries: SlotMap::with_key(),
            head: None,
            tail: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Appends a listener, recording the tick it joined at. Entries added
    /// during tick `t` are skipped by broadcasts stamped `t`: a new listener
    /// only observes subsequent ticks.
    pub(crate) fn subscribe(&mut self, sub: AnySubscriber<A>, t: Tick) -> SubscriberKey {
        let key = self.entries.insert(Entry {
            sub,
            added_at: t,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => self.entries[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
        key
    }

    /// Unlinks an entry. Returns `false` if the key was already removed.
    pub(crate) fn unsubscribe(&mut self, key: SubscriberKey) -> bool {
        let Some(entry) = self.entries.remove(key) else {
            return false;
        };
        match entry.prev {
            Some(prev) => self.entries[prev].next = entry.next,
            None => self.head = entry.next,
        }
        match entry.next {
            Some(next) => self.entries[next].prev = entry.prev,
            None => self.tail = entry.prev,
        }
        true
    }

    pub(crate) fn contains(&self, key: SubscriberKey) -> bool {
        self.entries.contains_key(key)
    }

    /// The tick at which an entry joined.
    pub(crate) fn added_at(&self, key: SubscriberKey) -> Option<Tick> {
        self.entries.get(key).map(|e| e.added_at)
    }

    /// A copy of the entry, for targeted delivery.
    pub(crate) fn entry(&self, key: SubscriberKey) -> Option<AnySubscriber<A>> {
        self.entries.get(key).map(|e| e.sub.clone())
    }

    /// The entries in insertion order, as of now.
    fn snapshot(&self) -> Vec<(SubscriberKey, Tick, AnySubscriber<A>)> {
        let mut out = Vec::with_capacity(self.entries.len());
        let mut cursor = self.head;
        while let Some(key) = cursor {
            let entry = &self.entries[key];
            out.push((key, entry.added_at, entry.sub.clone()));
            cursor = entry.next;
        }
        out
    }
}

/// Pushes `value` to every listener that joined strictly before tick `t`,
/// in insertion order, depth-first. Listeners removed mid-fan-out by an
/// earlier sibling are skipped.
pub(crate) fn broadcast<A>(set: &RwLock<SubscriberSet<A>>, t: Tick, value: &A) {
    let snapshot = set.read().or_poisoned().snapshot();
    for (key, added_at, sub) in snapshot {
        if added_at >= t {
            continue;
        }
        if !set.read().or_poisoned().contains(key) {
            continue;
        }
        sub.deliver(t, value);
    }
}

/// Notifies every listener of a state change. State recomputation is
/// idempotent, so no tick guard is applied.
pub(crate) fn broadcast_state<A>(set: &RwLock<SubscriberSet<A>>, t: Tick, state: NodeState) {
    let snapshot = set.read().or_poisoned().snapshot();
    for (key, _, sub) in snapshot {
        if !set.read().or_poisoned().contains(key) {
            continue;
        }
        sub.deliver_state(t, state);
    }
}

/// Delivers `value` to a single entry, bypassing the joined-tick guard. Used
/// by the synchronization handshake, which fires exactly once per new
/// listener by construction. Wake entries are skipped: they carry no value
/// and re-synchronize by sampling.
pub(crate) fn deliver_to<A>(
    set: &RwLock<SubscriberSet<A>>,
    key: SubscriberKey,
    t: Tick,
    value: &A,
) {
    let entry = set.read().or_poisoned().entry(key);
    match entry {
        Some(AnySubscriber::Wake(_)) | None => {}
        Some(sub) => sub.deliver(t, value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Spy(RwLock<Vec<u32>>);

    impl crate::graph::Subscriber<u32> for Spy {
        fn push(&self, _t: Tick, value: &u32) {
            self.0.write().or_poisoned().push(*value);
        }
        fn state_changed(&self, _t: Tick, _parent: NodeState) {}
    }

    fn value_sub(spy: &Arc<Spy>) -> AnySubscriber<u32> {
        AnySubscriber::Value(Arc::downgrade(spy) as _)
    }

    #[test]
    fn unlink_preserves_order() {
        let mut set = SubscriberSet::<u32>::new();
        let t = Tick::now();
        let spies: Vec<Arc<Spy>> =
            (0..3).map(|_| Arc::new(Spy(RwLock::new(Vec::new())))).collect();
        let keys: Vec<_> = spies.iter().map(|s| set.subscribe(value_sub(s), t)).collect();
        assert!(set.unsubscribe(keys[1]));
        assert!(!set.unsubscribe(keys[1]));
        let order: Vec<_> = set.snapshot().iter().map(|(k, ..)| *k).collect();
        assert_eq!(order, vec![keys[0], keys[2]]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn broadcast_skips_entries_added_this_tick() {
        let set = RwLock::new(SubscriberSet::<u32>::new());
        let old_spy = Arc::new(Spy(RwLock::new(Vec::new())));
        let new_spy = Arc::new(Spy(RwLock::new(Vec::new())));
        let t0 = Tick::advance();
        set.write().or_poisoned().subscribe(value_sub(&old_spy), t0);
        let t1 = Tick::advance();
        set.write().or_poisoned().subscribe(value_sub(&new_spy), t1);
        broadcast(&set, t1, &7);
        assert_eq!(*old_spy.0.read().or_poisoned(), vec![7]);
        assert!(new_spy.0.read().or_poisoned().is_empty());
    }
}
