//! Dependency resolver for tx sets and quorum sets.
//!
//! When a consensus value references an item we do not have, the resolver
//! starts tracking the hash and asks the overlay for it. Delivered items
//! are cached; the herder layers continuation queues on top so validation
//! can resume when a dependency arrives.
//!
//! The herder keeps two tx-set resolvers in a ping-pong: when a slot
//! externalizes, the active resolver stops fetching, the other becomes
//! active, and the retired one is cleared. In-flight fetches for the
//! closed slot die without racing late messages for the new one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use kraal_common::{Hash256, PeerId};

/// Callback used to request an item from the network.
pub type RequestFn = Box<dyn Fn(Hash256) + Send + Sync + 'static>;

struct FetchTracker {
    /// Peers that answered "don't have" for this hash.
    absent_peers: HashSet<PeerId>,
}

impl FetchTracker {
    fn new() -> Self {
        Self {
            absent_peers: HashSet::new(),
        }
    }
}

/// Caches resolved items and tracks in-flight fetches for one item kind.
pub struct ItemResolver<T> {
    kind: &'static str,
    cache: Mutex<HashMap<Hash256, Arc<T>>>,
    trackers: Mutex<HashMap<Hash256, FetchTracker>>,
    request: RequestFn,
}

impl<T> ItemResolver<T> {
    pub fn new(kind: &'static str, request: RequestFn) -> Self {
        Self {
            kind,
            cache: Mutex::new(HashMap::new()),
            trackers: Mutex::new(HashMap::new()),
            request,
        }
    }

    /// Return the cached item, or start a network fetch if `ask_network`
    /// and the hash is not already being tracked.
    pub fn fetch(&self, hash: Hash256, ask_network: bool) -> Option<Arc<T>> {
        if let Some(item) = self.cache.lock().get(&hash) {
            return Some(item.clone());
        }
        if ask_network {
            let mut trackers = self.trackers.lock();
            if !trackers.contains_key(&hash) {
                trackers.insert(hash, FetchTracker::new());
                trace!(kind = self.kind, hash = %hash.short_hex(), "asking network");
                (self.request)(hash);
            }
        }
        None
    }

    /// Store a delivered item. Returns true if a fetch was in flight for
    /// it, meaning someone is waiting and continuations should be drained.
    ///
    /// Items are cached even when nobody asked: locally built proposals go
    /// through this path so they resolve without touching the network.
    pub fn deliver(&self, hash: Hash256, item: Arc<T>) -> bool {
        self.cache.lock().insert(hash, item);
        let waited = self.trackers.lock().remove(&hash).is_some();
        debug!(kind = self.kind, hash = %hash.short_hex(), waited, "item delivered");
        waited
    }

    /// Record that a peer cannot supply this hash and re-issue the request
    /// so another peer can answer.
    pub fn mark_absent(&self, hash: Hash256, peer: PeerId) {
        let mut trackers = self.trackers.lock();
        if let Some(tracker) = trackers.get_mut(&hash) {
            if tracker.absent_peers.insert(peer) {
                trace!(kind = self.kind, hash = %hash.short_hex(), %peer, "peer doesn't have item, retrying");
                (self.request)(hash);
            }
        }
    }

    /// Abandon all in-flight fetches. The cache is untouched.
    pub fn stop_fetching_all(&self) {
        let dropped = {
            let mut trackers = self.trackers.lock();
            let n = trackers.len();
            trackers.clear();
            n
        };
        if dropped > 0 {
            debug!(kind = self.kind, dropped, "stopped all fetches");
        }
    }

    /// Drop the cache and all in-flight fetches.
    pub fn clear(&self) {
        self.cache.lock().clear();
        self.trackers.lock().clear();
    }

    pub fn is_tracking(&self, hash: &Hash256) -> bool {
        self.trackers.lock().contains_key(hash)
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}
