// Per-user single-flight for token re-authentication.
//
// A call that finds its token expired takes the user's flight before
// re-authenticating. Calls holding a fresh token never touch this map.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async lock per user id, created lazily on first expiry.
///
/// In-memory only. Entries are never evicted: one per linked user.
#[derive(Default)]
pub struct RefreshFlights {
    flights: DashMap<String, Arc<Mutex<()>>>,
}

impl RefreshFlights {
    pub fn new() -> Self {
        Self {
            flights: DashMap::new(),
        }
    }

    /// Waits until no other call is refreshing `user_id`'s token.
    ///
    /// The map shard lock is released before awaiting the user's mutex.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        let flight = self
            .flights
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        flight.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}
