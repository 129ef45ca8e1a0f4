//! Time-bounded cache in front of [`Source::fetch_snapshot`].
//!
//! A full track fetch is the expensive query; the transport state is cheap and
//! changes often, so it is re-read on every `get` even when the entry is fresh.

use tokio::time::{Duration, Instant};

use crate::source::Source;
use crate::track::TrackSnapshot;

pub const TRACK_TTL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct CacheEntry {
    snapshot: TrackSnapshot,
    captured_at: Instant,
}

#[derive(Debug)]
pub struct TrackCache {
    entry: Option<CacheEntry>,
    ttl: Duration,
}

impl Default for TrackCache {
    fn default() -> Self {
        Self::new(TRACK_TTL)
    }
}

impl TrackCache {
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entry.is_none()
    }

    fn fresh(&self, now: Instant) -> Option<&TrackSnapshot> {
        self.entry
            .as_ref()
            .filter(|e| now.saturating_duration_since(e.captured_at) < self.ttl)
            .map(|e| &e.snapshot)
    }

    /// Return an owned copy of the current track, refetching once the entry is
    /// older than the TTL. An invalid fetch empties the cache.
    pub async fn get<S: Source>(&mut self, source: &S) -> TrackSnapshot {
        let cached = self.fresh(Instant::now()).cloned();
        let mut snapshot = match cached {
            Some(s) => s,
            None => {
                let fetched = source.fetch_snapshot().await;
                if !fetched.is_valid() {
                    self.invalidate();
                    return TrackSnapshot::invalid();
                }
                // Replace in full; the old entry is dropped here.
                self.entry = Some(CacheEntry {
                    snapshot: fetched.clone(),
                    captured_at: Instant::now(),
                });
                fetched
            }
        };
        snapshot.set_state(source.player_state().await);
        snapshot
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}
