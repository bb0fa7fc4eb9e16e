use std::time::Duration;

use tokio::time::Instant;

use crate::favorites::FavoriteEntry;

/// Last fetched favorites list with the time it was fetched.
///
/// `entries` is `None` until a fetch completes; an empty list is a valid,
/// cacheable result and is distinct from `None`.
#[derive(Debug, Clone)]
pub struct FavoritesCache {
    entries: Option<Vec<FavoriteEntry>>,
    fetched_at: Instant,
    ttl: Duration,
}

impl FavoritesCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: None,
            fetched_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_fresh_at(&self, now: Instant) -> bool {
        self.entries.is_some() && now.saturating_duration_since(self.fetched_at) < self.ttl
    }

    /// Entries if still within the TTL at `now`.
    pub fn fresh_entries(&self, now: Instant) -> Option<&[FavoriteEntry]> {
        if self.is_fresh_at(now) {
            self.entries.as_deref()
        } else {
            None
        }
    }

    /// How long ago the cached list was fetched, if there is one.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.entries
            .as_ref()
            .map(|_| now.saturating_duration_since(self.fetched_at))
    }

    /// Replace the whole list.
    pub fn store(&mut self, entries: Vec<FavoriteEntry>, fetched_at: Instant) {
        self.entries = Some(entries);
        self.fetched_at = fetched_at;
    }

    pub fn clear(&mut self) {
        self.entries = None;
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_none()
    }
}
