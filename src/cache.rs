use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::models::{Page, PostView};

/// IndexCache
///
/// Caches rendered pages of the index listing, keyed by the resolved page number.
/// Entries expire after `ttl`; writes to posts do not invalidate them,
/// so a new post shows up on the index only once the cached page expires or the
/// cache is cleared. A zero `ttl` disables caching.
pub struct IndexCache {
    ttl: Duration,
    entries: RwLock<HashMap<u32, (Instant, Page<PostView>)>>,
}

pub type IndexCacheState = Arc<IndexCache>;

impl IndexCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns a cached page if one was stored less than `ttl` ago.
    pub async fn get(&self, number: u32) -> Option<Page<PostView>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(&number)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, page)| page.clone())
    }

    pub async fn put(&self, number: u32, page: Page<PostView>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        // Drop expired pages so the map cannot grow past the pages actually requested recently.
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(number, (Instant::now(), page));
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
