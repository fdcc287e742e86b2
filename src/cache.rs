use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::medium::{parse_feed, FeedPost, FeedSource};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedCacheState {
    pub posts: Vec<FeedPost>,
    pub refreshed_at: Option<DateTime<Utc>>, // UTC time of the last successful refresh
}

impl FeedCacheState {
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.refreshed_at {
            Some(at) if !self.posts.is_empty() => now - at >= ttl,
            _ => true,
        }
    }
}

/// Medium posts kept in memory for `ttl`, refreshed on the first request
/// after expiry. The lock is never held across the upstream fetch, so two
/// overlapping refreshes may both hit the feed; the later one wins.
pub struct FeedCache {
    source: Box<dyn FeedSource>,
    state: Mutex<FeedCacheState>,
    ttl: Duration,
    limit: usize,
    fallback_link: String,
}

impl FeedCache {
    pub fn new(
        source: Box<dyn FeedSource>,
        ttl: Duration,
        limit: usize,
        fallback_link: impl Into<String>,
    ) -> Self {
        Self {
            source,
            state: Mutex::new(FeedCacheState::default()),
            ttl,
            limit,
            fallback_link: fallback_link.into(),
        }
    }

    pub async fn get_posts(&self) -> FeedCacheState {
        self.get_posts_at(Utc::now()).await
    }

    /// Returns the posts served for this request together with the time they
    /// were fetched. A failed refresh yields an empty snapshot with no time.
    pub async fn get_posts_at(&self, now: DateTime<Utc>) -> FeedCacheState {
        {
            let state = self.state.lock().await;
            if !state.is_stale(now, self.ttl) {
                debug!("serving {} cached posts", state.posts.len());
                return state.clone();
            }
        }

        self.refresh(now).await.unwrap_or_default()
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.refreshed_at
    }

    async fn refresh(&self, now: DateTime<Utc>) -> Option<FeedCacheState> {
        let xml = match self.source.fetch().await {
            Ok(xml) => xml,
            Err(e) => {
                error!("Failed to fetch Medium posts: {}", e);
                return None;
            }
        };

        let posts = parse_feed(&xml, &self.fallback_link, self.limit);
        info!("refreshed feed cache with {} posts", posts.len());

        let fresh = FeedCacheState {
            posts,
            refreshed_at: Some(now),
        };
        *self.state.lock().await = fresh.clone();

        Some(fresh)
    }
}
