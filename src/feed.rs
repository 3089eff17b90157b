//! Periodically refreshed market snapshot.
//!
//! Every refresh either replaces the whole coin list or, on failure, leaves the
//! previous list in place and records a user-facing error. There is no retry
//! besides the next tick.

use crate::core::market::{CoinSnapshot, MarketDataProvider, find_by_symbol};
use crate::core::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub const FEED_ERROR_MESSAGE: &str = "Could not load market data. Please check your connection.";

#[derive(Debug, Default)]
struct FeedState {
    snapshots: Vec<CoinSnapshot>,
    error: Option<String>,
    refreshed_at: Option<DateTime<Utc>>,
}

pub struct MarketFeed {
    provider: Arc<dyn MarketDataProvider>,
    coin_ids: Vec<String>,
    state: RwLock<FeedState>,
    attempts: watch::Sender<u64>,
}

impl MarketFeed {
    pub fn new(provider: Arc<dyn MarketDataProvider>, coin_ids: Vec<String>) -> Self {
        let (attempts, _) = watch::channel(0);
        Self {
            provider,
            coin_ids,
            state: RwLock::new(FeedState::default()),
            attempts,
        }
    }

    /// Fetches the tracked coins once. Returns the number of coins now held.
    pub async fn refresh(&self) -> Result<usize> {
        let result = self.provider.fetch_markets(&self.coin_ids).await;

        let outcome = {
            let mut state = self.state.write().await;
            match result {
                Ok(snapshots) => {
                    let count = snapshots.len();
                    state.snapshots = snapshots;
                    state.error = None;
                    state.refreshed_at = Some(Utc::now());
                    debug!(count, "Market snapshot replaced");
                    Ok(count)
                }
                Err(e) => {
                    warn!(error = %e, "Could not fetch market data");
                    state.error = Some(FEED_ERROR_MESSAGE.to_string());
                    Err(Error::FeedUnavailable(FEED_ERROR_MESSAGE.to_string()))
                }
            }
        };
        self.attempts.send_modify(|n| *n += 1);
        outcome
    }

    pub async fn snapshots(&self) -> Vec<CoinSnapshot> {
        self.state.read().await.snapshots.clone()
    }

    pub async fn find(&self, symbol: &str) -> Option<CoinSnapshot> {
        find_by_symbol(&self.state.read().await.snapshots, symbol).cloned()
    }

    /// Message of the most recent failed refresh, cleared by a successful one.
    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().await.refreshed_at
    }

    /// Ticks after every refresh attempt, successful or not.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.attempts.subscribe()
    }

    /// Refreshes now and then every `interval` until the handle is dropped.
    pub fn start(self: &Arc<Self>, interval: Duration) -> FeedHandle {
        let feed = Arc::clone(self);
        info!(?interval, coins = feed.coin_ids.len(), "Starting market feed");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                // Failures are already recorded in the feed state.
                let _ = feed.refresh().await;
            }
        });
        FeedHandle { task }
    }
}

/// Owns the refresh timer; dropping it stops the feed.
pub struct FeedHandle {
    task: JoinHandle<()>,
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        debug!("Stopping market feed");
        self.task.abort();
    }
}
