//! Message expiry background job
//!
//! Removes messages once they are older than the window registered on the
//! collection's TTL index. Each cycle:
//! 1. Reads the TTL policies from the collection
//! 2. Deletes expired messages in batches, oldest first, until a batch comes back short
//! 3. Records stats and metrics

use crate::error::StoreResult;
use crate::metrics;
use crate::store::{MessageRepository, SchemaAdmin};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Field the repository purges on
const EXPIRY_FIELD: &str = "timestamp";

#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between sweeps
    pub sweep_interval: Duration,
    /// Maximum messages deleted per statement
    pub batch_size: usize,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            batch_size: 1000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExpiryStats {
    pub runs: u64,
    pub failed_runs: u64,
    pub purged: u64,
    pub last_run_at: Option<DateTime<Utc>>,
}

pub struct ExpirySweeper<S> {
    config: ExpiryConfig,
    store: Arc<S>,
    stats: Arc<RwLock<ExpiryStats>>,
}

impl<S> ExpirySweeper<S>
where
    S: SchemaAdmin + MessageRepository + 'static,
{
    pub fn new(config: ExpiryConfig, store: Arc<S>) -> Self {
        Self {
            config,
            store,
            stats: Arc::new(RwLock::new(ExpiryStats::default())),
        }
    }

    /// Shared handle to the stats; stays valid after [`ExpirySweeper::start`]
    pub fn stats_handle(&self) -> Arc<RwLock<ExpiryStats>> {
        Arc::clone(&self.stats)
    }

    pub async fn stats(&self) -> ExpiryStats {
        self.stats.read().await.clone()
    }

    /// Start the background job
    /// Returns a JoinHandle that can be awaited or aborted
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.config.sweep_interval);

            info!(
                interval_secs = self.config.sweep_interval.as_secs(),
                batch_size = self.config.batch_size,
                namespace = %self.store.namespace(),
                "Starting message expiry sweeper"
            );

            loop {
                ticker.tick().await;

                if let Err(e) = self.run_once_at(Utc::now()).await {
                    error!(error = %e, retryable = e.is_retryable(), "Expiry sweep failed");
                }
            }
        })
    }

    /// One sweep as if the clock read `now`; returns the number of messages removed
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let started = Instant::now();
        let result = self.sweep(now).await;
        let elapsed = started.elapsed();

        let mut stats = self.stats.write().await;
        stats.runs += 1;
        stats.last_run_at = Some(now);
        match &result {
            Ok(purged) => {
                stats.purged += purged;
                metrics::record_expiry_run("success", elapsed);
                metrics::record_expired(*purged);
            }
            Err(_) => {
                stats.failed_runs += 1;
                metrics::record_expiry_run("error", elapsed);
            }
        }
        result
    }

    async fn sweep(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let policies = self.store.ttl_policies().await?;
        if policies.is_empty() {
            debug!(namespace = %self.store.namespace(), "No TTL index defined; nothing to expire");
            return Ok(0);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut total = 0u64;

        for policy in policies {
            if policy.field != EXPIRY_FIELD {
                warn!(
                    index = %policy.index,
                    field = %policy.field,
                    "Skipping TTL index on unsupported field"
                );
                continue;
            }

            let cutoff = policy.cutoff(now);
            loop {
                let purged = self.store.purge_expired(cutoff, batch_size).await?;
                total += purged;
                if purged < batch_size as u64 {
                    break;
                }
            }
            debug!(index = %policy.index, %cutoff, "TTL policy applied");
        }

        if total > 0 {
            info!(purged = total, "Expired messages removed");
        }
        Ok(total)
    }
}
