//! Prometheus metrics for the connection pool
//!
//! Pool occupancy is sampled periodically; acquisition latency and failures
//! are recorded by [`acquire_with_metrics`].

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use std::time::Instant;

lazy_static::lazy_static! {
    static ref DB_POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Database pool connection count by state",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref DB_POOL_ACQUIRE_DURATION: HistogramVec = register_histogram_vec!(
        "db_pool_acquire_duration_seconds",
        "Time to acquire connection from pool",
        &["service"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref DB_POOL_ACQUIRE_ERRORS: IntCounterVec = register_int_counter_vec!(
        "db_pool_acquire_errors_total",
        "Connection acquisition failures by kind",
        &["service", "error_type"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// Point-in-time view of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub size: u32,
    pub idle: u32,
    pub max: u32,
}

impl PoolSnapshot {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle() as u32,
            max: pool.options().get_max_connections(),
        }
    }

    pub fn active(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }

    /// Share of `max` currently checked out, in `0.0..=1.0`
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            return 0.0;
        }
        self.active() as f64 / self.max as f64
    }
}

pub(crate) fn update_pool_metrics(pool: &PgPool, service: &str) {
    let snapshot = PoolSnapshot::of(pool);

    for (state, value) in [
        ("idle", snapshot.idle),
        ("active", snapshot.active()),
        ("max", snapshot.max),
    ] {
        DB_POOL_CONNECTIONS
            .with_label_values(&[service, state])
            .set(value as i64);
    }
}

pub(crate) fn acquire_error_kind(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::PoolTimedOut => "timeout",
        sqlx::Error::PoolClosed => "closed",
        sqlx::Error::Io(_) => "io",
        _ => "other",
    }
}

/// Acquire a connection and record latency / failure metrics
///
/// Drop-in replacement for `pool.acquire().await`.
pub async fn acquire_with_metrics(
    pool: &PgPool,
    service: &str,
) -> Result<PoolConnection<Postgres>, sqlx::Error> {
    let start = Instant::now();
    let result = pool.acquire().await;

    DB_POOL_ACQUIRE_DURATION
        .with_label_values(&[service])
        .observe(start.elapsed().as_secs_f64());

    if let Err(e) = &result {
        DB_POOL_ACQUIRE_ERRORS
            .with_label_values(&[service, acquire_error_kind(e)])
            .inc();
    }

    result
}
