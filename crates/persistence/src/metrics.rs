//! Database metrics collection.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Record a query duration under `quote_desk_db_query_duration_seconds`.
pub fn record_query_duration(query_name: &str, duration_secs: f64) {
    histogram!(
        "quote_desk_db_query_duration_seconds",
        "query" => query_name.to_string()
    )
    .record(duration_secs);
}

/// Record connection pool gauges. Called periodically by the pool job.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("quote_desk_db_connections_active").set(active as f64);
    gauge!("quote_desk_db_connections_idle").set(idle as f64);
    gauge!("quote_desk_db_connections_total").set(size as f64);
}

/// Times one query and records it on [`QueryTimer::record`].
///
/// ```ignore
/// let timer = QueryTimer::new("find_bound_template");
/// let result = sqlx::query_as::<_, TemplateEntity>(...).fetch_optional(&pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        let elapsed = self.start.elapsed().as_secs_f64();
        tracing::trace!(query = self.query_name, elapsed_secs = elapsed, "Query finished");
        record_query_duration(self.query_name, elapsed);
    }
}
