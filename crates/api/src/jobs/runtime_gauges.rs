//! Periodic gauges for the pool and the in-process tables.

use domain::services::{AuditTrail, NotificationDispatcher, SubmissionCoordinator};
use sqlx::PgPool;
use std::sync::Arc;

use super::scheduler::{Job, JobFrequency};
use crate::app::AppState;

pub struct RuntimeGaugesJob {
    pool: Option<PgPool>,
    audit: Arc<AuditTrail>,
    dispatcher: Arc<NotificationDispatcher>,
    coordinator: Arc<SubmissionCoordinator>,
}

impl RuntimeGaugesJob {
    pub fn new(state: &AppState) -> Self {
        Self {
            pool: state.pool.clone(),
            audit: state.audit.clone(),
            dispatcher: state.dispatcher.clone(),
            coordinator: state.coordinator.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Job for RuntimeGaugesJob {
    fn name(&self) -> &'static str {
        "runtime_gauges"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(15)
    }

    async fn execute(&self) -> Result<(), String> {
        if let Some(pool) = &self.pool {
            persistence::metrics::record_pool_metrics(pool);
        }

        metrics::gauge!("audit_entries_in_memory").set(self.audit.len().await as f64);
        metrics::gauge!("notification_history_size")
            .set(self.dispatcher.statistics().await.history_size as f64);
        metrics::gauge!("idempotency_keys_marked")
            .set(self.coordinator.idempotency().len() as f64);
        Ok(())
    }
}
