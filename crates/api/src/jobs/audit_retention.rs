//! Prunes persisted audit entries past the retention window.

use domain::services::AuditTrail;
use std::sync::Arc;

use super::scheduler::{Job, JobFrequency};

pub struct AuditRetentionJob {
    audit: Arc<AuditTrail>,
}

impl AuditRetentionJob {
    pub fn new(audit: Arc<AuditTrail>) -> Self {
        Self { audit }
    }
}

#[async_trait::async_trait]
impl Job for AuditRetentionJob {
    fn name(&self) -> &'static str {
        "audit_retention"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        let pruned = self.audit.prune_persisted().await.map_err(|e| e.to_string())?;
        if pruned > 0 {
            tracing::info!(
                pruned,
                retention_days = self.audit.config().retention_days,
                "Pruned audit entries"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::AuditConfig;

    #[tokio::test]
    async fn test_without_store_is_noop() {
        let job = AuditRetentionJob::new(Arc::new(AuditTrail::new(AuditConfig::default())));
        assert!(job.execute().await.is_ok());
    }
}
