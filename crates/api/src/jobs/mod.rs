//! Background job scheduler and job implementations.

mod audit_retention;
mod lock_sweep;
mod runtime_gauges;
mod scheduler;

pub use audit_retention::AuditRetentionJob;
pub use lock_sweep::LockSweepJob;
pub use runtime_gauges::RuntimeGaugesJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
