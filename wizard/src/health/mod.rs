//! Cluster health scanning.
//!
//! The [`scanner::ClusterScanner`] walks every metric of the metadata store and runs the
//! [`checks::MetricHealthChecks`] for it on a [`pool::BoundedTaskPool`]. Each check reconciles
//! its issue reports through the [`reports::IssueReporter`], so the issue store always holds one
//! report per detected `(type, scope_type, scope)`. Reports are read back through
//! [`queries::IssueQueryService`].
//!
//! Scans are started over HTTP or by the [`scheduler::HealthScanScheduler`].

pub mod checks;
pub mod pool;
pub mod queries;
pub mod reports;
pub mod scanner;
pub mod scheduler;

pub use queries::IssueQueryService;
pub use scanner::{ClusterScanner, ScanError, ScanOptions, ScanStatus};
pub use scheduler::HealthScanScheduler;
