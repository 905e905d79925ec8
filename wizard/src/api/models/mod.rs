//! API request and response data models.
//!
//! API models are kept apart from the storage models in [`crate::db::models`]; where a storage
//! model is returned unchanged (issue reports, config backups) it is used directly.

pub mod configs;
pub mod issues;
pub mod metrics;
pub mod pagination;
