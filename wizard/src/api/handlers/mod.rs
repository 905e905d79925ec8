//! HTTP request handlers, organised by resource.
//!
//! - [`cluster`]: health scans and issue reports
//! - [`metrics`]: metric metadata browsing and deletion
//! - [`configs`]: client configurations and their backups
//!
//! Handlers return [`crate::errors::Error`], which converts to the matching status code.

pub mod cluster;
pub mod configs;
pub mod metrics;
