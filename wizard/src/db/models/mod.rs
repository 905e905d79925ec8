//! Stored document models.
//!
//! - [`metadata`]: metric metadata documents as published by sources
//! - [`issues`]: health-scan issue reports and their identity
//! - [`configs`]: client configuration documents and their backups
//!
//! Documents are JSON objects at heart; the typed wrappers here interpret the fields the
//! service relies on and keep everything else untouched.

pub mod configs;
pub mod issues;
pub mod metadata;
