//! Persistence layer.
//!
//! Documents live in PostgreSQL (JSONB columns, see `migrations/`) or, for tests and
//! single-process development, in process-local maps. Both backends sit behind the traits in
//! [`crate::storage`]; this module holds what they share.
//!
//! # Modules
//!
//! - [`models`]: typed views of the stored documents
//! - [`errors`]: storage error type shared by every backend
//! - [`pools`]: PostgreSQL connection pool construction
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! wizard::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod models;
pub mod pools;
