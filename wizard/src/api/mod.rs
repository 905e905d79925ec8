//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! Everything is mounted under `/api`:
//!
//! - **Cluster** (`/api/cluster/*`, `/api/metric/{id}/issues`): health scans and issue reports
//! - **Metrics** (`/api/metrics`, `/api/metric/{id}`): metric metadata
//! - **Clients** (`/api/clients`, `/api/client/{token}/*`): client configurations
//!
//! The OpenAPI document is served at `/api/openapi.json`.

pub mod handlers;
pub mod models;
