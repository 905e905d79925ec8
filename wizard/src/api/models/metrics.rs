//! API models for metric metadata browsing.

use crate::db::models::metadata::MetadataFilter;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use utoipa::{IntoParams, ToSchema};

pub const DEFAULT_METRICS_LIMIT: usize = 100;
pub const MAX_METRICS_LIMIT: usize = 10_000;

/// Query parameters for listing metrics
#[serde_as]
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ListMetricsQuery {
    /// Only metrics whose id starts with this prefix
    pub prefix: Option<String>,

    /// Only metrics with this `historic` flag; metrics without one count as not historic
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub historic: Option<bool>,

    /// Only metrics published by this source
    pub source: Option<String>,

    /// Maximum number of ids returned (default: 100, max: 10000)
    #[param(default = 100, minimum = 1, maximum = 10000)]
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub limit: Option<usize>,
}

impl ListMetricsQuery {
    pub fn to_filter(&self) -> MetadataFilter {
        MetadataFilter {
            prefix: self.prefix.clone().filter(|p| !p.is_empty()),
            historic: self.historic,
            source: self.source.clone(),
            limit: self.limit.unwrap_or(DEFAULT_METRICS_LIMIT).clamp(1, MAX_METRICS_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteMetricsRequest {
    /// Ids of the metrics whose metadata should be removed
    #[schema(example = json!(["room.a.power", "room.b.power"]))]
    pub metrics: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeleteMetricsResponse {
    /// Ids that were deleted; historic and unknown metrics are left out
    pub deleted: Vec<String>,
}
