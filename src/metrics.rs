//! Boundary to the metrics/time-series query service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One job-queue lag sample: the backlog of a single topic partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LagSample {
    pub topic: String,
    pub partition: i32,
    pub value: f64,
}

/// Metrics query collaborator, scoped to one datacenter per call.
#[async_trait]
pub trait MetricsApi: Send + Sync {
    async fn query(&self, expression: &str, datacenter: &str) -> Result<Vec<LagSample>>;
}
