//! Typed boundary to one logical cluster's REST API.
//!
//! The orchestration core never talks HTTP directly; it goes through
//! [`ClusterApi`], which models exactly the calls maintenance needs. The
//! default adapter in [`http`] speaks the search engine's REST dialect.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;

/// Cluster health color as reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

impl HealthStatus {
    /// Whether this status is at least as healthy as `wanted`
    /// (green satisfies a yellow gate).
    pub fn satisfies(&self, wanted: HealthStatus) -> bool {
        self.rank() <= wanted.rank()
    }

    fn rank(&self) -> u8 {
        match self {
            HealthStatus::Green => 0,
            HealthStatus::Yellow => 1,
            HealthStatus::Red => 2,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Green => write!(f, "green"),
            HealthStatus::Yellow => write!(f, "yellow"),
            HealthStatus::Red => write!(f, "red"),
        }
    }
}

/// Parameters for a gated health query.
#[derive(Debug, Clone)]
pub struct HealthQuery {
    pub wait_for_status: HealthStatus,
    pub timeout: Duration,
    pub wait_for_no_initializing_shards: bool,
    pub wait_for_no_relocating_shards: bool,
}

/// Health endpoint response, trimmed to the fields gating cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timed_out: bool,
    #[serde(default)]
    pub relocating_shards: u64,
    #[serde(default)]
    pub initializing_shards: u64,
}

/// Raw per-instance info as reported by the nodes endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub name: String,
    pub hostname: String,
    pub fqdn: String,
    pub row: String,
    /// Instance start time, milliseconds since the epoch.
    pub jvm_start_ms: i64,
}

/// A replica shard copy with no node currently hosting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnassignedShard {
    pub index: String,
    pub shard: u32,
}

/// Shard-allocation routing modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationMode {
    Primaries,
    All,
}

impl AllocationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationMode::Primaries => "primaries",
            AllocationMode::All => "all",
        }
    }
}

/// One cluster's REST API, reduced to the operations maintenance needs.
///
/// Implementations map transport failures to the non-retryable
/// `FleetError::Cluster` kind and per-shard flush conflicts to
/// `FleetError::Conflict`; interpretation of health responses is left to the
/// caller.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Node-id -> raw node attributes, fetched fresh on every call.
    async fn node_info(&self) -> Result<HashMap<String, NodeInfo>>;

    async fn cluster_health(&self, query: &HealthQuery) -> Result<HealthResponse>;

    /// Set the transient routing-allocation enable setting.
    async fn set_allocation_mode(&self, mode: AllocationMode) -> Result<()>;

    async fn flush(&self, timeout: Duration) -> Result<()>;

    async fn flush_synced(&self) -> Result<()>;

    async fn unassigned_shards(&self) -> Result<Vec<UnassignedShard>>;

    /// Force-allocate a replica shard copy to the given node.
    async fn allocate_replica(&self, index: &str, shard: u32, node: &str) -> Result<()>;

    async fn put_doc(&self, index: &str, id: &str, body: serde_json::Value) -> Result<()>;

    async fn delete_doc(&self, index: &str, id: &str) -> Result<()>;

    /// Clear the read-only-allow-delete block on all indices.
    async fn clear_read_only(&self) -> Result<()>;
}
