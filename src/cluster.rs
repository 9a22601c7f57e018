//! Operations against one logical cluster.

use chrono::Utc;
use rand::seq::SliceRandom;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::api::{AllocationMode, ClusterApi, HealthQuery, HealthStatus};
use crate::config::ClusterGroupConfig;
use crate::error::{FleetError, Result};
use crate::host::NodeRecord;

/// Timeout for gated health queries. Kept short: callers poll in a bounded
/// retry loop instead of parking inside the cluster API.
const HEALTH_QUERY_TIMEOUT: Duration = Duration::from_secs(1);

/// Shard-allocation routing modes as maintenance uses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationMode {
    /// Only primary shards may be (re)allocated; replicas stay put.
    PrimariesOnly,
    /// Normal operation, all shard copies may move.
    All,
}

impl From<ReplicationMode> for AllocationMode {
    fn from(mode: ReplicationMode) -> Self {
        match mode {
            ReplicationMode::PrimariesOnly => AllocationMode::Primaries,
            ReplicationMode::All => AllocationMode::All,
        }
    }
}

/// Handle for one member cluster of a clustergroup.
pub struct ClusterHandle {
    name: String,
    api: Arc<dyn ClusterApi>,
    freeze_index: String,
    freeze_doc_id: String,
    dry_run: bool,
}

impl std::fmt::Debug for ClusterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterHandle")
            .field("name", &self.name)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl ClusterHandle {
    pub fn new(name: impl Into<String>, api: Arc<dyn ClusterApi>, config: &ClusterGroupConfig) -> Self {
        Self {
            name: name.into(),
            api,
            freeze_index: config.freeze_index.clone(),
            freeze_doc_id: config.freeze_doc_id.clone(),
            dry_run: config.dry_run,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh node list for this cluster, one record per instance.
    pub async fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let nodes = self.api.node_info().await?;
        let mut records = Vec::with_capacity(nodes.len());
        for node in nodes.values() {
            let started_at = chrono::DateTime::<Utc>::from_timestamp_millis(node.jvm_start_ms)
                .ok_or_else(|| {
                    FleetError::cluster(format!(
                        "Node {} reports unrepresentable start time {}",
                        node.name, node.jvm_start_ms
                    ))
                })?;
            records.push(NodeRecord {
                hostname: node.hostname.clone(),
                fqdn: node.fqdn.clone(),
                row: node.row.clone(),
                cluster_name: self.name.clone(),
                started_at,
            });
        }
        Ok(records)
    }

    /// Whether a host currently has an instance joined to this cluster.
    /// Used post-restart to confirm rejoin.
    pub async fn is_member(&self, hostname: &str) -> Result<bool> {
        let nodes = self.list_nodes().await?;
        Ok(nodes.iter().any(|n| n.hostname == hostname))
    }

    /// Toggle shard-allocation routing. Paired around any operation that must
    /// not trigger rebalancing; see [`ClusterHandle::stopped_replication`].
    pub async fn set_replication_enabled(&self, mode: ReplicationMode) -> Result<()> {
        if self.dry_run {
            info!(cluster = %self.name, "Dry-run: would set replication to {:?}", mode);
            return Ok(());
        }
        info!(cluster = %self.name, "Setting replication to {:?}", mode);
        self.api.set_allocation_mode(mode.into()).await
    }

    /// Run `body` with replica movement disabled, restoring normal allocation
    /// afterwards even when the body fails.
    pub async fn stopped_replication<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.set_replication_enabled(ReplicationMode::PrimariesOnly).await?;
        let result = body().await;
        let restore = self.set_replication_enabled(ReplicationMode::All).await;
        match (result, restore) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Gate: cluster is green.
    ///
    /// All failure modes (timeout, transport error, status not reached) come
    /// back as the retryable `Check` kind; callers poll with a budget.
    pub async fn check_green(&self) -> Result<()> {
        let query = HealthQuery {
            wait_for_status: HealthStatus::Green,
            timeout: HEALTH_QUERY_TIMEOUT,
            wait_for_no_initializing_shards: false,
            wait_for_no_relocating_shards: false,
        };
        let response = self
            .api
            .cluster_health(&query)
            .await
            .map_err(|e| FleetError::check(format!("{}: health query failed: {}", self.name, e)))?;

        if response.timed_out || !response.status.satisfies(HealthStatus::Green) {
            return Err(FleetError::check(format!(
                "{} is not green (status {}, timed_out {})",
                self.name, response.status, response.timed_out
            )));
        }
        Ok(())
    }

    /// Gate: cluster is at least yellow and no shard is initializing or
    /// relocating. The weaker gate used mid-maintenance, when replicas on
    /// stopped hosts keep the cluster out of green.
    pub async fn check_yellow_no_moving_shards(&self) -> Result<()> {
        let query = HealthQuery {
            wait_for_status: HealthStatus::Yellow,
            timeout: HEALTH_QUERY_TIMEOUT,
            wait_for_no_initializing_shards: true,
            wait_for_no_relocating_shards: true,
        };
        let response = self
            .api
            .cluster_health(&query)
            .await
            .map_err(|e| FleetError::check(format!("{}: health query failed: {}", self.name, e)))?;

        if response.timed_out || !response.status.satisfies(HealthStatus::Yellow) {
            return Err(FleetError::check(format!(
                "{} is not yellow (status {}, timed_out {})",
                self.name, response.status, response.timed_out
            )));
        }
        if response.relocating_shards > 0 || response.initializing_shards > 0 {
            return Err(FleetError::check(format!(
                "{} has moving shards ({} relocating, {} initializing)",
                self.name, response.relocating_shards, response.initializing_shards
            )));
        }
        Ok(())
    }

    fn freeze_marker(&self, reason: &str) -> serde_json::Value {
        json!({
            "user": std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            "timestamp": Utc::now().to_rfc3339(),
            "reason": reason,
        })
    }

    /// Write the advisory freeze marker. The marker does not prevent writes;
    /// it records operator intent so tools can detect the pause out of band.
    pub async fn freeze_writes(&self, reason: &str) -> Result<()> {
        if self.dry_run {
            info!(cluster = %self.name, "Dry-run: would freeze writes ({})", reason);
            return Ok(());
        }
        info!(cluster = %self.name, "Freezing writes: {}", reason);
        self.api
            .put_doc(&self.freeze_index, &self.freeze_doc_id, self.freeze_marker(reason))
            .await
    }

    /// Remove the advisory freeze marker.
    ///
    /// Self-healing: if the delete fails, the marker is re-written and the
    /// delete retried exactly once; only that second failure propagates.
    pub async fn unfreeze_writes(&self, reason: &str) -> Result<()> {
        if self.dry_run {
            info!(cluster = %self.name, "Dry-run: would unfreeze writes");
            return Ok(());
        }
        info!(cluster = %self.name, "Unfreezing writes");
        if let Err(e) = self.api.delete_doc(&self.freeze_index, &self.freeze_doc_id).await {
            warn!(
                cluster = %self.name,
                "Failed to remove freeze marker ({}); re-freezing and retrying once", e
            );
            self.api
                .put_doc(&self.freeze_index, &self.freeze_doc_id, self.freeze_marker(reason))
                .await?;
            self.api.delete_doc(&self.freeze_index, &self.freeze_doc_id).await?;
        }
        Ok(())
    }

    /// Run `body` with the freeze marker in place, removing it afterwards
    /// even when the body fails.
    pub async fn frozen_writes<T, F, Fut>(&self, reason: &str, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.freeze_writes(reason).await?;
        let result = body().await;
        let unfreeze = self.unfreeze_writes(reason).await;
        match (result, unfreeze) {
            (Err(e), _) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Ok(value), Ok(())) => Ok(value),
        }
    }

    /// Flush indices to speed up later shard recovery.
    ///
    /// Per-shard "not all shards flushed/synced" conflicts are expected while
    /// writes are in flight; they are logged and swallowed because the flush
    /// is an optimization, not a correctness requirement.
    pub async fn flush_markers(&self, timeout: Duration) -> Result<()> {
        if self.dry_run {
            info!(cluster = %self.name, "Dry-run: would flush indices");
            return Ok(());
        }
        match self.api.flush(timeout).await {
            Ok(()) => {}
            Err(FleetError::Conflict(msg)) => {
                warn!(cluster = %self.name, "Not all shards flushed: {}", msg);
            }
            Err(e) => return Err(e),
        }
        match self.api.flush_synced().await {
            Ok(()) => {}
            Err(FleetError::Conflict(msg)) => {
                warn!(cluster = %self.name, "Not all shards sync-flushed: {}", msg);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Try to force-allocate every unassigned replica shard.
    ///
    /// Candidates are shuffled per shard so repeated runs do not hammer the
    /// same node first. Per-shard failure is tolerated (warn and move on);
    /// only failure to enumerate shards or nodes propagates.
    pub async fn force_allocate_unassigned_shards(&self) -> Result<()> {
        if self.dry_run {
            info!(cluster = %self.name, "Dry-run: would force-allocate unassigned shards");
            return Ok(());
        }
        let shards = self.api.unassigned_shards().await?;
        if shards.is_empty() {
            debug!(cluster = %self.name, "No unassigned shards");
            return Ok(());
        }
        let nodes = self.api.node_info().await?;
        let candidates: Vec<String> = nodes.values().map(|n| n.name.clone()).collect();

        for shard in &shards {
            let mut order = candidates.clone();
            order.shuffle(&mut rand::rng());

            let mut allocated = false;
            for node in &order {
                match self.api.allocate_replica(&shard.index, shard.shard, node).await {
                    Ok(()) => {
                        info!(
                            cluster = %self.name,
                            "Allocated [{}][{}] to {}", shard.index, shard.shard, node
                        );
                        allocated = true;
                        break;
                    }
                    Err(e) => {
                        debug!(
                            cluster = %self.name,
                            "Cannot allocate [{}][{}] to {}: {}", shard.index, shard.shard, node, e
                        );
                    }
                }
            }
            if !allocated {
                warn!(
                    cluster = %self.name,
                    "Could not allocate [{}][{}] to any of {} nodes",
                    shard.index, shard.shard, order.len()
                );
            }
        }
        Ok(())
    }

    /// Clear the "read-only due to low disk" flag cluster-wide.
    pub async fn reset_read_only(&self) -> Result<()> {
        if self.dry_run {
            info!(cluster = %self.name, "Dry-run: would reset read-only flag");
            return Ok(());
        }
        info!(cluster = %self.name, "Resetting read-only flag");
        self.api.clear_read_only().await
    }
}
