//! Multi-cluster fan-out and the node-selection algorithm.

use chrono::{DateTime, Utc};
use std::collections::{hash_map::Entry, BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::api::http::HttpClusterApi;
use crate::batch::HostBatch;
use crate::cluster::{ClusterHandle, ReplicationMode};
use crate::config::ClusterGroupConfig;
use crate::error::{FleetError, Result};
use crate::host::HostView;
use crate::metrics::MetricsApi;
use crate::remote::RemoteExecutor;
use crate::retry::{retry, tries_for};

const HEALTH_RETRY_DELAY: Duration = Duration::from_secs(10);
const WRITE_QUEUE_RETRY_DELAY: Duration = Duration::from_secs(60);
const WRITE_QUEUE_TRIES: usize = 60;

/// Owns the member clusters of one clustergroup and coordinates maintenance
/// across them. Immutable after construction.
pub struct FleetCoordinator {
    config: ClusterGroupConfig,
    clusters: Vec<Arc<ClusterHandle>>,
    remote: Arc<dyn RemoteExecutor>,
    metrics: Arc<dyn MetricsApi>,
}

impl FleetCoordinator {
    pub fn new(
        config: ClusterGroupConfig,
        clusters: Vec<Arc<ClusterHandle>>,
        remote: Arc<dyn RemoteExecutor>,
        metrics: Arc<dyn MetricsApi>,
    ) -> Self {
        Self { config, clusters, remote, metrics }
    }

    /// Build a coordinator from config, with one HTTP-backed handle per
    /// member endpoint.
    pub fn connect(
        config: ClusterGroupConfig,
        remote: Arc<dyn RemoteExecutor>,
        metrics: Arc<dyn MetricsApi>,
    ) -> Result<Self> {
        let mut clusters = Vec::with_capacity(config.members.len());
        for (name, url) in &config.members {
            let api = Arc::new(HttpClusterApi::new(url.clone())?);
            clusters.push(Arc::new(ClusterHandle::new(name.clone(), api, &config)));
        }
        Ok(Self::new(config, clusters, remote, metrics))
    }

    pub fn clusters(&self) -> &[Arc<ClusterHandle>] {
        &self.clusters
    }

    /// Flush every member cluster. Sequential, stop on first error, no
    /// rollback: members after the failing one are left untouched.
    pub async fn flush_markers(&self, timeout: Duration) -> Result<()> {
        for cluster in &self.clusters {
            cluster.flush_markers(timeout).await?;
        }
        Ok(())
    }

    /// Force-allocate unassigned shards on every member cluster. Sequential,
    /// stop on first error, no rollback.
    pub async fn force_allocate_unassigned_shards(&self) -> Result<()> {
        for cluster in &self.clusters {
            cluster.force_allocate_unassigned_shards().await?;
        }
        Ok(())
    }

    /// Reset the read-only flag on every member cluster. Sequential, stop on
    /// first error, no rollback.
    pub async fn reset_read_only(&self) -> Result<()> {
        for cluster in &self.clusters {
            cluster.reset_read_only().await?;
        }
        Ok(())
    }

    /// Run `body` with the advisory freeze marker in place on every member.
    ///
    /// Entry follows member order; exit is reverse order. If freezing member
    /// m fails, members 1..m-1 are unfrozen (best effort) before the entry
    /// error propagates, so no member is left frozen behind a failed setup.
    pub async fn frozen_writes<T, F, Fut>(&self, reason: &str, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut entered: Vec<Arc<ClusterHandle>> = Vec::new();
        for cluster in &self.clusters {
            if let Err(e) = cluster.freeze_writes(reason).await {
                error!(
                    "Freezing writes on {} failed; unwinding {} already-frozen members",
                    cluster.name(),
                    entered.len()
                );
                for frozen in entered.iter().rev() {
                    if let Err(unwind) = frozen.unfreeze_writes(reason).await {
                        warn!("Failed to unfreeze {} while unwinding: {}", frozen.name(), unwind);
                    }
                }
                return Err(e);
            }
            entered.push(Arc::clone(cluster));
        }

        let result = body().await;

        let mut exit_error = None;
        for frozen in entered.iter().rev() {
            if let Err(e) = frozen.unfreeze_writes(reason).await {
                error!("Failed to unfreeze {}: {}", frozen.name(), e);
                exit_error.get_or_insert(e);
            }
        }
        match (result, exit_error) {
            (Err(e), _) => Err(e),
            (Ok(_), Some(e)) => Err(e),
            (Ok(value), None) => Ok(value),
        }
    }

    /// Run `body` with replica movement disabled on every member. Same
    /// cleanup-stack semantics as [`FleetCoordinator::frozen_writes`].
    pub async fn stopped_replication<T, F, Fut>(&self, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut entered: Vec<Arc<ClusterHandle>> = Vec::new();
        for cluster in &self.clusters {
            if let Err(e) = cluster.set_replication_enabled(ReplicationMode::PrimariesOnly).await {
                error!(
                    "Stopping replication on {} failed; restoring {} already-stopped members",
                    cluster.name(),
                    entered.len()
                );
                for stopped in entered.iter().rev() {
                    if let Err(unwind) = stopped.set_replication_enabled(ReplicationMode::All).await {
                        warn!("Failed to restore replication on {}: {}", stopped.name(), unwind);
                    }
                }
                return Err(e);
            }
            entered.push(Arc::clone(cluster));
        }

        let result = body().await;

        let mut exit_error = None;
        for stopped in entered.iter().rev() {
            if let Err(e) = stopped.set_replication_enabled(ReplicationMode::All).await {
                error!("Failed to restore replication on {}: {}", stopped.name(), e);
                exit_error.get_or_insert(e);
            }
        }
        match (result, exit_error) {
            (Err(e), _) => Err(e),
            (Ok(_), Some(e)) => Err(e),
            (Ok(value), None) => Ok(value),
        }
    }

    /// Wait until every member cluster is green. The retry budget is derived
    /// from the caller-supplied timeout at call time.
    pub async fn wait_for_green(&self, timeout: Duration) -> Result<()> {
        let tries = tries_for(timeout, HEALTH_RETRY_DELAY);
        retry(tries, HEALTH_RETRY_DELAY, || async move {
            for cluster in &self.clusters {
                cluster.check_green().await?;
            }
            Ok(())
        })
        .await
    }

    /// Wait until every member cluster is at least yellow with no moving
    /// shards.
    pub async fn wait_for_yellow_no_moving_shards(&self, timeout: Duration) -> Result<()> {
        let tries = tries_for(timeout, HEALTH_RETRY_DELAY);
        retry(tries, HEALTH_RETRY_DELAY, || async move {
            for cluster in &self.clusters {
                cluster.check_yellow_no_moving_shards().await?;
            }
            Ok(())
        })
        .await
    }

    /// Wait until the external write queues feeding the clustergroup are
    /// fully drained in every configured datacenter. Bounded to roughly one
    /// hour of polling.
    pub async fn wait_for_all_write_queues_empty(&self) -> Result<()> {
        retry(WRITE_QUEUE_TRIES, WRITE_QUEUE_RETRY_DELAY, || self.write_queues_empty()).await
    }

    async fn write_queues_empty(&self) -> Result<()> {
        let mut reported = false;
        for datacenter in &self.config.write_queue_datacenters {
            let samples = self
                .metrics
                .query(&self.config.write_queue_query, datacenter)
                .await?;
            if !samples.is_empty() {
                reported = true;
            }
            for sample in samples {
                if sample.value > 0.0 {
                    return Err(FleetError::check(format!(
                        "Write queue {}[{}] in {} has lag {}",
                        sample.topic, sample.partition, datacenter, sample.value
                    )));
                }
            }
        }
        // At least one datacenter is expected to always report data; silence
        // everywhere means the signal itself is broken.
        if !reported {
            return Err(FleetError::Metrics(
                "No datacenter reported any write-queue partition".to_string(),
            ));
        }
        Ok(())
    }

    /// Pick the next batch of hosts to operate on.
    ///
    /// Merges every member's node list into per-host views, drops hosts
    /// already restarted since `cutoff`, and returns up to `size` hosts from
    /// the row with the fewest remaining candidates (ties broken by lexical
    /// row name). Draining the row closest to completion first keeps at most
    /// one failure domain in a partially-maintained state.
    ///
    /// Returns `Ok(None)` once every host has been restarted.
    pub async fn select_next_batch(
        &self,
        cutoff: DateTime<Utc>,
        size: usize,
    ) -> Result<Option<HostBatch>> {
        if size < 1 {
            return Err(FleetError::InvalidArgument(format!(
                "Batch size must be at least 1, got {}",
                size
            )));
        }

        let mut hosts: HashMap<String, HostView> = HashMap::new();
        for cluster in &self.clusters {
            for record in cluster.list_nodes().await? {
                match hosts.entry(record.hostname.clone()) {
                    Entry::Occupied(mut view) => {
                        view.get_mut().accumulate(record, Arc::clone(cluster))?;
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(HostView::from_record(record, Arc::clone(cluster)));
                    }
                }
            }
        }

        let mut rows: BTreeMap<String, Vec<HostView>> = BTreeMap::new();
        let mut remaining = 0usize;
        for view in hosts.into_values() {
            if view.restarted_since(cutoff) {
                continue;
            }
            remaining += 1;
            rows.entry(view.row().to_string()).or_default().push(view);
        }
        if rows.is_empty() {
            info!("Every host restarted since {}; no more work", cutoff);
            return Ok(None);
        }

        // min_by_key keeps the first minimum, and BTreeMap iterates rows in
        // lexical order, so ties resolve to the lexically smallest row name.
        let Some((row, mut selected)) = rows.into_iter().min_by_key(|(_, hosts)| hosts.len())
        else {
            return Ok(None);
        };
        selected.sort_by(|a, b| a.hostname().cmp(b.hostname()));
        selected.truncate(size);

        info!(
            "Selected {} host(s) from row {} ({} host(s) remaining fleet-wide)",
            selected.len(),
            row,
            remaining
        );
        Ok(Some(HostBatch::new(
            selected,
            Arc::clone(&self.remote),
            self.config.service_unit_prefix.clone(),
            self.config.dry_run,
        )))
    }
}
