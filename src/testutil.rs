//! Hand-rolled mock collaborators shared by the unit tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::api::{
    AllocationMode, ClusterApi, HealthQuery, HealthResponse, HealthStatus, NodeInfo,
    UnassignedShard,
};
use crate::cluster::ClusterHandle;
use crate::config::ClusterGroupConfig;
use crate::error::{FleetError, Result};
use crate::host::NodeRecord;
use crate::metrics::{LagSample, MetricsApi};
use crate::remote::{Command, ExecTarget, RemoteExecutor};

pub(crate) fn test_config() -> ClusterGroupConfig {
    let mut members = BTreeMap::new();
    members.insert("alpha".to_string(), "http://alpha.example.org:9200".to_string());
    ClusterGroupConfig {
        name: "test-group".to_string(),
        members,
        write_queue_datacenters: vec!["dc1".to_string(), "dc2".to_string()],
        write_queue_query: "queue_lag".to_string(),
        service_unit_prefix: "elasticsearch".to_string(),
        freeze_index: "maintenance-metadata".to_string(),
        freeze_doc_id: "freeze-writes".to_string(),
        dry_run: false,
    }
}

pub(crate) fn record(hostname: &str, row: &str, cluster: &str, start_ms: i64) -> NodeRecord {
    NodeRecord {
        hostname: hostname.to_string(),
        fqdn: format!("{}.example.org", hostname),
        row: row.to_string(),
        cluster_name: cluster.to_string(),
        started_at: Utc.timestamp_millis_opt(start_ms).unwrap(),
    }
}

pub(crate) fn test_cluster(name: &str) -> Arc<ClusterHandle> {
    Arc::new(ClusterHandle::new(
        name,
        Arc::new(MockClusterApi::default()),
        &test_config(),
    ))
}

pub(crate) fn health(status: HealthStatus) -> HealthResponse {
    HealthResponse {
        status,
        timed_out: false,
        relocating_shards: 0,
        initializing_shards: 0,
    }
}

/// Scripted response for one health query.
pub(crate) enum MockHealth {
    Respond(HealthResponse),
    TransportError,
}

/// Scriptable [`ClusterApi`] mock. Fields are plain shared state the tests
/// poke before driving the code under test.
#[derive(Default)]
pub(crate) struct MockClusterApi {
    pub nodes: Mutex<HashMap<String, NodeInfo>>,
    pub health_script: Mutex<VecDeque<MockHealth>>,
    pub fail_transport: AtomicBool,
    pub flush_conflict: AtomicBool,
    pub flush_synced_conflict: AtomicBool,
    pub flush_calls: AtomicUsize,
    pub flush_synced_calls: AtomicUsize,
    pub shards: Mutex<Vec<UnassignedShard>>,
    pub rejecting_nodes: Mutex<HashSet<String>>,
    pub allocations: Mutex<Vec<(String, u32, String)>>,
    pub put_doc_failures: AtomicUsize,
    pub delete_doc_failures: AtomicUsize,
    pub put_docs: Mutex<Vec<(String, String, serde_json::Value)>>,
    pub deleted_docs: AtomicUsize,
    pub allocation_modes: Mutex<Vec<AllocationMode>>,
    pub clear_read_only_calls: AtomicUsize,
}

impl MockClusterApi {
    /// Populate the node list with one instance per `(hostname, row, start_ms)`.
    pub fn with_hosts(hosts: &[(&str, &str, i64)]) -> Self {
        let api = Self::default();
        {
            let mut nodes = api.nodes.lock().unwrap();
            for (i, (hostname, row, start_ms)) in hosts.iter().enumerate() {
                nodes.insert(
                    format!("node-{}", i),
                    NodeInfo {
                        name: format!("{}-instance", hostname),
                        hostname: hostname.to_string(),
                        fqdn: format!("{}.example.org", hostname),
                        row: row.to_string(),
                        jvm_start_ms: *start_ms,
                    },
                );
            }
        }
        api
    }

    fn check_transport(&self) -> Result<()> {
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(FleetError::cluster("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterApi for MockClusterApi {
    async fn node_info(&self) -> Result<HashMap<String, NodeInfo>> {
        self.check_transport()?;
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn cluster_health(&self, _query: &HealthQuery) -> Result<HealthResponse> {
        match self.health_script.lock().unwrap().pop_front() {
            Some(MockHealth::Respond(response)) => Ok(response),
            Some(MockHealth::TransportError) => Err(FleetError::cluster("connection refused")),
            None => Ok(health(HealthStatus::Green)),
        }
    }

    async fn set_allocation_mode(&self, mode: AllocationMode) -> Result<()> {
        self.check_transport()?;
        self.allocation_modes.lock().unwrap().push(mode);
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> Result<()> {
        self.check_transport()?;
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        if self.flush_conflict.load(Ordering::SeqCst) {
            return Err(FleetError::Conflict("3 of 12 shards failed".to_string()));
        }
        Ok(())
    }

    async fn flush_synced(&self) -> Result<()> {
        self.check_transport()?;
        self.flush_synced_calls.fetch_add(1, Ordering::SeqCst);
        if self.flush_synced_conflict.load(Ordering::SeqCst) {
            return Err(FleetError::Conflict("sync failed on 2 shards".to_string()));
        }
        Ok(())
    }

    async fn unassigned_shards(&self) -> Result<Vec<UnassignedShard>> {
        self.check_transport()?;
        Ok(self.shards.lock().unwrap().clone())
    }

    async fn allocate_replica(&self, index: &str, shard: u32, node: &str) -> Result<()> {
        self.check_transport()?;
        if self.rejecting_nodes.lock().unwrap().contains(node) {
            return Err(FleetError::cluster(format!("{} cannot take [{}][{}]", node, index, shard)));
        }
        self.allocations
            .lock()
            .unwrap()
            .push((index.to_string(), shard, node.to_string()));
        Ok(())
    }

    async fn put_doc(&self, index: &str, id: &str, body: serde_json::Value) -> Result<()> {
        let failures = self.put_doc_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.put_doc_failures.store(failures - 1, Ordering::SeqCst);
            return Err(FleetError::cluster("index failed"));
        }
        self.put_docs
            .lock()
            .unwrap()
            .push((index.to_string(), id.to_string(), body));
        Ok(())
    }

    async fn delete_doc(&self, _index: &str, _id: &str) -> Result<()> {
        let failures = self.delete_doc_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.delete_doc_failures.store(failures - 1, Ordering::SeqCst);
            return Err(FleetError::cluster("delete failed"));
        }
        self.deleted_docs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_read_only(&self) -> Result<()> {
        self.check_transport()?;
        self.clear_read_only_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every fan-out command; optionally fails them all.
#[derive(Default)]
pub(crate) struct MockRemote {
    pub executed: Mutex<Vec<(String, Command)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl RemoteExecutor for MockRemote {
    async fn execute(&self, target: &ExecTarget, command: &Command) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(FleetError::remote("fan-out failed"));
        }
        self.executed
            .lock()
            .unwrap()
            .push((target.pattern(), command.clone()));
        Ok(())
    }
}

/// Per-datacenter scripted lag samples.
#[derive(Default)]
pub(crate) struct MockMetrics {
    pub samples: Mutex<HashMap<String, Vec<LagSample>>>,
}

impl MockMetrics {
    pub fn with_lag(datacenter: &str, topic: &str, partition: i32, value: f64) -> Self {
        let metrics = Self::default();
        metrics.samples.lock().unwrap().insert(
            datacenter.to_string(),
            vec![LagSample { topic: topic.to_string(), partition, value }],
        );
        metrics
    }
}

#[async_trait]
impl MetricsApi for MockMetrics {
    async fn query(&self, _expression: &str, datacenter: &str) -> Result<Vec<LagSample>> {
        Ok(self
            .samples
            .lock()
            .unwrap()
            .get(datacenter)
            .cloned()
            .unwrap_or_default())
    }
}
