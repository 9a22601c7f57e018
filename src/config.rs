use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path};

use crate::error::FleetError;

/// Configuration for one clustergroup: the set of logical clusters that are
/// maintained together, plus the ambient knobs every handle needs.
///
/// `members` is ordered (member name -> REST endpoint URL); the order defines
/// the fan-out order of fleet-wide operations and the entry order of the
/// freeze/replication cleanup stacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterGroupConfig {
    /// Clustergroup name, e.g. "search-main".
    pub name: String,
    /// Member name -> REST endpoint URL.
    pub members: BTreeMap<String, String>,
    /// Datacenters to probe for write-queue lag before declaring
    /// maintenance complete.
    #[serde(default)]
    pub write_queue_datacenters: Vec<String>,
    /// Metrics expression yielding per-topic/per-partition queue lag.
    #[serde(default = "default_write_queue_query")]
    pub write_queue_query: String,
    /// systemd unit prefix for co-located instances; the per-cluster unit is
    /// "<prefix>@<cluster>.service".
    #[serde(default = "default_service_unit_prefix")]
    pub service_unit_prefix: String,
    /// Well-known index holding the advisory freeze marker.
    #[serde(default = "default_freeze_index")]
    pub freeze_index: String,
    /// Fixed document id of the freeze marker.
    #[serde(default = "default_freeze_doc_id")]
    pub freeze_doc_id: String,
    /// When true, every mutating operation logs and returns success without
    /// calling out.
    #[serde(default)]
    pub dry_run: bool,
}

fn default_write_queue_query() -> String {
    "kafka_consumergroup_lag{group=\"search-indexing\"}".to_string()
}

fn default_service_unit_prefix() -> String {
    "elasticsearch".to_string()
}

fn default_freeze_index() -> String {
    "maintenance-metadata".to_string()
}

fn default_freeze_doc_id() -> String {
    "freeze-writes".to_string()
}

impl ClusterGroupConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, FleetError> {
        let content = fs::read_to_string(path)
            .map_err(|e| FleetError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| FleetError::Config(format!("Failed to parse config file: {}", e)))?;

        if config.members.is_empty() {
            return Err(FleetError::Config(format!(
                "Clustergroup {} has no members",
                config.name
            )));
        }

        Ok(config)
    }
}
