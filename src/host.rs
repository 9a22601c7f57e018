//! Per-host view of cluster membership.
//!
//! A physical host runs one search-engine instance per logical cluster it
//! participates in. Each instance shows up separately in its cluster's node
//! list; maintenance reasons about whole hosts, so the per-instance records
//! are merged into one [`HostView`] per hostname.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::cluster::ClusterHandle;
use crate::error::{FleetError, Result};

/// Immutable snapshot of one cluster-reported instance. Produced fresh on
/// every node-list query, never persisted.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub hostname: String,
    pub fqdn: String,
    pub row: String,
    pub cluster_name: String,
    pub started_at: DateTime<Utc>,
}

/// All co-located instances on one physical host, merged.
///
/// Rebuilt from scratch on every selection pass so it always reflects live
/// cluster state.
#[derive(Debug, Clone)]
pub struct HostView {
    hostname: String,
    fqdn: String,
    row: String,
    cluster_names: BTreeSet<String>,
    clusters: Vec<Arc<ClusterHandle>>,
    earliest_started_at: DateTime<Utc>,
}

impl HostView {
    pub fn from_record(record: NodeRecord, cluster: Arc<ClusterHandle>) -> Self {
        let mut cluster_names = BTreeSet::new();
        cluster_names.insert(record.cluster_name);
        Self {
            hostname: record.hostname,
            fqdn: record.fqdn,
            row: record.row,
            cluster_names,
            clusters: vec![cluster],
            earliest_started_at: record.started_at,
        }
    }

    /// Fold another instance record for the same host into this view.
    ///
    /// All records for one hostname must agree on fqdn and row; a mismatch
    /// means the host is misconfigured or the inventory is corrupt, and the
    /// merge aborts with [`FleetError::InvariantViolation`] rather than
    /// silently picking one value.
    pub fn accumulate(&mut self, record: NodeRecord, cluster: Arc<ClusterHandle>) -> Result<()> {
        if record.hostname != self.hostname {
            return Err(FleetError::invariant(format!(
                "Cannot merge record for {} into host {}",
                record.hostname, self.hostname
            )));
        }
        if record.fqdn != self.fqdn {
            return Err(FleetError::invariant(format!(
                "Host {} reports conflicting fqdn values: {} vs {}",
                self.hostname, self.fqdn, record.fqdn
            )));
        }
        if record.row != self.row {
            return Err(FleetError::invariant(format!(
                "Host {} reports conflicting rows: {} vs {}",
                self.hostname, self.row, record.row
            )));
        }

        if self.cluster_names.insert(record.cluster_name) {
            self.clusters.push(cluster);
        }
        self.earliest_started_at = self.earliest_started_at.min(record.started_at);
        Ok(())
    }

    /// A host counts as restarted only when *every* instance hosted on it
    /// started strictly after `cutoff`; a single stale instance keeps the
    /// whole host pending.
    pub fn restarted_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.earliest_started_at > cutoff
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn fqdn(&self) -> &str {
        &self.fqdn
    }

    pub fn row(&self) -> &str {
        &self.row
    }

    pub fn cluster_names(&self) -> &BTreeSet<String> {
        &self.cluster_names
    }

    pub fn clusters(&self) -> &[Arc<ClusterHandle>] {
        &self.clusters
    }

    pub fn earliest_started_at(&self) -> DateTime<Utc> {
        self.earliest_started_at
    }
}
