//! Remote-execution verbs over one selected batch of hosts.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::{FleetError, Result};
use crate::host::HostView;
use crate::remote::{Command, ExecTarget, RemoteExecutor};
use crate::retry::{retry, tries_for};

const REJOIN_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A bound set of physical hosts produced by batch selection, consumed by
/// exactly one maintenance cycle. Not persisted.
pub struct HostBatch {
    hosts: Vec<HostView>,
    target: ExecTarget,
    remote: Arc<dyn RemoteExecutor>,
    service_unit_prefix: String,
    dry_run: bool,
}

impl std::fmt::Debug for HostBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostBatch")
            .field("hosts", &self.hosts)
            .field("target", &self.target)
            .field("service_unit_prefix", &self.service_unit_prefix)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl HostBatch {
    pub fn new(
        hosts: Vec<HostView>,
        remote: Arc<dyn RemoteExecutor>,
        service_unit_prefix: String,
        dry_run: bool,
    ) -> Self {
        let target = ExecTarget::new(hosts.iter().map(|h| h.hostname().to_string()).collect());
        Self { hosts, target, remote, service_unit_prefix, dry_run }
    }

    pub fn hosts(&self) -> &[HostView] {
        &self.hosts
    }

    pub fn target(&self) -> &ExecTarget {
        &self.target
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// The service units configured on the batch's hosts, one per cluster a
    /// host participates in.
    fn service_units(&self) -> BTreeSet<String> {
        let mut units = BTreeSet::new();
        for host in &self.hosts {
            for cluster in host.cluster_names() {
                units.insert(format!("{}@{}.service", self.service_unit_prefix, cluster));
            }
        }
        units
    }

    async fn run(&self, command: Command) -> Result<()> {
        if self.dry_run && !command.safe {
            info!(hosts = %self.target, "Dry-run: would execute '{}'", command.line);
            return Ok(());
        }
        info!(hosts = %self.target, "Executing '{}'", command.line);
        self.remote.execute(&self.target, &command).await
    }

    async fn systemctl(&self, verb: &str) -> Result<()> {
        let units: Vec<String> = self.service_units().into_iter().collect();
        if units.is_empty() {
            return Err(FleetError::InvalidArgument(
                "Batch has no service units to operate on".to_string(),
            ));
        }
        self.run(Command::new(format!("systemctl {} {}", verb, units.join(" "))))
            .await
    }

    pub async fn start_service(&self) -> Result<()> {
        self.systemctl("start").await
    }

    pub async fn stop_service(&self) -> Result<()> {
        self.systemctl("stop").await
    }

    pub async fn restart_service(&self) -> Result<()> {
        self.systemctl("restart").await
    }

    /// Remove the batch's hosts from the load balancer. No verification is
    /// done here; callers gate on health before pooling back in.
    pub async fn depool(&self) -> Result<()> {
        self.run(Command::new("depool")).await
    }

    /// Put the batch's hosts back into the load balancer.
    pub async fn pool(&self) -> Result<()> {
        self.run(Command::new("pool")).await
    }

    /// Wait until every host in the batch has rejoined every cluster it
    /// participates in. The retry budget is derived from the caller-supplied
    /// timeout; skipped entirely in dry-run mode (nothing was restarted).
    pub async fn wait_until_rejoined(&self, timeout: Duration) -> Result<()> {
        if self.dry_run {
            info!(hosts = %self.target, "Dry-run: skipping rejoin wait");
            return Ok(());
        }
        let tries = tries_for(timeout, REJOIN_RETRY_DELAY);
        retry(tries, REJOIN_RETRY_DELAY, || async move {
            for host in &self.hosts {
                for cluster in host.clusters() {
                    if !cluster.is_member(host.hostname()).await? {
                        return Err(FleetError::check(format!(
                            "{} has not rejoined {}",
                            host.hostname(),
                            cluster.name()
                        )));
                    }
                }
            }
            Ok(())
        })
        .await
    }
}
