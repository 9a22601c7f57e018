//! Rolling-maintenance orchestration for clustered search-engine fleets.
//!
//! An external driver repeatedly asks a [`FleetCoordinator`] for the next
//! batch of hosts to operate on, restarts them through the returned
//! [`HostBatch`], and gates on cluster health before looping. Selection
//! balances progress across failure domains ("rows") by always draining the
//! row closest to completion first.

pub mod api;
pub mod batch;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod host;
pub mod logging;
pub mod metrics;
pub mod remote;
pub mod retry;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export common types
pub use batch::HostBatch;
pub use cluster::{ClusterHandle, ReplicationMode};
pub use config::ClusterGroupConfig;
pub use coordinator::FleetCoordinator;
pub use error::{FleetError, Result};
pub use host::{HostView, NodeRecord};
