//! Default [`ClusterApi`] adapter speaking the search engine's REST dialect.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::{
    AllocationMode, ClusterApi, HealthQuery, HealthResponse, NodeInfo, UnassignedShard,
};
use crate::error::{FleetError, Result};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpClusterApi {
    base_url: String,
    client: Client,
}

impl HttpClusterApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| FleetError::cluster(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Wire shape of one entry in the nodes endpoint response.
#[derive(Debug, Deserialize)]
struct WireNode {
    name: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
    jvm: WireJvm,
}

#[derive(Debug, Deserialize)]
struct WireJvm {
    start_time_in_millis: i64,
}

#[derive(Debug, Deserialize)]
struct WireNodes {
    nodes: HashMap<String, WireNode>,
}

#[derive(Debug, Deserialize)]
struct WireCatShard {
    index: String,
    shard: String,
    prirep: String,
    state: String,
}

fn require_attr(node: &WireNode, key: &str) -> Result<String> {
    node.attributes
        .get(key)
        .cloned()
        .ok_or_else(|| FleetError::cluster(format!("Node {} has no '{}' attribute", node.name, key)))
}

async fn expect_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::CONFLICT {
        let text = response.text().await.unwrap_or_default();
        return Err(FleetError::Conflict(format!("{}: {}", what, text)));
    }
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(FleetError::cluster(format!("{} failed ({}): {}", what, status, text)));
    }
    Ok(response)
}

#[async_trait]
impl ClusterApi for HttpClusterApi {
    async fn node_info(&self) -> Result<HashMap<String, NodeInfo>> {
        let response = self.client.get(self.url("/_nodes")).send().await?;
        let wire: WireNodes = expect_success(response, "Nodes query").await?.json().await?;

        let mut nodes = HashMap::with_capacity(wire.nodes.len());
        for (id, node) in &wire.nodes {
            nodes.insert(
                id.clone(),
                NodeInfo {
                    name: node.name.clone(),
                    hostname: require_attr(node, "hostname")?,
                    fqdn: require_attr(node, "fqdn")?,
                    row: require_attr(node, "row")?,
                    jvm_start_ms: node.jvm.start_time_in_millis,
                },
            );
        }
        Ok(nodes)
    }

    async fn cluster_health(&self, query: &HealthQuery) -> Result<HealthResponse> {
        let mut request = self
            .client
            .get(self.url("/_cluster/health"))
            .query(&[
                ("wait_for_status", query.wait_for_status.to_string()),
                ("timeout", format!("{}s", query.timeout.as_secs().max(1))),
            ]);
        if query.wait_for_no_initializing_shards {
            request = request.query(&[("wait_for_no_initializing_shards", "true")]);
        }
        if query.wait_for_no_relocating_shards {
            request = request.query(&[("wait_for_no_relocating_shards", "true")]);
        }

        let response = request.send().await?;
        let status = response.status();
        // The health endpoint answers 408 with a regular body when the wait
        // condition is not reached within the timeout.
        if !status.is_success() && status != StatusCode::REQUEST_TIMEOUT {
            let text = response.text().await.unwrap_or_default();
            return Err(FleetError::cluster(format!(
                "Health query failed ({}): {}",
                status, text
            )));
        }
        Ok(response.json().await?)
    }

    async fn set_allocation_mode(&self, mode: AllocationMode) -> Result<()> {
        debug!("Setting routing allocation to {}", mode.as_str());
        let body = json!({
            "transient": { "cluster.routing.allocation.enable": mode.as_str() }
        });
        let response = self
            .client
            .put(self.url("/_cluster/settings"))
            .json(&body)
            .send()
            .await?;
        expect_success(response, "Cluster settings update").await?;
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> Result<()> {
        let response = self
            .client
            .post(self.url("/_all/_flush"))
            .query(&[("timeout", format!("{}s", timeout.as_secs().max(1)))])
            .send()
            .await?;
        expect_success(response, "Flush").await?;
        Ok(())
    }

    async fn flush_synced(&self) -> Result<()> {
        let response = self.client.post(self.url("/_all/_flush/synced")).send().await?;
        expect_success(response, "Synced flush").await?;
        Ok(())
    }

    async fn unassigned_shards(&self) -> Result<Vec<UnassignedShard>> {
        let response = self
            .client
            .get(self.url("/_cat/shards"))
            .query(&[("format", "json"), ("h", "index,shard,prirep,state")])
            .send()
            .await?;
        let rows: Vec<WireCatShard> = expect_success(response, "Shards query").await?.json().await?;

        let mut shards = Vec::new();
        for row in rows {
            if row.state != "UNASSIGNED" || row.prirep != "r" {
                continue;
            }
            let shard = row.shard.parse::<u32>().map_err(|_| {
                FleetError::cluster(format!("Unparseable shard number '{}' for {}", row.shard, row.index))
            })?;
            shards.push(UnassignedShard { index: row.index, shard });
        }
        Ok(shards)
    }

    async fn allocate_replica(&self, index: &str, shard: u32, node: &str) -> Result<()> {
        let body = json!({
            "commands": [{
                "allocate_replica": { "index": index, "shard": shard, "node": node }
            }]
        });
        let response = self
            .client
            .post(self.url("/_cluster/reroute"))
            .json(&body)
            .send()
            .await?;
        expect_success(response, "Reroute").await?;
        Ok(())
    }

    async fn put_doc(&self, index: &str, id: &str, body: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .put(self.url(&format!("/{}/_doc/{}", index, id)))
            .json(&body)
            .send()
            .await?;
        expect_success(response, "Document index").await?;
        Ok(())
    }

    async fn delete_doc(&self, index: &str, id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/{}/_doc/{}", index, id)))
            .send()
            .await?;
        expect_success(response, "Document delete").await?;
        Ok(())
    }

    async fn clear_read_only(&self) -> Result<()> {
        let body = json!({ "index.blocks.read_only_allow_delete": null });
        let response = self
            .client
            .put(self.url("/_all/_settings"))
            .json(&body)
            .send()
            .await?;
        expect_success(response, "Read-only reset").await?;
        Ok(())
    }
}
