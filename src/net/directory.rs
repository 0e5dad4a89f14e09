/// Directory service client.
///
/// The directory is an external registry of live nodes; only its
/// request/response shapes are fixed here. It is fully untrusted: the
/// client never sends it anything but node bookkeeping.
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::NodeDescriptor;
use crate::error::{MystError, Result};

/// Client for the directory HTTP API.
#[derive(Clone)]
pub struct DirectoryClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct NodesResponse {
    nodes: Vec<NodeDescriptor>,
}

/// Node registration request body.
#[derive(Debug, Serialize)]
pub struct RegisterRequest {
    pub node_id: String,
    pub address: String,
    pub port: u16,
    pub available_space: u64,
    pub total_space: u64,
}

/// Fragment placement report, sent best-effort after a store.
#[derive(Debug, Serialize)]
pub struct FragmentReport {
    pub fragment_id: String,
    pub node_id: String,
    pub file_hash: String,
    pub partition_index: usize,
}

/// Heartbeat outcome: the directory either still knows the node or has
/// expired it (a 404, which triggers re-registration).
#[derive(Debug, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Acknowledged,
    Unknown,
}

/// Network-wide statistics as the directory reports them.
#[derive(Debug, Deserialize)]
pub struct DirectoryStats {
    #[serde(default)]
    pub total_nodes: u64,
    #[serde(default)]
    pub active_nodes: u64,
    #[serde(default)]
    pub total_fragments: u64,
    #[serde(default)]
    pub total_space: u64,
    #[serde(default)]
    pub available_space: u64,
}

impl DirectoryClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Ask for `count` nodes each holding at least `min_space` free bytes.
    pub async fn discover_nodes(&self, count: usize, min_space: u64) -> Result<Vec<NodeDescriptor>> {
        let resp = self
            .client
            .get(format!("{}/nodes", self.base_url))
            .query(&[
                ("count", count.to_string()),
                ("minSpace", min_space.to_string()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MystError::Directory(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MystError::Directory(format!(
                "node discovery returned {}",
                resp.status()
            )));
        }

        let body: NodesResponse = resp
            .json()
            .await
            .map_err(|e| MystError::Directory(format!("bad /nodes response: {e}")))?;

        Ok(body.nodes)
    }

    /// Register (or re-register) a storage node.
    pub async fn register(&self, req: &RegisterRequest) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/register", self.base_url))
            .json(req)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MystError::Directory(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MystError::Directory(format!(
                "registration returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Report liveness. A 404 means the directory expired this node.
    pub async fn heartbeat(&self, node_id: &str) -> Result<HeartbeatOutcome> {
        let resp = self
            .client
            .post(format!("{}/heartbeat/{node_id}", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MystError::Directory(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(HeartbeatOutcome::Unknown);
        }
        if !resp.status().is_success() {
            return Err(MystError::Directory(format!(
                "heartbeat returned {}",
                resp.status()
            )));
        }
        Ok(HeartbeatOutcome::Acknowledged)
    }

    /// Best-effort removal on shutdown.
    pub async fn unregister(&self, node_id: &str) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/unregister/{node_id}", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MystError::Directory(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MystError::Directory(format!(
                "unregister returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Tell the directory where a fragment landed. Best-effort; callers
    /// log and ignore failures.
    pub async fn register_fragment(&self, report: &FragmentReport) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/fragment/register", self.base_url))
            .json(report)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MystError::Directory(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MystError::Directory(format!(
                "fragment registration returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Network overview for the `stats` command.
    pub async fn stats(&self) -> Result<DirectoryStats> {
        let resp = self
            .client
            .get(format!("{}/stats", self.base_url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| MystError::Directory(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(MystError::Directory(format!(
                "stats returned {}",
                resp.status()
            )));
        }

        resp.json()
            .await
            .map_err(|e| MystError::Directory(format!("bad /stats response: {e}")))
    }
}
