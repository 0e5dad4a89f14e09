/// Fragment transport against storage nodes.
///
/// Wire shapes are shared with the node service in `crate::node`. All
/// payloads are base64 in JSON; nodes only ever see ciphertext.
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::crypto::hash;
use crate::error::{MystError, Result};

/// `POST /store` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRequest {
    pub fragment_id: String,
    /// Base64 fragment ciphertext.
    pub data: String,
    /// SHA-256 of the ciphertext, hex; the node recomputes and compares.
    pub checksum: String,
    pub metadata: FragmentMetadata,
}

/// Opaque-to-the-node bookkeeping stored alongside a fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentMetadata {
    pub file_hash: String,
    pub partition_index: usize,
    pub redundancy_index: usize,
    pub double_encrypted: bool,
    /// Upload wall-clock time, epoch milliseconds.
    pub timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreResponse {
    pub success: bool,
    pub fragment_id: String,
    pub size: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RetrieveResponse {
    pub success: bool,
    /// Base64 fragment ciphertext.
    pub data: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub metadata: Option<FragmentMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub timestamp: u64,
    pub node_id: String,
    #[serde(default)]
    pub public_ip: Option<String>,
}

/// HTTP client for storage-node endpoints.
#[derive(Clone)]
pub struct NodeClient {
    client: Client,
    ping_timeout: Duration,
    transfer_timeout: Duration,
}

impl NodeClient {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::new(),
            ping_timeout: config.ping_timeout,
            transfer_timeout: config.transfer_timeout,
        }
    }

    /// Latency probe. Any failure (including timeout) surfaces as
    /// `NodeUnreachable`.
    pub async fn ping(&self, base_url: &str) -> Result<Duration> {
        let started = Instant::now();
        let resp = self
            .client
            .get(format!("{base_url}/ping"))
            .timeout(self.ping_timeout)
            .send()
            .await
            .map_err(|e| MystError::NodeUnreachable {
                address: base_url.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(MystError::NodeUnreachable {
                address: base_url.to_string(),
                reason: format!("ping returned {}", resp.status()),
            });
        }
        Ok(started.elapsed())
    }

    /// Store one fragment. Success requires HTTP 2xx and `success: true`.
    pub async fn store(&self, base_url: &str, request: &StoreRequest) -> Result<StoreResponse> {
        let resp = self
            .client
            .post(format!("{base_url}/store"))
            .json(request)
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(|e| MystError::NodeUnreachable {
                address: base_url.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(MystError::NodeUnreachable {
                address: base_url.to_string(),
                reason: format!("store returned {}", resp.status()),
            });
        }

        let body: StoreResponse =
            resp.json()
                .await
                .map_err(|e| MystError::NodeUnreachable {
                    address: base_url.to_string(),
                    reason: format!("bad store response: {e}"),
                })?;

        if !body.success {
            return Err(MystError::NodeUnreachable {
                address: base_url.to_string(),
                reason: "node rejected the fragment".to_string(),
            });
        }
        Ok(body)
    }

    /// Retrieve one fragment's ciphertext by id.
    ///
    /// 404 is a soft miss (`FragmentNotFound`); anything else that fails
    /// is `NodeUnreachable`. Both are absorbed while replicas remain.
    pub async fn retrieve(&self, base_url: &str, fragment_id: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(format!("{base_url}/retrieve/{fragment_id}"))
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(|e| MystError::NodeUnreachable {
                address: base_url.to_string(),
                reason: e.to_string(),
            })?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MystError::FragmentNotFound {
                fragment_id: fragment_id.to_string(),
                address: base_url.to_string(),
            });
        }
        if !resp.status().is_success() {
            return Err(MystError::NodeUnreachable {
                address: base_url.to_string(),
                reason: format!("retrieve returned {}", resp.status()),
            });
        }

        let body: RetrieveResponse =
            resp.json()
                .await
                .map_err(|e| MystError::NodeUnreachable {
                    address: base_url.to_string(),
                    reason: format!("bad retrieve response: {e}"),
                })?;

        if !body.success {
            return Err(MystError::FragmentNotFound {
                fragment_id: fragment_id.to_string(),
                address: base_url.to_string(),
            });
        }

        BASE64.decode(&body.data).map_err(|e| MystError::NodeUnreachable {
            address: base_url.to_string(),
            reason: format!("fragment payload is not valid base64: {e}"),
        })
    }
}

impl StoreRequest {
    /// Build a request from raw ciphertext, encoding and checksumming.
    pub fn from_ciphertext(
        fragment_id: String,
        ciphertext: &[u8],
        metadata: FragmentMetadata,
    ) -> Self {
        Self {
            fragment_id,
            data: BASE64.encode(ciphertext),
            checksum: hash::sha256_hex(ciphertext),
            metadata,
        }
    }
}
