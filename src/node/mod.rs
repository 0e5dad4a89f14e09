/// Storage-node fragment service.
///
/// An untrusted blob server: it accepts opaque ciphertext fragments,
/// serves them back by id, and reports its liveness to the directory.
/// It can never read what it stores.
///
/// Fragments live as `<storage>/<fragment_id>.frag` with a JSON metadata
/// sidecar; the in-memory table is rebuilt on startup by scanning the
/// storage directory and re-hashing every fragment.
pub mod identity;
pub mod routes;
pub mod tasks;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::NodeConfig;
use crate::crypto::hash;
use crate::error::{MystError, Result};
use crate::net::directory::DirectoryClient;
use crate::net::transport::FragmentMetadata;
use identity::NodeIdentity;

pub const FRAGMENT_EXTENSION: &str = "frag";
const SIDECAR_EXTENSION: &str = "meta";

/// One stored fragment as tracked by the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentRecord {
    /// SHA-256 of the stored ciphertext, hex.
    pub checksum: String,
    pub size: u64,
    pub metadata: FragmentMetadata,
    /// Epoch milliseconds at store time.
    pub stored_at: u64,
    pub access_count: u64,
}

/// Fragment table plus the used-space counter it implies.
///
/// Guarded by one RwLock so `/store` updates stay serialized against
/// readers (single-writer discipline).
#[derive(Default)]
pub struct FragmentTable {
    pub entries: HashMap<String, FragmentRecord>,
    pub used_space: u64,
}

/// Shared state for the fragment service.
pub struct NodeState {
    pub config: NodeConfig,
    pub identity: NodeIdentity,
    pub table: RwLock<FragmentTable>,
    pub directory: DirectoryClient,
    pub started: Instant,
}

impl NodeState {
    /// Initialize the node: identity, storage directory, table rescan.
    pub async fn init(config: NodeConfig) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.storage_dir).await?;
        let identity = NodeIdentity::load_or_create(&config.storage_dir).await?;
        let directory =
            DirectoryClient::new(config.directory_url.clone(), config.directory_timeout);

        let table = scan_storage(&config.storage_dir).await?;
        info!(
            node_id = %identity.node_id,
            fragments = table.entries.len(),
            used_space = table.used_space,
            "Fragment table rebuilt from disk"
        );

        Ok(Arc::new(Self {
            config,
            identity,
            table: RwLock::new(table),
            directory,
            started: Instant::now(),
        }))
    }

    pub fn fragment_path(&self, fragment_id: &str) -> PathBuf {
        self.config
            .storage_dir
            .join(format!("{fragment_id}.{FRAGMENT_EXTENSION}"))
    }

    pub fn sidecar_path(&self, fragment_id: &str) -> PathBuf {
        self.config
            .storage_dir
            .join(format!("{fragment_id}.{SIDECAR_EXTENSION}"))
    }

    /// Free bytes under the configured capacity.
    pub async fn available_space(&self) -> u64 {
        let table = self.table.read().await;
        self.config.capacity.saturating_sub(table.used_space)
    }
}

/// Rebuild the fragment table by scanning `*.frag` files.
///
/// Every fragment is re-hashed so the recorded checksum is trustworthy
/// even when the sidecar is stale or missing.
async fn scan_storage(storage_dir: &std::path::Path) -> Result<FragmentTable> {
    let mut table = FragmentTable::default();
    let mut dir = tokio::fs::read_dir(storage_dir).await?;

    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(FRAGMENT_EXTENSION) {
            continue;
        }
        let Some(fragment_id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
            continue;
        };

        let data = match tokio::fs::read(&path).await {
            Ok(d) => d,
            Err(e) => {
                warn!(fragment_id, error = %e, "Unreadable fragment skipped during scan");
                continue;
            }
        };
        let checksum = hash::sha256_hex(&data);

        let sidecar = storage_dir.join(format!("{fragment_id}.{SIDECAR_EXTENSION}"));
        let record = match tokio::fs::read(&sidecar).await {
            Ok(raw) => match serde_json::from_slice::<FragmentRecord>(&raw) {
                Ok(mut rec) => {
                    if rec.checksum != checksum {
                        warn!(fragment_id, "Fragment drifted from its sidecar checksum");
                    }
                    rec.checksum = checksum;
                    rec.size = data.len() as u64;
                    rec
                }
                Err(e) => {
                    warn!(fragment_id, error = %e, "Bad sidecar; rebuilding record");
                    orphan_record(checksum, data.len() as u64)
                }
            },
            Err(_) => orphan_record(checksum, data.len() as u64),
        };

        table.used_space += record.size;
        table.entries.insert(fragment_id, record);
    }

    Ok(table)
}

fn orphan_record(checksum: String, size: u64) -> FragmentRecord {
    FragmentRecord {
        checksum,
        size,
        metadata: FragmentMetadata {
            file_hash: String::new(),
            partition_index: 0,
            redundancy_index: 0,
            double_encrypted: true,
            timestamp: 0,
        },
        stored_at: 0,
        access_count: 0,
    }
}

/// Build the axum application.
pub fn build_app(state: Arc<NodeState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::router()
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Run the fragment service until a shutdown signal arrives.
///
/// Registers with the directory, spawns the background loops, and
/// unregisters best-effort on the way out.
pub async fn serve(config: NodeConfig) -> Result<()> {
    let state = NodeState::init(config).await?;

    tasks::register_with_directory(&state).await;
    tasks::spawn_background(state.clone());

    let app = build_app(state.clone());
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(MystError::Io)?;

    info!(
        node_id = %state.identity.node_id,
        addr = %addr,
        capacity = state.config.capacity,
        "Fragment service listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(MystError::Io)?;

    if let Err(e) = state.directory.unregister(&state.identity.node_id).await {
        warn!(error = %e, "Unregister on shutdown failed");
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
