/// HTTP endpoints of the fragment service.
///
/// Status-code contract:
/// - `/store`: 507 when the fragment exceeds free space, 400 on a
///   checksum mismatch or bad payload, 200 on success
/// - `/retrieve/{id}`: 404 unknown id, 500 when the stored bytes have
///   drifted from their recorded checksum (corruption detected)
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use super::{FragmentRecord, NodeState};
use crate::crypto::hash;
use crate::net::directory::FragmentReport;
use crate::net::transport::{PingResponse, RetrieveResponse, StoreRequest, StoreResponse};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn err(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

pub fn router() -> Router<Arc<NodeState>> {
    Router::new()
        .route("/store", post(store))
        .route("/retrieve/{fragment_id}", get(retrieve))
        .route("/ping", get(ping))
        .route("/health", get(health))
}

/// POST /store — persist one fragment.
///
/// Disk write happens before the table insert so a crash can leave an
/// orphan file but never a table entry without bytes.
async fn store(
    State(state): State<Arc<NodeState>>,
    Json(req): Json<StoreRequest>,
) -> Result<Json<StoreResponse>, HandlerError> {
    let data = BASE64
        .decode(&req.data)
        .map_err(|e| err(StatusCode::BAD_REQUEST, format!("data is not base64: {e}")))?;

    let available = state.available_space().await;
    if data.len() as u64 > available {
        return Err(err(
            StatusCode::INSUFFICIENT_STORAGE,
            format!("fragment of {} bytes exceeds free space {available}", data.len()),
        ));
    }

    let checksum = hash::sha256_hex(&data);
    if checksum != req.checksum {
        return Err(err(
            StatusCode::BAD_REQUEST,
            "checksum does not match payload",
        ));
    }

    let record = FragmentRecord {
        checksum,
        size: data.len() as u64,
        metadata: req.metadata.clone(),
        stored_at: Utc::now().timestamp_millis() as u64,
        access_count: 0,
    };

    let path = state.fragment_path(&req.fragment_id);
    let tmp = path.with_extension("tmp");
    let write = async {
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        let sidecar = serde_json::to_vec_pretty(&record)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        tokio::fs::write(state.sidecar_path(&req.fragment_id), sidecar).await
    };
    if let Err(e) = write.await {
        error!(fragment_id = %req.fragment_id, error = %e, "Fragment write failed");
        return Err(err(
            StatusCode::INTERNAL_SERVER_ERROR,
            "could not persist fragment",
        ));
    }

    let size = record.size;
    {
        let mut table = state.table.write().await;
        if let Some(old) = table.entries.insert(req.fragment_id.clone(), record) {
            table.used_space = table.used_space.saturating_sub(old.size);
        }
        table.used_space += size;
    }

    info!(
        fragment_id = %req.fragment_id,
        size,
        partition = req.metadata.partition_index,
        "Fragment stored"
    );

    // Best-effort placement report; the upload succeeds regardless.
    let report = FragmentReport {
        fragment_id: req.fragment_id.clone(),
        node_id: state.identity.node_id.clone(),
        file_hash: req.metadata.file_hash.clone(),
        partition_index: req.metadata.partition_index,
    };
    let directory = state.directory.clone();
    tokio::spawn(async move {
        if let Err(e) = directory.register_fragment(&report).await {
            warn!(error = %e, "Fragment placement report failed");
        }
    });

    Ok(Json(StoreResponse {
        success: true,
        fragment_id: req.fragment_id,
        size,
    }))
}

/// GET /retrieve/{fragment_id} — serve a fragment back.
async fn retrieve(
    State(state): State<Arc<NodeState>>,
    Path(fragment_id): Path<String>,
) -> Result<Json<RetrieveResponse>, HandlerError> {
    let record = {
        let table = state.table.read().await;
        table.entries.get(&fragment_id).cloned()
    };
    let Some(record) = record else {
        return Err(err(StatusCode::NOT_FOUND, "unknown fragment"));
    };

    let data = tokio::fs::read(state.fragment_path(&fragment_id))
        .await
        .map_err(|e| {
            error!(fragment_id, error = %e, "Fragment file unreadable");
            err(StatusCode::INTERNAL_SERVER_ERROR, "fragment unreadable")
        })?;

    // Detect bit rot before handing anything out.
    if hash::sha256_hex(&data) != record.checksum {
        error!(fragment_id, "Stored fragment has drifted from its checksum");
        return Err(err(
            StatusCode::INTERNAL_SERVER_ERROR,
            "fragment corrupted on disk",
        ));
    }

    {
        let mut table = state.table.write().await;
        if let Some(entry) = table.entries.get_mut(&fragment_id) {
            entry.access_count += 1;
        }
    }

    Ok(Json(RetrieveResponse {
        success: true,
        data: BASE64.encode(&data),
        checksum: Some(record.checksum),
        metadata: Some(record.metadata),
    }))
}

/// GET /ping — liveness and latency probe target.
async fn ping(State(state): State<Arc<NodeState>>) -> Json<PingResponse> {
    Json(PingResponse {
        timestamp: Utc::now().timestamp_millis() as u64,
        node_id: state.identity.node_id.clone(),
        public_ip: Some(state.config.advertise_address.clone()),
    })
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: String,
    version: &'static str,
    fragment_count: usize,
    used_space: u64,
    available_space: u64,
    total_space: u64,
    uptime_secs: u64,
}

/// GET /health — service status and storage accounting.
async fn health(State(state): State<Arc<NodeState>>) -> Json<HealthResponse> {
    let table = state.table.read().await;
    Json(HealthResponse {
        status: "ok",
        node_id: state.identity.node_id.clone(),
        version: env!("CARGO_PKG_VERSION"),
        fragment_count: table.entries.len(),
        used_space: table.used_space,
        available_space: state.config.capacity.saturating_sub(table.used_space),
        total_space: state.config.capacity,
        uptime_secs: state.started.elapsed().as_secs(),
    })
}
