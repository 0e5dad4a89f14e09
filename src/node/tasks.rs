/// Background loops of the fragment service.
///
/// - heartbeat every 30 s; a 404 means the directory expired us, so
///   re-register
/// - full integrity sweep hourly, re-hashing every stored fragment
/// - free-space log every 5 minutes
use std::sync::Arc;

use tracing::{error, info, warn};

use super::NodeState;
use crate::crypto::hash;
use crate::net::directory::{HeartbeatOutcome, RegisterRequest};

/// Initial registration; retried by the heartbeat loop on failure.
pub async fn register_with_directory(state: &Arc<NodeState>) {
    let available = state.available_space().await;
    let req = RegisterRequest {
        node_id: state.identity.node_id.clone(),
        address: state.config.advertise_address.clone(),
        port: state.config.port,
        available_space: available,
        total_space: state.config.capacity,
    };
    match state.directory.register(&req).await {
        Ok(()) => info!(node_id = %req.node_id, "Registered with directory"),
        Err(e) => warn!(error = %e, "Directory registration failed; will retry via heartbeat"),
    }
}

/// Spawn all periodic loops. They run for the life of the process.
pub fn spawn_background(state: Arc<NodeState>) {
    tokio::spawn(heartbeat_loop(state.clone()));
    tokio::spawn(integrity_sweep_loop(state.clone()));
    tokio::spawn(space_log_loop(state));
}

async fn heartbeat_loop(state: Arc<NodeState>) {
    let mut ticker = tokio::time::interval(state.config.heartbeat_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match state.directory.heartbeat(&state.identity.node_id).await {
            Ok(HeartbeatOutcome::Acknowledged) => {}
            Ok(HeartbeatOutcome::Unknown) => {
                warn!("Directory no longer knows this node; re-registering");
                register_with_directory(&state).await;
            }
            Err(e) => warn!(error = %e, "Heartbeat failed"),
        }
    }
}

/// Re-hash every stored fragment and evict the ones that no longer
/// match. A corrupted replica is better reported missing than served.
async fn integrity_sweep_loop(state: Arc<NodeState>) {
    let mut ticker = tokio::time::interval(state.config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sweep_once(&state).await;
    }
}

pub async fn sweep_once(state: &Arc<NodeState>) {
    let ids: Vec<String> = {
        let table = state.table.read().await;
        table.entries.keys().cloned().collect()
    };

    let mut checked = 0usize;
    let mut evicted = 0usize;
    for fragment_id in ids {
        let expected = {
            let table = state.table.read().await;
            match table.entries.get(&fragment_id) {
                Some(rec) => rec.checksum.clone(),
                None => continue,
            }
        };

        let ok = match tokio::fs::read(state.fragment_path(&fragment_id)).await {
            Ok(data) => hash::sha256_hex(&data) == expected,
            Err(e) => {
                warn!(fragment_id, error = %e, "Fragment unreadable during sweep");
                false
            }
        };
        checked += 1;

        if !ok {
            error!(fragment_id, "Integrity sweep evicting corrupted fragment");
            let mut table = state.table.write().await;
            if let Some(rec) = table.entries.remove(&fragment_id) {
                table.used_space = table.used_space.saturating_sub(rec.size);
            }
            drop(table);
            let _ = tokio::fs::remove_file(state.fragment_path(&fragment_id)).await;
            let _ = tokio::fs::remove_file(state.sidecar_path(&fragment_id)).await;
            evicted += 1;
        }
    }

    info!(checked, evicted, "Integrity sweep complete");
}

async fn space_log_loop(state: Arc<NodeState>) {
    let mut ticker = tokio::time::interval(state.config.space_log_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let table = state.table.read().await;
        info!(
            fragments = table.entries.len(),
            used_space = table.used_space,
            available_space = state.config.capacity.saturating_sub(table.used_space),
            "Storage accounting"
        );
    }
}
