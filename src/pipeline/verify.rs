/// Availability probe: can the manifest still be satisfied?
///
/// Pings every node referenced by the manifest (once per distinct
/// address) and counts partitions with at least one reachable replica.
/// The file is recoverable when that count reaches the data-shard
/// requirement, or every partition without Reed-Solomon.
use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::manifest::RecoveryManifest;
use crate::net::base_url_for;
use crate::net::transport::NodeClient;

/// Availability of one partition.
#[derive(Debug)]
pub struct PartitionAvailability {
    pub index: usize,
    pub reachable_fragments: usize,
    pub total_fragments: usize,
}

/// Full availability report for a manifest.
#[derive(Debug)]
pub struct VerifyReport {
    pub file_name: String,
    pub partitions: Vec<PartitionAvailability>,
    /// Partitions needed for reconstruction.
    pub required: usize,
    /// Partitions with at least one reachable replica.
    pub recoverable_partitions: usize,
    pub recoverable: bool,
}

/// Probe every node the manifest references and report availability.
pub async fn run_verify(manifest_path: &Path, config: &ClientConfig) -> Result<VerifyReport> {
    let raw = tokio::fs::read_to_string(manifest_path).await?;
    let manifest = RecoveryManifest::from_json(&raw)?;
    let client = NodeClient::new(config);

    // Probe each distinct address once, in parallel.
    let mut addresses: Vec<String> = manifest
        .partitions
        .iter()
        .flat_map(|p| p.fragments.iter().map(|f| f.node_address.clone()))
        .collect();
    addresses.sort();
    addresses.dedup();

    let mut probes = Vec::with_capacity(addresses.len());
    for address in addresses {
        let client = client.clone();
        probes.push(tokio::spawn(async move {
            let ok = client.ping(&base_url_for(&address)).await.is_ok();
            (address, ok)
        }));
    }

    let mut reachable: HashMap<String, bool> = HashMap::new();
    for probe in probes {
        if let Ok((address, ok)) = probe.await {
            reachable.insert(address, ok);
        }
    }

    let partitions: Vec<PartitionAvailability> = manifest
        .partitions
        .iter()
        .map(|p| PartitionAvailability {
            index: p.index,
            reachable_fragments: p
                .fragments
                .iter()
                .filter(|f| reachable.get(&f.node_address).copied().unwrap_or(false))
                .count(),
            total_fragments: p.fragments.len(),
        })
        .collect();

    let required = manifest.required_partitions();
    let recoverable_partitions = partitions
        .iter()
        .filter(|p| p.reachable_fragments > 0)
        .count();
    let recoverable = if manifest.reed_solomon {
        recoverable_partitions >= required
    } else {
        recoverable_partitions >= manifest.partitions.len()
    };

    info!(
        file = %manifest.file_name,
        recoverable_partitions,
        required,
        recoverable,
        "Availability probe complete"
    );

    Ok(VerifyReport {
        file_name: manifest.file_name,
        partitions,
        required,
        recoverable_partitions,
        recoverable,
    })
}
