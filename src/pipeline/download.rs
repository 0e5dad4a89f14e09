/// Download pipeline orchestrator: the inverse of the upload flow.
///
/// 1. Parse the manifest (version-gated)
/// 2. Fetch fragments, one task per partition, replicas in manifest order
/// 3. Verify + decrypt layer 2, verify the shard digest
/// 4. Reassemble the master ciphertext (Reed-Solomon or plain merge)
/// 5. Decompress if flagged, verify the master digest
/// 6. Master-decrypt, verify the plaintext digest, write the output
///
/// Per-replica failures are soft: the next replica is tried. A partition
/// with no usable replica keeps its last failure; that failure surfaces
/// when reconstruction turns out to be impossible. No partial plaintext
/// ever reaches the disk.
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::crypto::sensitive::SensitiveBytes32;
use crate::crypto::{aead, hash, kdf};
use crate::erasure;
use crate::error::{IntegrityStage, MystError, Result};
use crate::manifest::{FragmentDescriptor, PartitionRecord, RecoveryManifest};
use crate::net::base_url_for;
use crate::net::transport::NodeClient;
use crate::partition;

/// Result of a completed download.
#[derive(Debug)]
pub struct DownloadResult {
    pub output_path: PathBuf,
    pub bytes_written: u64,
}

/// Run the download pipeline from a manifest file.
pub async fn run_download(
    manifest_path: &Path,
    output: Option<PathBuf>,
    master_password: Option<String>,
    config: &ClientConfig,
) -> Result<DownloadResult> {
    let raw = tokio::fs::read_to_string(manifest_path).await?;
    let manifest = RecoveryManifest::from_json(&raw)?;

    if manifest.is_password_protected() && master_password.is_none() {
        return Err(MystError::PasswordRequired);
    }

    info!(
        file = %manifest.file_name,
        partitions = manifest.partitions.len(),
        reed_solomon = manifest.reed_solomon,
        "Starting download pipeline"
    );

    let plaintext = reconstruct(&manifest, master_password.as_deref(), config).await?;

    let output_path = output.unwrap_or_else(|| {
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&manifest.file_name)
    });
    tokio::fs::write(&output_path, &plaintext).await?;

    info!(
        output = %output_path.display(),
        bytes = plaintext.len(),
        "Download complete"
    );

    Ok(DownloadResult {
        output_path,
        bytes_written: plaintext.len() as u64,
    })
}

/// Rebuild the plaintext entirely in memory.
async fn reconstruct(
    manifest: &RecoveryManifest,
    master_password: Option<&str>,
    config: &ClientConfig,
) -> Result<Vec<u8>> {
    let client = NodeClient::new(config);

    // One task per partition; each tries its replicas in listed order.
    let mut tasks = Vec::with_capacity(manifest.partitions.len());
    for record in manifest.partitions.clone() {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let shard = recover_partition(&client, &record).await;
            (record.index, shard)
        }));
    }

    let total = match &manifest.reed_solomon_config {
        Some(cfg) => cfg.total_shards,
        None => manifest.partitions.len(),
    };
    let mut shards: Vec<Option<Vec<u8>>> = vec![None; total];
    let mut failures: Vec<(usize, MystError)> = Vec::new();

    for task in tasks {
        let Ok((index, outcome)) = task.await else {
            continue;
        };
        match outcome {
            Ok(shard) if index < total => shards[index] = Some(shard),
            Ok(_) => warn!(index, "Partition index outside shard geometry; ignored"),
            Err(e) => {
                warn!(partition = index, error = %e, "Partition unrecoverable");
                failures.push((index, e));
            }
        }
    }

    let processed = assemble(manifest, shards, failures)?;

    // Undo compression / padding to get back the exact master ciphertext.
    let master_ct = if manifest.compressed {
        crate::compress::decompress(&processed)?
    } else {
        let mut buf = processed;
        buf.truncate(manifest.original_size as usize);
        buf
    };

    let master = &manifest.security.master_encryption;
    if hash::sha256_hex(&master_ct) != master.encrypted_hash {
        return Err(MystError::IntegrityFailure {
            stage: IntegrityStage::MasterCiphertext,
        });
    }

    let master_key = resolve_master_key(manifest, master_password)?;
    let plaintext = aead::decrypt(&master_key, &master.nonce()?, &master_ct, &master.tag_bytes()?)
        .map_err(|e| match e {
            MystError::AuthenticationFailed if master.password_protected => {
                MystError::IncorrectPassword
            }
            other => other,
        })?;

    if hash::sha256_hex(&plaintext) != manifest.file_hash {
        return Err(MystError::IntegrityFailure {
            stage: IntegrityStage::FinalHash,
        });
    }

    Ok(plaintext)
}

/// Combine recovered shards into the processed (pre-decompression)
/// buffer, or fail with the most meaningful error available.
fn assemble(
    manifest: &RecoveryManifest,
    shards: Vec<Option<Vec<u8>>>,
    mut failures: Vec<(usize, MystError)>,
) -> Result<Vec<u8>> {
    match &manifest.reed_solomon_config {
        Some(cfg) => {
            match erasure::decode(&shards, cfg.data_shards, cfg.parity_shards) {
                Ok(buf) => Ok(buf),
                Err(e) => {
                    // Degenerate escape hatch: enough data shards even
                    // though the parity system would not solve.
                    let data_present =
                        shards[..cfg.data_shards].iter().filter(|s| s.is_some()).count();
                    if data_present >= cfg.data_shards {
                        let data: Vec<Vec<u8>> = shards[..cfg.data_shards]
                            .iter()
                            .flatten()
                            .cloned()
                            .collect();
                        Ok(partition::merge(&data))
                    } else {
                        Err(e)
                    }
                }
            }
        }
        None => {
            // Without parity every partition must be present; surface
            // the first failed partition's own error.
            if !failures.is_empty() {
                failures.sort_by_key(|(index, _)| *index);
                return Err(failures.remove(0).1);
            }
            if shards.iter().any(Option::is_none) {
                let have = shards.iter().filter(|s| s.is_some()).count();
                return Err(MystError::InsufficientShards {
                    have,
                    need: shards.len(),
                });
            }
            let chunks: Vec<Vec<u8>> = shards.into_iter().flatten().collect();
            Ok(partition::merge(&chunks))
        }
    }
}

/// Try every replica of one partition; first fully verified copy wins.
async fn recover_partition(client: &NodeClient, record: &PartitionRecord) -> Result<Vec<u8>> {
    let mut last_error: Option<MystError> = None;

    for descriptor in &record.fragments {
        match fetch_and_decrypt(client, record, descriptor).await {
            Ok(shard) => {
                info!(
                    partition = record.index,
                    replica = descriptor.redundancy_index,
                    node = %descriptor.node_address,
                    "Partition recovered"
                );
                return Ok(shard);
            }
            Err(e) => {
                warn!(
                    partition = record.index,
                    replica = descriptor.redundancy_index,
                    node = %descriptor.node_address,
                    error = %e,
                    "Replica failed; trying next"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or(MystError::NodeUnreachable {
        address: "-".to_string(),
        reason: format!("partition {} lists no fragments", record.index),
    }))
}

/// One replica attempt: fetch, checksum, layer-2 decrypt, shard digest.
async fn fetch_and_decrypt(
    client: &NodeClient,
    record: &PartitionRecord,
    descriptor: &FragmentDescriptor,
) -> Result<Vec<u8>> {
    let base = base_url_for(&descriptor.node_address);
    let ciphertext = client.retrieve(&base, &descriptor.fragment_id).await?;

    if hash::sha256_hex(&ciphertext) != descriptor.checksum {
        return Err(MystError::IntegrityFailure {
            stage: IntegrityStage::FragmentCiphertext,
        });
    }

    let raw_key = descriptor.encryption.raw_key_bytes()?;
    let salt = descriptor.encryption.salt_bytes()?;
    let effective_key = kdf::derive_fragment_key(&raw_key, &salt);
    let shard = aead::decrypt(
        &effective_key,
        &descriptor.encryption.nonce()?,
        &ciphertext,
        &descriptor.encryption.tag_bytes()?,
    )?;

    if hash::sha256_hex(&shard) != record.original_checksum {
        return Err(MystError::IntegrityFailure {
            stage: IntegrityStage::Shard,
        });
    }

    Ok(shard)
}

fn resolve_master_key(
    manifest: &RecoveryManifest,
    master_password: Option<&str>,
) -> Result<SensitiveBytes32> {
    let master = &manifest.security.master_encryption;
    if master.password_protected {
        let password = master_password.ok_or(MystError::PasswordRequired)?;
        let salt = master.salt_bytes()?.ok_or_else(|| {
            MystError::Serialization("password-protected manifest lacks a salt".to_string())
        })?;
        Ok(kdf::derive_master_key(password.as_bytes(), &salt))
    } else {
        let key = master.key_bytes()?.ok_or_else(|| {
            MystError::Serialization("manifest lacks an embedded master key".to_string())
        })?;
        SensitiveBytes32::from_slice(&key)
            .ok_or_else(|| MystError::Serialization("master key must be 32 bytes".to_string()))
    }
}
