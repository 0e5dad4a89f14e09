/// Upload pipeline orchestrator.
///
/// Coordinates the full scatter flow:
/// 1. Read the file, hash the plaintext
/// 2. Master-encrypt (random key, or PBKDF2 from a password)
/// 3. Optionally DEFLATE the master ciphertext
/// 4. Erasure-code (or plain-split) into shards
/// 5. Discover and latency-rank storage nodes
/// 6. Encrypt every fragment with its own derived key and round-robin
///    them across the ranked nodes
/// 7. Emit the recovery manifest next to the source file
///
/// Nodes only ever see doubly-encrypted fragments. Every secret lands
/// in the manifest and nowhere else.
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::{ClientConfig, UploadOptions};
use crate::crypto::sensitive::SensitiveBytes32;
use crate::crypto::{aead, hash, kdf};
use crate::erasure;
use crate::error::{MystError, Result};
use crate::manifest::{
    FragmentDescriptor, FragmentEncryption, FragmentEncryptionSummary, MasterEncryption,
    PartitionRecord, RecoveryManifest, ReedSolomonConfig, SecurityMetadata, MANIFEST_EXTENSION,
    MANIFEST_VERSION,
};
use crate::net::directory::DirectoryClient;
use crate::net::selection::{self, NodeRotation};
use crate::net::transport::{FragmentMetadata, NodeClient, StoreRequest};
use crate::partition;

/// Result of a completed upload.
#[derive(Debug)]
pub struct UploadResult {
    /// Where the manifest was written.
    pub manifest_path: PathBuf,
    pub manifest: RecoveryManifest,
    /// Fragments successfully placed (shards * redundancy).
    pub fragments_stored: usize,
}

/// Run the upload pipeline for one local file.
pub async fn run_upload(
    file_path: &Path,
    options: &UploadOptions,
    config: &ClientConfig,
) -> Result<UploadResult> {
    if options.partitions < 2 {
        return Err(MystError::Config(
            "at least 2 partitions are required".to_string(),
        ));
    }
    if options.redundancy < 1 {
        return Err(MystError::Config(
            "redundancy must be at least 1".to_string(),
        ));
    }

    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MystError::Config(format!("bad input path {}", file_path.display())))?
        .to_string();

    let plaintext = tokio::fs::read(file_path).await?;
    let file_hash = hash::sha256_hex(&plaintext);
    info!(
        file = %file_name,
        size = plaintext.len(),
        partitions = options.partitions,
        redundancy = options.redundancy,
        "Starting upload pipeline"
    );

    // Master layer: exactly one of {embedded key, password salt} will
    // reach the manifest.
    let (master_key, master_salt) = match &options.master_password {
        Some(password) => {
            let salt = kdf::generate_master_salt();
            (kdf::derive_master_key(password.as_bytes(), &salt), Some(salt))
        }
        None => (aead::generate_key(), None),
    };

    let (master_iv, master_ct, master_tag) = aead::encrypt(&master_key, &plaintext)?;
    let master_encrypted_hash = hash::sha256_hex(&master_ct);

    let processed = if options.compression {
        crate::compress::compress(&master_ct)?
    } else {
        master_ct
    };

    // Erasure layer.
    let data_shards = options.partitions;
    let (shards, parity_shards) = if options.reed_solomon {
        let parity = erasure::parity_count(data_shards);
        (erasure::encode(&processed, data_shards, parity), parity)
    } else {
        (partition::split(&processed, data_shards), 0)
    };

    // Node discovery: enough candidates for every replica of every shard.
    let needed = shards.len() * options.redundancy;
    let largest_shard = shards.iter().map(Vec::len).max().unwrap_or(0) as u64;
    let directory = DirectoryClient::new(config.directory_url.clone(), config.directory_timeout);
    let candidates = directory.discover_nodes(needed, largest_shard).await?;
    if candidates.len() < needed {
        return Err(MystError::InsufficientNodes {
            needed,
            available: candidates.len(),
        });
    }

    let client = NodeClient::new(config);
    let ranked = selection::probe_and_rank(&client, candidates).await;
    info!(candidates = ranked.len(), "Nodes ranked by latency/reliability");
    let mut rotation = NodeRotation::new(ranked);

    let timestamp = Utc::now().timestamp_millis() as u64;
    let mut partitions = Vec::with_capacity(shards.len());
    let mut fragments_stored = 0usize;

    for (index, shard) in shards.iter().enumerate() {
        let original_checksum = hash::sha256_hex(shard);
        let mut fragments = Vec::with_capacity(options.redundancy);

        // A failed slot is retried on the next node in rotation without
        // advancing the shard; total attempts per shard are bounded.
        let max_attempts = 2 * options.redundancy;
        let mut attempts = 0usize;
        let mut replica = 0usize;
        while replica < options.redundancy {
            if attempts >= max_attempts {
                return Err(MystError::DistributionFailed { shard: index });
            }
            attempts += 1;

            let target = rotation.next().node.clone();

            // Fresh key material per attempt; a retried slot never
            // reuses the failed fragment's secrets.
            let raw_key = SensitiveBytes32::random();
            let salt = kdf::generate_fragment_salt();
            let effective_key = kdf::derive_fragment_key(raw_key.as_ref(), &salt);
            let (iv, ciphertext, tag) = aead::encrypt(&effective_key, shard)?;
            let fragment_id = fragment_id(&ciphertext, &raw_key, &iv, index, replica, timestamp);

            let request = StoreRequest::from_ciphertext(
                fragment_id.clone(),
                &ciphertext,
                FragmentMetadata {
                    file_hash: file_hash.clone(),
                    partition_index: index,
                    redundancy_index: replica,
                    double_encrypted: true,
                    timestamp,
                },
            );

            match client.store(&target.base_url(), &request).await {
                Ok(_) => {
                    fragments.push(FragmentDescriptor {
                        fragment_id,
                        redundancy_index: replica,
                        node_id: target.id.clone(),
                        node_address: target.location(),
                        checksum: request.checksum.clone(),
                        encryption: FragmentEncryption {
                            key: BASE64.encode(raw_key.as_ref()),
                            iv: BASE64.encode(iv),
                            tag: BASE64.encode(tag),
                            salt: BASE64.encode(salt),
                            algorithm: "AES-256-GCM-LAYER2".to_string(),
                        },
                    });
                    fragments_stored += 1;
                    replica += 1;
                }
                Err(e) => {
                    warn!(
                        shard = index,
                        replica,
                        node = %target.id,
                        error = %e,
                        "Fragment placement failed; retrying slot on next node"
                    );
                }
            }
        }

        info!(shard = index, replicas = fragments.len(), "Shard distributed");
        partitions.push(PartitionRecord {
            index,
            original_checksum,
            size: shard.len() as u64,
            fragments,
        });
    }

    let manifest = RecoveryManifest {
        version: MANIFEST_VERSION.to_string(),
        file_name: file_name.clone(),
        file_hash,
        original_size: plaintext.len() as u64,
        compressed: options.compression,
        reed_solomon: options.reed_solomon,
        reed_solomon_config: options.reed_solomon.then(|| ReedSolomonConfig {
            data_shards,
            parity_shards,
            total_shards: data_shards + parity_shards,
        }),
        timestamp,
        security: SecurityMetadata {
            double_encryption: true,
            master_encryption: MasterEncryption {
                algorithm: "AES-256-GCM".to_string(),
                key: match &options.master_password {
                    Some(_) => None,
                    None => Some(BASE64.encode(master_key.as_ref())),
                },
                iv: BASE64.encode(master_iv),
                tag: BASE64.encode(master_tag),
                salt: master_salt.map(|s| BASE64.encode(s)),
                encrypted_hash: master_encrypted_hash,
                key_derivation: if options.master_password.is_some() {
                    "PBKDF2".to_string()
                } else {
                    "RANDOM".to_string()
                },
                password_protected: options.master_password.is_some(),
            },
            fragment_encryption: FragmentEncryptionSummary {
                algorithm: "AES-256-GCM".to_string(),
                unique_keys_per_fragment: true,
                total_unique_keys: fragments_stored as u64,
            },
        },
        partitions,
    };

    let manifest_path = manifest_path_for(file_path);
    tokio::fs::write(&manifest_path, manifest.to_json()?).await?;

    info!(
        manifest = %manifest_path.display(),
        fragments = fragments_stored,
        "Upload complete"
    );

    Ok(UploadResult {
        manifest_path,
        manifest,
        fragments_stored,
    })
}

/// Fragment identity: SHA-256(ct || raw_key || iv || "i-r-timestamp").
///
/// The wall-clock component makes identical uploads produce disjoint
/// fragment ids on purpose; repeated uploads of one file are not
/// correlatable by id.
fn fragment_id(
    ciphertext: &[u8],
    raw_key: &SensitiveBytes32,
    iv: &[u8; 12],
    partition_index: usize,
    redundancy_index: usize,
    timestamp: u64,
) -> String {
    let suffix = format!("{partition_index}-{redundancy_index}-{timestamp}");
    let mut input =
        Vec::with_capacity(ciphertext.len() + 32 + iv.len() + suffix.len());
    input.extend_from_slice(ciphertext);
    input.extend_from_slice(raw_key.as_ref());
    input.extend_from_slice(iv);
    input.extend_from_slice(suffix.as_bytes());
    hash::sha256_hex(&input)
}

/// `<filename>.myst` next to the source file.
fn manifest_path_for(file_path: &Path) -> PathBuf {
    let mut os = file_path.as_os_str().to_os_string();
    os.push(".");
    os.push(MANIFEST_EXTENSION);
    PathBuf::from(os)
}
