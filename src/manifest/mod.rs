/// Recovery manifest: the single object a user must retain.
///
/// The `.myst` file binds together everything needed to reconstruct a
/// scattered file: plaintext identity (SHA-256), master-layer secrets
/// (or the salt that re-derives them from a password), erasure geometry,
/// and per-fragment key material with node locations.
///
/// Whoever holds the manifest (plus the password, if one was set) can
/// rebuild the file from any D surviving fragments; nobody else can.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::{MystError, Result};

/// Current manifest format version.
pub const MANIFEST_VERSION: &str = "3.0";

/// Manifest file extension.
pub const MANIFEST_EXTENSION: &str = "myst";

/// A complete recovery manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryManifest {
    /// Format version; the major component gates parsing.
    pub version: String,
    /// Original file name.
    pub file_name: String,
    /// SHA-256 of the plaintext, hex.
    pub file_hash: String,
    /// Plaintext length in bytes.
    pub original_size: u64,
    /// Whether the master ciphertext was DEFLATE-compressed before
    /// partitioning.
    pub compressed: bool,
    /// Whether parity shards were added.
    pub reed_solomon: bool,
    /// Erasure geometry; null when `reed_solomon` is false.
    #[serde(default)]
    pub reed_solomon_config: Option<ReedSolomonConfig>,
    /// Upload wall-clock time, epoch milliseconds.
    pub timestamp: u64,
    /// Both encryption layers.
    pub security: SecurityMetadata,
    /// One record per shard, in shard-index order.
    pub partitions: Vec<PartitionRecord>,
}

/// Erasure geometry recorded for the download path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReedSolomonConfig {
    pub data_shards: usize,
    pub parity_shards: usize,
    pub total_shards: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityMetadata {
    /// Always true in version 3 manifests.
    pub double_encryption: bool,
    pub master_encryption: MasterEncryption,
    pub fragment_encryption: FragmentEncryptionSummary,
}

/// Master (layer 1) parameters.
///
/// Exactly one of `key` and `salt` is set: an embedded random key, or
/// the salt that re-derives the key from the user's password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterEncryption {
    pub algorithm: String,
    /// Base64 master key; null iff `password_protected`.
    pub key: Option<String>,
    /// Base64 GCM nonce. Written as 12 bytes; legacy manifests carry 16,
    /// of which the first 12 are the nonce.
    pub iv: String,
    /// Base64 16-byte authentication tag.
    pub tag: String,
    /// Base64 32-byte PBKDF2 salt; set iff `password_protected`.
    #[serde(default)]
    pub salt: Option<String>,
    /// SHA-256 of the master ciphertext (the input to compression), hex.
    pub encrypted_hash: String,
    /// "PBKDF2" for the password path, "RANDOM" otherwise.
    pub key_derivation: String,
    pub password_protected: bool,
}

/// Fragment (layer 2) summary, informational.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentEncryptionSummary {
    pub algorithm: String,
    pub unique_keys_per_fragment: bool,
    pub total_unique_keys: u64,
}

/// One shard's record: identity of the pre-encryption bytes plus every
/// replica that was placed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub index: usize,
    /// SHA-256 of the plaintext shard (pre-encryption), hex.
    pub original_checksum: String,
    /// Shard length in bytes.
    pub size: u64,
    /// Replicas in placement order; download tries them in this order.
    pub fragments: Vec<FragmentDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentDescriptor {
    /// SHA-256(ct || raw_key || iv || "i-r-timestamp"), hex.
    pub fragment_id: String,
    pub redundancy_index: usize,
    pub node_id: String,
    /// "host:port" of the storage node holding this fragment.
    pub node_address: String,
    /// SHA-256 of the fragment ciphertext, hex.
    pub checksum: String,
    pub encryption: FragmentEncryption,
}

/// Per-fragment key material. The stored key is the raw input to
/// PBKDF2, not the effective AEAD key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentEncryption {
    /// Base64 32-byte raw key.
    pub key: String,
    /// Base64 GCM nonce (12 bytes; 16 accepted, first 12 used).
    pub iv: String,
    /// Base64 16-byte tag.
    pub tag: String,
    /// Base64 16-byte PBKDF2 salt.
    pub salt: String,
    pub algorithm: String,
}

impl RecoveryManifest {
    /// Serialize to the canonical pretty-printed JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MystError::Serialization(e.to_string()))
    }

    /// Parse a manifest, gating on the major version.
    pub fn from_json(data: &str) -> Result<Self> {
        let manifest: RecoveryManifest =
            serde_json::from_str(data).map_err(|e| MystError::Serialization(e.to_string()))?;

        let major = manifest.version.split('.').next().unwrap_or("");
        let expected_major = MANIFEST_VERSION.split('.').next().unwrap_or("3");
        if major != expected_major {
            return Err(MystError::UnsupportedManifest {
                version: manifest.version.clone(),
            });
        }

        manifest.validate()?;
        Ok(manifest)
    }

    /// Structural invariants that typed parsing cannot express.
    fn validate(&self) -> Result<()> {
        let master = &self.security.master_encryption;
        if master.password_protected {
            if master.salt.is_none() || master.key.is_some() {
                return Err(MystError::Serialization(
                    "password-protected manifest must carry a salt and no key".to_string(),
                ));
            }
        } else if master.key.is_none() {
            return Err(MystError::Serialization(
                "manifest carries neither a master key nor a password salt".to_string(),
            ));
        }
        if self.reed_solomon && self.reed_solomon_config.is_none() {
            return Err(MystError::Serialization(
                "reed_solomon set without reed_solomon_config".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of data shards required to reconstruct.
    pub fn required_partitions(&self) -> usize {
        match &self.reed_solomon_config {
            Some(cfg) => cfg.data_shards,
            None => self.partitions.len(),
        }
    }

    pub fn is_password_protected(&self) -> bool {
        self.security.master_encryption.password_protected
    }
}

impl MasterEncryption {
    /// GCM nonce: first 12 bytes of the persisted IV field.
    pub fn nonce(&self) -> Result<[u8; 12]> {
        decode_nonce(&self.iv)
    }

    pub fn tag_bytes(&self) -> Result<[u8; 16]> {
        decode_tag(&self.tag)
    }

    /// Embedded master key bytes (non-password path).
    pub fn key_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.key.as_deref().map(decode_b64).transpose()
    }

    pub fn salt_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.salt.as_deref().map(decode_b64).transpose()
    }
}

impl FragmentEncryption {
    pub fn nonce(&self) -> Result<[u8; 12]> {
        decode_nonce(&self.iv)
    }

    pub fn tag_bytes(&self) -> Result<[u8; 16]> {
        decode_tag(&self.tag)
    }

    pub fn raw_key_bytes(&self) -> Result<Vec<u8>> {
        decode_b64(&self.key)
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        decode_b64(&self.salt)
    }
}

fn decode_b64(s: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(s)
        .map_err(|e| MystError::Serialization(format!("bad base64 field: {e}")))
}

fn decode_nonce(s: &str) -> Result<[u8; 12]> {
    let bytes = decode_b64(s)?;
    if bytes.len() != 12 && bytes.len() != 16 {
        return Err(MystError::Serialization(format!(
            "IV field must be 12 or 16 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes[..12].try_into().unwrap())
}

fn decode_tag(s: &str) -> Result<[u8; 16]> {
    let bytes = decode_b64(s)?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| MystError::Serialization(format!("tag must be 16 bytes, got {}", bytes.len())))
}
