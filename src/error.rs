use thiserror::Error;

/// Pipeline stage at which an integrity check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityStage {
    /// SHA-256 of a fetched fragment ciphertext vs the manifest checksum.
    FragmentCiphertext,
    /// SHA-256 of a decrypted shard vs the partition's original checksum.
    Shard,
    /// SHA-256 of the reassembled master ciphertext vs the manifest.
    MasterCiphertext,
    /// SHA-256 of the final plaintext vs the manifest file hash.
    FinalHash,
}

impl std::fmt::Display for IntegrityStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IntegrityStage::FragmentCiphertext => "fragment_ciphertext",
            IntegrityStage::Shard => "shard",
            IntegrityStage::MasterCiphertext => "master_ciphertext",
            IntegrityStage::FinalHash => "final_hash",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum MystError {
    #[error("Directory returned {available} nodes, need {needed}")]
    InsufficientNodes { needed: usize, available: usize },

    #[error("All node attempts exhausted for shard {shard}")]
    DistributionFailed { shard: usize },

    #[error("Cannot reconstruct: {have} valid shards, need {need}")]
    InsufficientShards { have: usize, need: usize },

    #[error("Authentication failed: ciphertext tag mismatch")]
    AuthenticationFailed,

    #[error("Incorrect master password")]
    IncorrectPassword,

    #[error("Manifest is password-protected; no password supplied")]
    PasswordRequired,

    #[error("Integrity check failed at stage {stage}")]
    IntegrityFailure { stage: IntegrityStage },

    #[error("Unsupported manifest version {version}")]
    UnsupportedManifest { version: String },

    #[error("Node {address} unreachable: {reason}")]
    NodeUnreachable { address: String, reason: String },

    #[error("Fragment {fragment_id} not found on {address}")]
    FragmentNotFound {
        fragment_id: String,
        address: String,
    },

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Compression failed: {0}")]
    Compression(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Directory request failed: {0}")]
    Directory(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MystError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_fields() {
        let e = MystError::InsufficientShards { have: 9, need: 10 };
        assert_eq!(e.to_string(), "Cannot reconstruct: 9 valid shards, need 10");

        let e = MystError::IntegrityFailure {
            stage: IntegrityStage::FinalHash,
        };
        assert!(e.to_string().contains("final_hash"));
    }
}
