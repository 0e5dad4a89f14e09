/// SHA-256 hashing utilities.
///
/// SHA-256 identifies everything in the protocol: the plaintext file,
/// the master ciphertext, each pre-encryption shard, each fragment
/// ciphertext, and the fragment ids themselves.
use sha2::{Digest, Sha256};

/// Hash arbitrary data with SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 digest as a lowercase hex string, the form stored in manifests.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // SHA-256("hello world")
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_different_inputs_differ() {
        assert_ne!(sha256(b"hello"), sha256(b"world"));
    }
}
