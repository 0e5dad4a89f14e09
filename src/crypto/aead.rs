/// AES-256-GCM with detached tags.
///
/// Both encryption layers use the same primitive: the master layer over
/// the whole file, the fragment layer over individual shards. The 16-byte
/// authentication tag travels separately from the ciphertext because the
/// manifest records it as its own field.
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use crate::crypto::sensitive::SensitiveBytes32;
use crate::error::{MystError, Result};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Generate a random 256-bit key.
pub fn generate_key() -> SensitiveBytes32 {
    SensitiveBytes32::random()
}

/// Generate a random 96-bit GCM nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Encrypt plaintext with a fresh random nonce.
///
/// Returns (nonce, ciphertext, tag) with the tag detached.
pub fn encrypt(
    key: &SensitiveBytes32,
    plaintext: &[u8],
) -> Result<([u8; NONCE_LEN], Vec<u8>, [u8; TAG_LEN])> {
    let nonce = generate_nonce();
    let (ciphertext, tag) = encrypt_with_nonce(key, &nonce, plaintext)?;
    Ok((nonce, ciphertext, tag))
}

/// Encrypt with a caller-supplied nonce. Returns (ciphertext, tag).
pub fn encrypt_with_nonce(
    key: &SensitiveBytes32,
    nonce: &[u8; NONCE_LEN],
    plaintext: &[u8],
) -> Result<(Vec<u8>, [u8; TAG_LEN])> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| MystError::Encryption(e.to_string()))?;

    let mut combined = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| MystError::Encryption(e.to_string()))?;

    // aes-gcm appends the tag; detach it
    let split = combined.len() - TAG_LEN;
    let tag: [u8; TAG_LEN] = combined[split..].try_into().unwrap();
    combined.truncate(split);
    Ok((combined, tag))
}

/// Decrypt and authenticate.
///
/// Fails with `AuthenticationFailed` on any tag mismatch; no partial
/// plaintext is ever returned.
pub fn decrypt(
    key: &SensitiveBytes32,
    nonce: &[u8; NONCE_LEN],
    ciphertext: &[u8],
    tag: &[u8; TAG_LEN],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| MystError::Encryption(e.to_string()))?;

    let mut combined = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(ciphertext);
    combined.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(nonce), combined.as_slice())
        .map_err(|_| MystError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = generate_key();
        let plaintext = b"fragment payload, both layers use this primitive";

        let (nonce, ciphertext, tag) = encrypt(&key, plaintext).unwrap();
        assert_eq!(ciphertext.len(), plaintext.len());

        let decrypted = decrypt(&key, &nonce, &ciphertext, &tag).unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = generate_key();
        let key2 = generate_key();

        let (nonce, ciphertext, tag) = encrypt(&key1, b"secret").unwrap();
        let result = decrypt(&key2, &nonce, &ciphertext, &tag);

        assert!(matches!(result, Err(MystError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = generate_key();
        let (nonce, mut ciphertext, tag) = encrypt(&key, b"secret").unwrap();
        ciphertext[0] ^= 0xFF;

        let result = decrypt(&key, &nonce, &ciphertext, &tag);
        assert!(matches!(result, Err(MystError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = generate_key();
        let (nonce, ciphertext, mut tag) = encrypt(&key, b"secret").unwrap();
        tag[15] ^= 0x01;

        let result = decrypt(&key, &nonce, &ciphertext, &tag);
        assert!(matches!(result, Err(MystError::AuthenticationFailed)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = generate_key();
        let (nonce, ciphertext, tag) = encrypt(&key, b"").unwrap();
        assert!(ciphertext.is_empty());
        let decrypted = decrypt(&key, &nonce, &ciphertext, &tag).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_large_plaintext() {
        let key = generate_key();
        let plaintext = vec![0xAB; 1_000_000];

        let (nonce, ciphertext, tag) = encrypt(&key, &plaintext).unwrap();
        let decrypted = decrypt(&key, &nonce, &ciphertext, &tag).unwrap();

        assert_eq!(decrypted, plaintext);
    }
}
