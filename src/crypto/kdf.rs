/// PBKDF2-HMAC-SHA256 key derivation.
///
/// Two parameter sets, one per encryption layer:
/// - master (password path): 100,000 iterations, 32-byte salt
/// - fragment: 10,000 iterations, 16-byte salt over a random 32-byte raw key
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

use crate::crypto::sensitive::SensitiveBytes32;

pub const MASTER_ITERATIONS: u32 = 100_000;
pub const FRAGMENT_ITERATIONS: u32 = 10_000;
pub const MASTER_SALT_LEN: usize = 32;
pub const FRAGMENT_SALT_LEN: usize = 16;

/// Generate a random 32-byte salt for the master password path.
pub fn generate_master_salt() -> [u8; MASTER_SALT_LEN] {
    let mut salt = [0u8; MASTER_SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a random 16-byte salt for one fragment key.
pub fn generate_fragment_salt() -> [u8; FRAGMENT_SALT_LEN] {
    let mut salt = [0u8; FRAGMENT_SALT_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the 32-byte master key from a user password.
pub fn derive_master_key(password: &[u8], salt: &[u8]) -> SensitiveBytes32 {
    let mut output = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, MASTER_ITERATIONS, &mut output);
    SensitiveBytes32::new(output)
}

/// Derive the effective AEAD key for one fragment from its raw key.
pub fn derive_fragment_key(raw_key: &[u8], salt: &[u8]) -> SensitiveBytes32 {
    let mut output = [0u8; 32];
    pbkdf2_hmac::<Sha256>(raw_key, salt, FRAGMENT_ITERATIONS, &mut output);
    SensitiveBytes32::new(output)
}
