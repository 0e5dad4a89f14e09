/// Cryptographic primitives for the double-encryption scheme.
///
/// - `aead`: AES-256-GCM with detached tags (both layers)
/// - `kdf`: PBKDF2-HMAC-SHA256 (master password path and per-fragment keys)
/// - `hash`: SHA-256 identity and integrity digests
/// - `sensitive`: zeroize-on-drop key wrappers
pub mod aead;
pub mod hash;
pub mod kdf;
pub mod sensitive;
