//! Cryptographic building blocks for the keystore.
//!
//! Provides password key derivation, authenticated encryption, and the random source seam.

pub mod aead;
pub mod kdf;
pub mod rand;

use sha2::{Digest, Sha256};

pub use aead::{ACCEPTED_CIPHERS, CIPHER_AES_GCM, SealedBox, is_supported_cipher, open, seal};
pub use kdf::{DerivedKey, SCRYPT, ScryptParams, derive_key};
pub use rand::{OsRandom, RandomSource};

/// Length of the KDF salt (32 bytes).
pub const SALT_LEN: usize = 32;
/// Length of the AES-GCM nonce (12 bytes).
pub const NONCE_LEN: usize = 12;
/// Length of the AES-GCM authentication tag (16 bytes).
pub const TAG_LEN: usize = 16;
/// Number of hex characters kept from the ciphertext digest for the keystore id.
pub const ID_HEX_LEN: usize = 16;

/// Content-derived display id: the last 16 hex chars of `sha256(ciphertext)`.
///
/// Truncated, so not collision resistant. Never use it as a uniqueness guarantee.
pub fn keystore_id(ciphertext: &[u8]) -> String {
    let digest = hex::encode(Sha256::digest(ciphertext));
    digest[digest.len() - ID_HEX_LEN..].to_string()
}
