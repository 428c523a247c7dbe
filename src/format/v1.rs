//! Keystore container format v1.
//!
//! V1 is a JSON document:
//! ```text
//! {
//!   "memo"?: string,
//!   "crypto": {
//!     "cipher": "AES-GCM",
//!     "cipherparams": { "nonce": hex },
//!     "ciphertext": hex,
//!     "kdf": "scrypt",
//!     "kdfparams": {
//!       "costParameterN": int, "costParameterC": int, "blockSize": int,
//!       "parallelizationParameter": int, "lengthOfDerivedKey": int, "salt": hex
//!     },
//!     "mac": hex
//!   },
//!   "id": string,
//!   "version": 1
//! }
//! ```
//!
//! Parsing checks shape only. Whether the KDF parameters make sense is decided when a key
//! is derived from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::crypto::ScryptParams;
use crate::error::{FieldGroup, KeystoreError, ParseError};

/// Format version written by this module.
pub const VERSION_V1: u64 = 1;

/// `crypto.cipherparams`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherParams {
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
}

/// The `crypto` block of a keystore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeystoreCrypto {
    pub cipher: String,
    pub cipherparams: CipherParams,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
    pub kdf: String,
    pub kdfparams: ScryptParams,
    #[serde(with = "hex::serde")]
    pub mac: Vec<u8>,
}

/// A persisted, password-sealed secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keystore {
    pub memo: Option<String>,
    pub crypto: KeystoreCrypto,
    /// Display and lookup hint derived from the ciphertext. Not unique, not authenticated.
    pub id: String,
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    memo: Option<&'a str>,
    crypto: &'a KeystoreCrypto,
    id: &'a str,
    version: u64,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    memo: Option<String>,
    crypto: Value,
    id: String,
    version: u64,
}

#[derive(Deserialize)]
struct RawCrypto {
    cipher: String,
    cipherparams: CipherParams,
    #[serde(with = "hex::serde")]
    ciphertext: Vec<u8>,
    kdf: String,
    kdfparams: Value,
    #[serde(with = "hex::serde")]
    mac: Vec<u8>,
}

/// Parses a v1 keystore document.
///
/// # Errors
///
/// Returns a [`ParseError`] naming the first field group that is missing a field or has
/// one of the wrong type.
pub fn parse(value: &Value) -> Result<Keystore, ParseError> {
    let raw = RawEnvelope::deserialize(value)
        .map_err(|e| ParseError::new(FieldGroup::Keystore, e))?;

    if raw.version != VERSION_V1 {
        return Err(ParseError::new(
            FieldGroup::Keystore,
            format!("wrong version {} for v1 parser", raw.version),
        ));
    }

    Ok(Keystore {
        memo: raw.memo,
        crypto: parse_crypto(&raw.crypto)?,
        id: raw.id,
    })
}

/// Parses a `crypto` block.
pub fn parse_crypto(value: &Value) -> Result<KeystoreCrypto, ParseError> {
    let raw =
        RawCrypto::deserialize(value).map_err(|e| ParseError::new(FieldGroup::Crypto, e))?;

    Ok(KeystoreCrypto {
        cipher: raw.cipher,
        cipherparams: raw.cipherparams,
        ciphertext: raw.ciphertext,
        kdf: raw.kdf,
        kdfparams: parse_scrypt_params(&raw.kdfparams)?,
        mac: raw.mac,
    })
}

/// Parses a `kdfparams` block.
pub fn parse_scrypt_params(value: &Value) -> Result<ScryptParams, ParseError> {
    ScryptParams::deserialize(value).map_err(|e| ParseError::new(FieldGroup::KdfParams, e))
}

/// Serializes a keystore as v1 JSON.
pub fn serialize(keystore: &Keystore, pretty: bool) -> Result<Vec<u8>, KeystoreError> {
    let envelope = Envelope {
        memo: keystore.memo.as_deref(),
        crypto: &keystore.crypto,
        id: &keystore.id,
        version: VERSION_V1,
    };

    let bytes = if pretty {
        serde_json::to_vec_pretty(&envelope)?
    } else {
        serde_json::to_vec(&envelope)?
    };
    Ok(bytes)
}
