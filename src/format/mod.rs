//! Keystore container codec.
//!
//! Provides version-aware parsing and serialization of the persisted JSON container.

use serde_json::Value;

use crate::error::{FieldGroup, KeystoreError, ParseError};

pub mod v1;

pub use v1::{CipherParams, Keystore, KeystoreCrypto};

/// Latest format version
pub const CURRENT_VERSION: u64 = v1::VERSION_V1;

/// Parses keystore JSON bytes.
///
/// Automatically dispatches to the appropriate version parser.
///
/// # Errors
///
/// Returns an error if:
/// - The bytes are not a JSON document
/// - The version is missing or unsupported
/// - A required field is missing or has the wrong shape
pub fn from_json(bytes: &[u8]) -> Result<Keystore, ParseError> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| ParseError::new(FieldGroup::Keystore, e))?;
    from_value(&value)
}

/// Parses an already decoded JSON document.
pub fn from_value(value: &Value) -> Result<Keystore, ParseError> {
    let version = value
        .get("version")
        .ok_or_else(|| ParseError::new(FieldGroup::Keystore, "missing field `version`"))?;

    match version.as_u64() {
        Some(v1::VERSION_V1) => v1::parse(value),
        Some(other) => Err(ParseError::new(
            FieldGroup::Keystore,
            format!("unsupported version {other}"),
        )),
        None => Err(ParseError::new(
            FieldGroup::Keystore,
            "`version` must be a non-negative integer",
        )),
    }
}

/// Serializes a keystore to compact JSON bytes.
pub fn to_json(keystore: &Keystore) -> Result<Vec<u8>, KeystoreError> {
    v1::serialize(keystore, false)
}

/// Serializes a keystore to indented JSON bytes.
pub fn to_json_pretty(keystore: &Keystore) -> Result<Vec<u8>, KeystoreError> {
    v1::serialize(keystore, true)
}

/// Whether `value` has the shape of a keystore this crate can load.
pub fn is_keystore(value: &Value) -> bool {
    from_value(value).is_ok()
}

/// Whether `value` has the shape of a `crypto` block.
pub fn is_keystore_crypto(value: &Value) -> bool {
    v1::parse_crypto(value).is_ok()
}

/// Whether `value` has the shape of a `kdfparams` block.
pub fn is_scrypt_params(value: &Value) -> bool {
    v1::parse_scrypt_params(value).is_ok()
}

impl Keystore {
    /// Format version of this container.
    pub fn version(&self) -> u64 {
        CURRENT_VERSION
    }

    pub fn to_json(&self) -> Result<Vec<u8>, KeystoreError> {
        to_json(self)
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, KeystoreError> {
        to_json_pretty(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ParseError> {
        from_json(bytes)
    }
}
