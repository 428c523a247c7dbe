//! Error taxonomy for sealing and opening keystores.

use std::fmt;

use thiserror::Error;

/// The block of the keystore container a [`ParseError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    /// Top-level envelope: `version`, `id`, `memo`, presence of `crypto`.
    Keystore,
    /// The `crypto` block, excluding `kdfparams`.
    Crypto,
    /// The `crypto.kdfparams` block.
    KdfParams,
}

impl fmt::Display for FieldGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldGroup::Keystore => write!(f, "keystore"),
            FieldGroup::Crypto => write!(f, "crypto"),
            FieldGroup::KdfParams => write!(f, "kdfparams"),
        }
    }
}

/// A keystore document is missing a field or has one of the wrong shape.
#[derive(Debug, Error)]
#[error("malformed {field} block: {reason}")]
pub struct ParseError {
    field: FieldGroup,
    reason: String,
}

impl ParseError {
    pub(crate) fn new(field: FieldGroup, reason: impl fmt::Display) -> Self {
        Self {
            field,
            reason: reason.to_string(),
        }
    }

    pub fn field(&self) -> FieldGroup {
        self.field
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Rejections decided from the container alone, before any expensive work.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("unsupported KDF: {0}")]
    UnsupportedKdf(String),

    #[error("unsupported cipher: {0}")]
    UnsupportedCipher(String),

    #[error("invalid KDF parameters: {0}")]
    InvalidKdfParams(String),

    #[error(transparent)]
    Malformed(#[from] ParseError),
}

/// Errors returned by every fallible keystore operation.
#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Wrong password or tampered data. The two are never told apart.
    #[error("wrong password or corrupted keystore")]
    Authentication,

    /// The KDF primitive failed. `cause` is for operator logs only.
    #[error("key derivation failed")]
    Derivation { cause: String },

    #[error("secure random source unavailable")]
    RandomUnavailable,

    #[error("encryption failed")]
    Encryption,

    #[error("keystore encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl KeystoreError {
    pub(crate) fn derivation<E: fmt::Display>(cause: E) -> Self {
        KeystoreError::Derivation {
            cause: cause.to_string(),
        }
    }

    pub(crate) fn invalid_params(reason: impl Into<String>) -> Self {
        ValidationError::InvalidKdfParams(reason.into()).into()
    }
}

impl From<ParseError> for KeystoreError {
    fn from(e: ParseError) -> Self {
        KeystoreError::Validation(ValidationError::Malformed(e))
    }
}

pub type Result<T, E = KeystoreError> = std::result::Result<T, E>;
