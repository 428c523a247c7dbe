use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use super::SALT_LEN;
use super::rand::RandomSource;
use crate::error::{KeystoreError, Result, ValidationError};

/// Identifier of the only supported KDF.
pub const SCRYPT: &str = "scrypt";

pub const DEFAULT_N: u64 = 8192;
/// Legacy iteration count carried by the format; scrypt does not consume it.
pub const DEFAULT_C: u64 = 262_144;
pub const DEFAULT_R: u64 = 8;
pub const DEFAULT_P: u64 = 1;
pub const DEFAULT_DKLEN: u64 = 32;

/// Upper bounds accepted from a keystore file.
pub const MAX_N: u64 = 1 << 20;
pub const MAX_R: u64 = 32;
pub const MAX_P: u64 = 16;
/// scrypt refuses to produce fewer bytes than this.
pub const MIN_DKLEN: u64 = 10;
pub const MAX_DKLEN: u64 = 64;
pub const MAX_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

/// scrypt cost parameters and salt, as persisted in `crypto.kdfparams`.
///
/// Numbers are kept exactly as read. Semantic checks happen in [`ScryptParams::validate`],
/// which [`derive_key`] runs before touching the primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptParams {
    #[serde(rename = "costParameterN")]
    pub n: u64,
    #[serde(rename = "costParameterC")]
    pub c: u64,
    #[serde(rename = "blockSize")]
    pub r: u64,
    #[serde(rename = "parallelizationParameter")]
    pub p: u64,
    #[serde(rename = "lengthOfDerivedKey")]
    pub dklen: u64,
    #[serde(with = "hex::serde")]
    pub salt: Vec<u8>,
}

impl ScryptParams {
    /// Default costs with a fresh salt drawn from `rng`.
    pub fn create<R: RandomSource + ?Sized>(rng: &R) -> Result<Self> {
        let mut salt = vec![0u8; SALT_LEN];
        rng.fill_bytes(&mut salt)?;
        Ok(Self::with_salt(salt))
    }

    /// Default costs with a caller-chosen salt. Intended for deterministic tests.
    pub fn with_salt(salt: Vec<u8>) -> Self {
        Self {
            n: DEFAULT_N,
            c: DEFAULT_C,
            r: DEFAULT_R,
            p: DEFAULT_P,
            dklen: DEFAULT_DKLEN,
            salt,
        }
    }

    /// Approximate scrypt working memory in bytes (`128 * r * N`).
    pub fn memory_cost(&self) -> u64 {
        128u64
            .saturating_mul(self.r)
            .saturating_mul(self.n)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n < 2 || !self.n.is_power_of_two() {
            return Err(KeystoreError::invalid_params(format!(
                "costParameterN must be a power of two >= 2, got {}",
                self.n
            )));
        }
        if self.n > MAX_N {
            return Err(KeystoreError::invalid_params(format!(
                "costParameterN {} exceeds maximum {MAX_N}",
                self.n
            )));
        }
        if self.r == 0 || self.r > MAX_R {
            return Err(KeystoreError::invalid_params(format!(
                "blockSize must be in 1..={MAX_R}, got {}",
                self.r
            )));
        }
        if self.p == 0 || self.p > MAX_P {
            return Err(KeystoreError::invalid_params(format!(
                "parallelizationParameter must be in 1..={MAX_P}, got {}",
                self.p
            )));
        }
        if self.dklen < MIN_DKLEN || self.dklen > MAX_DKLEN {
            return Err(KeystoreError::invalid_params(format!(
                "lengthOfDerivedKey must be in {MIN_DKLEN}..={MAX_DKLEN}, got {}",
                self.dklen
            )));
        }
        // scrypt requires log2(N) < 16 * r
        if u64::from(self.n.trailing_zeros()) >= 16 * self.r {
            return Err(KeystoreError::invalid_params(format!(
                "costParameterN {} is too large for blockSize {}",
                self.n, self.r
            )));
        }
        if self.memory_cost() > MAX_MEMORY_BYTES {
            return Err(KeystoreError::invalid_params(format!(
                "scrypt memory cost {} bytes exceeds maximum {MAX_MEMORY_BYTES}",
                self.memory_cost()
            )));
        }
        if self.salt.len() != SALT_LEN {
            return Err(KeystoreError::invalid_params(format!(
                "salt must be {SALT_LEN} bytes, got {}",
                self.salt.len()
            )));
        }
        Ok(())
    }
}

/// Symmetric key produced by [`derive_key`]. Wiped on drop.
pub struct DerivedKey(Zeroizing<Vec<u8>>);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey([REDACTED; {} bytes])", self.len())
    }
}

#[cfg(test)]
impl From<Vec<u8>> for DerivedKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }
}

/// Derive a key from `password` with the KDF named `kdf`.
///
/// Foreign KDF names are rejected before any parameter is looked at, and parameters are
/// validated (including the resource maxima) before scrypt runs.
pub fn derive_key(password: &[u8], kdf: &str, params: &ScryptParams) -> Result<DerivedKey> {
    if kdf != SCRYPT {
        return Err(ValidationError::UnsupportedKdf(kdf.to_string()).into());
    }
    params.validate()?;

    // validate() bounds every value well inside these target types
    let log_n = params.n.trailing_zeros() as u8;
    let r = u32::try_from(params.r).map_err(KeystoreError::derivation)?;
    let p = u32::try_from(params.p).map_err(KeystoreError::derivation)?;
    let dklen = usize::try_from(params.dklen).map_err(KeystoreError::derivation)?;
    let scrypt_params =
        scrypt::Params::new(log_n, r, p, dklen).map_err(KeystoreError::derivation)?;

    debug!(
        n = params.n,
        r = params.r,
        p = params.p,
        dklen = params.dklen,
        "deriving key"
    );

    let mut key = Zeroizing::new(vec![0u8; dklen]);
    scrypt::scrypt(password, &params.salt, &scrypt_params, &mut key)
        .map_err(KeystoreError::derivation)?;

    Ok(DerivedKey(key))
}
