use getrandom::fill;

use crate::error::{KeystoreError, Result};

/// Source of the salt and nonce bytes used when sealing.
pub trait RandomSource: Send + Sync {
    /// Fill `buf` entirely with fresh random bytes.
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<()>;
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<()> {
        fill(buf).map_err(|_| KeystoreError::RandomUnavailable)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &R {
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<()> {
        (**self).fill_bytes(buf)
    }
}

/// Fills every request with the same byte. Only for golden vectors.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub(crate) struct FixedRandom(pub u8);

#[cfg(test)]
impl RandomSource for FixedRandom {
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<()> {
        buf.fill(self.0);
        Ok(())
    }
}
