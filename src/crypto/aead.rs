use aes_gcm::{
    Aes128Gcm, Aes256Gcm,
    aead::{AeadInPlace, KeyInit, Nonce, Tag},
};
use zeroize::Zeroizing;

use super::kdf::DerivedKey;
use super::rand::RandomSource;
use super::{NONCE_LEN, TAG_LEN};
use crate::error::{KeystoreError, Result};
use crate::secret::Secret;

/// Algorithm id written to `crypto.cipher`.
pub const CIPHER_AES_GCM: &str = "AES-GCM";

/// Ids accepted in `crypto.cipher` on read. `aes-256-gcm` is written by older
/// keystore producers for the same construction.
pub const ACCEPTED_CIPHERS: &[&str] = &[CIPHER_AES_GCM, "aes-256-gcm"];

pub fn is_supported_cipher(id: &str) -> bool {
    ACCEPTED_CIPHERS.contains(&id)
}

/// Output of [`seal`]: everything needed to open the plaintext again, minus the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBox {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub auth_tag: Vec<u8>,
}

/// Encrypt `plaintext` under `key` with a nonce freshly drawn from `rng`.
///
/// A 16-byte key selects AES-128-GCM and a 32-byte key AES-256-GCM. No associated data.
pub fn seal<R: RandomSource + ?Sized>(
    plaintext: &[u8],
    key: &DerivedKey,
    rng: &R,
) -> Result<SealedBox> {
    if !matches!(key.len(), 16 | 32) {
        return Err(KeystoreError::Encryption);
    }

    let mut nonce = vec![0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce)?;

    // holds plaintext until encryption succeeds
    let mut buffer = Zeroizing::new(plaintext.to_vec());
    let tag = match key.len() {
        16 => seal_with::<Aes128Gcm>(key.as_bytes(), &nonce, &mut buffer),
        _ => seal_with::<Aes256Gcm>(key.as_bytes(), &nonce, &mut buffer),
    }
    .map_err(|_| KeystoreError::Encryption)?;

    Ok(SealedBox {
        nonce,
        ciphertext: buffer.to_vec(),
        auth_tag: tag,
    })
}

/// Verify the tag and decrypt. Any mismatch yields [`KeystoreError::Authentication`].
pub fn open(sealed: &SealedBox, key: &DerivedKey) -> Result<Secret> {
    if sealed.nonce.len() != NONCE_LEN || sealed.auth_tag.len() != TAG_LEN {
        return Err(KeystoreError::Authentication);
    }

    let mut buffer = Zeroizing::new(sealed.ciphertext.clone());
    match key.len() {
        16 => open_with::<Aes128Gcm>(key.as_bytes(), sealed, &mut buffer),
        32 => open_with::<Aes256Gcm>(key.as_bytes(), sealed, &mut buffer),
        _ => Err(aes_gcm::Error),
    }
    .map_err(|_| KeystoreError::Authentication)?;

    Ok(Secret::from(buffer))
}

fn seal_with<C: KeyInit + AeadInPlace>(
    key: &[u8],
    nonce: &[u8],
    buffer: &mut [u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    let cipher = C::new_from_slice(key).map_err(|_| aes_gcm::Error)?;
    let tag = cipher.encrypt_in_place_detached(Nonce::<C>::from_slice(nonce), b"", buffer)?;
    Ok(tag.to_vec())
}

fn open_with<C: KeyInit + AeadInPlace>(
    key: &[u8],
    sealed: &SealedBox,
    buffer: &mut [u8],
) -> Result<(), aes_gcm::Error> {
    let cipher = C::new_from_slice(key).map_err(|_| aes_gcm::Error)?;
    cipher.decrypt_in_place_detached(
        Nonce::<C>::from_slice(&sealed.nonce),
        b"",
        buffer,
        Tag::<C>::from_slice(&sealed.auth_tag),
    )
}
