//! Password-sealed keystore containers.
//!
//! A [`Secret`] (private key or seed) is sealed under a password into a [`Keystore`]:
//! scrypt derives a key from the password and a fresh salt, AES-GCM encrypts the secret
//! under a fresh nonce, and the result is assembled into a JSON container the caller can
//! persist anywhere. Opening recomputes the key from the stored parameters and verifies
//! the authentication tag before any plaintext is released.
//!
//! ```no_run
//! let keystore = keyseal::encrypt_secret(&[7u8; 32], "correct horse", Some("signing key"))?;
//! let json = keystore.to_json()?;
//!
//! let loaded = keyseal::Keystore::from_json(&json)?;
//! let secret = keyseal::decrypt(&loaded, "correct horse")?;
//! assert_eq!(secret.expose(), &[7u8; 32]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod crypto;
pub mod error;
pub mod format;
mod secret;
pub mod storage;

use tracing::{debug, instrument};

use crate::crypto::{
    CIPHER_AES_GCM, OsRandom, RandomSource, SCRYPT, SealedBox, ScryptParams, derive_key,
    is_supported_cipher, keystore_id,
};
pub use crate::error::{FieldGroup, KeystoreError, ParseError, Result, ValidationError};
pub use crate::format::{CipherParams, Keystore, KeystoreCrypto};
pub use crate::secret::Secret;
pub use crate::storage::Storage;

/// Seals secrets into keystores and opens them again.
///
/// Holds nothing but the random source, so one service can be shared across threads and
/// any number of calls may run in parallel.
#[derive(Debug, Clone, Default)]
pub struct KeystoreService<R = OsRandom> {
    rng: R,
}

impl KeystoreService<OsRandom> {
    pub fn new() -> Self {
        Self { rng: OsRandom }
    }
}

impl<R: RandomSource> KeystoreService<R> {
    /// Uses `rng` for every salt and nonce this service draws.
    pub fn with_random(rng: R) -> Self {
        Self { rng }
    }

    /// Seals `secret` under `password`.
    ///
    /// Fresh scrypt parameters and salt are generated unless `kdf_params` is given. Passing
    /// explicit parameters is meant for deterministic tests and cost tuning; the salt they
    /// carry is used as is.
    #[instrument(skip_all, fields(memo = memo.is_some()))]
    pub fn encrypt_secret(
        &self,
        secret: &[u8],
        password: &str,
        memo: Option<&str>,
        kdf_params: Option<ScryptParams>,
    ) -> Result<Keystore> {
        let params = match kdf_params {
            Some(params) => params,
            None => ScryptParams::create(&self.rng)?,
        };

        let key = derive_key(password.as_bytes(), SCRYPT, &params)?;
        let sealed = crypto::seal(secret, &key, &self.rng)?;
        drop(key);

        let id = keystore_id(&sealed.ciphertext);
        debug!(%id, n = params.n, r = params.r, "sealed secret");

        Ok(Keystore {
            memo: memo.map(str::to_string),
            crypto: KeystoreCrypto {
                cipher: CIPHER_AES_GCM.to_string(),
                cipherparams: CipherParams {
                    nonce: sealed.nonce,
                },
                ciphertext: sealed.ciphertext,
                kdf: SCRYPT.to_string(),
                kdfparams: params,
                mac: sealed.auth_tag,
            },
            id,
        })
    }

    /// Opens `keystore` with `password`.
    ///
    /// # Errors
    ///
    /// - [`KeystoreError::Validation`] when the container names an unsupported cipher or
    ///   KDF, or carries KDF parameters outside the accepted range.
    /// - [`KeystoreError::Authentication`] for everything else: wrong password, tampered
    ///   or truncated data, or a failing primitive.
    #[instrument(skip_all, fields(id = %keystore.id))]
    pub fn decrypt(&self, keystore: &Keystore, password: &str) -> Result<Secret> {
        let crypto = &keystore.crypto;
        if !is_supported_cipher(&crypto.cipher) {
            return Err(ValidationError::UnsupportedCipher(crypto.cipher.clone()).into());
        }

        let sealed = SealedBox {
            nonce: crypto.cipherparams.nonce.clone(),
            ciphertext: crypto.ciphertext.clone(),
            auth_tag: crypto.mac.clone(),
        };

        let key = derive_key(password.as_bytes(), &crypto.kdf, &crypto.kdfparams)
            .map_err(collapse)?;
        let secret = crypto::open(&sealed, &key).map_err(collapse)?;

        debug!("opened keystore");
        Ok(secret)
    }

    /// Reseals the secret in `keystore` under `new_password`.
    ///
    /// The cost parameters and memo are kept; salt and nonce are drawn fresh.
    #[instrument(skip_all, fields(id = %keystore.id))]
    pub fn change_password(
        &self,
        keystore: &Keystore,
        old_password: &str,
        new_password: &str,
    ) -> Result<Keystore> {
        let secret = self.decrypt(keystore, old_password)?;
        let fresh = ScryptParams::create(&self.rng)?;
        let params = ScryptParams {
            salt: fresh.salt,
            ..keystore.crypto.kdfparams.clone()
        };

        self.encrypt_secret(
            secret.expose(),
            new_password,
            keystore.memo.as_deref(),
            Some(params),
        )
    }
}

/// Keeps validation errors precise and folds every other failure into `Authentication`.
fn collapse(err: KeystoreError) -> KeystoreError {
    match err {
        KeystoreError::Validation(e) => KeystoreError::Validation(e),
        other => {
            debug!(cause = ?other, "keystore could not be opened");
            KeystoreError::Authentication
        }
    }
}

/// Seals `secret` under `password` with default scrypt costs and OS randomness.
pub fn encrypt_secret(secret: &[u8], password: &str, memo: Option<&str>) -> Result<Keystore> {
    KeystoreService::new().encrypt_secret(secret, password, memo, None)
}

/// Opens `keystore` with `password`. See [`KeystoreService::decrypt`].
pub fn decrypt(keystore: &Keystore, password: &str) -> Result<Secret> {
    KeystoreService::new().decrypt(keystore, password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SALT_LEN;
    use crate::crypto::rand::FixedRandom;

    const GOLDEN_PASSWORD: &str = "correct horse battery staple";

    fn light_params() -> ScryptParams {
        ScryptParams {
            n: 16,
            r: 1,
            ..ScryptParams::create(&OsRandom).unwrap()
        }
    }

    fn seal(secret: &[u8], password: &str) -> Keystore {
        KeystoreService::new()
            .encrypt_secret(secret, password, None, Some(light_params()))
            .unwrap()
    }

    fn flip_bit(bytes: &mut [u8], bit: usize) {
        bytes[bit / 8] ^= 1 << (bit % 8);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let service = KeystoreService::new();
        for len in [0usize, 1, 16, 32, 64, 1000] {
            let secret: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let keystore = seal(&secret, "pw");
            let opened = service.decrypt(&keystore, "pw").unwrap();
            assert_eq!(opened.expose(), secret.as_slice());
        }
    }

    #[test]
    fn roundtrip_through_json() {
        let keystore = seal(b"seed phrase bytes", "pw");
        let json = keystore.to_json().unwrap();
        let loaded = Keystore::from_json(&json).unwrap();

        assert_eq!(loaded, keystore);
        assert_eq!(decrypt(&loaded, "pw").unwrap().expose(), b"seed phrase bytes");
    }

    #[test]
    fn wrong_password_fails() {
        let keystore = seal(b"secret", "correct");
        let err = decrypt(&keystore, "wrong").unwrap_err();
        assert!(matches!(err, KeystoreError::Authentication));
        assert_eq!(err.to_string(), "wrong password or corrupted keystore");
    }

    #[test]
    fn any_flipped_bit_fails_authentication() {
        let keystore = seal(&[0x42; 32], "pw");
        let service = KeystoreService::new();

        for bit in 0..keystore.crypto.ciphertext.len() * 8 {
            let mut tampered = keystore.clone();
            flip_bit(&mut tampered.crypto.ciphertext, bit);
            assert!(matches!(
                service.decrypt(&tampered, "pw"),
                Err(KeystoreError::Authentication)
            ));
        }
        for bit in 0..keystore.crypto.mac.len() * 8 {
            let mut tampered = keystore.clone();
            flip_bit(&mut tampered.crypto.mac, bit);
            assert!(matches!(
                service.decrypt(&tampered, "pw"),
                Err(KeystoreError::Authentication)
            ));
        }
        for bit in 0..keystore.crypto.cipherparams.nonce.len() * 8 {
            let mut tampered = keystore.clone();
            flip_bit(&mut tampered.crypto.cipherparams.nonce, bit);
            assert!(matches!(
                service.decrypt(&tampered, "pw"),
                Err(KeystoreError::Authentication)
            ));
        }
    }

    #[test]
    fn tampered_salt_fails_authentication() {
        let mut keystore = seal(b"secret", "pw");
        keystore.crypto.kdfparams.salt[0] ^= 1;
        assert!(matches!(
            decrypt(&keystore, "pw"),
            Err(KeystoreError::Authentication)
        ));
    }

    #[test]
    fn truncated_fields_fail_authentication() {
        let keystore = seal(b"secret", "pw");

        let mut short_mac = keystore.clone();
        short_mac.crypto.mac.truncate(12);
        let mut empty_nonce = keystore.clone();
        empty_nonce.crypto.cipherparams.nonce.clear();
        let mut short_ct = keystore.clone();
        short_ct.crypto.ciphertext.pop();

        for tampered in [short_mac, empty_nonce, short_ct] {
            assert!(matches!(
                decrypt(&tampered, "pw"),
                Err(KeystoreError::Authentication)
            ));
        }
    }

    #[test]
    fn golden_vector() {
        let service = KeystoreService::with_random(FixedRandom(0x02));
        let params = ScryptParams::with_salt(vec![0x01; SALT_LEN]);

        let keystore = service
            .encrypt_secret(&[0u8; 32], GOLDEN_PASSWORD, None, Some(params))
            .unwrap();

        assert_eq!(keystore.crypto.cipherparams.nonce, vec![0x02; 12]);
        assert_eq!(
            hex::encode(&keystore.crypto.ciphertext),
            "7f0b9aa16429331f7a6ebc147a9b8ff5868f9772f697a5dea7a183e1a294685a"
        );
        assert_eq!(
            hex::encode(&keystore.crypto.mac),
            "431415a3e9d2be809a322898983e3144"
        );
        assert_eq!(keystore.id, "cf4b4b95aa00effa");

        let opened = service.decrypt(&keystore, GOLDEN_PASSWORD).unwrap();
        assert_eq!(opened.expose(), &[0u8; 32]);

        assert!(matches!(
            service.decrypt(&keystore, "wrong"),
            Err(KeystoreError::Authentication)
        ));
    }

    #[test]
    fn fixed_randomness_is_deterministic() {
        let service = KeystoreService::with_random(FixedRandom(0x33));
        let a = service
            .encrypt_secret(b"secret", "pw", Some("m"), Some(light_params()))
            .unwrap();
        let b = service
            .encrypt_secret(b"secret", "pw", Some("m"), Some(a.crypto.kdfparams.clone()))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn fresh_randomness_per_keystore() {
        let service = KeystoreService::new();
        let a = service
            .encrypt_secret(b"secret", "pw", None, None)
            .unwrap();
        let b = service
            .encrypt_secret(b"secret", "pw", None, None)
            .unwrap();

        assert_eq!(a.crypto.kdfparams.salt.len(), SALT_LEN);
        assert_ne!(a.crypto.kdfparams.salt, b.crypto.kdfparams.salt);
        assert_ne!(a.crypto.cipherparams.nonce, b.crypto.cipherparams.nonce);
        assert_ne!(a.crypto.ciphertext, b.crypto.ciphertext);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn keystore_fields_are_assembled() {
        let keystore = KeystoreService::new()
            .encrypt_secret(b"secret", "pw", Some("hot wallet"), Some(light_params()))
            .unwrap();

        assert_eq!(keystore.version(), 1);
        assert_eq!(keystore.memo.as_deref(), Some("hot wallet"));
        assert_eq!(keystore.crypto.cipher, "AES-GCM");
        assert_eq!(keystore.crypto.kdf, "scrypt");
        assert_eq!(keystore.crypto.mac.len(), 16);
        assert_eq!(keystore.id, keystore_id(&keystore.crypto.ciphertext));
    }

    #[test]
    fn unsupported_kdf_is_a_validation_error() {
        let mut keystore = seal(b"secret", "pw");
        keystore.crypto.kdf = "pbkdf2".to_string();
        // would be refused as too costly if it ever reached parameter checks
        keystore.crypto.kdfparams.n = 1 << 40;

        match decrypt(&keystore, "pw") {
            Err(KeystoreError::Validation(ValidationError::UnsupportedKdf(name))) => {
                assert_eq!(name, "pbkdf2")
            }
            other => panic!("expected UnsupportedKdf, got: {other:?}"),
        }
    }

    #[test]
    fn unsupported_cipher_is_a_validation_error() {
        let mut keystore = seal(b"secret", "pw");
        keystore.crypto.cipher = "aes-128-ctr".to_string();
        assert!(matches!(
            decrypt(&keystore, "pw"),
            Err(KeystoreError::Validation(ValidationError::UnsupportedCipher(_)))
        ));
    }

    #[test]
    fn bad_params_load_then_fail_precisely() {
        let mut keystore = seal(b"secret", "pw");
        keystore.crypto.kdfparams.n = 12345;
        let json = keystore.to_json().unwrap();

        let loaded = Keystore::from_json(&json).unwrap();
        assert!(matches!(
            decrypt(&loaded, "pw"),
            Err(KeystoreError::Validation(ValidationError::InvalidKdfParams(_)))
        ));
    }

    #[test]
    fn params_outside_scrypt_domain_fail_precisely() {
        let too_wide = ScryptParams {
            n: 1 << 17,
            ..light_params()
        };
        let too_short = ScryptParams {
            dklen: 8,
            ..light_params()
        };

        for params in [too_wide, too_short] {
            assert!(matches!(
                KeystoreService::new().encrypt_secret(b"s", "pw", None, Some(params.clone())),
                Err(KeystoreError::Validation(ValidationError::InvalidKdfParams(_)))
            ));

            let mut keystore = seal(b"secret", "pw");
            keystore.crypto.kdfparams = params;
            assert!(matches!(
                decrypt(&keystore, "pw"),
                Err(KeystoreError::Validation(ValidationError::InvalidKdfParams(_)))
            ));
        }
    }

    #[test]
    fn huge_block_size_loads_then_fails_precisely() {
        let keystore = seal(b"secret", "pw");
        let mut value: serde_json::Value =
            serde_json::from_slice(&keystore.to_json().unwrap()).unwrap();
        value["crypto"]["kdfparams"]["blockSize"] = serde_json::json!(5_000_000_000u64);

        let loaded = format::from_value(&value).unwrap();
        assert_eq!(loaded.crypto.kdfparams.r, 5_000_000_000);
        assert!(matches!(
            decrypt(&loaded, "pw"),
            Err(KeystoreError::Validation(ValidationError::InvalidKdfParams(_)))
        ));
    }

    #[test]
    fn legacy_cipher_id_opens() {
        let mut keystore = seal(b"secret", "pw");
        keystore.crypto.cipher = "aes-256-gcm".to_string();
        assert_eq!(decrypt(&keystore, "pw").unwrap().expose(), b"secret");
    }

    #[test]
    fn hostile_costs_are_refused() {
        let mut keystore = seal(b"secret", "pw");
        keystore.crypto.kdfparams.n = 1 << 30;
        keystore.crypto.kdfparams.r = 1024;
        assert!(matches!(
            decrypt(&keystore, "pw"),
            Err(KeystoreError::Validation(ValidationError::InvalidKdfParams(_)))
        ));
    }

    #[test]
    fn explicit_params_are_validated_on_encrypt() {
        let params = ScryptParams {
            salt: vec![1; 8],
            ..light_params()
        };
        assert!(matches!(
            KeystoreService::new().encrypt_secret(b"s", "pw", None, Some(params)),
            Err(KeystoreError::Validation(_))
        ));
    }

    #[test]
    fn short_derived_key_uses_aes128() {
        let params = ScryptParams {
            dklen: 16,
            ..light_params()
        };
        let keystore = KeystoreService::new()
            .encrypt_secret(b"secret", "pw", None, Some(params))
            .unwrap();
        assert_eq!(decrypt(&keystore, "pw").unwrap().expose(), b"secret");
    }

    #[test]
    fn unusable_key_length_fails_closed_on_decrypt() {
        let mut keystore = seal(b"secret", "pw");
        keystore.crypto.kdfparams.dklen = 24;
        assert!(matches!(
            decrypt(&keystore, "pw"),
            Err(KeystoreError::Authentication)
        ));
    }

    #[test]
    fn change_password_reseals() {
        let service = KeystoreService::new();
        let keystore = service
            .encrypt_secret(b"secret", "old", Some("memo"), Some(light_params()))
            .unwrap();

        let rekeyed = service.change_password(&keystore, "old", "new").unwrap();

        assert_eq!(rekeyed.memo.as_deref(), Some("memo"));
        assert_eq!(rekeyed.crypto.kdfparams.n, keystore.crypto.kdfparams.n);
        assert_ne!(rekeyed.crypto.kdfparams.salt, keystore.crypto.kdfparams.salt);
        assert_ne!(rekeyed.crypto.cipherparams.nonce, keystore.crypto.cipherparams.nonce);
        assert_eq!(service.decrypt(&rekeyed, "new").unwrap().expose(), b"secret");
        assert!(service.decrypt(&rekeyed, "old").is_err());
    }

    #[test]
    fn change_password_with_wrong_old_password_fails() {
        let keystore = seal(b"secret", "old");
        assert!(matches!(
            KeystoreService::new().change_password(&keystore, "nope", "new"),
            Err(KeystoreError::Authentication)
        ));
    }

    #[test]
    fn parallel_calls_do_not_interfere() {
        let service = KeystoreService::new();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0u8..8)
                .map(|i| {
                    let service = &service;
                    scope.spawn(move || {
                        let password = format!("pw-{i}");
                        let keystore = service
                            .encrypt_secret(&[i; 32], &password, None, Some(light_params()))
                            .unwrap();
                        service.decrypt(&keystore, &password).unwrap()
                    })
                })
                .collect();

            for (i, handle) in handles.into_iter().enumerate() {
                assert_eq!(handle.join().unwrap().expose(), &[i as u8; 32]);
            }
        });
    }
}
