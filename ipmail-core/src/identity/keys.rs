//! Key material behind an identity
//!
//! Every identity carries an Ed25519 key for signing and an X25519 key for
//! receiving encrypted messages. Secret halves can be sealed under a
//! passphrase:
//!
//! ```text
//! [Salt: 16 bytes][Nonce: 12 bytes][AES-256-GCM(secret keys) + tag]
//! ```
//!
//! The sealing key is derived from the passphrase with Argon2id.

use super::IdentityError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use ed25519_dalek::SigningKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Length of a key id in bytes
pub const KEY_ID_LEN: usize = 8;

/// Salt length for Argon2 KDF (16 bytes = 128 bits)
const SALT_LEN: usize = 16;

/// Nonce length for AES-GCM (12 bytes = 96 bits)
const NONCE_LEN: usize = 12;

/// Short identifier of an encryption key, used to tag recipient slots
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyId([u8; KEY_ID_LEN]);

impl KeyId {
    /// Derive the key id of an X25519 public key (truncated Blake3)
    pub fn of(encryption_key: &[u8; 32]) -> Self {
        let hash = blake3::hash(encryption_key);
        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&hash.as_bytes()[..KEY_ID_LEN]);
        KeyId(id)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_ID_LEN] {
        &self.0
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode_upper(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self)
    }
}

/// Public half of an identity's key material (the primary key)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKeys {
    /// Ed25519 verifying key
    pub signing: [u8; 32],
    /// X25519 public key
    pub encryption: [u8; 32],
}

impl PublicKeys {
    pub fn key_id(&self) -> KeyId {
        KeyId::of(&self.encryption)
    }

    /// Serialized form used when comparing primary keys
    pub fn to_bytes(&self) -> Result<Vec<u8>, IdentityError> {
        crate::encoding::serialize(self).map_err(|e| IdentityError::Serialization(e.to_string()))
    }

    pub(crate) fn encryption_key(&self) -> X25519PublicKey {
        X25519PublicKey::from(self.encryption)
    }
}

impl fmt::Debug for PublicKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKeys")
            .field("signing", &hex::encode(self.signing))
            .field("encryption", &hex::encode(self.encryption))
            .finish()
    }
}

/// Secret half of an identity's key material
/// Automatically zeroized on drop
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct SecretKeys {
    signing: [u8; 32],
    encryption: [u8; 32],
}

impl SecretKeys {
    /// Generate fresh signing and encryption keys
    pub(crate) fn generate() -> (Self, PublicKeys) {
        let mut rng = rand::rng();
        let mut secret = SecretKeys { signing: [0u8; 32], encryption: [0u8; 32] };
        rng.fill_bytes(&mut secret.signing);
        rng.fill_bytes(&mut secret.encryption);
        let public = secret.public_keys();
        (secret, public)
    }

    pub(crate) fn public_keys(&self) -> PublicKeys {
        let signing = SigningKey::from_bytes(&self.signing).verifying_key().to_bytes();
        let encryption = X25519PublicKey::from(&self.static_secret()).to_bytes();
        PublicKeys { signing, encryption }
    }

    pub(crate) fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.signing)
    }

    pub(crate) fn static_secret(&self) -> StaticSecret {
        StaticSecret::from(self.encryption)
    }
}

impl fmt::Debug for SecretKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKeys(<redacted>)")
    }
}

/// Secret keys sealed under a passphrase
#[derive(Clone, Serialize, Deserialize)]
pub(crate) struct LockedSecret {
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
    ciphertext: Vec<u8>,
}

impl LockedSecret {
    pub(crate) fn seal(secret: &SecretKeys, passphrase: &[u8]) -> Result<Self, IdentityError> {
        let mut rng = rand::rng();
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let key = derive_key_from_passphrase(passphrase, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| IdentityError::Encryption(format!("Invalid key: {}", e)))?;

        let plaintext = Zeroizing::new(
            crate::encoding::serialize(secret)
                .map_err(|e| IdentityError::Serialization(e.to_string()))?,
        );
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| IdentityError::Encryption(format!("Encryption failed: {}", e)))?;

        Ok(LockedSecret { salt, nonce, ciphertext })
    }

    pub(crate) fn open(&self, passphrase: &[u8]) -> Result<SecretKeys, IdentityError> {
        let key = derive_key_from_passphrase(passphrase, &self.salt)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_slice())
            .map_err(|e| IdentityError::Encryption(format!("Invalid key: {}", e)))?;

        // AEAD tag mismatch = wrong passphrase or corrupted
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
                .map_err(|_| IdentityError::InvalidPassphrase)?,
        );
        crate::encoding::deserialize(&plaintext)
            .map_err(|e| IdentityError::Serialization(e.to_string()))
    }
}

/// Secret key material as held by an identity
#[derive(Clone, Serialize, Deserialize)]
pub(crate) enum SecretMaterial {
    Plain(SecretKeys),
    Locked(LockedSecret),
}

fn derive_key_from_passphrase(
    passphrase: &[u8],
    salt: &[u8],
) -> Result<Zeroizing<[u8; 32]>, IdentityError> {
    let params = Params::new(
        19 * 1024, // 19 MiB memory cost
        2,         // 2 iterations
        1,         // 1 lane
        Some(32),
    )
    .map_err(|e| IdentityError::Encryption(format!("Invalid Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, key.as_mut_slice())
        .map_err(|e| IdentityError::Encryption(format!("Key derivation failed: {}", e)))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_public_keys_match_secret() {
        let (secret, public) = SecretKeys::generate();
        assert_eq!(secret.public_keys(), public);
        assert_eq!(secret.signing_key().verifying_key().to_bytes(), public.signing);
    }

    #[test]
    fn test_key_id_is_stable() {
        let (_, public) = SecretKeys::generate();
        assert_eq!(public.key_id(), KeyId::of(&public.encryption));
        assert_eq!(public.key_id().to_string().len(), KEY_ID_LEN * 2);
    }

    #[test]
    fn test_seal_and_open() {
        let (secret, public) = SecretKeys::generate();
        let locked = LockedSecret::seal(&secret, b"correct horse").unwrap();

        let opened = locked.open(b"correct horse").unwrap();
        assert_eq!(opened.public_keys(), public);
    }

    #[test]
    fn test_open_with_wrong_passphrase() {
        let (secret, _) = SecretKeys::generate();
        let locked = LockedSecret::seal(&secret, b"correct horse").unwrap();

        assert!(matches!(
            locked.open(b"battery staple"),
            Err(IdentityError::InvalidPassphrase)
        ));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let (secret, _) = SecretKeys::generate();
        assert_eq!(format!("{:?}", secret), "SecretKeys(<redacted>)");
    }
}
