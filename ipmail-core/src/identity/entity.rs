//! Identity: user-id records bound to a primary key pair
//!
//! Identities are compared by their canonical serialized form (user ids plus
//! public keys), never by address. Two copies of the same contact, one
//! loaded from disk and one embedded in a message, are equal.

use super::keys::{KeyId, LockedSecret, PublicKeys, SecretKeys, SecretMaterial};
use super::IdentityError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Characters that would make the `Name (Comment) <email>` form ambiguous
const RESERVED_CHARS: [char; 5] = ['(', ')', '<', '>', '\0'];

/// One user-id record: name, comment and email
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId {
    pub name: String,
    pub comment: String,
    pub email: String,
}

impl UserId {
    /// Create a user id, rejecting fields that contain `(`, `)`, `<`, `>` or NUL
    pub fn new(
        name: impl Into<String>,
        comment: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let user_id = UserId { name: name.into(), comment: comment.into(), email: email.into() };
        for (field, value) in
            [("name", &user_id.name), ("comment", &user_id.comment), ("email", &user_id.email)]
        {
            if let Some(c) = value.chars().find(|c| RESERVED_CHARS.contains(c)) {
                return Err(IdentityError::InvalidUserId(format!(
                    "{} can not contain {:?}",
                    field, c
                )));
            }
        }
        Ok(user_id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.comment.is_empty() {
            write!(f, " ({})", self.comment)?;
        }
        if !self.email.is_empty() {
            write!(f, " <{}>", self.email)?;
        }
        Ok(())
    }
}

/// On-disk form of an identity including its secret keys
#[derive(Serialize, Deserialize)]
struct SecretForm {
    user_ids: Vec<UserId>,
    keys: PublicKeys,
    secret: Option<SecretMaterial>,
}

/// A cryptographic identity
#[derive(Clone)]
pub struct Identity {
    user_ids: Vec<UserId>,
    keys: PublicKeys,
    secret: Option<SecretMaterial>,
}

impl Identity {
    /// Generate a new identity with fresh keys and a single user id
    pub fn generate(
        name: impl Into<String>,
        comment: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let user_id = UserId::new(name, comment, email)?;
        let (secret, keys) = SecretKeys::generate();
        Ok(Identity { user_ids: vec![user_id], keys, secret: Some(SecretMaterial::Plain(secret)) })
    }

    /// Build a public-only identity from its parts
    pub fn from_public_parts(user_ids: Vec<UserId>, keys: PublicKeys) -> Result<Self, IdentityError> {
        if user_ids.is_empty() {
            return Err(IdentityError::NoUserId);
        }
        Ok(Identity { user_ids, keys, secret: None })
    }

    /// The primary user-id record (the first one)
    pub fn primary_user_id(&self) -> &UserId {
        &self.user_ids[0]
    }

    pub fn user_ids(&self) -> &[UserId] {
        &self.user_ids
    }

    pub fn name(&self) -> &str {
        &self.primary_user_id().name
    }

    pub fn email(&self) -> &str {
        &self.primary_user_id().email
    }

    pub fn public_keys(&self) -> &PublicKeys {
        &self.keys
    }

    pub fn key_id(&self) -> KeyId {
        self.keys.key_id()
    }

    /// Whether this identity holds secret keys (locked or not)
    pub fn has_secret_keys(&self) -> bool {
        self.secret.is_some()
    }

    /// Whether the secret keys are sealed under a passphrase
    pub fn is_locked(&self) -> bool {
        matches!(self.secret, Some(SecretMaterial::Locked(_)))
    }

    /// Copy of this identity without secret keys
    pub fn to_public(&self) -> Identity {
        Identity { user_ids: self.user_ids.clone(), keys: self.keys.clone(), secret: None }
    }

    /// Canonical serialized form: user ids and public keys, never secrets
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, IdentityError> {
        crate::encoding::serialize(&(&self.user_ids, &self.keys))
            .map_err(|e| IdentityError::Serialization(e.to_string()))
    }

    /// Parse the canonical form produced by [`Identity::canonical_bytes`]
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let (user_ids, keys): (Vec<UserId>, PublicKeys) = crate::encoding::deserialize(bytes)
            .map_err(|e| IdentityError::Serialization(e.to_string()))?;
        Self::from_public_parts(user_ids, keys)
    }

    /// Serialized form including secret keys (locked keys stay locked)
    pub fn to_secret_bytes(&self) -> Result<Vec<u8>, IdentityError> {
        let form = SecretForm {
            user_ids: self.user_ids.clone(),
            keys: self.keys.clone(),
            secret: self.secret.clone(),
        };
        crate::encoding::serialize(&form).map_err(|e| IdentityError::Serialization(e.to_string()))
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, IdentityError> {
        let form: SecretForm = crate::encoding::deserialize(bytes)
            .map_err(|e| IdentityError::Serialization(e.to_string()))?;
        let mut identity = Self::from_public_parts(form.user_ids, form.keys)?;
        if let Some(SecretMaterial::Plain(secret)) = &form.secret {
            if secret.public_keys() != identity.keys {
                return Err(IdentityError::KeyMismatch);
            }
        }
        identity.secret = form.secret;
        Ok(identity)
    }

    /// Seal the secret keys under a passphrase
    pub fn lock(&mut self, passphrase: &[u8]) -> Result<(), IdentityError> {
        let locked = match &self.secret {
            Some(SecretMaterial::Plain(secret)) => LockedSecret::seal(secret, passphrase)?,
            Some(SecretMaterial::Locked(_)) => return Ok(()),
            None => return Err(IdentityError::MissingSecret),
        };
        self.secret = Some(SecretMaterial::Locked(locked));
        Ok(())
    }

    /// Open sealed secret keys with a passphrase
    pub fn unlock(&mut self, passphrase: &[u8]) -> Result<(), IdentityError> {
        let opened = match &self.secret {
            Some(SecretMaterial::Locked(locked)) => locked.open(passphrase)?,
            Some(SecretMaterial::Plain(_)) => return Ok(()),
            None => return Err(IdentityError::MissingSecret),
        };
        self.secret = Some(SecretMaterial::Plain(opened));
        Ok(())
    }

    /// Equality by canonical form
    pub fn same_as(&self, other: &Identity) -> bool {
        match (self.canonical_bytes(), other.canonical_bytes()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    /// Unlocked secret keys, or an error if absent or sealed
    pub(crate) fn secret_keys(&self) -> Result<&SecretKeys, IdentityError> {
        match &self.secret {
            Some(SecretMaterial::Plain(secret)) => Ok(secret),
            Some(SecretMaterial::Locked(_)) => Err(IdentityError::Locked(self.key_id())),
            None => Err(IdentityError::MissingSecret),
        }
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.primary_user_id(), f)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("user_id", &self.primary_user_id().to_string())
            .field("key_id", &self.key_id())
            .field(
                "secret",
                &match self.secret {
                    Some(SecretMaterial::Plain(_)) => "<redacted>",
                    Some(SecretMaterial::Locked(_)) => "<locked>",
                    None => "<none>",
                },
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_display() {
        let full = UserId::new("Alice", "work", "alice@example.com").unwrap();
        assert_eq!(full.to_string(), "Alice (work) <alice@example.com>");

        let bare = UserId::new("Bob", "", "").unwrap();
        assert_eq!(bare.to_string(), "Bob");
    }

    #[test]
    fn test_user_id_rejects_reserved_characters() {
        assert!(UserId::new("Al<ice", "", "").is_err());
        assert!(UserId::new("Alice", "(x)", "").is_err());
        assert!(UserId::new("Alice", "", "a>b").is_err());
    }

    #[test]
    fn test_generated_identity_has_secret() {
        let alice = Identity::generate("Alice", "", "alice@example.com").unwrap();
        assert!(alice.has_secret_keys());
        assert!(!alice.is_locked());
        assert_eq!(alice.name(), "Alice");
        assert_eq!(alice.email(), "alice@example.com");
    }

    #[test]
    fn test_equality_ignores_secret_keys() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let public = alice.to_public();

        assert!(!public.has_secret_keys());
        assert_eq!(alice, public);
    }

    #[test]
    fn test_same_name_different_keys_not_equal() {
        let a = Identity::generate("Alice", "", "").unwrap();
        let b = Identity::generate("Alice", "", "").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_roundtrip() {
        let alice = Identity::generate("Alice", "c", "alice@example.com").unwrap();
        let bytes = alice.canonical_bytes().unwrap();

        let parsed = Identity::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(parsed, alice);
        assert!(!parsed.has_secret_keys());
    }

    #[test]
    fn test_secret_form_keeps_keys() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let parsed = Identity::from_secret_bytes(&alice.to_secret_bytes().unwrap()).unwrap();

        assert_eq!(parsed, alice);
        assert!(parsed.secret_keys().is_ok());
    }

    #[test]
    fn test_lock_and_unlock() {
        let mut alice = Identity::generate("Alice", "", "").unwrap();
        alice.lock(b"hunter2").unwrap();

        assert!(alice.is_locked());
        assert!(matches!(alice.secret_keys(), Err(IdentityError::Locked(_))));
        assert!(alice.unlock(b"wrong").is_err());

        alice.unlock(b"hunter2").unwrap();
        assert!(alice.secret_keys().is_ok());
    }

    #[test]
    fn test_lock_public_identity_fails() {
        let mut public = Identity::generate("Alice", "", "").unwrap().to_public();
        assert!(matches!(public.lock(b"x"), Err(IdentityError::MissingSecret)));
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let debug = format!("{:?}", alice);
        assert!(debug.contains("<redacted>"));
    }
}
