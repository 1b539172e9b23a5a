//! The local user's own identities
//!
//! Every entry holds secret keys. Exactly one entry is the default: it signs
//! outgoing mail and is always added to the recipient set.

use super::file::{read_entries, write_entries, SELF_MAGIC};
use super::{Identity, IdentityDirectory, IdentityError};
use std::ops::Deref;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SelfIdentities {
    directory: IdentityDirectory,
    default_index: usize,
}

impl SelfIdentities {
    /// Wrap an identity with secret keys as the default self identity
    pub fn new(default: Identity) -> Result<Self, IdentityError> {
        if !default.has_secret_keys() {
            return Err(IdentityError::MissingSecret);
        }
        let mut directory = IdentityDirectory::new();
        directory.add(default);
        Ok(SelfIdentities { directory, default_index: 0 })
    }

    /// Generate a fresh default identity
    pub fn generate(
        name: impl Into<String>,
        comment: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        Self::new(Identity::generate(name, comment, email)?)
    }

    /// Add another own identity (must carry secret keys)
    pub fn add(&mut self, identity: Identity) -> Result<bool, IdentityError> {
        if !identity.has_secret_keys() {
            return Err(IdentityError::MissingSecret);
        }
        Ok(self.directory.add(identity))
    }

    pub fn default_identity(&self) -> &Identity {
        &self.directory.as_slice()[self.default_index]
    }

    /// Make an already present identity the default
    pub fn set_default(&mut self, identity: &Identity) -> Result<(), IdentityError> {
        let index = self
            .directory
            .iter()
            .position(|entry| entry == identity)
            .ok_or_else(|| IdentityError::NotFound(identity.to_string()))?;
        self.default_index = index;
        Ok(())
    }

    /// Unlock every sealed identity that opens with `passphrase`.
    /// Returns how many were unlocked.
    pub fn unlock_all(&mut self, passphrase: &[u8]) -> usize {
        let mut unlocked = Vec::with_capacity(self.directory.len());
        let mut count = 0;
        for identity in self.directory.iter() {
            let mut identity = identity.clone();
            if identity.is_locked() && identity.unlock(passphrase).is_ok() {
                count += 1;
            }
            unlocked.push(identity);
        }
        self.directory = unlocked.into_iter().collect();
        count
    }

    /// Write every identity with its secret keys, default first
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IdentityError> {
        let default = self.default_identity();
        let mut entries = vec![default.to_secret_bytes()?];
        for identity in self.directory.iter().filter(|i| *i != default) {
            entries.push(identity.to_secret_bytes()?);
        }
        write_entries(path.as_ref(), SELF_MAGIC, &entries)?;
        debug!(path = %path.as_ref().display(), count = entries.len(), "Saved self identities");
        Ok(())
    }

    /// Load identities saved by [`SelfIdentities::save`]; the first is the default
    pub fn load(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let entries = read_entries(path.as_ref(), SELF_MAGIC)?;
        let mut entries = entries.iter();
        let first = entries.next().ok_or(IdentityError::Empty)?;
        let mut selves = SelfIdentities::new(Identity::from_secret_bytes(first)?)?;
        for entry in entries {
            selves.add(Identity::from_secret_bytes(entry)?)?;
        }
        Ok(selves)
    }
}

impl Deref for SelfIdentities {
    type Target = IdentityDirectory;

    fn deref(&self) -> &Self::Target {
        &self.directory
    }
}
