//! Contact directory: other people's public identities, persisted to disk

use super::file::{read_entries, write_entries, CONTACTS_MAGIC};
use super::{Identity, IdentityDirectory, IdentityError};
use std::ops::Deref;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ContactDirectory {
    directory: IdentityDirectory,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_identities(identities: impl IntoIterator<Item = Identity>) -> Self {
        ContactDirectory { directory: identities.into_iter().map(|i| i.to_public()).collect() }
    }

    /// Add a contact. Only the public form is kept.
    pub fn add(&mut self, identity: Identity) -> bool {
        self.directory.add(identity.to_public())
    }

    /// Add every identity in order, skipping duplicates and `None` entries
    pub fn add_all<I>(&mut self, identities: I)
    where
        I: IntoIterator<Item = Option<Identity>>,
    {
        self.extend(identities.into_iter().flatten());
    }

    /// First contact whose name or email matches `query` exactly
    pub fn resolve(&self, query: &str) -> Option<&Identity> {
        self.directory.iter().find(|identity| {
            identity.user_ids().iter().any(|uid| uid.name == query || uid.email == query)
        })
    }

    /// Write every contact's public form, overwriting `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), IdentityError> {
        let entries = self
            .directory
            .iter()
            .map(Identity::canonical_bytes)
            .collect::<Result<Vec<_>, _>>()?;
        write_entries(path.as_ref(), CONTACTS_MAGIC, &entries)?;
        debug!(path = %path.as_ref().display(), count = entries.len(), "Saved contacts");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, IdentityError> {
        let entries = read_entries(path.as_ref(), CONTACTS_MAGIC)?;
        let mut contacts = ContactDirectory::new();
        for entry in entries {
            contacts.add(Identity::from_canonical_bytes(&entry)?);
        }
        Ok(contacts)
    }
}

impl Deref for ContactDirectory {
    type Target = IdentityDirectory;

    fn deref(&self) -> &Self::Target {
        &self.directory
    }
}

impl Extend<Identity> for ContactDirectory {
    fn extend<T: IntoIterator<Item = Identity>>(&mut self, iter: T) {
        for identity in iter {
            self.add(identity);
        }
    }
}
