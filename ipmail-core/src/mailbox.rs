//! Sent, Inbox and Requests mailboxes
//!
//! Routing adds to the in-memory store first and then saves that store.
//! A failed save is logged and counted but never undoes the add: memory is
//! the source of truth and the file may lag behind it.

use crate::envelope::Message;
use crate::identity::{ContactDirectory, Identity, IdentityError, SelfIdentities};
use crate::metrics::{record_counter, STORE_SAVE_FAILED};
use crate::store::{MessageStore, StoreError};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Failed to load {folder}: {source}")]
    Load {
        folder: Folder,
        #[source]
        source: StoreError,
    },

    #[error("Failed to save {folder}: {source}")]
    Save {
        folder: Folder,
        #[source]
        source: StoreError,
    },

    #[error("No contact request with id {0}")]
    RequestNotFound(u64),

    #[error("Failed to save contacts: {0}")]
    Contacts(#[from] IdentityError),
}

/// Where a decoded message is filed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Folder {
    /// Our own messages, echoed back by the network
    Sent,
    /// Messages from known contacts
    Inbox,
    /// Messages from unknown senders
    Requests,
}

impl Folder {
    pub const ALL: [Folder; 3] = [Folder::Sent, Folder::Inbox, Folder::Requests];

    pub fn as_str(&self) -> &'static str {
        match self {
            Folder::Sent => "sent",
            Folder::Inbox => "inbox",
            Folder::Requests => "requests",
        }
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Folder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sent" => Ok(Folder::Sent),
            "inbox" | "messages" => Ok(Folder::Inbox),
            "requests" => Ok(Folder::Requests),
            _ => Err(format!("Unknown folder: {}", s)),
        }
    }
}

/// Files backing each mailbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxPaths {
    pub sent: PathBuf,
    pub inbox: PathBuf,
    pub requests: PathBuf,
}

impl MailboxPaths {
    pub fn get(&self, folder: Folder) -> &Path {
        match folder {
            Folder::Sent => &self.sent,
            Folder::Inbox => &self.inbox,
            Folder::Requests => &self.requests,
        }
    }
}

/// The three mailboxes of one user
#[derive(Debug, Default)]
pub struct Mailboxes {
    sent: MessageStore,
    inbox: MessageStore,
    requests: MessageStore,
    paths: Option<MailboxPaths>,
}

impl Mailboxes {
    /// Mailboxes that are never written to disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Empty mailboxes saved to `paths`
    pub fn with_paths(paths: MailboxPaths) -> Self {
        Self { paths: Some(paths), ..Self::default() }
    }

    /// Load each mailbox from `paths`. A missing file is an empty mailbox;
    /// any other failure fails the load.
    pub fn load(
        paths: MailboxPaths,
        selves: &SelfIdentities,
        contacts: &ContactDirectory,
    ) -> Result<Self, MailboxError> {
        let load = |folder: Folder| match MessageStore::load(paths.get(folder), selves, contacts) {
            Ok(store) => {
                debug!(%folder, count = store.len(), "Loaded mailbox");
                Ok(store)
            }
            Err(StoreError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(MessageStore::new()),
            Err(source) => Err(MailboxError::Load { folder, source }),
        };
        Ok(Self {
            sent: load(Folder::Sent)?,
            inbox: load(Folder::Inbox)?,
            requests: load(Folder::Requests)?,
            paths: Some(paths),
        })
    }

    pub fn store(&self, folder: Folder) -> &MessageStore {
        match folder {
            Folder::Sent => &self.sent,
            Folder::Inbox => &self.inbox,
            Folder::Requests => &self.requests,
        }
    }

    pub fn sent(&self) -> &MessageStore {
        &self.sent
    }

    pub fn inbox(&self) -> &MessageStore {
        &self.inbox
    }

    pub fn requests(&self) -> &MessageStore {
        &self.requests
    }

    pub fn paths(&self) -> Option<&MailboxPaths> {
        self.paths.as_ref()
    }

    /// File `message` into `folder` and save that folder.
    /// Returns whether the save succeeded; the message is kept either way.
    pub fn route(&self, folder: Folder, message: impl Into<Arc<Message>>) -> bool {
        let message = message.into();
        let id = message.id();
        self.store(folder).add(message);
        info!(%folder, id, "Routed message");

        match self.save(folder) {
            Ok(()) => true,
            Err(e) => {
                warn!(%folder, id, error = %e, "Mailbox could not be saved, keeping message in memory");
                record_counter(STORE_SAVE_FAILED, 1);
                false
            }
        }
    }

    /// Save one folder; a no-op for in-memory mailboxes
    pub fn save(&self, folder: Folder) -> Result<(), MailboxError> {
        match &self.paths {
            Some(paths) => self
                .store(folder)
                .save(paths.get(folder))
                .map_err(|source| MailboxError::Save { folder, source }),
            None => Ok(()),
        }
    }

    pub fn save_all(&self) -> Result<(), MailboxError> {
        Folder::ALL.iter().try_for_each(|folder| self.save(*folder))
    }

    /// Trust the sender of request `id`: add them to `contacts` (saving the
    /// directory to `contacts_path` if given) and move the message to the
    /// inbox. Returns the new contact.
    pub fn accept_request(
        &self,
        id: u64,
        contacts: &mut ContactDirectory,
        contacts_path: Option<&Path>,
    ) -> Result<Identity, MailboxError> {
        let message = self.requests.by_id(id).ok_or(MailboxError::RequestNotFound(id))?;
        let sender = message.sender().to_public();

        contacts.add(sender.clone());
        if let Some(path) = contacts_path {
            contacts.save(path)?;
        }

        self.requests.remove_by_id(id);
        self.inbox.add(message);
        self.save(Folder::Requests)?;
        self.save(Folder::Inbox)?;

        info!(id, contact = %sender, "Accepted contact request");
        Ok(sender)
    }

    /// Drop request `id`
    pub fn deny_request(&self, id: u64) -> Result<(), MailboxError> {
        self.requests.remove_by_id(id).ok_or(MailboxError::RequestNotFound(id))?;
        self.save(Folder::Requests)?;
        info!(id, "Denied contact request");
        Ok(())
    }
}
