//! ipmail: encrypted peer-to-peer mail over content-addressed storage
//!
//! Messages are encrypted, stored as blobs, and announced on a pub/sub
//! topic by content address only. Receivers fetch, decrypt and file them
//! under Sent, Inbox or Requests depending on who signed them.
//!
//! - [`identity`]: identities, self identities and contacts
//! - [`envelope`]: the armored, encrypted and signed message format
//! - [`store`]: thread-safe persisted message lists
//! - [`dispatcher`]: announcement in, message filed
//! - [`publisher`]: message out

pub mod announcement;
pub mod config;
pub mod dispatcher;
pub(crate) mod encoding;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod logging;
pub mod mailbox;
pub mod metrics;
pub mod network;
pub mod publisher;
pub mod store;

pub use config::Config;
pub use dispatcher::{classify, DispatchMode, DispatchOutcome, Dispatcher, DiscardReason, SharedContacts};
pub use envelope::{Envelope, EnvelopeError, Keyring, LockedKey, Message};
pub use error::{Error, Result};
pub use identity::{ContactDirectory, Identity, IdentityDirectory, IdentitySource, SelfIdentities, UserId};
pub use logging::{init_logging, LogLevel};
pub use mailbox::{Folder, MailboxPaths, Mailboxes};
pub use network::{ContentAddress, ContentStore, MemoryNetwork, PeerAddress, PubSub, PubSubMessage};
pub use publisher::Publisher;
pub use store::MessageStore;
