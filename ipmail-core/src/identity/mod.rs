//! Identity subsystem
//!
//! - [`Identity`]: user ids bound to an Ed25519 + X25519 key pair
//! - [`IdentityDirectory`]: ordered, duplicate-free identity collection
//! - [`SelfIdentities`]: own identities with a designated default
//! - [`ContactDirectory`]: other people's public identities
//! - [`IdentitySource`]: importing identities from files, text or storage

use thiserror::Error;

mod contacts;
mod directory;
mod entity;
mod file;
mod keys;
mod self_identity;
mod source;

pub use contacts::ContactDirectory;
pub use directory::IdentityDirectory;
pub use entity::{Identity, UserId};
pub use keys::{KeyId, PublicKeys, KEY_ID_LEN};
pub use self_identity::SelfIdentities;
pub use source::{export_base64, IdentitySource};

/// Identity errors
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Invalid passphrase")]
    InvalidPassphrase,

    #[error("Identity {0} is locked")]
    Locked(KeyId),

    #[error("Identity has no secret keys")]
    MissingSecret,

    #[error("Secret keys do not match the public keys")]
    KeyMismatch,

    #[error("Identity has no user id")]
    NoUserId,

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Identity not found: {0}")]
    NotFound(String),

    #[error("Identity file is empty")]
    Empty,

    #[error("Invalid identity source: {0}")]
    InvalidSource(String),
}
