//! Envelope codec
//!
//! Turns plaintext into an armored, multi-recipient encrypted and signed
//! message body and back, and defines the persisted envelope record.

mod armor;
mod cipher;
mod codec;
mod message;
pub(crate) mod wire;

pub use cipher::{decline_prompt, Keyring, LockedKey, PassphrasePrompt};
pub use codec::{decode, encode};
pub use message::{Envelope, Message};

use crate::identity::IdentityError;
use thiserror::Error;

/// Armor label that marks a protocol message
pub const MESSAGE_LABEL: &str = "9c9ek45n65o2radWERjoi";

/// Envelope errors
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Data not encrypted as a message (armor label {0:?})")]
    NotProtocolMessage(String),

    #[error("Armor error: {0}")]
    Armor(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Message is not addressed to any key in the keyring")]
    NotAddressedToUs,

    #[error("A passphrase is required to unlock the decryption key")]
    PassphraseRequired,

    #[error("Message is not signed")]
    Unsigned,

    #[error("Invalid signature")]
    BadSignature,

    #[error("Already decrypted message")]
    AlreadyDecrypted,

    #[error("Every recipient must be resolved")]
    MissingRecipient,

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Identity(#[from] IdentityError),
}
