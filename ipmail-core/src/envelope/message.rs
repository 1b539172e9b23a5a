//! Envelopes and decoded messages

use super::cipher::{Keyring, PassphrasePrompt};
use super::{codec, wire, EnvelopeError};
use crate::identity::Identity;
use crate::network::PeerAddress;
use std::borrow::Cow;
use std::fmt;
use std::io::{self, Write};

/// Encrypted message bytes as received, not yet decoded
///
/// Decoding succeeds at most once per envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    encrypted: Vec<u8>,
    origin: PeerAddress,
    id: u64,
    decoded: bool,
}

impl Envelope {
    pub fn new(encrypted: Vec<u8>, origin: PeerAddress, id: u64) -> Self {
        Self { encrypted, origin, id, decoded: false }
    }

    pub fn encrypted(&self) -> &[u8] {
        &self.encrypted
    }

    pub fn origin(&self) -> &PeerAddress {
        &self.origin
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded
    }

    /// Decrypt into a [`Message`]; a second call fails with
    /// [`EnvelopeError::AlreadyDecrypted`]
    pub fn decode(&mut self, keyring: &Keyring<'_>, prompt: &PassphrasePrompt<'_>) -> Result<Message, EnvelopeError> {
        if self.decoded {
            return Err(EnvelopeError::AlreadyDecrypted);
        }
        let (payload, sender) = codec::decode(&self.encrypted, keyring, prompt)?;
        self.decoded = true;
        Ok(Message {
            id: self.id,
            origin: self.origin.clone(),
            encrypted: self.encrypted.clone(),
            payload,
            sender,
        })
    }
}

/// A decoded message with its verified sender
#[derive(Debug, Clone)]
pub struct Message {
    id: u64,
    origin: PeerAddress,
    encrypted: Vec<u8>,
    payload: Vec<u8>,
    sender: Identity,
}

impl Message {
    /// Decode `encrypted` straight into a message
    pub fn open(
        encrypted: Vec<u8>,
        origin: PeerAddress,
        id: u64,
        keyring: &Keyring<'_>,
        prompt: &PassphrasePrompt<'_>,
    ) -> Result<Self, EnvelopeError> {
        Envelope::new(encrypted, origin, id).decode(keyring, prompt)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin(&self) -> &PeerAddress {
        &self.origin
    }

    /// Raw encrypted bytes, kept for persistence
    pub fn encrypted(&self) -> &[u8] {
        &self.encrypted
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn sender(&self) -> &Identity {
        &self.sender
    }

    pub fn sender_name(&self) -> &str {
        self.sender.name()
    }

    pub fn sender_email(&self) -> &str {
        self.sender.email()
    }

    pub fn is_from(&self, identity: &Identity) -> bool {
        self.sender == *identity
    }

    /// Write this message as a persisted envelope record
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        wire::write_record(writer, &self.encrypted, &self.origin, self.id)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID: {} Name: {}", self.id, self.sender_name())
    }
}
