//! Network collaborators
//!
//! The mail layer only needs two things from the network below it:
//! content-addressed blob storage and topic-based publish/subscribe.
//! Both are expressed as async traits so tests and the loopback demo can
//! run entirely in memory ([`MemoryNetwork`]).

mod memory;

pub use memory::{MemoryNetwork, MemoryPeer};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Multihash code for Blake3
const BLAKE3_CODE: u8 = 0x1e;

/// Digest length carried in the address
const DIGEST_LEN: u8 = 32;

/// Network errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Content not found: {0}")]
    NotFound(ContentAddress),

    #[error("Invalid content address: {0}")]
    InvalidAddress(String),

    #[error("Invalid peer address: {0}")]
    InvalidPeer(String),

    #[error("Network unavailable: {0}")]
    Unavailable(String),
}

/// Hash-derived identifier of an immutable blob
///
/// Multihash layout: `[0x1e][0x20][blake3 digest: 32 bytes]`, displayed
/// in base58.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentAddress(Vec<u8>);

impl ContentAddress {
    /// Address of `content`
    pub fn for_content(content: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(2 + DIGEST_LEN as usize);
        bytes.push(BLAKE3_CODE);
        bytes.push(DIGEST_LEN);
        bytes.extend_from_slice(blake3::hash(content).as_bytes());
        ContentAddress(bytes)
    }

    /// Parse raw multihash bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetworkError> {
        match bytes {
            [BLAKE3_CODE, DIGEST_LEN, digest @ ..] if digest.len() == DIGEST_LEN as usize => {
                Ok(ContentAddress(bytes.to_vec()))
            }
            [code, ..] if *code != BLAKE3_CODE => Err(NetworkError::InvalidAddress(format!(
                "unsupported hash code 0x{:02x}",
                code
            ))),
            _ => Err(NetworkError::InvalidAddress(format!("bad length {}", bytes.len()))),
        }
    }

    pub fn from_base58(text: &str) -> Result<Self, NetworkError> {
        let bytes = bs58::decode(text)
            .into_vec()
            .map_err(|e| NetworkError::InvalidAddress(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self)
    }
}

/// Address of the peer a pub/sub message came from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        PeerAddress(address.into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetworkError> {
        String::from_utf8(bytes.to_vec())
            .map(PeerAddress)
            .map_err(|e| NetworkError::InvalidPeer(e.to_string()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One message delivered on a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PubSubMessage {
    pub payload: Vec<u8>,
    pub topics: Vec<String>,
    pub origin: PeerAddress,
    pub sequence: u64,
}

/// Inbound stream of a subscription; ends when the topic closes
pub type Subscription = mpsc::Receiver<PubSubMessage>;

/// Content-addressed blob storage
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store a blob and return its address
    async fn store(&self, content: Vec<u8>) -> Result<ContentAddress, NetworkError>;

    /// Fetch the blob stored under `address`
    async fn fetch(&self, address: &ContentAddress) -> Result<Vec<u8>, NetworkError>;
}

/// Topic-based publish/subscribe
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), NetworkError>;

    /// Subscribe to a topic
    ///
    /// Returns a channel receiver for incoming messages. The receiver
    /// yields `None` once the topic is closed.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, NetworkError>;
}
