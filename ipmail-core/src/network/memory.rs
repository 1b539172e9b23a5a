//! In-memory network
//!
//! A [`MemoryNetwork`] is a shared hub; each [`MemoryPeer`] is one node's
//! view of it with its own origin address. Published messages reach every
//! subscriber of the topic, the publisher included, the same way a
//! pub/sub mesh echoes a node's own messages back to it.

use super::{ContentAddress, ContentStore, NetworkError, PeerAddress, PubSub, PubSubMessage, Subscription};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock as StdRwLock};
use tokio::sync::{mpsc, RwLock};

/// Default per-subscription channel capacity
const DEFAULT_BUFFER: usize = 256;

struct Hub {
    blobs: StdRwLock<HashMap<ContentAddress, Vec<u8>>>,
    /// Subscriptions: topic -> channel senders
    subscriptions: RwLock<HashMap<String, Vec<mpsc::Sender<PubSubMessage>>>>,
    sequence: AtomicU64,
    fetches: AtomicUsize,
    buffer: usize,
}

/// Shared in-memory storage and pub/sub hub
#[derive(Clone)]
pub struct MemoryNetwork {
    hub: Arc<Hub>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_BUFFER)
    }

    /// Hub whose subscriptions hold at most `buffer` undelivered messages
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            hub: Arc::new(Hub {
                blobs: StdRwLock::new(HashMap::new()),
                subscriptions: RwLock::new(HashMap::new()),
                sequence: AtomicU64::new(0),
                fetches: AtomicUsize::new(0),
                buffer: buffer.max(1),
            }),
        }
    }

    /// A node attached to this hub
    pub fn peer(&self, address: impl Into<String>) -> MemoryPeer {
        MemoryPeer { hub: self.hub.clone(), address: PeerAddress::new(address) }
    }

    /// Number of fetch calls served so far, successful or not
    pub fn fetch_count(&self) -> usize {
        self.hub.fetches.load(Ordering::SeqCst)
    }

    /// Drop every subscription to `topic`, ending their streams
    pub async fn close_topic(&self, topic: &str) {
        self.hub.subscriptions.write().await.remove(topic);
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

/// One node's handle onto a [`MemoryNetwork`]
#[derive(Clone)]
pub struct MemoryPeer {
    hub: Arc<Hub>,
    address: PeerAddress,
}

impl MemoryPeer {
    pub fn address(&self) -> &PeerAddress {
        &self.address
    }
}

#[async_trait]
impl ContentStore for MemoryPeer {
    async fn store(&self, content: Vec<u8>) -> Result<ContentAddress, NetworkError> {
        let address = ContentAddress::for_content(&content);
        let mut blobs = self.hub.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(address.clone(), content);
        Ok(address)
    }

    async fn fetch(&self, address: &ContentAddress) -> Result<Vec<u8>, NetworkError> {
        self.hub.fetches.fetch_add(1, Ordering::SeqCst);
        let blobs = self.hub.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs.get(address).cloned().ok_or_else(|| NetworkError::NotFound(address.clone()))
    }
}

#[async_trait]
impl PubSub for MemoryPeer {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), NetworkError> {
        let message = PubSubMessage {
            payload,
            topics: vec![topic.to_string()],
            origin: self.address.clone(),
            sequence: self.hub.sequence.fetch_add(1, Ordering::SeqCst),
        };

        let subscriptions = self.hub.subscriptions.read().await;
        if let Some(senders) = subscriptions.get(topic) {
            for sender in senders {
                // Drop if receiver is slow
                let _ = sender.try_send(message.clone());
            }
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, NetworkError> {
        let (tx, rx) = mpsc::channel(self.hub.buffer);
        let mut subscriptions = self.hub.subscriptions.write().await;
        subscriptions.entry(topic.to_string()).or_default().push(tx);
        Ok(rx)
    }
}
