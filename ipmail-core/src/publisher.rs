//! Publisher: encrypt, store, announce
//!
//! The sender is always added to the recipients. Their own dispatcher then
//! decodes the echoed announcement and files the message under Sent.

use crate::announcement;
use crate::envelope::{self, EnvelopeError};
use crate::identity::{Identity, IdentityError};
use crate::metrics::{record_counter, PUBLISH_SENT};
use crate::network::{ContentAddress, ContentStore, NetworkError, PubSub};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Recipient {0} could not be resolved")]
    UnresolvedRecipient(usize),

    #[error("Encoding failed: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

pub struct Publisher {
    storage: Arc<dyn ContentStore>,
    pubsub: Arc<dyn PubSub>,
    topic: String,
}

impl Publisher {
    pub fn new(storage: Arc<dyn ContentStore>, pubsub: Arc<dyn PubSub>) -> Self {
        Self { storage, pubsub, topic: announcement::MAIL_TOPIC.to_string() }
    }

    /// Announce on `topic` instead of the mail topic
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Encrypt `plaintext` to `recipients` and `from`, store it and announce
    /// its address. `from` signs the message when `sign` is set.
    ///
    /// Fails before anything is stored if any recipient is `None`.
    pub async fn send(
        &self,
        plaintext: &[u8],
        sign: bool,
        from: &Identity,
        recipients: &[Option<&Identity>],
    ) -> Result<ContentAddress, PublishError> {
        if let Some(index) = recipients.iter().position(Option::is_none) {
            return Err(PublishError::UnresolvedRecipient(index));
        }

        let mut to: Vec<Option<&Identity>> = recipients.to_vec();
        to.push(Some(from));
        let armored = envelope::encode(plaintext, &to, sign.then_some(from))?;

        let address = self.storage.store(armored).await?;
        debug!(%address, "Stored message");
        self.pubsub.publish(&self.topic, announcement::encode(&address)).await?;

        record_counter(PUBLISH_SENT, 1);
        info!(%address, recipients = recipients.len(), signed = sign, "Message sent");
        Ok(address)
    }

    /// Store the public form of `identity` so others can import it by address
    pub async fn share_identity(&self, identity: &Identity) -> Result<ContentAddress, PublishError> {
        let address = self.storage.store(identity.canonical_bytes()?).await?;
        info!(%address, identity = %identity, "Shared identity");
        Ok(address)
    }

    /// Fetch an identity shared with [`Publisher::share_identity`]
    pub async fn fetch_identity(&self, address: &ContentAddress) -> Result<Identity, PublishError> {
        let bytes = self.storage.fetch(address).await?;
        Ok(Identity::from_canonical_bytes(&bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{decline_prompt, Keyring, Message};
    use crate::identity::IdentityDirectory;
    use crate::network::{MemoryNetwork, PeerAddress};

    fn publisher(network: &MemoryNetwork, name: &str) -> Publisher {
        let peer = Arc::new(network.peer(name));
        Publisher::new(peer.clone(), peer)
    }

    #[tokio::test]
    async fn test_send_stores_and_announces() {
        let network = MemoryNetwork::new();
        let alice = Identity::generate("Alice", "", "").unwrap();
        let bob = Identity::generate("Bob", "", "").unwrap();
        let mut bob_rx = network.peer("Bob").subscribe(announcement::MAIL_TOPIC).await.unwrap();

        let address = publisher(&network, "Alice").send(b"hi", true, &alice, &[Some(&bob)]).await.unwrap();

        let announced = bob_rx.recv().await.unwrap();
        assert_eq!(announcement::decode(&announced.payload).unwrap(), address);
        assert_eq!(announced.origin, PeerAddress::new("Alice"));
    }

    #[tokio::test]
    async fn test_sender_can_read_own_message() {
        let network = MemoryNetwork::new();
        let alice = Identity::generate("Alice", "", "").unwrap();
        let bob = Identity::generate("Bob", "", "").unwrap();
        let address = publisher(&network, "Alice").send(b"hello", true, &alice, &[Some(&bob)]).await.unwrap();

        let encrypted = network.peer("Alice").fetch(&address).await.unwrap();
        let selves: IdentityDirectory = vec![alice.clone()].into_iter().collect();
        let contacts = IdentityDirectory::new();
        let message =
            Message::open(encrypted, PeerAddress::new("Alice"), 0, &Keyring::new(&selves, &contacts), &decline_prompt)
                .unwrap();
        assert_eq!(message.payload(), b"hello");
        assert!(message.is_from(&alice));
    }

    #[tokio::test]
    async fn test_unresolved_recipient_publishes_nothing() {
        let network = MemoryNetwork::new();
        let alice = Identity::generate("Alice", "", "").unwrap();
        let mut rx = network.peer("Bob").subscribe(announcement::MAIL_TOPIC).await.unwrap();

        let result = publisher(&network, "Alice").send(b"hi", true, &alice, &[None]).await;
        assert!(matches!(result, Err(PublishError::UnresolvedRecipient(0))));

        network.close_topic(announcement::MAIL_TOPIC).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_share_and_fetch_identity() {
        let network = MemoryNetwork::new();
        let alice = Identity::generate("Alice", "", "alice@example.com").unwrap();

        let address = publisher(&network, "Alice").share_identity(&alice).await.unwrap();
        let fetched = publisher(&network, "Bob").fetch_identity(&address).await.unwrap();

        assert_eq!(fetched, alice);
        assert!(!fetched.has_secret_keys());
    }
}
