//! Announcement framing
//!
//! Only a content address travels over pub/sub, framed by fixed ASCII tags
//! so unrelated traffic on the same topic is cheap to reject:
//!
//! ```text
//! [PREFIX][content address bytes][POSTFIX]
//! ```

use crate::network::{ContentAddress, NetworkError, PubSubMessage};
use thiserror::Error;

/// Topic that carries mail announcements
pub const MAIL_TOPIC: &str = "Mail";

pub const PREFIX: &[u8] = b"2jf9viv549cjksdfjo932";
pub const POSTFIX: &[u8] = b"0anrnLKj34kvlPWnx1as";

#[derive(Debug, Error)]
pub enum AnnouncementError {
    #[error("Payload is not framed as an announcement")]
    NotFramed,

    #[error("Invalid content address: {0}")]
    InvalidAddress(#[from] NetworkError),
}

/// Frame a content address for publishing
pub fn encode(address: &ContentAddress) -> Vec<u8> {
    let mut payload = Vec::with_capacity(PREFIX.len() + address.as_bytes().len() + POSTFIX.len());
    payload.extend_from_slice(PREFIX);
    payload.extend_from_slice(address.as_bytes());
    payload.extend_from_slice(POSTFIX);
    payload
}

/// Whether `payload` carries both framing tags
pub fn is_framed(payload: &[u8]) -> bool {
    payload.len() >= PREFIX.len() + POSTFIX.len() && payload.starts_with(PREFIX) && payload.ends_with(POSTFIX)
}

/// Strip the framing and parse the content address
pub fn decode(payload: &[u8]) -> Result<ContentAddress, AnnouncementError> {
    if !is_framed(payload) {
        return Err(AnnouncementError::NotFramed);
    }
    let inner = &payload[PREFIX.len()..payload.len() - POSTFIX.len()];
    Ok(ContentAddress::from_bytes(inner)?)
}

/// Whether a pub/sub message was delivered on `topic`
pub fn is_on_topic(message: &PubSubMessage, topic: &str) -> bool {
    message.topics.iter().any(|t| t == topic)
}
