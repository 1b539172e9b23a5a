//! Crate-level error for front-ends that drive several subsystems

use crate::announcement::AnnouncementError;
use crate::config::ConfigError;
use crate::envelope::EnvelopeError;
use crate::identity::IdentityError;
use crate::logging::LoggingError;
use crate::mailbox::MailboxError;
use crate::network::NetworkError;
use crate::publisher::PublishError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Announcement(#[from] AnnouncementError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errors_convert() {
        fn fails() -> Result<()> {
            let inner: std::result::Result<(), IdentityError> = Err(IdentityError::NoUserId);
            inner?;
            Ok(())
        }
        let err = fails().unwrap_err();
        assert!(matches!(err, Error::Identity(IdentityError::NoUserId)));
        assert_eq!(err.to_string(), "Identity has no user id");
    }
}
