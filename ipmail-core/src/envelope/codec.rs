//! Envelope codec: armored, encrypted, signed message bodies

use super::armor;
use super::cipher::{self, Keyring, PassphrasePrompt};
use super::{EnvelopeError, MESSAGE_LABEL};
use crate::identity::Identity;
use tracing::trace;

/// Encrypt `plaintext` to `recipients` and armor it under the message label.
///
/// Every recipient must be resolved: a `None` entry fails the encode.
pub fn encode(
    plaintext: &[u8],
    recipients: &[Option<&Identity>],
    signer: Option<&Identity>,
) -> Result<Vec<u8>, EnvelopeError> {
    let recipients: Vec<&Identity> =
        recipients.iter().copied().collect::<Option<_>>().ok_or(EnvelopeError::MissingRecipient)?;
    let body = cipher::seal(plaintext, &recipients, signer)?;
    trace!(recipients = recipients.len(), bytes = body.len(), "Sealed message body");
    Ok(armor::encode(MESSAGE_LABEL, &body))
}

/// Unarmor and decrypt a message, returning the plaintext and its signer.
///
/// `prompt` is called at most once, and only when a passphrase-protected key
/// in `keyring` is needed.
pub fn decode(
    armored: &[u8],
    keyring: &Keyring<'_>,
    prompt: &PassphrasePrompt<'_>,
) -> Result<(Vec<u8>, Identity), EnvelopeError> {
    let (label, body) = armor::decode(armored)?;
    if label != MESSAGE_LABEL {
        return Err(EnvelopeError::NotProtocolMessage(label));
    }
    cipher::open(&body, keyring, prompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::decline_prompt;
    use crate::identity::IdentityDirectory;

    #[test]
    fn test_encode_decode() {
        let alice = Identity::generate("Alice", "", "alice@example.com").unwrap();
        let bob = Identity::generate("Bob", "", "bob@example.com").unwrap();

        let armored = encode(b"hi", &[Some(&alice)], Some(&bob)).unwrap();
        assert!(String::from_utf8_lossy(&armored).starts_with("-----BEGIN 9c9ek45n65o2radWERjoi-----"));

        let selves: IdentityDirectory = vec![alice].into_iter().collect();
        let contacts: IdentityDirectory = vec![bob.to_public()].into_iter().collect();
        let (plaintext, sender) = decode(&armored, &Keyring::new(&selves, &contacts), &decline_prompt).unwrap();

        assert_eq!(plaintext, b"hi");
        assert_eq!(sender, bob);
    }

    #[test]
    fn test_unresolved_recipient_fails() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        assert!(matches!(
            encode(b"hi", &[Some(&alice), None], Some(&alice)),
            Err(EnvelopeError::MissingRecipient)
        ));
    }

    #[test]
    fn test_foreign_label_is_not_a_message() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let armored = armor::encode("PGP MESSAGE", b"whatever");

        let selves: IdentityDirectory = vec![alice].into_iter().collect();
        let contacts = IdentityDirectory::new();
        assert!(matches!(
            decode(&armored, &Keyring::new(&selves, &contacts), &decline_prompt),
            Err(EnvelopeError::NotProtocolMessage(label)) if label == "PGP MESSAGE"
        ));
    }

    #[test]
    fn test_self_keys_checked_before_contacts() {
        // Alice has herself as a contact too, decoding must still work
        let alice = Identity::generate("Alice", "", "").unwrap();
        let armored = encode(b"note to self", &[Some(&alice)], Some(&alice)).unwrap();

        let selves: IdentityDirectory = vec![alice.clone()].into_iter().collect();
        let contacts: IdentityDirectory = vec![alice.to_public()].into_iter().collect();
        let (_, sender) = decode(&armored, &Keyring::new(&selves, &contacts), &decline_prompt).unwrap();
        assert_eq!(sender, alice);
    }
}
