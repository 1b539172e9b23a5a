//! Multi-recipient public-key encryption with signing
//!
//! ```text
//! EncryptedBody
//!   version
//!   ephemeral X25519 public key
//!   recipient slots: [key id][nonce][XChaCha20-Poly1305(content key)]
//!   nonce
//!   XChaCha20-Poly1305(content key, SignedPayload)
//! ```
//!
//! Each slot's wrapping key is HKDF-SHA256 over X25519(ephemeral, recipient).
//! The signed payload embeds the signer's public identity so messages from
//! senders outside the keyring still verify.

use super::EnvelopeError;
use crate::identity::{Identity, IdentityDirectory, IdentityError, KeyId, UserId};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use ed25519_dalek::{Signature, Signer, VerifyingKey};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

const VERSION: u8 = 1;
const WRAP_CONTEXT: &[u8] = b"ipmail:content-key:v1";
const SIGNATURE_CONTEXT: &[u8] = b"ipmail:signed-payload:v1";

#[derive(Serialize, Deserialize)]
struct RecipientSlot {
    key_id: KeyId,
    nonce: [u8; 24],
    wrapped_key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct EncryptedBody {
    version: u8,
    ephemeral_public: [u8; 32],
    recipients: Vec<RecipientSlot>,
    nonce: [u8; 24],
    ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SignerBlock {
    /// Canonical bytes of the signer's public identity
    identity: Vec<u8>,
    signature: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SignedPayload {
    plaintext: Vec<u8>,
    signer: Option<SignerBlock>,
}

/// Identities whose secret keys may be used for decryption
///
/// Self identities are tried before contacts.
#[derive(Clone, Copy)]
pub struct Keyring<'a> {
    selves: &'a IdentityDirectory,
    contacts: &'a IdentityDirectory,
}

impl<'a> Keyring<'a> {
    pub fn new(selves: &'a IdentityDirectory, contacts: &'a IdentityDirectory) -> Self {
        Self { selves, contacts }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a Identity> {
        self.selves.iter().chain(self.contacts.iter())
    }

    /// The keyring entry equal to `identity`, if any
    pub fn find(&self, identity: &Identity) -> Option<&'a Identity> {
        self.selves.find(identity).or_else(|| self.contacts.find(identity))
    }
}

/// A passphrase-protected key that could open a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedKey {
    pub key_id: KeyId,
    pub user_id: UserId,
}

/// Supplies a passphrase for the given locked keys, or `None` to give up.
/// Called synchronously, at most once per decode.
/// The callback may borrow from the caller for `'a`.
pub type PassphrasePrompt<'a> = dyn Fn(&[LockedKey]) -> Option<Vec<u8>> + Send + Sync + 'a;

/// Prompt that never supplies a passphrase
pub fn decline_prompt(_: &[LockedKey]) -> Option<Vec<u8>> {
    None
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    rand::rng().fill_bytes(&mut bytes);
    bytes
}

fn derive_wrapping_key(
    shared_secret: &[u8; 32],
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>, EnvelopeError> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public);
    salt[32..].copy_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf.expand(WRAP_CONTEXT, key.as_mut_slice())
        .map_err(|_| EnvelopeError::Crypto("key derivation failed".to_string()))?;
    Ok(key)
}

fn signature_message(identity: &[u8], plaintext: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(SIGNATURE_CONTEXT.len() + 16 + identity.len() + plaintext.len());
    message.extend_from_slice(SIGNATURE_CONTEXT);
    message.extend_from_slice(&(identity.len() as u64).to_be_bytes());
    message.extend_from_slice(identity);
    message.extend_from_slice(&(plaintext.len() as u64).to_be_bytes());
    message.extend_from_slice(plaintext);
    message
}

fn aead(key: &[u8; 32]) -> Result<XChaCha20Poly1305, EnvelopeError> {
    XChaCha20Poly1305::new_from_slice(key).map_err(|e| EnvelopeError::Crypto(e.to_string()))
}

/// Encrypt `plaintext` to every recipient, signing with `signer` if given
pub(crate) fn seal(
    plaintext: &[u8],
    recipients: &[&Identity],
    signer: Option<&Identity>,
) -> Result<Vec<u8>, EnvelopeError> {
    if recipients.is_empty() {
        return Err(EnvelopeError::MissingRecipient);
    }

    let signer = signer
        .map(|signer| -> Result<SignerBlock, EnvelopeError> {
            let signing_key = signer.secret_keys()?.signing_key();
            let identity = signer.canonical_bytes()?;
            let signature = signing_key.sign(&signature_message(&identity, plaintext));
            Ok(SignerBlock { identity, signature: signature.to_bytes().to_vec() })
        })
        .transpose()?;
    let payload = Zeroizing::new(
        crate::encoding::serialize(&SignedPayload { plaintext: plaintext.to_vec(), signer })
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?,
    );

    let content_key = Zeroizing::new(random_bytes::<32>());
    let nonce = random_bytes::<24>();
    let ciphertext = aead(&content_key)?
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: payload.as_slice(), aad: &[VERSION] })
        .map_err(|_| EnvelopeError::Crypto("encryption failed".to_string()))?;

    let ephemeral = StaticSecret::from(random_bytes::<32>());
    let ephemeral_public = X25519PublicKey::from(&ephemeral).to_bytes();

    let mut slots: Vec<RecipientSlot> = Vec::with_capacity(recipients.len());
    for recipient in recipients {
        let key_id = recipient.key_id();
        if slots.iter().any(|slot| slot.key_id == key_id) {
            continue;
        }
        let recipient_public = recipient.public_keys().encryption_key();
        let shared = ephemeral.diffie_hellman(&recipient_public);
        if !shared.was_contributory() {
            return Err(EnvelopeError::Crypto(format!("weak public key for {}", recipient)));
        }
        let wrapping_key =
            derive_wrapping_key(shared.as_bytes(), &ephemeral_public, recipient_public.as_bytes())?;

        let slot_nonce = random_bytes::<24>();
        let wrapped_key = aead(&wrapping_key)?
            .encrypt(
                XNonce::from_slice(&slot_nonce),
                Payload { msg: content_key.as_slice(), aad: key_id.as_bytes() },
            )
            .map_err(|_| EnvelopeError::Crypto("key wrapping failed".to_string()))?;
        slots.push(RecipientSlot { key_id, nonce: slot_nonce, wrapped_key });
    }

    crate::encoding::serialize(&EncryptedBody {
        version: VERSION,
        ephemeral_public,
        recipients: slots,
        nonce,
        ciphertext,
    })
    .map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

/// Decrypt a body produced by [`seal`], returning the plaintext and verified signer
pub(crate) fn open(
    body: &[u8],
    keyring: &Keyring<'_>,
    prompt: &PassphrasePrompt<'_>,
) -> Result<(Vec<u8>, Identity), EnvelopeError> {
    let body: EncryptedBody =
        crate::encoding::deserialize(body).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
    if body.version != VERSION {
        return Err(EnvelopeError::Malformed(format!("unsupported version {}", body.version)));
    }

    let content_key = unwrap_content_key(&body, keyring, prompt)?;
    let payload = Zeroizing::new(
        aead(&content_key)?
            .decrypt(
                XNonce::from_slice(&body.nonce),
                Payload { msg: body.ciphertext.as_slice(), aad: &[body.version] },
            )
            .map_err(|_| EnvelopeError::Crypto("message authentication failed".to_string()))?,
    );
    let payload: SignedPayload =
        crate::encoding::deserialize(&payload).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let signer = payload.signer.ok_or(EnvelopeError::Unsigned)?;
    let embedded = Identity::from_canonical_bytes(&signer.identity)?;
    let verifying_key = VerifyingKey::from_bytes(&embedded.public_keys().signing)
        .map_err(|_| EnvelopeError::BadSignature)?;
    let signature = Signature::from_slice(&signer.signature).map_err(|_| EnvelopeError::BadSignature)?;
    verifying_key
        .verify_strict(&signature_message(&signer.identity, &payload.plaintext), &signature)
        .map_err(|_| EnvelopeError::BadSignature)?;

    let sender = keyring.find(&embedded).map(Identity::to_public).unwrap_or(embedded);
    Ok((payload.plaintext, sender))
}

fn unwrap_content_key(
    body: &EncryptedBody,
    keyring: &Keyring<'_>,
    prompt: &PassphrasePrompt<'_>,
) -> Result<Zeroizing<[u8; 32]>, EnvelopeError> {
    let slot_for = |identity: &Identity| {
        let key_id = identity.key_id();
        body.recipients.iter().find(|slot| slot.key_id == key_id)
    };

    let mut locked = Vec::new();
    for identity in keyring.iter() {
        let Some(slot) = slot_for(identity) else { continue };
        match identity.secret_keys() {
            Ok(_) => {
                if let Some(key) = try_unwrap(body, slot, identity) {
                    return Ok(key);
                }
            }
            Err(IdentityError::Locked(_)) => locked.push((identity, slot)),
            Err(_) => {}
        }
    }

    if locked.is_empty() {
        return Err(EnvelopeError::NotAddressedToUs);
    }

    let candidates: Vec<LockedKey> = locked
        .iter()
        .map(|(identity, _)| LockedKey {
            key_id: identity.key_id(),
            user_id: identity.primary_user_id().clone(),
        })
        .collect();
    let passphrase = Zeroizing::new(prompt(&candidates).ok_or(EnvelopeError::PassphraseRequired)?);

    for (identity, slot) in locked {
        let mut unlocked = identity.clone();
        if unlocked.unlock(&passphrase).is_err() {
            continue;
        }
        if let Some(key) = try_unwrap(body, slot, &unlocked) {
            return Ok(key);
        }
    }
    Err(EnvelopeError::Identity(IdentityError::InvalidPassphrase))
}

fn try_unwrap(body: &EncryptedBody, slot: &RecipientSlot, identity: &Identity) -> Option<Zeroizing<[u8; 32]>> {
    let secret = identity.secret_keys().ok()?.static_secret();
    let shared = secret.diffie_hellman(&X25519PublicKey::from(body.ephemeral_public));
    if !shared.was_contributory() {
        return None;
    }
    let recipient_public = identity.public_keys().encryption;
    let wrapping_key = derive_wrapping_key(shared.as_bytes(), &body.ephemeral_public, &recipient_public).ok()?;

    let key = Zeroizing::new(
        aead(&wrapping_key)
            .ok()?
            .decrypt(
                XNonce::from_slice(&slot.nonce),
                Payload { msg: slot.wrapped_key.as_slice(), aad: slot.key_id.as_bytes() },
            )
            .ok()?,
    );
    let mut content_key = Zeroizing::new([0u8; 32]);
    if key.len() != content_key.len() {
        return None;
    }
    content_key.copy_from_slice(&key);
    Some(content_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn directory(identities: &[&Identity]) -> IdentityDirectory {
        identities.iter().map(|i| (*i).clone()).collect()
    }

    #[test]
    fn test_seal_and_open() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let bob = Identity::generate("Bob", "", "").unwrap();

        let body = seal(b"hi", &[&alice], Some(&bob)).unwrap();

        let selves = directory(&[&alice]);
        let contacts = directory(&[&bob.to_public()]);
        let (plaintext, sender) = open(&body, &Keyring::new(&selves, &contacts), &decline_prompt).unwrap();
        assert_eq!(plaintext, b"hi");
        assert_eq!(sender, bob);
        assert!(!sender.has_secret_keys());
    }

    #[test]
    fn test_every_recipient_can_open() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let bob = Identity::generate("Bob", "", "").unwrap();
        let carol = Identity::generate("Carol", "", "").unwrap();
        let body = seal(b"group", &[&bob, &carol, &alice], Some(&alice)).unwrap();

        for reader in [&alice, &bob, &carol] {
            let selves = directory(&[reader]);
            let contacts = IdentityDirectory::new();
            let (plaintext, sender) =
                open(&body, &Keyring::new(&selves, &contacts), &decline_prompt).unwrap();
            assert_eq!(plaintext, b"group");
            assert_eq!(sender, alice);
        }
    }

    #[test]
    fn test_not_addressed_to_us() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let bob = Identity::generate("Bob", "", "").unwrap();
        let eve = Identity::generate("Eve", "", "").unwrap();
        let body = seal(b"secret", &[&bob], Some(&alice)).unwrap();

        let selves = directory(&[&eve]);
        let contacts = directory(&[&alice.to_public(), &bob.to_public()]);
        assert!(matches!(
            open(&body, &Keyring::new(&selves, &contacts), &decline_prompt),
            Err(EnvelopeError::NotAddressedToUs)
        ));
    }

    #[test]
    fn test_unsigned_is_rejected() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let body = seal(b"anonymous", &[&alice], None).unwrap();

        let selves = directory(&[&alice]);
        let contacts = IdentityDirectory::new();
        assert!(matches!(
            open(&body, &Keyring::new(&selves, &contacts), &decline_prompt),
            Err(EnvelopeError::Unsigned)
        ));
    }

    #[test]
    fn test_locked_key_prompts_once() {
        let mut alice = Identity::generate("Alice", "", "").unwrap();
        let bob = Identity::generate("Bob", "", "").unwrap();
        let body = seal(b"hi", &[&alice], Some(&bob)).unwrap();
        alice.lock(b"pass").unwrap();

        let calls = AtomicUsize::new(0);
        let prompt = |keys: &[LockedKey]| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(keys.len(), 1);
            assert_eq!(keys[0].user_id.name, "Alice");
            Some(b"pass".to_vec())
        };

        let selves = directory(&[&alice]);
        let contacts = IdentityDirectory::new();
        let (plaintext, _) = open(&body, &Keyring::new(&selves, &contacts), &prompt).unwrap();
        assert_eq!(plaintext, b"hi");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_locked_key_declined() {
        let mut alice = Identity::generate("Alice", "", "").unwrap();
        let body = seal(b"hi", &[&alice], Some(&alice)).unwrap();
        alice.lock(b"pass").unwrap();

        let selves = directory(&[&alice]);
        let contacts = IdentityDirectory::new();
        let keyring = Keyring::new(&selves, &contacts);
        assert!(matches!(open(&body, &keyring, &decline_prompt), Err(EnvelopeError::PassphraseRequired)));

        let wrong = |_: &[LockedKey]| Some(b"nope".to_vec());
        assert!(matches!(
            open(&body, &keyring, &wrong),
            Err(EnvelopeError::Identity(IdentityError::InvalidPassphrase))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        let mut parsed: EncryptedBody =
            crate::encoding::deserialize(&seal(b"hi", &[&alice], Some(&alice)).unwrap()).unwrap();
        if let Some(byte) = parsed.ciphertext.last_mut() {
            *byte ^= 0x01;
        }
        let tampered = crate::encoding::serialize(&parsed).unwrap();

        let selves = directory(&[&alice]);
        let contacts = IdentityDirectory::new();
        assert!(matches!(
            open(&tampered, &Keyring::new(&selves, &contacts), &decline_prompt),
            Err(EnvelopeError::Crypto(_))
        ));
    }

    #[test]
    fn test_no_recipients() {
        let alice = Identity::generate("Alice", "", "").unwrap();
        assert!(matches!(seal(b"x", &[], Some(&alice)), Err(EnvelopeError::MissingRecipient)));
    }
}
