//! Where an imported identity comes from
//!
//! Accepted forms:
//! - `file:<path>`: a file holding a public identity
//! - `bin:<bytes>`: the serialized identity inline
//! - `base64:<text>`: the serialized identity, base64 encoded
//! - `cid:<address>`: a base58 content address in content-addressed storage

use super::{Identity, IdentityError};
use crate::network::{ContentAddress, ContentStore};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentitySource {
    File(PathBuf),
    Raw(Vec<u8>),
    Base64(String),
    Address(ContentAddress),
}

impl IdentitySource {
    pub fn parse(input: &str) -> Result<Self, IdentityError> {
        if let Some(path) = input.strip_prefix("file:") {
            Ok(IdentitySource::File(PathBuf::from(path)))
        } else if let Some(raw) = input.strip_prefix("bin:") {
            Ok(IdentitySource::Raw(raw.as_bytes().to_vec()))
        } else if let Some(text) = input.strip_prefix("base64:") {
            Ok(IdentitySource::Base64(text.trim().to_string()))
        } else if let Some(address) = input.strip_prefix("cid:") {
            let address = ContentAddress::from_base58(address.trim())
                .map_err(|e| IdentityError::InvalidSource(e.to_string()))?;
            Ok(IdentitySource::Address(address))
        } else {
            Err(IdentityError::InvalidSource(format!("\"{}\" has an invalid prefix", input)))
        }
    }

    /// Load the public identity this source points at
    pub async fn resolve(&self, storage: &dyn ContentStore) -> Result<Identity, IdentityError> {
        let bytes = match self {
            IdentitySource::File(path) => std::fs::read(path)?,
            IdentitySource::Raw(bytes) => bytes.clone(),
            IdentitySource::Base64(text) => STANDARD
                .decode(text)
                .map_err(|e| IdentityError::InvalidSource(format!("Invalid base64: {}", e)))?,
            IdentitySource::Address(address) => storage
                .fetch(address)
                .await
                .map_err(|e| IdentityError::InvalidSource(e.to_string()))?,
        };
        Identity::from_canonical_bytes(&bytes)
    }
}

/// Base64 text of an identity's public form, as accepted by `base64:`
pub fn export_base64(identity: &Identity) -> Result<String, IdentityError> {
    Ok(STANDARD.encode(identity.canonical_bytes()?))
}
