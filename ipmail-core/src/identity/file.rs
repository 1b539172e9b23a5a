//! Identity list files
//!
//! File format:
//! ```text
//! [Magic: 8 bytes][bincode Vec<Vec<u8>>: one serialized identity per entry]
//! ```

use super::IdentityError;
use std::fs;
use std::path::Path;

/// Magic header for contact (public identity) files
pub(crate) const CONTACTS_MAGIC: &[u8; 8] = b"IPMC0001";

/// Magic header for self identity (secret key) files
pub(crate) const SELF_MAGIC: &[u8; 8] = b"IPMS0001";

pub(crate) fn write_entries(
    path: &Path,
    magic: &[u8; 8],
    entries: &[Vec<u8>],
) -> Result<(), IdentityError> {
    let body =
        crate::encoding::serialize(entries).map_err(|e| IdentityError::Serialization(e.to_string()))?;
    let mut data = Vec::with_capacity(magic.len() + body.len());
    data.extend_from_slice(magic);
    data.extend_from_slice(&body);

    crate::store::replace_file(path, &data)?;
    Ok(())
}

pub(crate) fn read_entries(path: &Path, magic: &[u8; 8]) -> Result<Vec<Vec<u8>>, IdentityError> {
    let data = fs::read(path)?;
    if data.len() < magic.len() || &data[..magic.len()] != magic {
        return Err(IdentityError::Serialization(format!(
            "{} is not an identity file of the expected kind",
            path.display()
        )));
    }
    crate::encoding::deserialize(&data[magic.len()..])
        .map_err(|e| IdentityError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_entries_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("contacts");
        let entries = vec![vec![1, 2, 3], vec![], vec![9]];

        write_entries(&path, CONTACTS_MAGIC, &entries).unwrap();
        assert_eq!(read_entries(&path, CONTACTS_MAGIC).unwrap(), entries);
        assert!(!dir.path().join("contacts.tmp").exists());
    }

    #[test]
    fn test_wrong_magic_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("identity");
        write_entries(&path, SELF_MAGIC, &[vec![1]]).unwrap();

        assert!(read_entries(&path, CONTACTS_MAGIC).is_err());
    }
}
