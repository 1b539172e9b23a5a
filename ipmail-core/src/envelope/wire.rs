//! Persisted envelope record
//!
//! ```text
//! [i64 BE length][encrypted bytes][i64 BE length][origin peer bytes][u64 BE id]
//! ```
//!
//! Records are concatenated with no other framing. A short read on any
//! field is an unexpected end of data.

use super::EnvelopeError;
use crate::network::PeerAddress;
use std::io::{self, Read, Write};

/// Largest field a record may declare (64 MiB)
const MAX_FIELD_LEN: i64 = 64 * 1024 * 1024;

/// One persisted envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub encrypted: Vec<u8>,
    pub origin: PeerAddress,
    pub id: u64,
}

pub fn write_record<W: Write>(
    writer: &mut W,
    encrypted: &[u8],
    origin: &PeerAddress,
    id: u64,
) -> io::Result<()> {
    writer.write_all(&(encrypted.len() as i64).to_be_bytes())?;
    writer.write_all(encrypted)?;
    writer.write_all(&(origin.as_bytes().len() as i64).to_be_bytes())?;
    writer.write_all(origin.as_bytes())?;
    writer.write_all(&id.to_be_bytes())
}

/// Read the next record, or `None` at a clean end of data
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<Record>, EnvelopeError> {
    let mut len_buf = [0u8; 8];
    match fill(reader, &mut len_buf)? {
        0 => return Ok(None),
        8 => {}
        _ => return Err(EnvelopeError::UnexpectedEof),
    }
    let encrypted = read_field(reader, i64::from_be_bytes(len_buf))?;

    read_exact(reader, &mut len_buf)?;
    let origin = read_field(reader, i64::from_be_bytes(len_buf))?;
    let origin = PeerAddress::from_bytes(&origin).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    let mut id_buf = [0u8; 8];
    read_exact(reader, &mut id_buf)?;

    Ok(Some(Record { encrypted, origin, id: u64::from_be_bytes(id_buf) }))
}

fn read_field<R: Read>(reader: &mut R, len: i64) -> Result<Vec<u8>, EnvelopeError> {
    if !(0..=MAX_FIELD_LEN).contains(&len) {
        return Err(EnvelopeError::Malformed(format!("invalid field length {}", len)));
    }
    let mut buf = vec![0u8; len as usize];
    read_exact(reader, &mut buf)?;
    Ok(buf)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<(), EnvelopeError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => EnvelopeError::UnexpectedEof,
        _ => EnvelopeError::Io(e),
    })
}

/// Read until `buf` is full or the reader is exhausted
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, EnvelopeError> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(EnvelopeError::Io(e)),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encoded(encrypted: &[u8], origin: &str, id: u64) -> Vec<u8> {
        let mut out = Vec::new();
        write_record(&mut out, encrypted, &PeerAddress::new(origin), id).unwrap();
        out
    }

    #[test]
    fn test_record_layout() {
        let bytes = encoded(b"abc", "peer", 7);

        assert_eq!(&bytes[..8], &3i64.to_be_bytes());
        assert_eq!(&bytes[8..11], b"abc");
        assert_eq!(&bytes[11..19], &4i64.to_be_bytes());
        assert_eq!(&bytes[19..23], b"peer");
        assert_eq!(&bytes[23..], &7u64.to_be_bytes());
    }

    #[test]
    fn test_reads_consecutive_records() {
        let mut bytes = encoded(b"first", "a", 1);
        bytes.extend(encoded(b"second", "b", 2));
        let mut cursor = Cursor::new(bytes);

        let first = read_record(&mut cursor).unwrap().unwrap();
        let second = read_record(&mut cursor).unwrap().unwrap();
        assert_eq!(first.encrypted, b"first");
        assert_eq!(second.origin, PeerAddress::new("b"));
        assert_eq!(second.id, 2);
        assert!(read_record(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_short_read_is_unexpected_eof() {
        let bytes = encoded(b"payload", "peer", 9);
        for cut in [3, 8, 12, 20, bytes.len() - 1] {
            let mut cursor = Cursor::new(&bytes[..cut]);
            assert!(
                matches!(read_record(&mut cursor), Err(EnvelopeError::UnexpectedEof)),
                "cut at {}",
                cut
            );
        }
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut cursor = Cursor::new((-1i64).to_be_bytes().to_vec());
        assert!(matches!(read_record(&mut cursor), Err(EnvelopeError::Malformed(_))));
    }
}
