//! ASCII armor
//!
//! ```text
//! -----BEGIN <LABEL>-----
//!
//! <base64 body, 64 columns>
//! =<base64 CRC-32 of the body>
//! -----END <LABEL>-----
//! ```

use super::EnvelopeError;
use base64::{engine::general_purpose::STANDARD, Engine as _};

const LINE_WIDTH: usize = 64;
const BEGIN: &str = "-----BEGIN ";
const END: &str = "-----END ";
const DASHES: &str = "-----";

/// Wrap `body` in an armor block tagged with `label`
pub fn encode(label: &str, body: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(body);
    let checksum = STANDARD.encode(crc32fast::hash(body).to_be_bytes());

    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH + 128);
    out.push_str(&format!("{}{}{}\n\n", BEGIN, label, DASHES));
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII, chunking never splits a character
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out.push('=');
    out.push_str(&checksum);
    out.push('\n');
    out.push_str(&format!("{}{}{}\n", END, label, DASHES));
    out.into_bytes()
}

/// Unwrap an armor block, returning its label and body
pub fn decode(armored: &[u8]) -> Result<(String, Vec<u8>), EnvelopeError> {
    let text = std::str::from_utf8(armored)
        .map_err(|_| EnvelopeError::Armor("armor is not valid UTF-8".to_string()))?;
    let mut lines = text.lines().map(str::trim).skip_while(|line| line.is_empty());

    let label = lines
        .next()
        .and_then(|line| line.strip_prefix(BEGIN))
        .and_then(|line| line.strip_suffix(DASHES))
        .ok_or_else(|| EnvelopeError::Armor("missing BEGIN line".to_string()))?
        .to_string();

    let mut encoded = String::new();
    let mut checksum = None;
    let mut closed = false;
    for line in lines {
        if let Some(rest) = line.strip_prefix(END) {
            if rest.strip_suffix(DASHES) != Some(label.as_str()) {
                return Err(EnvelopeError::Armor("END label does not match BEGIN".to_string()));
            }
            closed = true;
            break;
        } else if let Some(sum) = line.strip_prefix('=') {
            checksum = Some(sum.to_string());
        } else if !line.is_empty() {
            encoded.push_str(line);
        }
    }
    if !closed {
        return Err(EnvelopeError::Armor("missing END line".to_string()));
    }

    let body = STANDARD
        .decode(&encoded)
        .map_err(|e| EnvelopeError::Armor(format!("invalid base64 body: {}", e)))?;

    if let Some(sum) = checksum {
        let expected = STANDARD
            .decode(&sum)
            .map_err(|e| EnvelopeError::Armor(format!("invalid checksum: {}", e)))?;
        if expected != crc32fast::hash(&body).to_be_bytes() {
            return Err(EnvelopeError::Armor("checksum mismatch".to_string()));
        }
    }

    Ok((label, body))
}
