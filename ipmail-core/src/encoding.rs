//! Fixed-width bincode options shared by every on-disk and on-wire structure.
//!
//! Untrusted input is always decoded with a size limit so a forged length
//! prefix cannot trigger an unbounded allocation.

use bincode::Options;
use serde::{de::DeserializeOwned, Serialize};

/// Upper bound for any single decoded structure (64 MiB)
const MAX_DECODE_LEN: u64 = 64 * 1024 * 1024;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(MAX_DECODE_LEN)
}

pub(crate) fn serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, bincode::Error> {
    options().serialize(value)
}

pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, bincode::Error> {
    options().deserialize(bytes)
}
