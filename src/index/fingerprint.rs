//! Content fingerprints and the `doc_hash.txt` record that persists them.

use super::types::DocumentChunk;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::ErrorKind;
use std::path::Path;

/// File name of the fingerprint record inside a storage location.
pub const FINGERPRINT_FILE: &str = "doc_hash.txt";

const DIGEST_HEX_LEN: usize = 64;

/// SHA-256 digest over the ordered concatenation of chunk text, as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(String);

impl ContentFingerprint {
    /// Fingerprint an ordered chunk set. An empty set digests the empty string.
    pub fn of(chunks: &[DocumentChunk]) -> Self {
        let mut hasher = Sha256::new();
        for chunk in chunks {
            hasher.update(chunk.text.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a stored record, accepting only a well-formed hex digest.
    pub fn parse(raw: &str) -> Option<Self> {
        let candidate = raw.trim();
        let well_formed = candidate.len() == DIGEST_HEX_LEN
            && candidate
                .bytes()
                .all(|byte| byte.is_ascii_digit() || (b'a'..=b'f').contains(&byte));
        well_formed.then(|| Self(candidate.to_string()))
    }

    /// Hex representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of the fingerprint record found in a storage location.
#[derive(Debug)]
pub(crate) enum FingerprintRecord {
    Missing,
    Corrupt(String),
    Present(ContentFingerprint),
}

/// Read the record under `location`. Unreadable or malformed records are reported as corrupt.
pub(crate) async fn read_record(location: &Path) -> FingerprintRecord {
    let path = location.join(FINGERPRINT_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => match std::str::from_utf8(&bytes).ok().and_then(ContentFingerprint::parse) {
            Some(fingerprint) => FingerprintRecord::Present(fingerprint),
            None => FingerprintRecord::Corrupt(format!(
                "{} does not contain a hex digest",
                path.display()
            )),
        },
        Err(error) if error.kind() == ErrorKind::NotFound => FingerprintRecord::Missing,
        Err(error) => FingerprintRecord::Corrupt(format!("{}: {error}", path.display())),
    }
}

pub(crate) async fn write_record(
    location: &Path,
    fingerprint: &ContentFingerprint,
) -> std::io::Result<()> {
    super::write_atomic(&location.join(FINGERPRINT_FILE), fingerprint.as_str().as_bytes()).await
}

/// Remove the record so a failed rebuild cannot leave it pointing at replaced index contents.
pub(crate) async fn remove_record(location: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(location.join(FINGERPRINT_FILE)).await {
        Err(error) if error.kind() != ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}
