use sha2::{Digest, Sha256};

use crate::domain::product::ProductRecord;
use crate::domain::value_objects::Fingerprint;

/// Compute a SHA-256 fingerprint of a product collection.
///
/// Algorithm:
/// 1. Each record is serialised to JSON. Object keys come out sorted, so the
///    string is canonical for a given record.
/// 2. Record strings are joined with `\n` **in collection order** (order is
///    part of what a subscriber sees, so reordering counts as a change) and
///    hashed with SHA-256.
///
/// An empty collection produces a well-defined fingerprint (hash of empty string).
pub fn fingerprint(records: &[ProductRecord]) -> Fingerprint {
    let content = records
        .iter()
        .map(|r| serde_json::to_string(r).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n");
    let hash = Sha256::digest(content.as_bytes());
    Fingerprint(format!("{:x}", hash))
}
