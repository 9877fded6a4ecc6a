use sha2::{Digest, Sha256};

use crate::types::{CanonicalPriority, CanonicalStatus};

/// Deterministic digest over the synced subset of fields (§3 invariant 2,
/// GLOSSARY "Content hash"): title, trimmed description, normalized status,
/// normalized priority. Two issues with identical synced fields always
/// produce the same hash regardless of which tracker reported them.
pub fn content_hash(
    title: &str,
    description: &str,
    status: CanonicalStatus,
    priority: CanonicalPriority,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.trim().as_bytes());
    hasher.update(b"\0");
    hasher.update(description.trim().as_bytes());
    hasher.update(b"\0");
    hasher.update(format!("{status:?}").as_bytes());
    hasher.update(b"\0");
    hasher.update(format!("{priority:?}").as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_fields_hash_identically() {
        let a = content_hash("Fix bug", "desc", CanonicalStatus::Todo, CanonicalPriority::Medium);
        let b = content_hash("Fix bug", "desc", CanonicalStatus::Todo, CanonicalPriority::Medium);
        assert_eq!(a, b);
    }

    #[test]
    fn whitespace_padding_is_ignored() {
        let a = content_hash("Fix bug", "desc", CanonicalStatus::Todo, CanonicalPriority::Medium);
        let b = content_hash("Fix bug", "  desc  \n", CanonicalStatus::Todo, CanonicalPriority::Medium);
        assert_eq!(a, b);
    }

    #[test]
    fn different_status_changes_hash() {
        let a = content_hash("T", "D", CanonicalStatus::Todo, CanonicalPriority::Medium);
        let b = content_hash("T", "D", CanonicalStatus::Done, CanonicalPriority::Medium);
        assert_ne!(a, b);
    }

    #[test]
    fn different_priority_changes_hash() {
        let a = content_hash("T", "D", CanonicalStatus::Todo, CanonicalPriority::Medium);
        let b = content_hash("T", "D", CanonicalStatus::Todo, CanonicalPriority::High);
        assert_ne!(a, b);
    }

    #[test]
    fn title_is_not_interchangeable_with_description() {
        let a = content_hash("Title Desc", "", CanonicalStatus::Todo, CanonicalPriority::Medium);
        let b = content_hash("Title", " Desc", CanonicalStatus::Todo, CanonicalPriority::Medium);
        assert_ne!(a, b);
    }
}
