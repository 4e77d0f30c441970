use sha2::{Digest, Sha256};

use crate::field::FieldKind;

/// Computes the content hash of one index row.
///
/// The hash covers `path:value:value_type:title`. The entity title
/// participates so that renaming an entity forces its rows to reindex.
#[must_use]
pub fn content_hash(path: &str, value: &str, value_type: FieldKind, title: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    hasher.update(b":");
    hasher.update(value_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(title.unwrap_or_default().as_bytes());

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    hex
}
