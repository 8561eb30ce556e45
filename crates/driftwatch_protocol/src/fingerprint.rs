use blake3::Hasher;

use crate::types::SchemaDocument;

const SEP: u8 = 0x1f;

fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[SEP]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Stable content hash of a schema document.
///
/// Components:
/// - document version
/// - canonical JSON of the document
///
/// Two snapshots of an unchanged schema hash identically, so callers can
/// detect whether an update pass changed anything without diffing.
pub fn schema_fingerprint(doc: &SchemaDocument) -> String {
    // Plain data always serializes; Debug keeps the signature infallible.
    let json = serde_json::to_string(doc).unwrap_or_else(|_| format!("{:?}", doc));
    hash_parts(&[&doc.version.to_string(), &json])
}
