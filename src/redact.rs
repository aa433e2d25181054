use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest.
const FINGERPRINT_LEN: usize = 12;

/// Returns a short, stable SHA-256 fingerprint of a contact identifier.
///
/// Log lines carry the fingerprint instead of the raw email or phone number,
/// which still lets an operator correlate requests for the same identifier.
pub fn fingerprint(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    digest
}

/// Fingerprint of an optional identifier; `"-"` when absent.
pub fn fingerprint_opt(value: Option<&str>) -> String {
    value.map(fingerprint).unwrap_or_else(|| "-".to_string())
}
