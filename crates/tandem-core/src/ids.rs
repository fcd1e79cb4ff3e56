//! Identifier generation.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of hex characters in generated identifiers.
pub const ID_LENGTH: usize = 10;

/// Get current timestamp in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Generate a random identifier `prefix + 10 hex chars` for which `taken`
/// returns false.
pub fn generate(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut rng = rand::thread_rng();
    loop {
        let suffix: [u8; ID_LENGTH / 2] = rng.gen();
        let candidate = format!("{}{}", prefix, hex::encode(suffix));
        if !taken(&candidate) {
            return candidate;
        }
    }
}

/// Derive a stable identifier from a set of parts. The same parts always
/// produce the same identifier.
pub fn derive(prefix: &str, parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    format!("{}{}", prefix, &hex::encode(hasher.finalize().as_bytes())[..ID_LENGTH])
}
