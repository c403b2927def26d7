//! `mysql_native_password` challenge-response per the MySQL client/server
//! protocol: `SHA1(password) XOR SHA1(scramble + SHA1(SHA1(password)))`.
//! This is the only auth plugin this crate speaks — `caching_sha2_password`
//! and SSL-gated exchanges are out of scope (see DESIGN.md).

use sha1::{Digest, Sha1};

pub fn scramble(scramble_bytes: &[u8], password: &str) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = sha1_hash(password.as_bytes());
    let stage2 = sha1_hash(&stage1);

    let mut combined = Vec::with_capacity(scramble_bytes.len() + stage2.len());
    combined.extend_from_slice(scramble_bytes);
    combined.extend_from_slice(&stage2);
    let stage3 = sha1_hash(&combined);

    stage1.iter().zip(stage3.iter()).map(|(a, b)| a ^ b).collect()
}

fn sha1_hash(data: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_password_yields_empty_response() {
        assert!(scramble(b"01234567890123456789", "").is_empty());
    }

    #[test]
    fn scramble_is_deterministic_and_twenty_bytes() {
        let a = scramble(b"01234567890123456789", "secret");
        let b = scramble(b"01234567890123456789", "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);
    }

    #[test]
    fn different_passwords_scramble_differently() {
        let a = scramble(b"01234567890123456789", "secret");
        let b = scramble(b"01234567890123456789", "different");
        assert_ne!(a, b);
    }
}
