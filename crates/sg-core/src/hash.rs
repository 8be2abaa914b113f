//! Hash functions for ShieldGate
//!
//! Index keys are xxHash digests of lowercased input. Hosts use the 64-bit
//! variant; pattern tokens use the 32-bit variant with a separate seed.
//!
//! # Sentinel Handling
//!
//! Zero is never returned, so index tables can use it as an empty marker.

use std::hash::Hasher;

use twox_hash::{XxHash32, XxHash64};

const DOMAIN_SEED: u64 = 0x9e37_79b9_7f4a_7c15;
const TOKEN_SEED: u32 = 0x811c_9dc5;

/// Hash raw bytes with the 64-bit xxHash.
#[inline]
pub fn hash64(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(DOMAIN_SEED);
    hasher.write(data);
    match hasher.finish() {
        0 => 1,
        h => h,
    }
}

/// Hash a domain string for lookup in host indexes.
/// Lowercases the input before hashing for case-insensitive matching.
#[inline]
pub fn hash_domain(domain: &str) -> u64 {
    // Fast lowercase conversion for ASCII domains
    let mut buf = [0u8; 256];
    let bytes = domain.as_bytes();
    if bytes.len() > buf.len() {
        return hash64(domain.to_ascii_lowercase().as_bytes());
    }

    for (slot, &b) in buf.iter_mut().zip(bytes) {
        *slot = b.to_ascii_lowercase();
    }

    hash64(&buf[..bytes.len()])
}

/// Compute a 32-bit hash for an already-lowercased token.
/// Ensures result is never 0 (sentinel value).
#[inline]
pub fn hash_token(token: &[u8]) -> u32 {
    let mut hasher = XxHash32::with_seed(TOKEN_SEED);
    hasher.write(token);
    match hasher.finish() as u32 {
        0 => 1,
        h => h,
    }
}

/// Hash a token, lowercasing ASCII letters first.
#[inline]
pub fn hash_token_lower(token: &[u8]) -> u32 {
    if token.iter().any(u8::is_ascii_uppercase) {
        hash_token(&token.to_ascii_lowercase())
    } else {
        hash_token(token)
    }
}
