//! Fast URL parsing utilities for the hot path
//!
//! These functions avoid full URL parsing and work directly on string slices.
//! Malformed input never errors; callers get `None` or an empty result.

use crate::hash::hash_token_lower;

// =============================================================================
// Scheme
// =============================================================================

/// Get the position after "://".
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    // Find ':'
    let colon_pos = bytes.iter().position(|&b| b == b':')?;
    if colon_pos == 0
        || !bytes[..colon_pos]
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
    {
        return None;
    }

    // Check for "://"
    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

// =============================================================================
// Host Extraction
// =============================================================================

/// Get the start and end positions of the hostname in a URL.
#[inline]
pub fn get_host_position(url: &str) -> Option<(usize, usize)> {
    let scheme_end = get_scheme_end(url)?;
    let bytes = url.as_bytes();

    // Authority ends at the first '/', '?' or '#'
    let authority_end = bytes[scheme_end..]
        .iter()
        .position(|&b| b == b'/' || b == b'?' || b == b'#')
        .map_or(bytes.len(), |i| scheme_end + i);

    // Skip userinfo
    let host_start = bytes[scheme_end..authority_end]
        .iter()
        .rposition(|&b| b == b'@')
        .map_or(scheme_end, |i| scheme_end + i + 1);

    // Bracketed IPv6 literal keeps its colons
    let host_end = if bytes.get(host_start) == Some(&b'[') {
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b']')
            .map_or(authority_end, |i| host_start + i + 1)
    } else {
        bytes[host_start..authority_end]
            .iter()
            .position(|&b| b == b':')
            .map_or(authority_end, |i| host_start + i)
    };

    if host_end == host_start {
        return None;
    }

    Some((host_start, host_end))
}

/// Fast host extraction without allocations.
/// Returns a slice into the original URL.
#[inline]
pub fn extract_host(url: &str) -> Option<&str> {
    let (host_start, host_end) = get_host_position(url)?;
    Some(&url[host_start..host_end])
}

/// Lowercase and strip a trailing dot from a hostname.
pub fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}

// =============================================================================
// URL Tokenization
// =============================================================================

/// Shortest alphanumeric run used as an index token.
pub const MIN_TOKEN_LEN: usize = 3;

/// Check if a byte is alphanumeric.
#[inline]
pub(crate) fn is_token_char(b: u8) -> bool {
    b.is_ascii_alphanumeric()
}

/// Tokenize a URL for index lookup.
///
/// Returns the distinct hashes of every alphanumeric run of at least
/// [`MIN_TOKEN_LEN`] characters after the scheme, lowercased.
pub fn tokenize_url(url: &str) -> Vec<u32> {
    let bytes = url.as_bytes();
    let start = get_scheme_end(url).unwrap_or(0);
    let mut tokens = Vec::with_capacity(16);
    let mut token_start = None;

    for i in start..=bytes.len() {
        let is_alnum = i < bytes.len() && is_token_char(bytes[i]);

        if is_alnum {
            if token_start.is_none() {
                token_start = Some(i);
            }
        } else if let Some(ts) = token_start.take() {
            if i - ts >= MIN_TOKEN_LEN {
                tokens.push(hash_token_lower(&bytes[ts..i]));
            }
        }
    }

    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

// =============================================================================
// Separator Check
// =============================================================================

/// Check if a character is a filter-list separator (`^`).
/// Separators are anything but letters, digits and `_ - . %`.
#[inline]
pub fn is_separator_char(c: u8) -> bool {
    !(c.is_ascii_alphanumeric() || matches!(c, b'_' | b'-' | b'.' | b'%'))
}

/// Check if position in string is at a separator or the end of input.
#[inline]
pub fn is_at_separator(s: &[u8], pos: usize) -> bool {
    if pos >= s.len() {
        return true;
    }
    is_separator_char(s[pos])
}
