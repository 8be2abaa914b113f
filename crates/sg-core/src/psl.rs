//! Public Suffix List (PSL) utilities for registrable-domain extraction
//!
//! A snapshot of the full public suffix list, private registries included,
//! is compiled in and installed on first use. Hosts can swap in a fresher
//! copy at runtime with [`install_suffix_list`]; readers pick up the new
//! list on their next lookup without locking.
//!
//! # Examples
//!
//! ```
//! use sg_core::psl::registrable_domain;
//!
//! assert_eq!(registrable_domain("sub.example.com"), "example.com");
//! assert_eq!(registrable_domain("sub.example.co.uk"), "example.co.uk");
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use publicsuffix::{List, Psl};

/// Error type for suffix list loading.
#[derive(Debug, thiserror::Error)]
pub enum PslError {
    #[error("Invalid public suffix list: {0}")]
    Invalid(String),
    #[error("Public suffix list contains no rules")]
    Empty,
}

// =============================================================================
// Built-in list
// =============================================================================

/// Snapshot of https://publicsuffix.org/list/public_suffix_list.dat
/// (ICANN and PRIVATE sections).
const BUILTIN_PSL: &str = include_str!("../data/public_suffix_list.dat");

/// Installed suffix list with a heuristic fallback.
pub struct SuffixList {
    list: Option<List>,
}

impl SuffixList {
    /// Parse a suffix list in the publicsuffix.org `.dat` format.
    pub fn parse(text: &str) -> Result<Self, PslError> {
        let has_rules = text
            .lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with("//"));
        if !has_rules {
            return Err(PslError::Empty);
        }

        let list: List = text
            .parse()
            .map_err(|e: publicsuffix::Error| PslError::Invalid(e.to_string()))?;
        Ok(Self { list: Some(list) })
    }

    /// The list compiled into this crate.
    pub fn builtin() -> Self {
        match Self::parse(BUILTIN_PSL) {
            Ok(list) => list,
            Err(e) => {
                log::warn!("built-in suffix list rejected, using heuristic: {e}");
                Self::heuristic()
            }
        }
    }

    /// A list that only uses the label-count heuristic.
    pub fn heuristic() -> Self {
        Self { list: None }
    }

    /// Registrable domain of an already-lowercased host.
    pub fn registrable_domain<'h>(&self, host: &'h str) -> &'h str {
        let host = host.trim_end_matches('.');
        if host.is_empty() || host.parse::<IpAddr>().is_ok() || is_bracketed_ipv6(host) {
            return host;
        }

        match &self.list {
            Some(list) => match list.domain(host.as_bytes()) {
                Some(domain) => {
                    let len = domain.as_bytes().len();
                    &host[host.len() - len..]
                }
                // Host is itself a public suffix
                None => host,
            },
            None => fallback_etld1(host),
        }
    }
}

fn is_bracketed_ipv6(host: &str) -> bool {
    host.starts_with('[') && host.ends_with(']')
}

// =============================================================================
// Global PSL State
// =============================================================================

static SUFFIX_LIST: Lazy<ArcSwap<SuffixList>> =
    Lazy::new(|| ArcSwap::from_pointee(SuffixList::builtin()));

/// Replace the process-wide suffix list.
pub fn install_suffix_list(list: SuffixList) {
    SUFFIX_LIST.store(Arc::new(list));
    log::info!("installed public suffix list");
}

/// Parse and install a suffix list from `.dat` text.
pub fn install_suffix_list_from_str(text: &str) -> Result<(), PslError> {
    install_suffix_list(SuffixList::parse(text)?);
    Ok(())
}

// =============================================================================
// Registrable Domain Extraction
// =============================================================================

/// Common two-part TLDs for the heuristic fallback.
const COMMON_TWO_PART_TLDS: &[&str] = &[
    "co.uk", "co.jp", "co.nz", "co.za", "co.in", "co.kr",
    "com.au", "com.br", "com.cn", "com.mx", "com.tw", "com.hk",
    "net.au", "net.nz",
    "org.uk", "org.au",
    "gov.uk", "gov.au",
    "ac.uk", "ac.jp",
    "ne.jp", "or.jp",
];

/// Get the registrable domain (eTLD+1) of an already-lowercased host.
pub fn registrable_domain(host: &str) -> &str {
    SUFFIX_LIST.load().registrable_domain(host)
}

/// Heuristic registrable domain: last two labels, or three for known
/// two-part TLDs.
fn fallback_etld1(host: &str) -> &str {
    let dots: Vec<usize> = host.match_indices('.').map(|(i, _)| i).collect();
    let n = dots.len();
    if n < 2 {
        return host;
    }

    // Check for common two-part TLDs
    let last_two = &host[dots[n - 2] + 1..];
    if COMMON_TWO_PART_TLDS.contains(&last_two) {
        return if n >= 3 { &host[dots[n - 3] + 1..] } else { host };
    }

    // Default: last 2 labels
    last_two
}

/// Check if two hosts share the same registrable domain.
pub fn is_same_site(host1: &str, host2: &str) -> bool {
    let site1 = registrable_domain(host1);
    !site1.is_empty() && site1 == registrable_domain(host2)
}

/// Check if a request is third-party.
pub fn is_third_party(site_host: &str, req_host: &str) -> bool {
    !is_same_site(site_host, req_host)
}

/// Get the parent domain (strip leftmost label).
pub fn get_parent_domain(host: &str) -> Option<&str> {
    match host.find('.') {
        Some(idx) if idx < host.len() - 1 => Some(&host[idx + 1..]),
        _ => None,
    }
}

/// Iterator for suffix-walking a host from full host down to its last label.
pub struct HostSuffixIter<'a> {
    current: Option<&'a str>,
}

impl<'a> Iterator for HostSuffixIter<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.current?;
        self.current = get_parent_domain(result);
        Some(result)
    }
}

/// Walk host suffixes from most specific to least specific.
pub fn walk_host_suffixes(host: &str) -> HostSuffixIter<'_> {
    let host = host.trim_end_matches('.');
    HostSuffixIter {
        current: if host.is_empty() { None } else { Some(host) },
    }
}
