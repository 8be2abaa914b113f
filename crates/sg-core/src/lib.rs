//! ShieldGate Core Library
//!
//! This crate provides the request classification and rule matching engine
//! for the ShieldGate content blocker.
//!
//! # Architecture
//!
//! Filter lists are compiled (by `sg-compiler`) into immutable [`RuleStore`]s.
//! The [`Engine`] holds an ordered list of store slots plus the enabled tag
//! set, and answers one question per network request: block or allow. Stores
//! and tags can be swapped at any time; each decision sees one consistent
//! snapshot of both.
//!
//! # Modules
//!
//! - `classify`: Resource kind to category mapping and party detection
//! - `engine`: Multi-store decision engine with atomic updates
//! - `hash`: xxHash functions for domain and token hashing
//! - `psl`: Public Suffix List for registrable domain extraction
//! - `rule`: Network rule and pattern representation
//! - `store`: Indexed, immutable rule collections
//! - `url`: Fast URL parsing without full URL validation
//! - `matcher`: Core request matching against one store
//! - `types`: Shared type definitions

pub mod classify;
pub mod engine;
pub mod hash;
pub mod matcher;
pub mod psl;
pub mod rule;
pub mod store;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use classify::{category_for, classify};
pub use engine::{Engine, RuleStoreSink};
pub use hash::{hash64, hash_domain, hash_token};
pub use matcher::Matcher;
pub use psl::{install_suffix_list_from_str, is_third_party, registrable_domain, SuffixList};
pub use rule::{DomainConstraint, Pattern, Rule};
pub use store::RuleStore;
pub use types::{
    Category, CategoryMask, Classification, Decision, MatchDecision, Party, PartyMask, Request,
    RequestContext, ResourceKind, RuleAction, RuleFlags, TagSet, Verdict,
};
