//! ShieldGate Filter List Compiler
//!
//! This crate compiles ABP/uBO filter lists into indexed rule stores for the
//! `sg-core` engine.

pub mod parser;
pub mod optimizer;
pub mod builder;

pub use builder::{build_rule_store, build_rule_store_from_text, BuildError, BuildOptions, BuildStats, ParseMode};
pub use optimizer::optimize_rules;
pub use parser::{parse_filter_list, parse_line, ParseError, ParsedLine, ParsedRule};
