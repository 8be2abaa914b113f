//! Network filter rules and their compiled patterns
//!
//! A [`Pattern`] is the compiled form of the classic filter syntax:
//! `*` wildcard, `^` separator, `||` hostname anchor, `|` start/end anchor.
//! A [`Rule`] adds the `$` option constraints on top of a pattern.

use std::fmt;

use crate::hash::{hash_domain, hash_token_lower};
use crate::psl::walk_host_suffixes;
use crate::types::{CategoryMask, PartyMask, RuleAction, RuleFlags};
use crate::url::{is_token_char, MIN_TOKEN_LEN};

// =============================================================================
// Pattern
// =============================================================================

/// Left-hand anchoring of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AnchorType {
    #[default]
    None,
    /// `|` - match starts at the beginning of the URL
    Left,
    /// `||` - match starts at the hostname or one of its label boundaries
    Hostname,
}

/// Pattern program step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternOp {
    /// Literal text (lowercased unless the rule is case-sensitive)
    Literal(Box<str>),
    /// `^` - one separator character, or the end of the URL
    Separator,
    /// `*` - any run of characters
    SkipAny,
}

/// Compiled URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern {
    raw: Box<str>,
    anchor: AnchorType,
    right_anchor: bool,
    ops: Vec<PatternOp>,
}

impl Pattern {
    /// Compile a pattern in filter-list syntax.
    ///
    /// An empty pattern (or a lone `*`) matches every URL.
    pub fn parse(text: &str, match_case: bool) -> Self {
        let raw = text.trim();

        let (anchor, mut body) = if let Some(rest) = raw.strip_prefix("||") {
            (AnchorType::Hostname, rest)
        } else if let Some(rest) = raw.strip_prefix('|') {
            (AnchorType::Left, rest)
        } else {
            (AnchorType::None, raw)
        };

        let mut right_anchor = false;
        if let Some(rest) = body.strip_suffix('|') {
            right_anchor = true;
            body = rest;
        }

        let mut ops = Vec::new();
        let mut literal = String::new();
        for ch in body.chars() {
            match ch {
                '*' | '^' => {
                    if !literal.is_empty() {
                        ops.push(PatternOp::Literal(std::mem::take(&mut literal).into_boxed_str()));
                    }
                    if ch == '^' {
                        ops.push(PatternOp::Separator);
                    } else if ops.last() != Some(&PatternOp::SkipAny) {
                        ops.push(PatternOp::SkipAny);
                    }
                }
                _ if match_case => literal.push(ch),
                _ => literal.push(ch.to_ascii_lowercase()),
            }
        }
        if !literal.is_empty() {
            ops.push(PatternOp::Literal(literal.into_boxed_str()));
        }

        // Unanchored ends already behave like wildcards
        if anchor == AnchorType::None && ops.first() == Some(&PatternOp::SkipAny) {
            ops.remove(0);
        }
        if !right_anchor && ops.last() == Some(&PatternOp::SkipAny) {
            ops.pop();
        }

        Self {
            raw: raw.into(),
            anchor,
            right_anchor,
            ops,
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn anchor(&self) -> AnchorType {
        self.anchor
    }

    pub fn right_anchor(&self) -> bool {
        self.right_anchor
    }

    pub fn ops(&self) -> &[PatternOp] {
        &self.ops
    }

    /// Hostname a `||` pattern is pinned to, if it starts with a complete
    /// hostname. Such patterns can be indexed by host instead of by token.
    pub fn anchor_host(&self) -> Option<&str> {
        if self.anchor != AnchorType::Hostname {
            return None;
        }

        let literal = match self.ops.first() {
            Some(PatternOp::Literal(lit)) => lit.as_ref(),
            _ => return None,
        };

        let host_len = literal
            .bytes()
            .position(|b| !(b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_'))
            .unwrap_or(literal.len());
        let host = &literal[..host_len];
        if host.is_empty() || host.starts_with('.') || host.ends_with('.') {
            return None;
        }

        let terminated = if host_len == literal.len() {
            matches!(self.ops.get(1), Some(PatternOp::Separator))
        } else {
            matches!(literal.as_bytes()[host_len], b'/' | b':')
        };

        terminated.then_some(host)
    }

    /// Hashes of the tokens that must appear as whole URL tokens in any URL
    /// this pattern matches.
    pub fn index_tokens(&self) -> Vec<u32> {
        let mut tokens = Vec::new();

        for (k, op) in self.ops.iter().enumerate() {
            let literal = match op {
                PatternOp::Literal(lit) => lit.as_bytes(),
                _ => continue,
            };

            let bounded_left = match k {
                0 => self.anchor == AnchorType::Hostname,
                _ => self.ops[k - 1] == PatternOp::Separator,
            };
            let bounded_right = match self.ops.get(k + 1) {
                Some(PatternOp::Separator) => true,
                Some(_) => false,
                None => self.right_anchor,
            };

            let mut start = 0;
            while start < literal.len() {
                if !is_token_char(literal[start]) {
                    start += 1;
                    continue;
                }
                let end = literal[start..]
                    .iter()
                    .position(|&b| !is_token_char(b))
                    .map_or(literal.len(), |i| start + i);

                let left_ok = start > 0 || bounded_left;
                let right_ok = end < literal.len() || bounded_right;
                if left_ok && right_ok && end - start >= MIN_TOKEN_LEN {
                    tokens.push(hash_token_lower(&literal[start..end]));
                }
                start = end;
            }
        }

        tokens
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// =============================================================================
// Domain Constraints
// =============================================================================

/// `$domain=` restriction on the initiating host.
///
/// Entries are host hashes; a constraint entry applies to the host itself
/// and all of its subdomains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DomainConstraint {
    include: Vec<u64>,
    exclude: Vec<u64>,
}

impl DomainConstraint {
    pub fn new<I, E, S, T>(include: I, exclude: E) -> Self
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        let mut constraint = Self::default();
        for domain in include {
            constraint.include.push(hash_domain(domain.as_ref()));
        }
        for domain in exclude {
            constraint.exclude.push(hash_domain(domain.as_ref()));
        }
        constraint.normalize();
        constraint
    }

    /// Fold another `domain=` option into this one.
    pub fn merge(&mut self, other: DomainConstraint) {
        self.include.extend(other.include);
        self.exclude.extend(other.exclude);
        self.normalize();
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    fn normalize(&mut self) {
        self.include.sort_unstable();
        self.include.dedup();
        self.exclude.sort_unstable();
        self.exclude.dedup();
    }

    /// Check the constraint against an initiating host.
    pub fn matches(&self, site_host: &str) -> bool {
        let mut included = self.include.is_empty();

        for suffix in walk_host_suffixes(site_host) {
            let hash = hash_domain(suffix);
            if self.exclude.binary_search(&hash).is_ok() {
                return false;
            }
            if !included && self.include.binary_search(&hash).is_ok() {
                included = true;
            }
        }

        included
    }
}

// =============================================================================
// Rule
// =============================================================================

/// A parsed network filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rule {
    pub action: RuleAction,
    pub flags: RuleFlags,
    pub pattern: Pattern,
    /// Categories the rule applies to (empty = all)
    pub category_mask: CategoryMask,
    /// Parties the rule applies to (empty = any)
    pub party_mask: PartyMask,
    pub domain_constraints: Option<DomainConstraint>,
    /// Opt-in tag the rule requires
    pub tag: Option<Box<str>>,
}

impl Rule {
    /// A blocking rule with no option constraints.
    pub fn block(pattern: &str) -> Self {
        Self::with_action(RuleAction::Block, pattern)
    }

    /// An exception rule with no option constraints.
    pub fn exception(pattern: &str) -> Self {
        Self::with_action(RuleAction::Allow, pattern)
    }

    fn with_action(action: RuleAction, pattern: &str) -> Self {
        Self {
            action,
            flags: RuleFlags::empty(),
            pattern: Pattern::parse(pattern, false),
            category_mask: CategoryMask::empty(),
            party_mask: PartyMask::empty(),
            domain_constraints: None,
            tag: None,
        }
    }

    pub fn with_categories(mut self, mask: CategoryMask) -> Self {
        self.category_mask = mask;
        self
    }

    pub fn with_party(mut self, mask: PartyMask) -> Self {
        self.party_mask = mask;
        self
    }

    pub fn with_domains(mut self, constraint: DomainConstraint) -> Self {
        self.domain_constraints = Some(constraint);
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_explicit_cancel(mut self) -> Self {
        self.flags |= RuleFlags::EXPLICIT_CANCEL;
        self
    }

    #[inline]
    pub fn is_exception(&self) -> bool {
        self.action == RuleAction::Allow
    }

    #[inline]
    pub fn explicit_cancel(&self) -> bool {
        self.flags.contains(RuleFlags::EXPLICIT_CANCEL)
    }

    #[inline]
    pub fn match_case(&self) -> bool {
        self.flags.contains(RuleFlags::MATCH_CASE)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exception() {
            f.write_str("@@")?;
        }
        write!(f, "{}", self.pattern)
    }
}
