//! Indexed rule store
//!
//! A [`RuleStore`] is built once from parsed rules and never mutated. Rules
//! are split into blocking and exception partitions; each partition is
//! indexed so that a lookup only visits rules that can plausibly match:
//!
//! - host index: `||host^` style rules keyed by their hostname hash, found by
//!   walking the request host's suffixes
//! - token index: other rules keyed by one whole token of their pattern,
//!   found through the URL's tokens
//! - fallback: rules with no usable token, always visited

use std::collections::HashMap;

use crate::hash::hash_domain;
use crate::psl::walk_host_suffixes;
use crate::rule::Rule;
use crate::types::RuleAction;
use crate::url::{extract_host, normalize_host, tokenize_url};

// =============================================================================
// Partition Index
// =============================================================================

#[derive(Debug, Default)]
struct RuleIndex {
    host: HashMap<u64, Vec<u32>>,
    token: HashMap<u32, Vec<u32>>,
    fallback: Vec<u32>,
    len: usize,
}

impl RuleIndex {
    fn insert(&mut self, rule_id: u32, rule: &Rule) {
        self.len += 1;

        if let Some(host) = rule.pattern.anchor_host() {
            self.host.entry(hash_domain(host)).or_default().push(rule_id);
            return;
        }

        // Pick the token with the shortest posting list so far
        let best = rule
            .pattern
            .index_tokens()
            .into_iter()
            .min_by_key(|token| self.token.get(token).map_or(0, Vec::len));

        match best {
            Some(token) => self.token.entry(token).or_default().push(rule_id),
            None => self.fallback.push(rule_id),
        }
    }

    fn stats(&self) -> PartitionStats {
        PartitionStats {
            rules: self.len,
            host_keys: self.host.len(),
            token_keys: self.token.len(),
            fallback_rules: self.fallback.len(),
        }
    }
}

/// Index sizes for one partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionStats {
    pub rules: usize,
    pub host_keys: usize,
    pub token_keys: usize,
    pub fallback_rules: usize,
}

/// Index sizes for a whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub block: PartitionStats,
    pub exception: PartitionStats,
}

// =============================================================================
// Rule Store
// =============================================================================

/// Immutable, indexed collection of network rules for one filter list.
#[derive(Debug, Default)]
pub struct RuleStore {
    rules: Vec<Rule>,
    block: RuleIndex,
    exception: RuleIndex,
}

impl RuleStore {
    /// A store with no rules; every request is allowed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Index a set of parsed rules.
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        let mut block = RuleIndex::default();
        let mut exception = RuleIndex::default();

        for (rule_id, rule) in rules.iter().enumerate() {
            let rule_id = rule_id as u32;
            match rule.action {
                RuleAction::Block => block.insert(rule_id, rule),
                RuleAction::Allow => exception.insert(rule_id, rule),
            }
        }

        let store = Self {
            rules,
            block,
            exception,
        };

        let stats = store.stats();
        log::debug!(
            "indexed {} blocking rules ({} hosts, {} tokens, {} fallback) and {} exceptions",
            stats.block.rules,
            stats.block.host_keys,
            stats.block.token_keys,
            stats.block.fallback_rules,
            stats.exception.rules,
        );

        store
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.block.len
    }

    pub fn exception_count(&self) -> usize {
        self.exception.len
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            block: self.block.stats(),
            exception: self.exception.stats(),
        }
    }

    /// Rules of one partition that could match a request.
    ///
    /// `req_host` must be lowercased; `url_tokens` comes from
    /// [`tokenize_url`]. Each rule is yielded at most once.
    pub fn candidates<'s, 'q>(
        &'s self,
        action: RuleAction,
        req_host: &'q str,
        url_tokens: &'q [u32],
    ) -> impl Iterator<Item = &'s Rule> + 'q
    where
        's: 'q,
    {
        let index = match action {
            RuleAction::Block => &self.block,
            RuleAction::Allow => &self.exception,
        };

        let by_host = walk_host_suffixes(req_host)
            .filter_map(move |suffix| index.host.get(&hash_domain(suffix)))
            .flatten();
        let by_token = url_tokens
            .iter()
            .filter_map(move |token| index.token.get(token))
            .flatten();

        by_host
            .chain(by_token)
            .chain(index.fallback.iter())
            .map(move |&rule_id| &self.rules[rule_id as usize])
    }

    /// Blocking and exception rules that could match `url`.
    ///
    /// Convenience wrapper over [`RuleStore::candidates`] for diagnostics.
    pub fn candidate_rules(&self, url: &str) -> Vec<&Rule> {
        let host = extract_host(url).map(normalize_host).unwrap_or_default();
        let tokens = tokenize_url(url);

        self.candidates(RuleAction::Block, &host, &tokens)
            .chain(self.candidates(RuleAction::Allow, &host, &tokens))
            .collect()
    }
}
