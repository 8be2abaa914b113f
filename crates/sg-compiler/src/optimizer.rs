use std::collections::HashSet;

use sg_core::rule::Rule;

use crate::parser::ParsedRule;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub badfilter_rules: usize,
    pub badfiltered_rules: usize,
}

/// Apply `$badfilter` and drop duplicate rules, keeping first occurrences.
///
/// A badfilter entry disables every rule identical to it apart from the
/// `badfilter` option itself; the entry is never kept.
pub fn optimize_rules(rules: &mut Vec<ParsedRule>) -> OptimizeStats {
    let before = rules.len();
    let mut badfilter_keys: HashSet<Rule> = HashSet::new();
    let mut badfilter_rules = 0usize;

    for parsed in rules.iter() {
        if parsed.badfilter {
            badfilter_rules += 1;
            badfilter_keys.insert(parsed.rule.clone());
        }
    }

    let mut badfiltered_rules = 0usize;
    rules.retain(|parsed| {
        if parsed.badfilter {
            return false;
        }
        if badfilter_keys.contains(&parsed.rule) {
            badfiltered_rules += 1;
            return false;
        }
        true
    });

    let mut seen: HashSet<Rule> = HashSet::with_capacity(rules.len());
    let mut deduped = 0usize;
    rules.retain(|parsed| {
        if seen.insert(parsed.rule.clone()) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    OptimizeStats {
        before,
        after: rules.len(),
        deduped,
        badfilter_rules,
        badfiltered_rules,
    }
}
