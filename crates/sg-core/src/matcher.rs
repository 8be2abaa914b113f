//! Core Matching Engine
//!
//! This is the hot path - every request goes through here, once per rule
//! store. Candidates come from the store's index; each is verified against
//! its options and its pattern program.

use crate::rule::{AnchorType, Pattern, PatternOp, Rule};
use crate::store::RuleStore;
use crate::types::{RequestContext, RuleAction, TagSet, Verdict};
use crate::url::{get_host_position, is_at_separator, tokenize_url};

// =============================================================================
// Matcher
// =============================================================================

/// Evaluates requests against one rule store under one tag set.
pub struct Matcher<'a> {
    store: &'a RuleStore,
    tags: &'a TagSet,
}

impl<'a> Matcher<'a> {
    /// Create a new matcher over a store.
    pub fn new(store: &'a RuleStore, tags: &'a TagSet) -> Self {
        Self { store, tags }
    }

    /// Match a request and return the verdict.
    pub fn evaluate(&self, ctx: &RequestContext<'_>) -> Verdict {
        if self.store.is_empty() {
            return Verdict::default();
        }
        let tokens = tokenize_url(ctx.url);
        self.evaluate_with_tokens(ctx, &tokens)
    }

    /// Match a request whose URL has already been tokenized.
    ///
    /// Exceptions outrank blocks unconditionally: if any blocking rule and
    /// any exception rule match, the request is allowed.
    pub fn evaluate_with_tokens(&self, ctx: &RequestContext<'_>, url_tokens: &[u32]) -> Verdict {
        if self.store.is_empty() {
            return Verdict::default();
        }

        let host_range = get_host_position(ctx.url);

        // Step 1: Collect matching blocking rules
        let mut matched_block = false;
        let mut explicit_cancel = false;
        for rule in self.store.candidates(RuleAction::Block, ctx.req_host, url_tokens) {
            if self.rule_matches(rule, ctx, host_range) {
                matched_block = true;
                explicit_cancel |= rule.explicit_cancel();
                if explicit_cancel {
                    break;
                }
            }
        }

        if !matched_block {
            return Verdict::default();
        }

        // Step 2: Any matching exception overrides the block
        let matched_exception = self
            .store
            .candidates(RuleAction::Allow, ctx.req_host, url_tokens)
            .any(|rule| self.rule_matches(rule, ctx, host_range));

        if matched_exception {
            return Verdict {
                matched_block: false,
                matched_exception: true,
                explicit_cancel: false,
            };
        }

        Verdict {
            matched_block: true,
            matched_exception: false,
            explicit_cancel,
        }
    }

    /// Every rule in the store that matches the request, in index order.
    pub fn matching_rules(&self, ctx: &RequestContext<'_>) -> Vec<&'a Rule> {
        let tokens = tokenize_url(ctx.url);
        let host_range = get_host_position(ctx.url);
        let store: &'a RuleStore = self.store;

        store
            .candidates(RuleAction::Block, ctx.req_host, &tokens)
            .chain(store.candidates(RuleAction::Allow, ctx.req_host, &tokens))
            .filter(|rule| self.rule_matches(rule, ctx, host_range))
            .collect()
    }

    fn rule_matches(
        &self,
        rule: &Rule,
        ctx: &RequestContext<'_>,
        host_range: Option<(usize, usize)>,
    ) -> bool {
        // Quick option checks first
        if !self.check_rule_options(rule, ctx) {
            return false;
        }

        if let Some(constraint) = &rule.domain_constraints {
            if !constraint.matches(ctx.site_host) {
                return false;
            }
        }

        verify_pattern(&rule.pattern, ctx.url.as_bytes(), host_range, rule.match_case())
    }

    /// Check if a rule's options match the request context.
    fn check_rule_options(&self, rule: &Rule, ctx: &RequestContext<'_>) -> bool {
        // Category mask
        if !rule.category_mask.is_empty()
            && !rule.category_mask.intersects(ctx.classification.category.mask())
        {
            return false;
        }

        // Party mask
        if !rule.party_mask.is_empty() && !rule.party_mask.intersects(ctx.classification.party.mask()) {
            return false;
        }

        // Tag gate
        match &rule.tag {
            Some(tag) => self.tags.contains(tag),
            None => true,
        }
    }
}

// =============================================================================
// Pattern Verification
// =============================================================================

/// Verify a URL against a compiled pattern program.
///
/// The program is split at each `*` into segments of literals and
/// separators. Every segment before the last is placed at its leftmost
/// occurrence, which never rules out a match a later placement would allow,
/// so verification is linear in the number of segments.
pub fn verify_pattern(
    pattern: &Pattern,
    url: &[u8],
    host_range: Option<(usize, usize)>,
    match_case: bool,
) -> bool {
    let ops = pattern.ops();
    let right_anchor = pattern.right_anchor();

    match pattern.anchor() {
        AnchorType::Left => match_anchored(ops, url, 0, right_anchor, match_case),

        AnchorType::Hostname => {
            // Start at the hostname or right after any '.' inside it
            let (host_start, host_end) = match host_range {
                Some(range) => range,
                None => return false,
            };
            if match_anchored(ops, url, host_start, right_anchor, match_case) {
                return true;
            }
            (host_start..host_end)
                .filter(|&i| url[i] == b'.')
                .any(|i| match_anchored(ops, url, i + 1, right_anchor, match_case))
        }

        AnchorType::None => match_floating(ops, url, 0, right_anchor, match_case),
    }
}

/// Split off the ops before the first `*`, returning the ops after it.
fn split_segment(ops: &[PatternOp]) -> (&[PatternOp], Option<&[PatternOp]>) {
    match ops.iter().position(|op| matches!(op, PatternOp::SkipAny)) {
        Some(i) => (&ops[..i], Some(&ops[i + 1..])),
        None => (ops, None),
    }
}

/// Match the program with its first segment starting exactly at `pos`.
fn match_anchored(ops: &[PatternOp], url: &[u8], pos: usize, right_anchor: bool, match_case: bool) -> bool {
    let (head, rest) = split_segment(ops);
    let end = match match_segment(head, url, pos, match_case) {
        Some(end) => end,
        None => return false,
    };
    match rest {
        Some(rest) => match_floating(rest, url, end, right_anchor, match_case),
        None => !right_anchor || end == url.len(),
    }
}

/// Match the program with its first segment starting anywhere from `pos`.
fn match_floating(
    mut ops: &[PatternOp],
    url: &[u8],
    mut pos: usize,
    right_anchor: bool,
    match_case: bool,
) -> bool {
    loop {
        let (segment, rest) = split_segment(ops);
        match rest {
            Some(rest) => match find_segment(segment, url, pos, match_case) {
                Some(end) => {
                    pos = end;
                    ops = rest;
                }
                None => return false,
            },
            // The last segment has to end exactly at the end of the URL
            None if right_anchor => {
                return (pos..=url.len()).any(|start| match_segment(segment, url, start, match_case) == Some(url.len()))
            }
            None => return find_segment(segment, url, pos, match_case).is_some(),
        }
    }
}

/// Match a `*`-free run of ops at `pos`, returning where it ends.
fn match_segment(segment: &[PatternOp], url: &[u8], mut pos: usize, match_case: bool) -> Option<usize> {
    for op in segment {
        match op {
            PatternOp::Literal(lit) => {
                let lit = lit.as_bytes();
                let end = pos + lit.len();
                if end > url.len() || !bytes_equal(&url[pos..end], lit, match_case) {
                    return None;
                }
                pos = end;
            }
            PatternOp::Separator => {
                if !is_at_separator(url, pos) {
                    return None;
                }
                // '^' also matches the end of the URL without consuming anything
                if pos < url.len() {
                    pos += 1;
                }
            }
            PatternOp::SkipAny => return None,
        }
    }
    Some(pos)
}

/// Leftmost match of a segment starting at or after `from`, returning its end.
fn find_segment(segment: &[PatternOp], url: &[u8], from: usize, match_case: bool) -> Option<usize> {
    match segment.first() {
        Some(PatternOp::Literal(lit)) => {
            let mut start = from;
            while start <= url.len() {
                let found = find_literal(&url[start..], lit.as_bytes(), match_case)?;
                if let Some(end) = match_segment(segment, url, start + found, match_case) {
                    return Some(end);
                }
                start += found + 1;
            }
            None
        }
        _ => (from..=url.len()).find_map(|start| match_segment(segment, url, start, match_case)),
    }
}

#[inline]
fn bytes_equal(haystack: &[u8], needle: &[u8], match_case: bool) -> bool {
    if match_case {
        haystack == needle
    } else {
        haystack.eq_ignore_ascii_case(needle)
    }
}

fn find_literal(haystack: &[u8], needle: &[u8], match_case: bool) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }

    let last = haystack.len() - needle.len();
    (0..=last).find(|&i| bytes_equal(&haystack[i..i + needle.len()], needle, match_case))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::DomainConstraint;
    use crate::types::{Category, CategoryMask, Classification, Party, PartyMask};

    fn ctx<'a>(url: &'a str, req_host: &'a str, site_host: &'a str, category: Category, party: Party) -> RequestContext<'a> {
        RequestContext {
            url,
            req_host,
            site_host,
            classification: Classification { category, party },
        }
    }

    fn matches(pattern: &str, url: &str) -> bool {
        let pattern = Pattern::parse(pattern, false);
        verify_pattern(&pattern, url.as_bytes(), get_host_position(url), false)
    }

    #[test]
    fn host_anchor_matches_label_boundaries() {
        assert!(matches("||ads.example.com^", "https://ads.example.com/banner.js"));
        assert!(matches("||ads.example.com^", "https://cdn.ads.example.com/x"));
        assert!(matches("||ads.example.com^", "https://ads.example.com"));
        assert!(matches("||ads.example.com^", "https://ads.example.com:8443/"));
        assert!(!matches("||ads.example.com^", "https://badads.example.com/"));
        assert!(!matches("||ads.example.com^", "https://ads.example.com.evil.net/"));
        assert!(!matches("||ads.example.com^", "https://site.com/?u=ads.example.com/"));
    }

    #[test]
    fn host_anchor_with_path() {
        assert!(matches("||ads.example.com/allowed.js", "https://ads.example.com/allowed.js"));
        assert!(!matches("||ads.example.com/allowed.js", "https://ads.example.com/other.js"));
    }

    #[test]
    fn wildcards_and_separators() {
        assert!(matches("/ads/*/banner^", "https://site.com/ads/x/y/banner?id=1"));
        assert!(matches("/ads/*/banner^", "https://site.com/ads/x/banner"));
        assert!(!matches("/ads/*/banner^", "https://site.com/ads/x/banners"));
        assert!(matches("&ad_*=", "https://site.com/?a=1&ad_type=2"));
    }

    #[test]
    fn left_and_right_anchors() {
        assert!(matches("|https://ads.", "https://ads.example.com/"));
        assert!(!matches("|https://ads.", "http://x.com/?https://ads."));
        assert!(matches(".gif|", "https://site.com/pixel.gif"));
        assert!(!matches(".gif|", "https://site.com/pixel.gif?x=1"));
    }

    #[test]
    fn case_insensitive_by_default() {
        assert!(matches("/BANNER/", "https://site.com/banner/1.png"));
        let cased = Pattern::parse("/Banner/", true);
        let url = "https://site.com/banner/1.png";
        assert!(!verify_pattern(&cased, url.as_bytes(), get_host_position(url), true));
    }

    #[test]
    fn empty_pattern_matches_everything() {
        assert!(matches("", "https://anything.com/"));
        assert!(matches("*", "https://anything.com/"));
    }

    #[test]
    fn wildcard_segments_need_not_take_first_occurrence() {
        assert!(matches("/ad*.js|", "https://site.com/ad/x.js?y=.js"));
        assert!(!matches("/ad*.js|", "https://site.com/ad/x.js?y=1"));
        assert!(matches("||cdn.example.net/*/pixel^", "https://cdn.example.net/a/pixel.b/pixel"));
        assert!(matches("|https://*/track*^", "https://site.com/tracking/track?x"));
        assert!(matches("ad*ad*ad", "https://site.com/adadad"));
        assert!(!matches("ad*ad*ad", "https://site.com/adad"));
    }

    #[test]
    fn repeated_wildcards_stay_linear() {
        let url = format!("https://site.org/{}", "/ad".repeat(2000));
        let start = std::time::Instant::now();
        assert!(!matches("/ad*ad*ad*ad*zz", &url));
        assert!(!matches("*ad*ad*ad*zz|", &url));
        assert!(!matches("||site.org/*ad*ad*ad^zz", &url));
        assert!(matches("/ad*ad*ad*ad", &url));
        assert!(
            start.elapsed() < std::time::Duration::from_millis(250),
            "wildcard verification took {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn first_party_only_rule() {
        let store = RuleStore::from_rules(vec![Rule::block("||cdn.example.net^").with_party(PartyMask::FIRST_PARTY)]);
        let tags = TagSet::new();
        let matcher = Matcher::new(&store, &tags);
        let url = "https://cdn.example.net/app.js";

        assert!(matcher.evaluate(&ctx(url, "cdn.example.net", "www.example.net", Category::Script, Party::FirstParty)).matched_block);
        assert!(!matcher.evaluate(&ctx(url, "cdn.example.net", "other.org", Category::Script, Party::ThirdParty)).matched_block);
    }

    #[test]
    fn exception_overrides_block() {
        let store = RuleStore::from_rules(vec![
            Rule::block("||ads.example.com^"),
            Rule::exception("||ads.example.com/allowed.js"),
        ]);
        let tags = TagSet::new();
        let matcher = Matcher::new(&store, &tags);

        let allowed = matcher.evaluate(&ctx(
            "https://ads.example.com/allowed.js",
            "ads.example.com",
            "news.example.com",
            Category::Script,
            Party::FirstParty,
        ));
        assert!(!allowed.matched_block);
        assert!(allowed.matched_exception);

        let blocked = matcher.evaluate(&ctx(
            "https://ads.example.com/other.js",
            "ads.example.com",
            "news.example.com",
            Category::Script,
            Party::FirstParty,
        ));
        assert!(blocked.matched_block);
        assert!(!blocked.matched_exception);
        assert!(!blocked.explicit_cancel);
    }

    #[test]
    fn exception_alone_is_not_reported() {
        let store = RuleStore::from_rules(vec![Rule::exception("||cdn.example.com^")]);
        let tags = TagSet::new();
        let verdict = Matcher::new(&store, &tags).evaluate(&ctx(
            "https://cdn.example.com/lib.js",
            "cdn.example.com",
            "example.com",
            Category::Script,
            Party::FirstParty,
        ));
        assert_eq!(verdict, Verdict::default());
    }

    #[test]
    fn explicit_cancel_from_any_matching_block() {
        let store = RuleStore::from_rules(vec![
            Rule::block("||evil.com^"),
            Rule::block("||evil.com^").with_categories(CategoryMask::SCRIPT).with_explicit_cancel(),
        ]);
        let tags = TagSet::new();
        let matcher = Matcher::new(&store, &tags);

        let script = matcher.evaluate(&ctx("https://evil.com/x.js", "evil.com", "site.org", Category::Script, Party::ThirdParty));
        assert!(script.matched_block);
        assert!(script.explicit_cancel);

        let image = matcher.evaluate(&ctx("https://evil.com/x.png", "evil.com", "site.org", Category::Image, Party::ThirdParty));
        assert!(image.matched_block);
        assert!(!image.explicit_cancel);
    }

    #[test]
    fn category_party_and_domain_constraints() {
        let store = RuleStore::from_rules(vec![Rule::block("||tracker.com^")
            .with_categories(CategoryMask::IMAGE)
            .with_party(PartyMask::THIRD_PARTY)
            .with_domains(DomainConstraint::new(["news.org"], ["sports.news.org"]))]);
        let tags = TagSet::new();
        let matcher = Matcher::new(&store, &tags);
        let url = "https://tracker.com/p.gif";

        assert!(matcher.evaluate(&ctx(url, "tracker.com", "www.news.org", Category::Image, Party::ThirdParty)).matched_block);
        assert!(!matcher.evaluate(&ctx(url, "tracker.com", "www.news.org", Category::Script, Party::ThirdParty)).matched_block);
        assert!(!matcher.evaluate(&ctx(url, "tracker.com", "tracker.com", Category::Image, Party::FirstParty)).matched_block);
        assert!(!matcher.evaluate(&ctx(url, "tracker.com", "sports.news.org", Category::Image, Party::ThirdParty)).matched_block);
        assert!(!matcher.evaluate(&ctx(url, "tracker.com", "other.org", Category::Image, Party::ThirdParty)).matched_block);
        // unclassified requests never satisfy a category-restricted rule
        assert!(!matcher.evaluate(&ctx(url, "tracker.com", "www.news.org", Category::None, Party::ThirdParty)).matched_block);
    }

    #[test]
    fn tag_gated_rules() {
        let store = RuleStore::from_rules(vec![Rule::block("||social.example^").with_tag("fb-embeds")]);
        let request = ctx("https://social.example/w.js", "social.example", "blog.org", Category::Script, Party::ThirdParty);

        let disabled = TagSet::new();
        assert!(!Matcher::new(&store, &disabled).evaluate(&request).matched_block);

        let enabled: TagSet = ["fb-embeds"].into_iter().collect();
        assert!(Matcher::new(&store, &enabled).evaluate(&request).matched_block);
    }

    #[test]
    fn matching_rules_lists_both_kinds() {
        let store = RuleStore::from_rules(vec![
            Rule::block("||ads.example.com^"),
            Rule::exception("||ads.example.com/allowed.js"),
            Rule::block("/never/"),
        ]);
        let tags = TagSet::new();
        let found = Matcher::new(&store, &tags).matching_rules(&ctx(
            "https://ads.example.com/allowed.js",
            "ads.example.com",
            "example.com",
            Category::Script,
            Party::FirstParty,
        ));
        assert_eq!(found.len(), 2);
    }
}
