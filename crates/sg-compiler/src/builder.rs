use sg_core::rule::Rule;
use sg_core::store::RuleStore;
use thiserror::Error;

use crate::optimizer::optimize_rules;
use crate::parser::{parse_line, ParseError, ParsedLine, ParsedRule};

/// How unparseable lines are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParseMode {
    /// The first bad line fails the build
    Strict,
    /// Bad lines are skipped and counted
    #[default]
    Lenient,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub mode: ParseMode,
}

impl BuildOptions {
    pub fn strict() -> Self {
        Self {
            mode: ParseMode::Strict,
        }
    }

    pub fn lenient() -> Self {
        Self {
            mode: ParseMode::Lenient,
        }
    }
}

/// Line and rule counts from one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub lines: usize,
    /// Rules in the finished store
    pub rules: usize,
    pub comments: usize,
    pub cosmetic: usize,
    pub invalid: usize,
    pub deduped: usize,
    pub badfiltered: usize,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("line {line_number}: {reason}")]
    Parse { line_number: usize, reason: ParseError },

    #[error("filter list contains no usable rules")]
    EmptyRuleSet,
}

/// Build a rule store from filter list lines.
pub fn build_rule_store<I, S>(lines: I, options: &BuildOptions) -> Result<(RuleStore, BuildStats), BuildError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut stats = BuildStats::default();
    let mut parsed: Vec<ParsedRule> = Vec::new();

    for (index, line) in lines.into_iter().enumerate() {
        let line = line.as_ref();
        let line_number = index + 1;
        stats.lines += 1;

        match parse_line(line) {
            Ok(ParsedLine::Blank) => {}
            Ok(ParsedLine::Comment) => stats.comments += 1,
            Ok(ParsedLine::Cosmetic) => stats.cosmetic += 1,
            Ok(ParsedLine::Rule(rule)) => parsed.push(rule),
            Ok(ParsedLine::Hosts(rules)) => {
                parsed.extend(rules.into_iter().map(|rule| ParsedRule { rule, badfilter: false }))
            }
            Err(reason) => match options.mode {
                ParseMode::Strict => return Err(BuildError::Parse { line_number, reason }),
                ParseMode::Lenient => {
                    log::debug!("skipping line {line_number}: {reason}");
                    stats.invalid += 1;
                }
            },
        }
    }

    if parsed.is_empty() && options.mode == ParseMode::Lenient {
        return Err(BuildError::EmptyRuleSet);
    }

    let optimized = optimize_rules(&mut parsed);
    stats.deduped = optimized.deduped;
    stats.badfiltered = optimized.badfiltered_rules;

    let rules: Vec<Rule> = parsed.into_iter().map(|parsed| parsed.rule).collect();
    stats.rules = rules.len();

    log::info!(
        "built rule store: {} rules from {} lines ({} invalid, {} duplicates, {} badfiltered)",
        stats.rules,
        stats.lines,
        stats.invalid,
        stats.deduped,
        stats.badfiltered,
    );

    Ok((RuleStore::from_rules(rules), stats))
}

/// Build a rule store from the full text of a filter list.
pub fn build_rule_store_from_text(
    text: &str,
    options: &BuildOptions,
) -> Result<(RuleStore, BuildStats), BuildError> {
    build_rule_store(text.lines(), options)
}

#[cfg(test)]
mod tests {
    use sg_core::engine::Engine;
    use sg_core::types::{Decision, MatchDecision, Request, ResourceKind};

    use super::*;

    fn engine_for(list: &str) -> Engine {
        let (store, _) = build_rule_store_from_text(list, &BuildOptions::lenient()).expect("list should build");
        Engine::with_stores([store])
    }

    #[test]
    fn blocks_host_anchored_script() {
        let engine = engine_for("||ads.example.com^");
        let decision = engine.decide(&Request::new(
            "https://ads.example.com/banner.js",
            "news.example.com",
            ResourceKind::Script,
        ));
        assert_eq!(decision.decision, MatchDecision::Block);
        assert!(!decision.explicit_cancel);
        assert!(!decision.matched_exception);
    }

    #[test]
    fn exception_overrides_block() {
        let engine = engine_for("||ads.example.com^\n@@||ads.example.com/allowed.js");
        let decision = engine.decide(&Request::new(
            "https://ads.example.com/allowed.js",
            "news.example.com",
            ResourceKind::Script,
        ));
        assert_eq!(decision.decision, MatchDecision::Allow);
        assert!(decision.matched_exception);

        let decision = engine.decide(&Request::new(
            "https://ads.example.com/banner.js",
            "news.example.com",
            ResourceKind::Script,
        ));
        assert_eq!(decision.decision, MatchDecision::Block);
    }

    #[test]
    fn third_party_rule_skips_first_party() {
        let engine = engine_for("||tracker.com^$third-party");
        let decision = engine.decide(&Request::new(
            "https://tracker.com/pixel.gif",
            "tracker.com",
            ResourceKind::Image,
        ));
        assert_eq!(decision, Decision::ALLOW);

        let decision = engine.decide(&Request::new(
            "https://tracker.com/pixel.gif",
            "blog.example.org",
            ResourceKind::Image,
        ));
        assert!(decision.is_blocked());
    }

    #[test]
    fn explicit_cancel_rule() {
        let engine = engine_for("||evil.com^$script,explicitcancel");
        let decision = engine.decide(&Request::new("https://evil.com/x.js", "site.org", ResourceKind::Script));
        assert_eq!(decision.decision, MatchDecision::Block);
        assert!(decision.explicit_cancel);

        let decision = engine.decide(&Request::new("https://evil.com/x.png", "site.org", ResourceKind::Image));
        assert_eq!(decision, Decision::ALLOW);
    }

    #[test]
    fn empty_store_allows() {
        let (store, stats) =
            build_rule_store_from_text("! only comments\n\n", &BuildOptions::strict()).expect("strict build");
        assert!(store.is_empty());
        assert_eq!(stats.comments, 1);

        let engine = Engine::with_stores([store]);
        let decision = engine.decide(&Request::new("https://any.example/", "site.org", ResourceKind::Script));
        assert_eq!(decision, Decision::ALLOW);
    }

    #[test]
    fn replacing_store_with_empty_allows() {
        let engine = engine_for("||ads.example.com^");
        let request = Request::new("https://ads.example.com/banner.js", "news.example.com", ResourceKind::Script);
        assert!(engine.decide(&request).is_blocked());

        let (empty, _) = build_rule_store(Vec::<String>::new(), &BuildOptions::strict()).expect("empty strict build");
        engine.replace_rule_store(0, empty);
        assert!(!engine.decide(&request).is_blocked());
    }

    #[test]
    fn tag_gated_rule() {
        let engine = engine_for("||social.example^$tag=fb-embeds,subdocument");
        let request = Request::new("https://social.example/plugins/like", "blog.org", ResourceKind::SubFrame);

        assert!(!engine.decide(&request).is_blocked());
        engine.set_tag("fb-embeds", true);
        assert!(engine.decide(&request).is_blocked());
    }

    #[test]
    fn wildcard_and_domain_rules() {
        let engine = engine_for(
            "/ads/*/banner^\n||cdn.example.net^$domain=news.org|~sports.news.org,image\n0.0.0.0 hosts-blocked.test",
        );

        let script = |url| Request::new(url, "site.org", ResourceKind::Script);
        assert!(engine.decide(&script("https://site.org/ads/x/banner?id=1")).is_blocked());
        assert!(!engine.decide(&script("https://site.org/ads/x/banners")).is_blocked());
        assert!(engine.decide(&script("https://www.hosts-blocked.test/a.js")).is_blocked());

        let image = |source| Request::new("https://cdn.example.net/a.png", source, ResourceKind::Image);
        assert!(engine.decide(&image("www.news.org")).is_blocked());
        assert!(!engine.decide(&image("sports.news.org")).is_blocked());
        assert!(!engine.decide(&image("other.org")).is_blocked());
    }

    #[test]
    fn strict_mode_reports_line_number() {
        let list = "! header\n||a.com^\n||b.com^$redirect=noop.js\n||c.com^";
        let err = build_rule_store_from_text(list, &BuildOptions::strict()).unwrap_err();
        match err {
            BuildError::Parse { line_number, reason } => {
                assert_eq!(line_number, 3);
                assert_eq!(reason, ParseError::UnsupportedOption("redirect=noop.js".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn lenient_mode_counts_invalid_lines() {
        let list = "! header\n||a.com^\n||b.com^$redirect=noop.js\n/regex\\d/\nexample.com##.ad\n||c.com^\n||a.com^";
        let (store, stats) = build_rule_store_from_text(list, &BuildOptions::default()).expect("lenient build");
        assert_eq!(stats.lines, 7);
        assert_eq!(stats.invalid, 2);
        assert_eq!(stats.comments, 1);
        assert_eq!(stats.cosmetic, 1);
        assert_eq!(stats.deduped, 1);
        assert_eq!(stats.rules, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn lenient_mode_rejects_list_without_rules() {
        let err = build_rule_store_from_text("! nothing\n/bad\\d/\n", &BuildOptions::lenient()).unwrap_err();
        assert!(matches!(err, BuildError::EmptyRuleSet));
    }

    #[test]
    fn badfilter_removes_rule() {
        let engine = engine_for("||ads.example.com^\n||ads.example.com^$badfilter\n||other.example^");
        let request = Request::new("https://ads.example.com/banner.js", "site.org", ResourceKind::Script);
        assert!(!engine.decide(&request).is_blocked());
        assert_eq!(engine.rule_count(), 1);
    }

    #[test]
    fn match_case_rule() {
        let engine = engine_for("/BannerAd.$match-case");
        let image = |url| Request::new(url, "site.org", ResourceKind::Image);
        assert!(engine.decide(&image("https://site.org/BannerAd.png")).is_blocked());
        assert!(!engine.decide(&image("https://site.org/bannerad.png")).is_blocked());
    }
}
