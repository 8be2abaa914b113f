//! Filter list line parser
//!
//! Turns one line of ABP/uBO network filter syntax into a [`Rule`]. Comments,
//! list headers and cosmetic filters are recognised and reported so the
//! builder can count them; anything else that cannot be expressed as a
//! network rule is a [`ParseError`].

use std::net::IpAddr;

use sg_core::rule::{DomainConstraint, Pattern, Rule};
use sg_core::types::{CategoryMask, PartyMask, RuleAction, RuleFlags};
use thiserror::Error;

/// Why a line could not be turned into a rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unsupported option `{0}`")]
    UnsupportedOption(String),

    #[error("regular expression patterns are not supported")]
    RegexPattern,

    #[error("empty pattern without options")]
    EmptyPattern,

    #[error("pattern contains whitespace")]
    Whitespace,

    #[error("invalid domain `{0}`")]
    InvalidDomain(String),

    #[error("empty domain= option")]
    EmptyDomainOption,

    #[error("empty tag= option")]
    EmptyTag,

    #[error("{0} options exclude every request")]
    EmptyMask(&'static str),

    #[error("invalid hosts entry `{0}`")]
    InvalidHostsEntry(String),
}

/// A network rule plus the parse-time markers that do not survive into the
/// store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub rule: Rule,
    /// `$badfilter`: disables the identical rule instead of adding one
    pub badfilter: bool,
}

/// Outcome of parsing one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Blank,
    /// `!` comments, `[Adblock Plus]` headers and `#` hosts-file comments
    Comment,
    /// Element hiding and scriptlet filters; not network rules
    Cosmetic,
    Rule(ParsedRule),
    /// Hosts-file line; one block rule per listed name
    Hosts(Vec<Rule>),
}

/// Parse a single filter list line.
pub fn parse_line(raw_line: &str) -> Result<ParsedLine, ParseError> {
    let line = raw_line.trim();
    if line.is_empty() {
        return Ok(ParsedLine::Blank);
    }

    if is_cosmetic_line(line) {
        return Ok(ParsedLine::Cosmetic);
    }

    if is_comment_line(line) {
        return Ok(ParsedLine::Comment);
    }

    if let Some(names) = parse_hosts_file_line(line)? {
        if names.is_empty() {
            return Ok(ParsedLine::Comment);
        }
        let rules = names
            .iter()
            .map(|name| Rule::block(&format!("||{name}^")))
            .collect();
        return Ok(ParsedLine::Hosts(rules));
    }

    parse_network_rule(line).map(ParsedLine::Rule)
}

/// Parse every line of a filter list, skipping lines that fail.
///
/// Convenience for callers that do not need per-line diagnostics.
pub fn parse_filter_list(text: &str) -> Vec<ParsedRule> {
    let mut rules = Vec::new();
    for line in text.lines() {
        match parse_line(line) {
            Ok(ParsedLine::Rule(rule)) => rules.push(rule),
            Ok(ParsedLine::Hosts(hosts)) => rules.extend(hosts.into_iter().map(|rule| ParsedRule {
                rule,
                badfilter: false,
            })),
            Ok(_) => {}
            Err(err) => log::debug!("skipping `{line}`: {err}"),
        }
    }
    rules
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('[') || line.starts_with('#')
}

fn is_cosmetic_line(line: &str) -> bool {
    ["##", "#@#", "#?#", "#$#", "#@$#", "#@?#"]
        .iter()
        .any(|marker| line.contains(marker))
}

// =============================================================================
// Network Rules
// =============================================================================

fn parse_network_rule(line: &str) -> Result<ParsedRule, ParseError> {
    let (action, body) = match line.strip_prefix("@@") {
        Some(rest) => (RuleAction::Allow, rest.trim_start()),
        None => (RuleAction::Block, line),
    };

    let (pattern_text, options_text) = split_rule_options(body);
    let options = match options_text {
        Some(text) => parse_options(text)?,
        None => ParsedOptions::default(),
    };

    let pattern_text = pattern_text.trim();
    if pattern_text.is_empty() && options_text.is_none() {
        return Err(ParseError::EmptyPattern);
    }
    if pattern_text.bytes().any(|b| b.is_ascii_whitespace()) {
        return Err(ParseError::Whitespace);
    }
    if is_regex_pattern(pattern_text) {
        return Err(ParseError::RegexPattern);
    }

    let match_case = options.flags.contains(RuleFlags::MATCH_CASE);
    let rule = Rule {
        action,
        flags: options.flags,
        pattern: Pattern::parse(pattern_text, match_case),
        category_mask: options.category_mask,
        party_mask: options.party_mask,
        domain_constraints: options.domain_constraints,
        tag: options.tag,
    };

    Ok(ParsedRule {
        rule,
        badfilter: options.badfilter,
    })
}

/// Split `pattern$options` at the last `$`.
///
/// A `$` followed by something that cannot start an option list (as in
/// `/path$/`) stays part of the pattern.
fn split_rule_options(line: &str) -> (&str, Option<&str>) {
    match line.rfind('$') {
        Some(pos) if !line[pos + 1..].contains('/') => (&line[..pos], Some(&line[pos + 1..])),
        _ => (line, None),
    }
}

fn is_regex_pattern(pattern: &str) -> bool {
    pattern.len() > 1 && pattern.starts_with('/') && pattern.ends_with('/')
}

// =============================================================================
// Options
// =============================================================================

#[derive(Debug)]
struct ParsedOptions {
    flags: RuleFlags,
    category_mask: CategoryMask,
    party_mask: PartyMask,
    domain_constraints: Option<DomainConstraint>,
    tag: Option<Box<str>>,
    badfilter: bool,
}

impl Default for ParsedOptions {
    fn default() -> Self {
        Self {
            flags: RuleFlags::empty(),
            category_mask: CategoryMask::empty(),
            party_mask: PartyMask::empty(),
            domain_constraints: None,
            tag: None,
            badfilter: false,
        }
    }
}

fn parse_options(text: &str) -> Result<ParsedOptions, ParseError> {
    let mut options = ParsedOptions::default();
    let mut category_include = 0u16;
    let mut category_exclude = 0u16;
    let mut party_include = 0u16;
    let mut party_exclude = 0u16;

    for raw in text.split(',') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        // Tag names keep their case; everything else is case-insensitive
        if let Some(tag) = raw.strip_prefix("tag=") {
            if tag.is_empty() {
                return Err(ParseError::EmptyTag);
            }
            options.tag = Some(tag.into());
            continue;
        }

        let raw_lower = raw.to_ascii_lowercase();
        let raw_lower = raw_lower.as_str();

        match raw_lower {
            "explicitcancel" => {
                options.flags |= RuleFlags::EXPLICIT_CANCEL;
                continue;
            }
            "match-case" | "match_case" => {
                options.flags |= RuleFlags::MATCH_CASE;
                continue;
            }
            "badfilter" => {
                options.badfilter = true;
                continue;
            }
            _ => {}
        }

        if let Some(domain_value) = raw_lower.strip_prefix("domain=") {
            let parsed = parse_domain_option(domain_value)?;
            match &mut options.domain_constraints {
                Some(existing) => existing.merge(parsed),
                None => options.domain_constraints = Some(parsed),
            }
            continue;
        }

        let (negated, name) = match raw_lower.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw_lower),
        };

        if let Some(mask) = category_mask(name) {
            if negated {
                category_exclude |= mask.bits();
            } else {
                category_include |= mask.bits();
            }
            continue;
        }

        if let Some(mask) = party_mask(name) {
            if negated {
                party_exclude |= u16::from(mask.bits());
            } else {
                party_include |= u16::from(mask.bits());
            }
            continue;
        }

        return Err(ParseError::UnsupportedOption(raw.to_string()));
    }

    let category_bits = finalize_mask(category_include, category_exclude, CategoryMask::ALL.bits())
        .ok_or(ParseError::EmptyMask("type"))?;
    let party_bits = finalize_mask(party_include, party_exclude, u16::from(PartyMask::ALL.bits()))
        .ok_or(ParseError::EmptyMask("party"))?;

    options.category_mask = CategoryMask::from_bits_truncate(category_bits);
    options.party_mask = PartyMask::from_bits_truncate(party_bits as u8);
    Ok(options)
}

fn parse_domain_option(value: &str) -> Result<DomainConstraint, ParseError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();

    for raw in value.split('|') {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        let (is_exclude, domain_raw) = match raw.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let domain =
            normalize_domain(domain_raw).ok_or_else(|| ParseError::InvalidDomain(domain_raw.to_string()))?;
        if is_exclude {
            exclude.push(domain);
        } else {
            include.push(domain);
        }
    }

    if include.is_empty() && exclude.is_empty() {
        return Err(ParseError::EmptyDomainOption);
    }

    Ok(DomainConstraint::new(include, exclude))
}

/// Combine positive and negated options into one mask.
///
/// Returns `None` when nothing is left, and `0` (unrestricted) when every
/// bit is set.
fn finalize_mask(include: u16, exclude: u16, all: u16) -> Option<u16> {
    let include = include & all;
    let exclude = exclude & all;
    let mut mask = if include != 0 { include & !exclude } else { all & !exclude };
    if mask == 0 {
        return None;
    }
    if mask == all {
        mask = 0;
    }
    Some(mask)
}

fn category_mask(name: &str) -> Option<CategoryMask> {
    match name {
        "script" => Some(CategoryMask::SCRIPT),
        "image" => Some(CategoryMask::IMAGE),
        "stylesheet" | "css" => Some(CategoryMask::STYLESHEET),
        "object" => Some(CategoryMask::OBJECT),
        "subdocument" | "frame" => Some(CategoryMask::SUBDOCUMENT),
        "document" | "doc" => Some(CategoryMask::DOCUMENT),
        "xmlhttprequest" | "xhr" => Some(CategoryMask::XMLHTTPREQUEST),
        "media" => Some(CategoryMask::MEDIA),
        "font" => Some(CategoryMask::FONT),
        "ping" | "beacon" => Some(CategoryMask::PING),
        "other" => Some(CategoryMask::OTHER),
        _ => None,
    }
}

fn party_mask(name: &str) -> Option<PartyMask> {
    match name {
        "third-party" | "thirdparty" | "3p" => Some(PartyMask::THIRD_PARTY),
        "first-party" | "firstparty" | "1p" => Some(PartyMask::FIRST_PARTY),
        _ => None,
    }
}

// =============================================================================
// Hosts Files
// =============================================================================

const LOCAL_HOST_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "local",
    "broadcasthost",
    "ip6-localhost",
    "ip6-loopback",
    "0.0.0.0",
];

/// Parse `0.0.0.0 ads.example.com [more.names] [# comment]`.
///
/// Returns `Ok(None)` when the line is not a hosts entry at all, and an empty
/// list when it only names local hosts.
fn parse_hosts_file_line(line: &str) -> Result<Option<Vec<String>>, ParseError> {
    let entry = line.split('#').next().unwrap_or_default();
    let mut parts = entry.split_whitespace().peekable();
    let address = match parts.next() {
        Some(address) => address,
        None => return Ok(None),
    };
    // A bare address is a network rule, not a hosts entry
    if address.parse::<IpAddr>().is_err() || parts.peek().is_none() {
        return Ok(None);
    }

    let mut names = Vec::new();
    for name in parts {
        let normalized = normalize_domain(name).ok_or_else(|| ParseError::InvalidHostsEntry(name.to_string()))?;
        if !LOCAL_HOST_NAMES.contains(&normalized.as_str()) {
            names.push(normalized);
        }
    }
    Ok(Some(names))
}

fn normalize_domain(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(line: &str) -> ParsedRule {
        match parse_line(line) {
            Ok(ParsedLine::Rule(rule)) => rule,
            other => panic!("expected a rule for `{line}`, got {other:?}"),
        }
    }

    #[test]
    fn skips_comments_headers_and_cosmetics() {
        assert_eq!(parse_line(""), Ok(ParsedLine::Blank));
        assert_eq!(parse_line("   "), Ok(ParsedLine::Blank));
        assert_eq!(parse_line("! Title: EasyList"), Ok(ParsedLine::Comment));
        assert_eq!(parse_line("[Adblock Plus 2.0]"), Ok(ParsedLine::Comment));
        assert_eq!(parse_line("# hosts comment"), Ok(ParsedLine::Comment));
        assert_eq!(parse_line("example.com##.ad-banner"), Ok(ParsedLine::Cosmetic));
        assert_eq!(parse_line("##.sponsored"), Ok(ParsedLine::Cosmetic));
        assert_eq!(parse_line("example.com#@#.ad"), Ok(ParsedLine::Cosmetic));
        assert_eq!(parse_line("example.com#$#abort-on-property-read x"), Ok(ParsedLine::Cosmetic));
    }

    #[test]
    fn parses_block_and_exception_rules() {
        let block = rule("||ads.example.com^");
        assert_eq!(block.rule.action, RuleAction::Block);
        assert_eq!(block.rule.pattern.anchor_host(), Some("ads.example.com"));
        assert!(!block.badfilter);

        let exception = rule("@@||ads.example.com/allowed.js");
        assert!(exception.rule.is_exception());
        assert_eq!(exception.rule.pattern.raw(), "||ads.example.com/allowed.js");
    }

    #[test]
    fn parses_category_and_party_options() {
        let parsed = rule("||ads.example.com^$script,image,third-party");
        assert_eq!(parsed.rule.category_mask, CategoryMask::SCRIPT | CategoryMask::IMAGE);
        assert_eq!(parsed.rule.party_mask, PartyMask::THIRD_PARTY);

        let parsed = rule("||cdn.example.com^$~script,~third-party");
        assert_eq!(parsed.rule.category_mask, CategoryMask::ALL - CategoryMask::SCRIPT);
        assert_eq!(parsed.rule.party_mask, PartyMask::FIRST_PARTY);

        let parsed = rule("||x.com^$3p,1p");
        assert!(parsed.rule.party_mask.is_empty());
    }

    #[test]
    fn parses_flags_tag_and_badfilter() {
        let parsed = rule("||evil.com^$script,explicitcancel");
        assert!(parsed.rule.explicit_cancel());
        assert_eq!(parsed.rule.category_mask, CategoryMask::SCRIPT);

        let parsed = rule("||social.example^$tag=fb-embeds");
        assert_eq!(parsed.rule.tag.as_deref(), Some("fb-embeds"));

        let parsed = rule("/Banner.$match-case");
        assert!(parsed.rule.match_case());
        assert_eq!(parsed.rule.pattern.raw(), "/Banner.");

        let parsed = rule("||ads.example.com^$badfilter");
        assert!(parsed.badfilter);
        assert_eq!(parsed.rule, rule("||ads.example.com^").rule);
    }

    #[test]
    fn parses_domain_option() {
        let parsed = rule("||tracker.com^$domain=news.org|~Sports.News.org");
        let constraint = parsed.rule.domain_constraints.expect("domain constraint");
        assert!(constraint.matches("www.news.org"));
        assert!(!constraint.matches("sports.news.org"));
        assert!(!constraint.matches("other.org"));
    }

    #[test]
    fn options_follow_the_last_dollar() {
        let parsed = rule("/ad$banner$image");
        assert_eq!(parsed.rule.pattern.raw(), "/ad$banner");
        assert_eq!(parsed.rule.category_mask, CategoryMask::IMAGE);

        let parsed = rule("/path$/x.js");
        assert_eq!(parsed.rule.pattern.raw(), "/path$/x.js");
    }

    #[test]
    fn empty_pattern_with_options_is_accepted() {
        let parsed = rule("$script,domain=example.com");
        assert_eq!(parsed.rule.pattern.raw(), "");
        assert_eq!(parse_line("@@"), Err(ParseError::EmptyPattern));
    }

    #[test]
    fn rejects_unsupported_input() {
        assert_eq!(
            parse_line("||ads.example.com^$redirect=noop.js"),
            Err(ParseError::UnsupportedOption("redirect=noop.js".to_string()))
        );
        assert_eq!(
            parse_line("||ads.example.com^$important"),
            Err(ParseError::UnsupportedOption("important".to_string()))
        );
        assert_eq!(parse_line("/banner\\d+/"), Err(ParseError::RegexPattern));
        assert_eq!(parse_line("not a filter"), Err(ParseError::Whitespace));
        assert_eq!(parse_line("||x.com^$domain="), Err(ParseError::EmptyDomainOption));
        assert_eq!(
            parse_line("||x.com^$domain=bad*host"),
            Err(ParseError::InvalidDomain("bad*host".to_string()))
        );
        assert_eq!(parse_line("||x.com^$tag="), Err(ParseError::EmptyTag));
        assert_eq!(parse_line("||x.com^$script,~script"), Err(ParseError::EmptyMask("type")));
        assert_eq!(
            parse_line("||x.com^$~third-party,~first-party"),
            Err(ParseError::EmptyMask("party"))
        );
    }

    #[test]
    fn parses_hosts_file_lines() {
        match parse_line("0.0.0.0 ads.example.com tracker.net # ad servers") {
            Ok(ParsedLine::Hosts(rules)) => {
                let patterns: Vec<&str> = rules.iter().map(|r| r.pattern.raw()).collect();
                assert_eq!(patterns, vec!["||ads.example.com^", "||tracker.net^"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(parse_line("127.0.0.1 localhost"), Ok(ParsedLine::Comment));
        assert_eq!(parse_line("::1 ip6-localhost"), Ok(ParsedLine::Comment));

        match parse_line("192.168.1.1") {
            Ok(ParsedLine::Rule(parsed)) => assert_eq!(parsed.rule.pattern.raw(), "192.168.1.1"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            parse_line("0.0.0.0 bad/host"),
            Err(ParseError::InvalidHostsEntry("bad/host".to_string()))
        );
    }

    #[test]
    fn parse_filter_list_skips_bad_lines() {
        let rules = parse_filter_list("! header\n||a.com^\n||b.com^$redirect=x\n0.0.0.0 c.com\n");
        assert_eq!(rules.len(), 2);
    }
}
