//! Core type definitions for ShieldGate
//!
//! These types are shared by the classifier, the rule store, the matcher
//! and the engine.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// =============================================================================
// Rule Actions
// =============================================================================

/// Action to take for a matched rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RuleAction {
    /// Exception rule (@@...) - allows the request
    Allow = 0,
    /// Block rule - cancels the request
    Block = 1,
}

impl TryFrom<u8> for RuleAction {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Allow),
            1 => Ok(Self::Block),
            _ => Err(()),
        }
    }
}

// =============================================================================
// Rule Flags
// =============================================================================

bitflags::bitflags! {
    /// Flags for rule behavior.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RuleFlags: u16 {
        /// $explicitcancel - caller should abort an in-flight fetch
        const EXPLICIT_CANCEL = 1 << 0;
        /// Case-sensitive matching ($match-case)
        const MATCH_CASE = 1 << 1;
    }
}

// =============================================================================
// Resource Kinds (what the host application reports)
// =============================================================================

/// Resource kind as reported by the host for an outgoing fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Top level page
    MainFrame,
    /// Frame or iframe
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Favicon,
    FontResource,
    /// An "other" subresource
    SubResource,
    /// An object (or embed) tag for a plugin
    Object,
    Media,
    Xhr,
    /// `<a ping>` or `sendBeacon`
    Ping,
    Worker,
    SharedWorker,
    Prefetch,
    ServiceWorker,
    CspReport,
    PluginResource,
    NavigationPreload,
    /// No usable classification
    Invalid,
}

impl ResourceKind {
    /// Parse from a browser request type string.
    ///
    /// Unknown strings map to [`ResourceKind::Invalid`].
    pub fn from_str(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::MainFrame,
            "sub_frame" | "subdocument" => Self::SubFrame,
            "stylesheet" => Self::Stylesheet,
            "script" => Self::Script,
            "image" => Self::Image,
            "favicon" => Self::Favicon,
            "font" => Self::FontResource,
            "other" => Self::SubResource,
            "object" => Self::Object,
            "media" => Self::Media,
            "xmlhttprequest" | "xhr" => Self::Xhr,
            "ping" | "beacon" => Self::Ping,
            "worker" => Self::Worker,
            "shared_worker" => Self::SharedWorker,
            "prefetch" => Self::Prefetch,
            "service_worker" => Self::ServiceWorker,
            "csp_report" => Self::CspReport,
            "plugin_resource" => Self::PluginResource,
            "navigation_preload" => Self::NavigationPreload,
            _ => Self::Invalid,
        }
    }
}

// =============================================================================
// Categories (what rules are written against)
// =============================================================================

/// Canonical request category used by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Document,
    Subdocument,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    Media,
    Xhr,
    Ping,
    Other,
    /// No classification; only unrestricted rules apply
    None,
}

impl Category {
    /// Bit for this category. `None` has no bit, so it never satisfies a
    /// category-restricted rule.
    #[inline]
    pub const fn mask(self) -> CategoryMask {
        match self {
            Self::Document => CategoryMask::DOCUMENT,
            Self::Subdocument => CategoryMask::SUBDOCUMENT,
            Self::Stylesheet => CategoryMask::STYLESHEET,
            Self::Script => CategoryMask::SCRIPT,
            Self::Image => CategoryMask::IMAGE,
            Self::Font => CategoryMask::FONT,
            Self::Object => CategoryMask::OBJECT,
            Self::Media => CategoryMask::MEDIA,
            Self::Xhr => CategoryMask::XMLHTTPREQUEST,
            Self::Ping => CategoryMask::PING,
            Self::Other => CategoryMask::OTHER,
            Self::None => CategoryMask::empty(),
        }
    }
}

bitflags::bitflags! {
    /// Category bit mask for rule type filtering.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CategoryMask: u16 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const DOCUMENT = 1 << 6;     // main document
        const XMLHTTPREQUEST = 1 << 7;
        const FONT = 1 << 8;
        const MEDIA = 1 << 9;
        const PING = 1 << 10;

        /// All categories
        const ALL = 0x07FF;
    }
}

// =============================================================================
// Party
// =============================================================================

/// First/third-party relationship of a request to its initiating page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    FirstParty,
    ThirdParty,
}

impl Party {
    #[inline]
    pub const fn mask(self) -> PartyMask {
        match self {
            Self::FirstParty => PartyMask::FIRST_PARTY,
            Self::ThirdParty => PartyMask::THIRD_PARTY,
        }
    }
}

bitflags::bitflags! {
    /// Party (first-party / third-party) mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PartyMask: u8 {
        /// Matches first-party requests
        const FIRST_PARTY = 1 << 0;
        /// Matches third-party requests
        const THIRD_PARTY = 1 << 1;
        /// Matches both
        const ALL = Self::FIRST_PARTY.bits() | Self::THIRD_PARTY.bits();
    }
}

// =============================================================================
// Classification & Request
// =============================================================================

/// Canonical classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Classification {
    pub category: Category,
    pub party: Party,
}

impl Classification {
    /// Classification used for inputs that cannot be interpreted.
    pub const PERMISSIVE: Self = Self {
        category: Category::None,
        party: Party::ThirdParty,
    };
}

/// A resource fetch the host is about to perform.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Host of the page that initiated the fetch
    pub initiating_host: &'a str,
    /// Resource kind reported by the host
    pub kind: ResourceKind,
}

impl<'a> Request<'a> {
    pub fn new(url: &'a str, initiating_host: &'a str, kind: ResourceKind) -> Self {
        Self {
            url,
            initiating_host,
            kind,
        }
    }
}

/// Context for a request being matched against one rule store.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Request hostname, lowercased (empty if the URL has none)
    pub req_host: &'a str,
    /// Initiating page hostname, lowercased
    pub site_host: &'a str,
    /// Category and party of the request
    pub classification: Classification,
}

// =============================================================================
// Tags
// =============================================================================

/// Enabled opt-in tags; a rule with `$tag=name` only applies while `name`
/// is enabled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: HashSet<Box<str>>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Enable or disable a tag. Returns whether the set changed.
    pub fn set(&mut self, tag: &str, enabled: bool) -> bool {
        if enabled {
            self.tags.insert(tag.into())
        } else {
            self.tags.remove(tag)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Enabled tags in sorted order.
    pub fn to_sorted_vec(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.tags.iter().map(|t| t.to_string()).collect();
        tags.sort();
        tags
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(|t| t.as_ref().into()).collect(),
        }
    }
}

// =============================================================================
// Match Results
// =============================================================================

/// Result of evaluating one rule store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    /// A blocking rule matched and no exception overrode it
    pub matched_block: bool,
    /// An exception rule overrode a matching blocking rule
    pub matched_exception: bool,
    /// The blocking rule asks for an explicit cancel
    pub explicit_cancel: bool,
}

/// Final decision for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    /// No blocking rule matched, or an exception matched
    Allow,
    /// Request is blocked
    Block,
}

/// Result of running a request through the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub decision: MatchDecision,
    pub explicit_cancel: bool,
    pub matched_exception: bool,
}

impl Decision {
    pub const ALLOW: Self = Self {
        decision: MatchDecision::Allow,
        explicit_cancel: false,
        matched_exception: false,
    };

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.decision == MatchDecision::Block
    }
}

impl Default for Decision {
    fn default() -> Self {
        Self::ALLOW
    }
}

impl From<Verdict> for Decision {
    fn from(verdict: Verdict) -> Self {
        Self {
            decision: if verdict.matched_block {
                MatchDecision::Block
            } else {
                MatchDecision::Allow
            },
            explicit_cancel: verdict.matched_block && verdict.explicit_cancel,
            matched_exception: verdict.matched_exception,
        }
    }
}
