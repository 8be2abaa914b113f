//! Multi-store decision engine
//!
//! The engine owns an ordered list of rule store slots and the enabled tag
//! set. Both live in one immutable [`EngineState`] published through
//! [`ArcSwap`]: every `decide` call loads one snapshot and uses it for the
//! whole call, while writers publish a fresh state with `rcu`. Readers never
//! block and never see a half-applied update.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::classify::classify_hosts;
use crate::matcher::Matcher;
use crate::store::RuleStore;
use crate::types::{Decision, MatchDecision, Request, RequestContext, TagSet};
use crate::url::{extract_host, normalize_host, tokenize_url};

/// Receiver for rule stores built off the decision path.
///
/// Stores may arrive in any order; each delivery overwrites its slot.
pub trait RuleStoreSink: Send + Sync {
    fn deliver_rule_store(&self, index: usize, store: RuleStore);
}

/// Snapshot of engine state seen by one decision.
#[derive(Debug, Clone, Default)]
struct EngineState {
    stores: Vec<Option<Arc<RuleStore>>>,
    tags: Arc<TagSet>,
}

/// Request decision engine over independently updated rule stores.
pub struct Engine {
    state: ArcSwap<EngineState>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An engine with no stores; every request is allowed.
    pub fn new() -> Self {
        Self {
            state: ArcSwap::from_pointee(EngineState::default()),
        }
    }

    /// An engine with `count` empty slots.
    pub fn with_slots(count: usize) -> Self {
        Self {
            state: ArcSwap::from_pointee(EngineState {
                stores: vec![None; count],
                tags: Arc::default(),
            }),
        }
    }

    /// An engine owning the given stores, in order.
    pub fn with_stores(stores: impl IntoIterator<Item = RuleStore>) -> Self {
        Self {
            state: ArcSwap::from_pointee(EngineState {
                stores: stores.into_iter().map(|s| Some(Arc::new(s))).collect(),
                tags: Arc::default(),
            }),
        }
    }

    /// Decide whether a request should be blocked.
    ///
    /// Stores are consulted in slot order and the first blocking verdict
    /// wins. Empty slots allow everything.
    pub fn decide(&self, request: &Request<'_>) -> Decision {
        let state = self.state.load();
        if state.stores.iter().all(Option::is_none) {
            return Decision::ALLOW;
        }

        let req_host = extract_host(request.url).map(normalize_host).unwrap_or_default();
        let site_host = normalize_host(request.initiating_host);
        let ctx = RequestContext {
            url: request.url,
            req_host: &req_host,
            site_host: &site_host,
            classification: classify_hosts(request.kind, &req_host, &site_host),
        };
        let tokens = tokenize_url(request.url);

        let mut matched_exception = false;
        for store in state.stores.iter().flatten() {
            let verdict = Matcher::new(store, &state.tags).evaluate_with_tokens(&ctx, &tokens);
            if verdict.matched_block {
                return Decision::from(verdict);
            }
            matched_exception |= verdict.matched_exception;
        }

        Decision {
            decision: MatchDecision::Allow,
            explicit_cancel: false,
            matched_exception,
        }
    }

    /// Enable or disable a tag for subsequent decisions.
    pub fn set_tag(&self, tag: &str, enabled: bool) {
        self.state.rcu(|current| {
            let mut tags = TagSet::clone(&current.tags);
            tags.set(tag, enabled);
            EngineState {
                stores: current.stores.clone(),
                tags: Arc::new(tags),
            }
        });
        log::info!("tag {tag} {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Atomically replace the store in one slot, growing the slot list if
    /// needed.
    pub fn replace_rule_store(&self, index: usize, store: RuleStore) {
        let rules = store.len();
        self.publish_slot(index, Some(Arc::new(store)));
        log::info!("published rule store in slot {index} ({rules} rules)");
    }

    /// Empty one slot; it then allows every request.
    pub fn clear_rule_store(&self, index: usize) {
        self.publish_slot(index, None);
        log::info!("cleared rule store slot {index}");
    }

    fn publish_slot(&self, index: usize, store: Option<Arc<RuleStore>>) {
        self.state.rcu(|current| {
            let mut next = EngineState::clone(current);
            if next.stores.len() <= index {
                next.stores.resize(index + 1, None);
            }
            next.stores[index] = store.clone();
            next
        });
    }

    /// Store currently published in a slot.
    pub fn rule_store(&self, index: usize) -> Option<Arc<RuleStore>> {
        self.state.load().stores.get(index).cloned().flatten()
    }

    pub fn slot_count(&self) -> usize {
        self.state.load().stores.len()
    }

    /// Total rules across all published stores.
    pub fn rule_count(&self) -> usize {
        self.state.load().stores.iter().flatten().map(|s| s.len()).sum()
    }

    pub fn is_tag_enabled(&self, tag: &str) -> bool {
        self.state.load().tags.contains(tag)
    }

    /// Enabled tags in sorted order.
    pub fn enabled_tags(&self) -> Vec<String> {
        self.state.load().tags.to_sorted_vec()
    }
}

impl RuleStoreSink for Engine {
    fn deliver_rule_store(&self, index: usize, store: RuleStore) {
        self.replace_rule_store(index, store);
    }
}

impl<T: RuleStoreSink + ?Sized> RuleStoreSink for Arc<T> {
    fn deliver_rule_store(&self, index: usize, store: RuleStore) {
        (**self).deliver_rule_store(index, store);
    }
}
