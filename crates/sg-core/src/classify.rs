//! Resource classification
//!
//! Maps a host-reported resource kind to the category rules are written
//! against, and decides first/third-party by comparing registrable domains.
//! Classification never fails: anything it cannot interpret comes out as
//! [`Classification::PERMISSIVE`].

use crate::psl::is_same_site;
use crate::types::{Category, Classification, Party, ResourceKind};
use crate::url::{extract_host, normalize_host};

/// Category for a resource kind.
#[inline]
pub fn category_for(kind: ResourceKind) -> Category {
    match kind {
        ResourceKind::MainFrame => Category::Document,
        ResourceKind::SubFrame => Category::Subdocument,
        ResourceKind::Stylesheet => Category::Stylesheet,
        ResourceKind::Script => Category::Script,
        ResourceKind::Image | ResourceKind::Favicon => Category::Image,
        ResourceKind::FontResource => Category::Font,
        ResourceKind::SubResource => Category::Other,
        ResourceKind::Object => Category::Object,
        ResourceKind::Media => Category::Media,
        ResourceKind::Xhr => Category::Xhr,
        ResourceKind::Ping => Category::Ping,
        ResourceKind::Worker
        | ResourceKind::SharedWorker
        | ResourceKind::Prefetch
        | ResourceKind::ServiceWorker
        | ResourceKind::CspReport
        | ResourceKind::PluginResource
        | ResourceKind::NavigationPreload
        | ResourceKind::Invalid => Category::None,
    }
}

/// Classify a request from its raw URL and initiating host.
pub fn classify(kind: ResourceKind, request_url: &str, initiating_host: &str) -> Classification {
    let req_host = match extract_host(request_url) {
        Some(host) => normalize_host(host),
        None => return Classification::PERMISSIVE,
    };
    classify_hosts(kind, &req_host, &normalize_host(initiating_host))
}

/// Classify a request from already-normalized hosts.
pub fn classify_hosts(kind: ResourceKind, req_host: &str, site_host: &str) -> Classification {
    if req_host.is_empty() || site_host.is_empty() {
        return Classification::PERMISSIVE;
    }

    let party = if is_same_site(req_host, site_host) {
        Party::FirstParty
    } else {
        Party::ThirdParty
    };

    Classification {
        category: category_for(kind),
        party,
    }
}
