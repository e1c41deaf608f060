//! Hypermedia link containers
//!
//! Bitbucket 2.0 payloads keep their links under `links`; HAL documents (and the
//! entry point) use `_links`. Both are merged into one relation -> href set.

use serde_json::Value;
use std::collections::BTreeMap;

/// Keys that may hold a link container, merged in this order
pub const LINK_CONTAINER_KEYS: [&str; 2] = ["links", "_links"];

/// Relations bound to single-shot operations instead of traversals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SpecialAction {
    Approve,
    Decline,
    Merge,
    Diff,
}

impl SpecialAction {
    pub const ALL: [SpecialAction; 4] = [Self::Approve, Self::Decline, Self::Merge, Self::Diff];

    pub fn from_relation(name: &str) -> Option<Self> {
        match name {
            "approve" => Some(Self::Approve),
            "decline" => Some(Self::Decline),
            "merge" => Some(Self::Merge),
            "diff" => Some(Self::Diff),
            _ => None,
        }
    }

    pub fn relation(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Decline => "decline",
            Self::Merge => "merge",
            Self::Diff => "diff",
        }
    }
}

/// Every `(relation, href)` pair in the payload's link containers.
///
/// Relations that are not `{"href": "<url>"}` objects, such as the `clone` list of
/// named URLs, cannot be traversed and are skipped. When both containers name the
/// same relation the later (`_links`) entry wins.
pub fn links_from(data: &Value) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();

    for key in LINK_CONTAINER_KEYS {
        let Some(container) = data.get(key).and_then(Value::as_object) else {
            continue;
        };
        for (name, body) in container {
            match body.get("href").and_then(Value::as_str) {
                Some(href) if body.is_object() => {
                    links.insert(name.clone(), href.to_string());
                }
                _ => tracing::trace!("Skipping non-traversable link '{}'", name),
            }
        }
    }

    links
}

/// The `clone` relation's `name -> href` pairs (`https`, `ssh`, ...)
pub fn clone_urls(data: &Value) -> BTreeMap<String, String> {
    LINK_CONTAINER_KEYS
        .iter()
        .filter_map(|key| data.get(*key)?.get("clone")?.as_array())
        .flatten()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?;
            let href = entry.get("href")?.as_str()?;
            Some((name.to_string(), href.to_string()))
        })
        .collect()
}
