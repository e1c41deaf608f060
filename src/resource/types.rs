//! Built-in resource shapes
//!
//! Each shape has a positive marker: the fields (or canonical self URL) that
//! identify it. A built-in predicate accepts a payload only when its own marker
//! matches and no sibling marker does, so two built-ins never both accept the
//! same payload.

use super::registry::{ResourceKind, ResourceType};
use serde_json::Value;
use std::cell::OnceCell;
use url::Url;

type Marker = fn(&Candidate<'_>) -> bool;

/// Built-in markers, in classification priority order
static MARKERS: &[(ResourceKind, &str, Marker)] = &[
    (ResourceKind::Team, "username", is_team_like),
    (ResourceKind::User, "username", is_user_like),
    (ResourceKind::Repository, "full_name", is_repository_like),
    (ResourceKind::RepositoryV1, "name", is_repository_v1_like),
    (ResourceKind::Commit, "hash", is_commit_like),
    (ResourceKind::PullRequest, "id", is_pull_request_like),
    (ResourceKind::Snippet, "id", is_snippet_like),
    (ResourceKind::Comment, "id", is_comment_like),
    (ResourceKind::Hook, "uuid", is_hook_like),
    (ResourceKind::BuildStatus, "key", is_build_status_like),
    (ResourceKind::BranchRestriction, "id", is_branch_restriction_like),
    (ResourceKind::Tag, "name", is_tag_like),
    (ResourceKind::Branch, "name", is_branch_like),
    (ResourceKind::Consumer, "id", is_consumer_like),
];

/// Descriptors for every built-in shape
pub fn builtin_types() -> Vec<ResourceType> {
    MARKERS
        .iter()
        .map(|&(kind, id_attribute, _)| ResourceType::builtin(kind, id_attribute))
        .collect()
}

/// Id attribute of a built-in kind
pub fn id_attribute_for(kind: ResourceKind) -> Option<&'static str> {
    MARKERS
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, id, _)| *id)
}

/// The one built-in shape whose marker `data` carries.
///
/// Evaluates every marker once. A payload carrying two markers has no built-in kind.
pub fn builtin_kind(data: &Value) -> Option<ResourceKind> {
    let candidate = Candidate::new(data);
    let mut hit = None;
    for (kind, _, marker) in MARKERS {
        if marker(&candidate) {
            if hit.is_some() {
                return None;
            }
            hit = Some(*kind);
        }
    }
    hit
}

/// A payload under classification. Its self URL is parsed at most once.
struct Candidate<'a> {
    data: &'a Value,
    self_segments: OnceCell<Option<Vec<String>>>,
}

impl<'a> Candidate<'a> {
    fn new(data: &'a Value) -> Self {
        Self {
            data,
            self_segments: OnceCell::new(),
        }
    }

    fn present(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|v| !v.is_null())
    }

    fn has_link_container(&self) -> bool {
        self.present("links") || self.present("_links")
    }

    fn type_is(&self, name: &str) -> bool {
        self.data.get("type").and_then(Value::as_str) == Some(name)
    }

    fn self_segments(&self) -> Option<&[String]> {
        self.self_segments
            .get_or_init(|| self_path_segments(self.data))
            .as_deref()
    }

    fn has_v2_self_url(&self, resource_type: &str, id_attribute: &str) -> bool {
        match self.self_segments() {
            Some(segments) => self_url_matches(segments, self.data, resource_type, id_attribute),
            None => false,
        }
    }
}

/// Does `links.self.href` end in `.../{resource_type}/{id}`?
///
/// Ids containing `/` (such as a repository's `owner/slug`) must match that many
/// trailing path segments, and the segment before them must be `resource_type`.
pub fn has_v2_self_url(data: &Value, resource_type: &str, id_attribute: &str) -> bool {
    Candidate::new(data).has_v2_self_url(resource_type, id_attribute)
}

fn self_path_segments(data: &Value) -> Option<Vec<String>> {
    let href = data.pointer("/links/self/href").and_then(Value::as_str)?;
    let path = match Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.split(['?', '#']).next().unwrap_or(href).to_string(),
    };
    Some(
        path.trim_end_matches('/')
            .split('/')
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect(),
    )
}

fn self_url_matches(
    segments: &[String],
    data: &Value,
    resource_type: &str,
    id_attribute: &str,
) -> bool {
    let id = match data.get(id_attribute) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return false,
    };

    let id_parts: Vec<&str> = id.split('/').collect();
    if segments.len() <= id_parts.len() {
        return false;
    }

    let type_position = segments.len() - id_parts.len() - 1;
    segments[type_position + 1..]
        .iter()
        .zip(&id_parts)
        .all(|(segment, part)| segment == part)
        && segments[type_position] == resource_type
}

fn is_team_like(c: &Candidate<'_>) -> bool {
    c.type_is("team")
}

fn is_user_like(c: &Candidate<'_>) -> bool {
    c.present("username") && !c.type_is("team")
}

fn is_repository_like(c: &Candidate<'_>) -> bool {
    c.has_v2_self_url("repositories", "full_name")
}

fn is_repository_v1_like(c: &Candidate<'_>) -> bool {
    c.present("resource_uri") && c.present("scm") && c.present("slug") && !c.has_link_container()
}

fn is_commit_like(c: &Candidate<'_>) -> bool {
    c.present("links")
        && c.present("hash")
        && !c.present("scm")
        && !c.present("source")
        && !c.present("destination")
}

fn is_pull_request_like(c: &Candidate<'_>) -> bool {
    c.present("links") && c.present("source") && c.present("destination") && !c.present("scm")
}

fn is_snippet_like(c: &Candidate<'_>) -> bool {
    // Paged snippet listings omit `scm`, so it can't be the discriminator
    c.present("links")
        && c.present("id")
        && (c.present("creator") || c.present("is_unlisted"))
        && !c.present("content")
        && !c.present("_type")
}

fn is_comment_like(c: &Candidate<'_>) -> bool {
    c.present("id") && c.present("content") && c.present("snippet")
}

fn is_hook_like(c: &Candidate<'_>) -> bool {
    c.present("uuid") && c.present("events") && c.present("active")
}

fn is_build_status_like(c: &Candidate<'_>) -> bool {
    c.has_v2_self_url("build", "key")
}

fn is_branch_restriction_like(c: &Candidate<'_>) -> bool {
    c.has_v2_self_url("branch-restrictions", "id")
}

fn is_tag_like(c: &Candidate<'_>) -> bool {
    c.has_v2_self_url("tags", "name")
}

fn is_branch_like(c: &Candidate<'_>) -> bool {
    c.has_v2_self_url("branches", "name")
}

fn is_consumer_like(c: &Candidate<'_>) -> bool {
    c.present("id") && c.present("name") && c.present("secret") && c.present("key")
}
