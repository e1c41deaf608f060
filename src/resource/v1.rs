//! 1.0 API links
//!
//! 1.0 payloads carry no link container. Their relationships come from a URI
//! template document per kind, expanded with the client's base URI and the
//! identifiers found in the payload. Expressions whose variables the payload
//! cannot supply (`{/revision,path}`, `{?limit,start}`) stay in the href and are
//! filled in by [`Relationship::traverse_with`](super::Relationship::traverse_with).

use super::links;
use super::registry::ResourceKind;
use crate::api::client::Client;
use crate::api::template;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Embedded link documents (compiled into the binary)
const LINK_DOCUMENTS: &[(ResourceKind, &str)] = &[
    (
        ResourceKind::RepositoryV1,
        include_str!("../resources/repository_v1.json"),
    ),
    (
        ResourceKind::Consumer,
        include_str!("../resources/consumer.json"),
    ),
];

static LINK_TEMPLATES: OnceLock<HashMap<ResourceKind, BTreeMap<String, String>>> =
    OnceLock::new();

fn link_templates() -> &'static HashMap<ResourceKind, BTreeMap<String, String>> {
    LINK_TEMPLATES.get_or_init(|| {
        LINK_DOCUMENTS
            .iter()
            .map(|(kind, text)| {
                let document: Value = serde_json::from_str(text).unwrap_or_else(|e| {
                    panic!("Failed to parse embedded {} link document: {}", kind, e)
                });
                (*kind, links::links_from(&document))
            })
            .collect()
    })
}

/// Unexpanded relation templates for `kind`, if it has a link document
pub fn templates_for(kind: ResourceKind) -> Option<&'static BTreeMap<String, String>> {
    link_templates().get(&kind)
}

/// Relations of a `kind` payload, expanded as far as `data` allows
pub fn synthesized_links(
    kind: ResourceKind,
    data: &Value,
    client: &Client,
) -> BTreeMap<String, String> {
    let Some(templates) = templates_for(kind) else {
        return BTreeMap::new();
    };

    let mut vars = identifiers(kind, data, client);
    vars.insert(
        "bitbucket_url".to_string(),
        Value::String(client.bitbucket_url().to_string()),
    );
    let vars = Value::Object(vars);

    templates
        .iter()
        .map(|(name, href)| (name.clone(), template::expand_partial(href, &vars)))
        .collect()
}

/// Template variables naming the resource `data` describes
fn identifiers(kind: ResourceKind, data: &Value, client: &Client) -> Map<String, Value> {
    let mut vars = Map::new();
    match kind {
        ResourceKind::RepositoryV1 => {
            if let Some((owner, name)) = repository_path(data) {
                vars.insert("owner".to_string(), Value::String(owner));
                vars.insert("repository_name".to_string(), Value::String(name));
            }
        }
        ResourceKind::Consumer => {
            if let Some(username) = client.username() {
                vars.insert("username".to_string(), Value::String(username.to_string()));
            }
            if let Some(id) = data.get("id").filter(|id| !id.is_null()) {
                vars.insert("consumer_id".to_string(), id.clone());
            }
        }
        _ => {}
    }
    vars
}

/// `(owner, slug)` from a 2.0 `full_name` or a 1.0 `owner` plus `slug`/`name`
fn repository_path(data: &Value) -> Option<(String, String)> {
    if let Some(full_name) = data.get("full_name").and_then(Value::as_str) {
        let (owner, name) = full_name.split_once('/')?;
        return Some((owner.to_string(), name.to_string()));
    }

    let owner = match data.get("owner")? {
        Value::String(owner) => owner.clone(),
        owner => owner.get("username")?.as_str()?.to_string(),
    };
    let name = data
        .get("slug")
        .or_else(|| data.get("name"))
        .and_then(Value::as_str)?;
    Some((owner, name.to_string()))
}
