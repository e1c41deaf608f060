//! Materialized resources
//!
//! A [`Resource`] is a classified payload: its flattened attributes, its
//! relationships (lazy traversals), embedded sub-resources, and the special
//! actions and mutations its links enable.

use super::links::{self, SpecialAction, LINK_CONTAINER_KEYS};
use super::registry::{ResourceKind, ResourceType};
use super::traversal::Traversal;
use super::v1;
use crate::api::client::Client;
use crate::api::error::{Error, Result};
use crate::api::http::HttpRequest;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// What a traversal or conversion produces
#[derive(Clone)]
pub enum Item {
    Resource(Resource),
    /// A payload no registered type accepted, passed through unchanged
    Raw(Value),
}

impl Item {
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Self::Resource(resource) => Some(resource),
            Self::Raw(_) => None,
        }
    }

    pub fn into_resource(self) -> Option<Resource> {
        match self {
            Self::Resource(resource) => Some(resource),
            Self::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            Self::Raw(value) => Some(value),
            Self::Resource(_) => None,
        }
    }

    /// The JSON behind this item, whether or not it was classified
    pub fn raw(&self) -> &Value {
        match self {
            Self::Resource(resource) => resource.raw(),
            Self::Raw(value) => value,
        }
    }

    pub fn kind(&self) -> Option<ResourceKind> {
        self.as_resource().map(Resource::kind)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(resource) => fmt::Display::fmt(resource, f),
            Self::Raw(value) => write!(f, "{}", value),
        }
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource(resource) => fmt::Debug::fmt(resource, f),
            Self::Raw(value) => write!(f, "Raw({})", value),
        }
    }
}

/// A nested object or list of objects, converted when the parent was materialized
#[derive(Debug, Clone)]
pub enum Embedded {
    One(Box<Item>),
    Many(Vec<Item>),
}

impl Embedded {
    pub fn as_item(&self) -> Option<&Item> {
        match self {
            Self::One(item) => Some(item.as_ref()),
            Self::Many(_) => None,
        }
    }

    pub fn items(&self) -> &[Item] {
        match self {
            Self::One(item) => std::slice::from_ref(item.as_ref()),
            Self::Many(items) => items,
        }
    }
}

/// A named link that becomes a traversal when invoked
#[derive(Clone)]
pub struct Relationship {
    name: String,
    href: String,
    client: Client,
}

impl Relationship {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn href(&self) -> &str {
        &self.href
    }

    pub fn is_template(&self) -> bool {
        crate::api::template::is_template(&self.href)
    }

    /// Follow the link. Every call starts a fresh traversal.
    pub fn traverse(&self) -> Traversal {
        self.traverse_with(&Value::Null)
    }

    /// Expand the link's template with `vars`, then follow it.
    ///
    /// A concrete href is followed as is and `vars` is ignored.
    pub fn traverse_with(&self, vars: &Value) -> Traversal {
        if !self.is_template() && vars.as_object().is_some_and(|vars| !vars.is_empty()) {
            tracing::debug!(
                "Relationship '{}' is not a template, ignoring variables {}",
                self.name,
                vars
            );
        }
        let url = self.client.expand(&self.href, vars);
        tracing::debug!("Traversing '{}' -> {}", self.name, url);
        self.client.traverse(url)
    }
}

impl fmt::Debug for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relationship")
            .field("name", &self.name)
            .field("href", &self.href)
            .finish_non_exhaustive()
    }
}

/// A classified payload bound to the session that produced it
#[derive(Clone)]
pub struct Resource {
    kind: ResourceKind,
    id_attribute: &'static str,
    raw: Value,
    attributes: Map<String, Value>,
    links: BTreeMap<String, String>,
    relationships: BTreeMap<String, Relationship>,
    actions: BTreeMap<SpecialAction, String>,
    embedded: BTreeMap<String, Embedded>,
    client: Client,
}

impl Resource {
    /// Build a resource from a payload already accepted by `resource_type`
    pub fn materialize(raw: Value, resource_type: &ResourceType, client: &Client) -> Self {
        let mut links = links::links_from(&raw);
        // 1.0 shapes get their links from an embedded template document
        links.extend(v1::synthesized_links(resource_type.kind, &raw, client));

        let mut relationships = BTreeMap::new();
        let mut actions = BTreeMap::new();
        for (name, href) in &links {
            match SpecialAction::from_relation(name) {
                Some(action) => {
                    actions.insert(action, href.clone());
                }
                None => {
                    relationships.insert(
                        name.clone(),
                        Relationship {
                            name: name.clone(),
                            href: href.clone(),
                            client: client.clone(),
                        },
                    );
                }
            }
        }

        let mut attributes = Map::new();
        let mut embedded = BTreeMap::new();
        if let Value::Object(fields) = &raw {
            for (name, value) in fields {
                if LINK_CONTAINER_KEYS.contains(&name.as_str()) {
                    continue;
                }
                attributes.insert(name.clone(), value.clone());

                if name == "author" && value.get("raw").is_some_and(Value::is_string) {
                    embed_commit_author(value, client, &mut attributes, &mut embedded);
                } else if let Some(nested) = embed(value, client) {
                    embedded.insert(name.clone(), nested);
                }
            }

            for side in ["source", "destination"] {
                for part in ["commit", "repository"] {
                    if let Some(value) = fields.get(side).and_then(|s| s.get(part)) {
                        if value.is_object() {
                            embedded.insert(
                                format!("{}_{}", side, part),
                                Embedded::One(Box::new(client.convert_to_object(value.clone()))),
                            );
                        }
                    }
                }
            }
        }

        tracing::trace!(
            "Materialized {} with {} relationships, {} embedded",
            resource_type.kind,
            relationships.len(),
            embedded.len()
        );

        Self {
            kind: resource_type.kind,
            id_attribute: resource_type.id_attribute,
            raw,
            attributes,
            links,
            relationships,
            actions,
            embedded,
            client: client.clone(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id_attribute(&self) -> &'static str {
        self.id_attribute
    }

    pub fn id(&self) -> Option<&Value> {
        self.raw.get(self.id_attribute)
    }

    /// The payload exactly as the server sent it
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// String attribute shortcut
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(Value::as_str)
    }

    /// Every traversable link, special actions included
    pub fn links(&self) -> &BTreeMap<String, String> {
        &self.links
    }

    pub fn link(&self, name: &str) -> Option<&str> {
        self.links.get(name).map(String::as_str)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.get(name)
    }

    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    pub fn relationship_names(&self) -> Vec<&str> {
        self.relationships.keys().map(String::as_str).collect()
    }

    /// Start a fresh traversal of relationship `name`
    pub fn traverse(&self, name: &str) -> Result<Traversal> {
        self.traverse_with(name, &Value::Null)
    }

    /// Start a fresh traversal of relationship `name`, expanding its template with `vars`
    pub fn traverse_with(&self, name: &str, vars: &Value) -> Result<Traversal> {
        self.relationship(name)
            .map(|relationship| relationship.traverse_with(vars))
            .ok_or_else(|| Error::UnknownRelationship {
                name: name.to_string(),
            })
    }

    pub fn embedded(&self, name: &str) -> Option<&Embedded> {
        self.embedded.get(name)
    }

    pub fn embedded_names(&self) -> Vec<&str> {
        self.embedded.keys().map(String::as_str).collect()
    }

    /// A single embedded sub-resource, when it was classified
    pub fn embedded_resource(&self, name: &str) -> Option<&Resource> {
        self.embedded(name)?.as_item()?.as_resource()
    }

    pub fn clone_urls(&self) -> BTreeMap<String, String> {
        links::clone_urls(&self.raw)
    }

    /// The 1.0 API view of a 2.0 repository, with the 1.0-only relationships
    pub fn v1(&self) -> Option<Resource> {
        if self.kind != ResourceKind::Repository {
            return None;
        }
        let resource_type = self
            .client
            .registry()
            .get(ResourceKind::RepositoryV1)
            .cloned()
            .unwrap_or_else(|| ResourceType::new(ResourceKind::RepositoryV1, "name", |_| false));
        Some(Self::materialize(self.raw.clone(), &resource_type, &self.client))
    }

    pub fn has_action(&self, action: SpecialAction) -> bool {
        self.actions.contains_key(&action)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // =========================================================================
    // Special actions
    // =========================================================================

    fn action_href(&self, action: SpecialAction) -> Result<&str> {
        self.actions
            .get(&action)
            .map(String::as_str)
            .ok_or_else(|| Error::UnsupportedAction {
                action: action.relation().to_string(),
                kind: self.kind.to_string(),
            })
    }

    fn self_href(&self) -> Result<&str> {
        self.link("self").ok_or_else(|| Error::MissingLink {
            name: "self".to_string(),
        })
    }

    /// Approve, returning the server's `approved` flag
    pub async fn approve(&self) -> Result<bool> {
        let href = self.action_href(SpecialAction::Approve)?;
        let response = self
            .client
            .execute(HttpRequest::post(href, None), 200)
            .await?;
        let body = response.json()?;
        Ok(body.get("approved").and_then(Value::as_bool).unwrap_or(false))
    }

    /// Withdraw an approval
    pub async fn unapprove(&self) -> Result<bool> {
        let href = self.action_href(SpecialAction::Approve)?;
        self.client.execute(HttpRequest::delete(href), 204).await?;
        Ok(true)
    }

    pub async fn decline(&self) -> Result<Item> {
        let href = self.action_href(SpecialAction::Decline)?;
        let response = self
            .client
            .execute(HttpRequest::post(href, None), 200)
            .await?;
        Ok(self.client.convert_to_object(response.json()?))
    }

    /// Merge, optionally sending a merge body (message, strategy, ...)
    pub async fn merge(&self, body: Option<&Value>) -> Result<Item> {
        let href = self.action_href(SpecialAction::Merge)?;
        let response = self
            .client
            .execute(HttpRequest::post(href, body.cloned()), 200)
            .await?;
        Ok(self.client.convert_to_object(response.json()?))
    }

    /// The diff as plain text
    pub async fn diff(&self) -> Result<String> {
        let href = self.action_href(SpecialAction::Diff)?;
        self.client.get_text(href).await
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// PUT `body` to the self link and materialize the server's answer
    pub async fn update(&self, body: &Value) -> Result<Item> {
        let href = self.self_href()?;
        let response = self
            .client
            .execute(HttpRequest::put(href, Some(body.clone())), 200)
            .await?;
        Ok(self.client.convert_to_object(response.json()?))
    }

    /// DELETE the self link
    pub async fn delete(&self) -> Result<()> {
        let href = self.self_href()?;
        self.client.execute(HttpRequest::delete(href), 204).await?;
        Ok(())
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = match self.id() {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        };
        write!(f, "{} {}:{}", self.kind, self.id_attribute, id)
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.raw)
    }
}

fn embed(value: &Value, client: &Client) -> Option<Embedded> {
    match value {
        Value::Object(_) => Some(Embedded::One(Box::new(
            client.convert_to_object(value.clone()),
        ))),
        Value::Array(items) if items.first().is_some_and(Value::is_object) => Some(
            Embedded::Many(
                items
                    .iter()
                    .map(|item| client.convert_to_object(item.clone()))
                    .collect(),
            ),
        ),
        _ => None,
    }
}

/// Commit authors arrive as `{"raw": "Name <email>", "user": {...}}`
fn embed_commit_author(
    author: &Value,
    client: &Client,
    attributes: &mut Map<String, Value>,
    embedded: &mut BTreeMap<String, Embedded>,
) {
    if let Some(raw_author) = author.get("raw") {
        attributes.insert("raw_author".to_string(), raw_author.clone());
    }
    let user = match author.get("user") {
        Some(user) if user.is_object() => user.clone(),
        _ => author.clone(),
    };
    embedded.insert(
        "author".to_string(),
        Embedded::One(Box::new(client.convert_to_object(user))),
    );
}
