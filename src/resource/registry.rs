//! Resource Registry - ordered set of known payload shapes
//!
//! A [`TypeRegistry`] is built once at startup and handed to every
//! [`Client`](crate::Client) behind an `Arc`. After construction it is only read.

use super::types;
use serde_json::Value;
use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

/// Which shape a materialized resource was classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// The static entry point document
    Root,
    User,
    Team,
    Repository,
    RepositoryV1,
    Commit,
    PullRequest,
    Snippet,
    Comment,
    Hook,
    BuildStatus,
    BranchRestriction,
    Tag,
    Branch,
    Consumer,
    /// A shape registered by the caller
    Custom(&'static str),
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "Bitbucket",
            Self::User => "User",
            Self::Team => "Team",
            Self::Repository => "Repository",
            Self::RepositoryV1 => "RepositoryV1",
            Self::Commit => "Commit",
            Self::PullRequest => "PullRequest",
            Self::Snippet => "Snippet",
            Self::Comment => "Comment",
            Self::Hook => "Hook",
            Self::BuildStatus => "BuildStatus",
            Self::BranchRestriction => "BranchRestriction",
            Self::Tag => "Tag",
            Self::Branch => "Branch",
            Self::Consumer => "Consumer",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification predicate. Must be pure: it is evaluated for every payload.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One known shape of server-sent JSON
#[derive(Clone)]
pub struct ResourceType {
    pub kind: ResourceKind,
    /// Field holding the natural identifier
    pub id_attribute: &'static str,
    predicate: Predicate,
    /// Built-in shapes are decided together by one marker pass
    builtin: bool,
}

impl ResourceType {
    pub fn new<F>(kind: ResourceKind, id_attribute: &'static str, predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            kind,
            id_attribute,
            predicate: Arc::new(predicate),
            builtin: false,
        }
    }

    pub(crate) fn builtin(kind: ResourceKind, id_attribute: &'static str) -> Self {
        Self {
            builtin: true,
            ..Self::new(kind, id_attribute, move |data| {
                types::builtin_kind(data) == Some(kind)
            })
        }
    }

    /// Descriptor for the entry point, which is never classified from a payload
    pub fn root() -> Self {
        Self::new(ResourceKind::Root, "self", |_| false)
    }

    pub fn matches(&self, data: &Value) -> bool {
        (self.predicate)(data)
    }

    fn accepts(&self, data: &Value, builtin_hit: &OnceCell<Option<ResourceKind>>) -> bool {
        if self.builtin {
            *builtin_hit.get_or_init(|| types::builtin_kind(data)) == Some(self.kind)
        } else {
            self.matches(data)
        }
    }
}

impl fmt::Debug for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceType")
            .field("kind", &self.kind)
            .field("id_attribute", &self.id_attribute)
            .field("builtin", &self.builtin)
            .finish_non_exhaustive()
    }
}

/// Ordered, append-only set of resource types
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: Vec<ResourceType>,
}

impl TypeRegistry {
    /// An empty registry: every payload stays raw
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in Bitbucket shape, in priority order
    pub fn bitbucket() -> Self {
        let mut registry = Self::new();
        for resource_type in types::builtin_types() {
            registry.register(resource_type);
        }
        registry
    }

    /// Append a descriptor. Registering a kind twice keeps the first one.
    pub fn register(&mut self, resource_type: ResourceType) -> &mut Self {
        if self.types.iter().any(|t| t.kind == resource_type.kind) {
            tracing::debug!("Resource type {} already registered", resource_type.kind);
        } else {
            self.types.push(resource_type);
        }
        self
    }

    /// First descriptor, in registration order, accepting `data`
    pub fn classify(&self, data: &Value) -> Option<&ResourceType> {
        let builtin_hit = OnceCell::new();
        self.types.iter().find(|t| t.accepts(data, &builtin_hit))
    }

    /// Every descriptor accepting `data`. More than one is a predicate defect.
    pub fn matching(&self, data: &Value) -> Vec<&ResourceType> {
        let builtin_hit = OnceCell::new();
        self.types
            .iter()
            .filter(|t| t.accepts(data, &builtin_hit))
            .collect()
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.types.iter().map(|t| t.kind).collect()
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&ResourceType> {
        self.types.iter().find(|t| t.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
