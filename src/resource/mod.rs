//! Resource abstraction layer
//!
//! Turns server-sent JSON into typed resources by shape, without a schema.
//!
//! # Architecture
//!
//! - [`registry`] - Ordered set of known shapes, first match wins
//! - [`types`] - Built-in Bitbucket shapes and their predicates
//! - [`links`] - Link container normalisation and the reserved action names
//! - [`model`] - Materialized resources, embedded sub-resources, relationships
//! - [`traversal`] - Lazy, paginated iteration over a URL
//! - [`root`] - The static entry point and finders built on it
//! - [`v1`] - Relationships for 1.0 API shapes, which carry no links
//!
//! # Example
//!
//! ```ignore
//! use hyperbucket::{Client, Config};
//! use serde_json::json;
//!
//! async fn pull_requests(client: &Client) -> hyperbucket::Result<()> {
//!     let repository = client
//!         .root()
//!         .traverse_with("repositoryByOwnerAndRepositoryName",
//!             &json!({"owner": "teamsinspace", "repository_name": "teamsinspace.bitbucket.org"}))?
//!         .first()
//!         .await?;
//!     if let Some(repository) = repository.and_then(|item| item.into_resource()) {
//!         let mut prs = repository.traverse("pullrequests")?;
//!         while let Some(pr) = prs.next().await {
//!             println!("{}", pr?);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod links;
pub mod model;
pub mod registry;
pub mod root;
pub mod traversal;
pub mod types;
pub mod v1;

pub use links::SpecialAction;
pub use model::{Embedded, Item, Relationship, Resource};
pub use registry::{Predicate, ResourceKind, ResourceType, TypeRegistry};
pub use root::{
    current_user, entry_point, find_pullrequest, find_repository, find_repository_by_full_name,
    find_team, find_user, pullrequests_in_state, repositories_for_owner, PullRequestState,
};
pub use traversal::Traversal;
