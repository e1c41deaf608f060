//! Root entry point
//!
//! The service root is built from an embedded link document rather than fetched.
//! Every other URL is discovered by following its relationships, and the finders
//! below are thin conveniences over exactly that.

use super::model::{Item, Resource};
use super::registry::ResourceType;
use super::traversal::Traversal;
use crate::api::client::Client;
use crate::api::error::{Error, Result};
use serde_json::{json, Value};
use std::sync::OnceLock;

/// Embedded link document (compiled into the binary)
const ENTRYPOINTS_JSON: &str = include_str!("../resources/entrypoints.json");

static ENTRYPOINTS: OnceLock<Value> = OnceLock::new();

/// The parsed link document (parsed on first access)
pub fn entrypoints() -> &'static Value {
    ENTRYPOINTS.get_or_init(|| {
        serde_json::from_str(ENTRYPOINTS_JSON)
            .unwrap_or_else(|e| panic!("Failed to parse embedded entrypoints JSON: {}", e))
    })
}

/// Materialize the root resource for `client`
pub fn entry_point(client: &Client) -> Resource {
    Resource::materialize(entrypoints().clone(), &ResourceType::root(), client)
}

/// Pull request states accepted by `repositoryPullRequestsInState`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestState {
    Open,
    Merged,
    Declined,
    Superseded,
}

impl PullRequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
            Self::Declined => "DECLINED",
            Self::Superseded => "SUPERSEDED",
        }
    }
}

// =============================================================================
// Finders
// =============================================================================

fn root_traversal(client: &Client, relationship: &str, vars: Value) -> Result<Traversal> {
    client.root().traverse_with(relationship, &vars)
}

async fn find_one(client: &Client, relationship: &str, vars: Value) -> Result<Option<Item>> {
    root_traversal(client, relationship, vars)?.first().await
}

/// The authenticated user
pub async fn current_user(client: &Client) -> Result<Option<Item>> {
    find_one(client, "userForMyself", Value::Null).await
}

pub async fn find_user(client: &Client, username: &str) -> Result<Option<Item>> {
    find_one(client, "userByUsername", json!({ "username": username })).await
}

pub async fn find_team(client: &Client, username: &str) -> Result<Option<Item>> {
    find_one(client, "teamByUsername", json!({ "username": username })).await
}

pub async fn find_repository(
    client: &Client,
    owner: &str,
    repository_name: &str,
) -> Result<Option<Item>> {
    find_one(
        client,
        "repositoryByOwnerAndRepositoryName",
        json!({ "owner": owner, "repository_name": repository_name }),
    )
    .await
}

/// Find a repository by its `owner/slug` full name
pub async fn find_repository_by_full_name(
    client: &Client,
    full_name: &str,
) -> Result<Option<Item>> {
    match full_name.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            find_repository(client, owner, name).await
        }
        _ => Err(Error::InvalidArgument(format!(
            "Repository full name '{}' is not of the form owner/repository_name",
            full_name
        ))),
    }
}

pub async fn find_pullrequest(
    client: &Client,
    owner: &str,
    repository_name: &str,
    pullrequest_id: u64,
) -> Result<Option<Item>> {
    find_one(
        client,
        "repositoryPullRequestByPullRequestId",
        json!({
            "owner": owner,
            "repository_name": repository_name,
            "pullrequest_id": pullrequest_id
        }),
    )
    .await
}

/// Pull requests of a repository, optionally filtered by state
pub fn pullrequests_in_state(
    client: &Client,
    owner: &str,
    repository_name: &str,
    state: Option<PullRequestState>,
) -> Result<Traversal> {
    root_traversal(
        client,
        "repositoryPullRequestsInState",
        json!({
            "owner": owner,
            "repository_name": repository_name,
            "state": state.map(|s| s.as_str())
        }),
    )
}

/// Repositories of `owner`, or of the client's user when `owner` is `None`
pub fn repositories_for_owner(
    client: &Client,
    owner: Option<&str>,
    role: Option<&str>,
) -> Result<Traversal> {
    let owner = owner.or(client.username()).ok_or_else(|| {
        Error::InvalidArgument("No owner given and no username configured".to_string())
    })?;
    root_traversal(
        client,
        "repositoriesByOwnerAndRole",
        json!({ "owner": owner, "role": role }),
    )
}
