//! Integration tests for the hypermedia engine using wiremock
//!
//! These tests drive the real reqwest transport against mocked endpoints,
//! covering pagination, classification, error enrichment and the actions
//! a resource's links enable.

use hyperbucket::resource::{current_user, find_user, ResourceKind};
use hyperbucket::{Client, Credentials, Error, HttpClient, Item, TypeRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{bearer_token, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PUBLIC_API: &str = "https://api.bitbucket.org";

/// Build a client whose requests go to the mock server
fn client_for(server: &MockServer) -> Client {
    let http = HttpClient::new(
        Credentials::Bearer {
            token: "test-token".to_string(),
        },
        Some("dev@example.com"),
    )
    .expect("HTTP client should build");
    Client::with_transport(
        Arc::new(http),
        Arc::new(TypeRegistry::bitbucket()),
        &server.uri(),
    )
}

/// Load a fixture, pointing its links at the mock server
fn fixture(server: &MockServer, text: &str) -> Value {
    serde_json::from_str(&text.replace(PUBLIC_API, &server.uri())).expect("fixture should parse")
}

fn user_fixture(server: &MockServer) -> Value {
    fixture(server, include_str!("fixtures/user.json"))
}

fn repository_fixture(server: &MockServer) -> Value {
    fixture(server, include_str!("fixtures/repository.json"))
}

fn pullrequest_fixture(server: &MockServer) -> Value {
    fixture(server, include_str!("fixtures/pullrequest.json"))
}

fn ids(items: &[Item]) -> Vec<i64> {
    items
        .iter()
        .map(|item| item.raw()["id"].as_i64().unwrap())
        .collect()
}

/// Pagination and fallback shapes
mod traversal_tests {
    use super::*;

    /// Two pages of 3 and 2 items yield 5 items in page order, then exhaustion
    #[tokio::test]
    async fn test_two_page_collection_terminates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/things"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [{"id": 1}, {"id": 2}, {"id": 3}],
                "next": format!("{}/2.0/things/page-2", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/2.0/things/page-2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"values": [{"id": 4}, {"id": 5}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut traversal = client.traverse(format!("{}/2.0/things", server.uri()));

        let mut items = Vec::new();
        while let Some(item) = traversal.next().await {
            items.push(item.expect("page should load"));
        }

        assert_eq!(ids(&items), vec![1, 2, 3, 4, 5]);
        assert!(traversal.is_exhausted());
        assert!(traversal.next().await.is_none(), "Exhausted traversal stays exhausted");
        assert_eq!(traversal.pages_fetched(), 2);
    }

    /// A bare object with no items collection yields exactly one item
    #[tokio::test]
    async fn test_single_object_fallback() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/users/evzijst"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_fixture(&server)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let items = client
            .traverse(format!("{}/2.0/users/evzijst", server.uri()))
            .try_collect()
            .await
            .expect("traversal should succeed");

        assert_eq!(items.len(), 1);
        let user = items[0].as_resource().expect("user should classify");
        assert_eq!(user.kind(), ResourceKind::User);
        assert_eq!(user.attribute_str("display_name"), Some("Erik van Zijst"));
    }

    /// An array yields one item per element and never follows continuation data
    #[tokio::test]
    async fn test_array_fallback_ignores_next() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "next": format!("{}/2.0/never", server.uri())},
                {"id": 2, "links": {"self": {"href": format!("{}/2.0/never", server.uri())}}}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(path("/2.0/never"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let items = client
            .traverse(format!("{}/2.0/list", server.uri()))
            .try_collect()
            .await
            .expect("traversal should succeed");

        assert_eq!(ids(&items), vec![1, 2]);
    }

    /// Items [1, 2] then [3] across a continuation
    #[tokio::test]
    async fn test_scenario_values_then_next() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/u1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "values": [{"id": 1}, {"id": 2}],
                "next": format!("{}/2.0/u2", server.uri())
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/2.0/u2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": [{"id": 3}]})))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let items = client
            .traverse(format!("{}/2.0/u1", server.uri()))
            .try_collect()
            .await
            .expect("traversal should succeed");

        assert_eq!(ids(&items), vec![1, 2, 3]);
        assert!(items.iter().all(|item| item.as_raw().is_some()));
    }

    /// A 500 on the first page surfaces on the first pull
    #[tokio::test]
    async fn test_scenario_server_error_on_first_pull() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/broken"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": {"message": "boom"}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let mut traversal = client.traverse(format!("{}/2.0/broken", server.uri()));

        let err = traversal
            .next()
            .await
            .expect("first pull yields the error")
            .unwrap_err();
        assert!(matches!(err, Error::ServerError(_)));
        assert_eq!(err.error_message(), Some("boom"));
        assert_eq!(err.status(), Some(500));
        assert!(traversal.next().await.is_none());
    }

    /// Invoking the same relationship twice re-fetches from the first page
    #[tokio::test]
    async fn test_relationship_is_restartable() {
        let server = MockServer::start().await;
        let commits_path = "/2.0/repositories/teamsinspace/teamsinspace.bitbucket.org/commits";

        Mock::given(method("GET"))
            .and(path(commits_path))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixture(
                &server,
                include_str!("fixtures/commits_page.json"),
            )))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let repository = client
            .convert_to_object(repository_fixture(&server))
            .into_resource()
            .expect("repository should classify");
        assert_eq!(repository.kind(), ResourceKind::Repository);

        let mut first = repository.traverse("commits").unwrap();
        let a = first.next().await.unwrap().unwrap();

        let mut second = repository.traverse("commits").unwrap();
        let b = second.next().await.unwrap().unwrap();

        assert_eq!(a.raw()["hash"], "61d9e64348f9");
        assert_eq!(a.raw(), b.raw());
    }

    /// Collections predating `values` keep their items elsewhere
    #[tokio::test]
    async fn test_legacy_items_key() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/1.0/repositories/teamsinspace"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 2,
                "repositories": [
                    {"name": "a", "slug": "a", "scm": "git", "resource_uri": "/1.0/repositories/teamsinspace/a"},
                    {"name": "b", "slug": "b", "scm": "hg", "resource_uri": "/1.0/repositories/teamsinspace/b"}
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let items = client
            .traverse(format!("{}/1.0/repositories/teamsinspace", server.uri()))
            .with_items_key("repositories")
            .try_collect()
            .await
            .expect("traversal should succeed");

        assert_eq!(items.len(), 2);
        assert!(items
            .iter()
            .all(|item| item.kind() == Some(ResourceKind::RepositoryV1)));
    }
}

/// Error classification against real responses
mod error_tests {
    use super::*;

    /// A JSON 400 carries the server's message and extra fields
    #[tokio::test]
    async fn test_bad_request_with_json_message() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "error",
                "error": {"message": "X", "fields": {"name": ["required"]}}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .get_json(&format!("{}/2.0/bad", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(err.error_message(), Some("X"));
        assert_eq!(err.field("type"), Some(&json!("error")));
    }

    /// A 400 with a non-JSON body still classifies, without a message
    #[tokio::test]
    async fn test_bad_request_with_html_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("<html>Bad Request</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .get_json(&format!("{}/2.0/bad", server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BadRequest(_)));
        assert_eq!(err.error_message(), None);
        assert_eq!(err.details().unwrap().body, "<html>Bad Request</html>");
    }

    /// Any other unexpected status is unclassified
    #[tokio::test]
    async fn test_not_found_is_unexpected_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/users/nobody"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(json!({"error": {"message": "nobody not found"}})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = find_user(&client, "nobody").await.unwrap_err();

        assert!(matches!(err, Error::UnexpectedStatus(_)));
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.error_message(), Some("nobody not found"));
    }

    /// A 200 that isn't JSON is a decode error, not a panic
    #[tokio::test]
    async fn test_non_json_success_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("plain"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .traverse(format!("{}/2.0/text", server.uri()))
            .first()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }
}

/// Root entry point and finders
mod root_tests {
    use super::*;

    /// The transport attaches credentials and identifying headers
    #[tokio::test]
    async fn test_current_user_sends_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/2.0/user"))
            .and(bearer_token("test-token"))
            .and(header("from", "dev@example.com"))
            .and(header("accept", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(user_fixture(&server)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let user = current_user(&client)
            .await
            .expect("request should succeed")
            .expect("one user");

        assert_eq!(user.kind(), Some(ResourceKind::User));
        assert_eq!(user.to_string(), "User username:evzijst");
    }

    /// Root templates expand against the configured server
    #[tokio::test]
    async fn test_root_relationship_with_variables() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(
                "/2.0/repositories/teamsinspace/teamsinspace.bitbucket.org",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(repository_fixture(&server)))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let repository = client
            .root()
            .traverse_with(
                "repositoryByOwnerAndRepositoryName",
                &json!({"owner": "teamsinspace", "repository_name": "teamsinspace.bitbucket.org"}),
            )
            .unwrap()
            .first()
            .await
            .unwrap()
            .and_then(Item::into_resource)
            .expect("repository should classify");

        assert_eq!(repository.kind(), ResourceKind::Repository);
        assert_eq!(repository.clone_urls().len(), 2);
        assert!(repository.relationship("clone").is_none());
        assert_eq!(
            repository.embedded_resource("owner").map(|owner| owner.kind()),
            Some(ResourceKind::Team)
        );
    }

    /// Unknown relationship names fail before any request
    #[tokio::test]
    async fn test_unknown_root_relationship() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let err = client.root().traverse("repositoryIssues").unwrap_err();
        assert!(matches!(err, Error::UnknownRelationship { .. }));
    }
}

/// Special actions and mutations
mod action_tests {
    use super::*;

    const PR_PATH: &str = "/2.0/repositories/teamsinspace/teamsinspace.bitbucket.org/pullrequests/1";

    fn pull_request(server: &MockServer) -> hyperbucket::Resource {
        client_for(server)
            .convert_to_object(pullrequest_fixture(server))
            .into_resource()
            .expect("pull request should classify")
    }

    /// Embedded sub-objects become typed resources
    #[tokio::test]
    async fn test_pull_request_embeds() {
        let server = MockServer::start().await;
        let pr = pull_request(&server);

        assert_eq!(pr.kind(), ResourceKind::PullRequest);
        for name in [
            "source_commit",
            "source_repository",
            "destination_commit",
            "destination_repository",
            "author",
        ] {
            assert!(pr.embedded_resource(name).is_some(), "{} should be embedded", name);
        }
        let participants = pr.embedded("participants").unwrap().items();
        assert_eq!(participants.len(), 1);
        assert!(participants[0].as_raw().is_some());
    }

    #[tokio::test]
    async fn test_approve_then_unapprove() {
        let server = MockServer::start().await;
        let approve_path = format!("{}/approve", PR_PATH);

        Mock::given(method("POST"))
            .and(path(approve_path.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"approved": true, "role": "PARTICIPANT"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(approve_path.as_str()))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let pr = pull_request(&server);
        assert!(pr.approve().await.unwrap());
        assert!(pr.unapprove().await.unwrap());
    }

    #[tokio::test]
    async fn test_merge_and_decline() {
        let server = MockServer::start().await;

        let mut merged = pullrequest_fixture(&server);
        merged["state"] = json!("MERGED");
        Mock::given(method("POST"))
            .and(path(format!("{}/merge", PR_PATH).as_str()))
            .and(body_json(json!({"merge_strategy": "squash"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&merged))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("{}/decline", PR_PATH).as_str()))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "type": "error",
                "error": {"message": "You can't decline a merged pull request."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pr = pull_request(&server);
        let result = pr
            .merge(Some(&json!({"merge_strategy": "squash"})))
            .await
            .unwrap();
        assert_eq!(
            result.as_resource().unwrap().attribute_str("state"),
            Some("MERGED")
        );

        let err = pr.decline().await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_diff_is_text() {
        let server = MockServer::start().await;
        let diff = "diff --git a/index.html b/index.html\n+<form>\n";

        Mock::given(method("GET"))
            .and(path(format!("{}/diff", PR_PATH).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_string(diff))
            .mount(&server)
            .await;

        let pr = pull_request(&server);
        assert_eq!(pr.diff().await.unwrap(), diff);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let server = MockServer::start().await;

        let mut updated = user_fixture(&server);
        updated["location"] = json!("Amsterdam");
        Mock::given(method("PUT"))
            .and(path("/2.0/users/evzijst"))
            .and(body_json(json!({"location": "Amsterdam"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(&updated))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path("/2.0/users/evzijst"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let user = client_for(&server)
            .convert_to_object(user_fixture(&server))
            .into_resource()
            .unwrap();

        let fresh = user
            .update(&json!({"location": "Amsterdam"}))
            .await
            .unwrap();
        assert_eq!(
            fresh.as_resource().unwrap().attribute_str("location"),
            Some("Amsterdam")
        );
        // The original is not mutated in place
        assert_eq!(user.attribute_str("location"), Some("Sydney"));

        user.delete().await.unwrap();
    }

    /// Any 2xx answer to a delete counts as success
    #[tokio::test]
    async fn test_delete_accepts_ok() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/2.0/users/evzijst"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let user = client_for(&server)
            .convert_to_object(user_fixture(&server))
            .into_resource()
            .unwrap();

        user.delete().await.unwrap();
    }

    /// A missing resource is still reported on delete
    #[tokio::test]
    async fn test_delete_not_found() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/2.0/users/evzijst"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let user = client_for(&server)
            .convert_to_object(user_fixture(&server))
            .into_resource()
            .unwrap();

        let err = user.delete().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedStatus(_)));
        assert_eq!(err.status(), Some(404));
    }

    /// Bitbucket answers creation with 201 Created
    #[tokio::test]
    async fn test_create_accepts_created() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/2.0/repositories/teamsinspace/teamsinspace.bitbucket.org"))
            .and(body_json(json!({"scm": "git"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(repository_fixture(&server)))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!(
            "{}/2.0/repositories/teamsinspace/teamsinspace.bitbucket.org",
            server.uri()
        );
        let item = client_for(&server)
            .create(&url, &json!({"scm": "git"}))
            .await
            .unwrap();
        assert_eq!(item.kind(), Some(ResourceKind::Repository));
    }
}
