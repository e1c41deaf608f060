//! Lazy, paginated traversal of a relationship
//!
//! A [`Traversal`] fetches nothing until pulled. Each pull yields one item,
//! fetching the next page only once the buffered items run out. Response bodies
//! are interpreted in this order:
//!
//! 1. A JSON array: every element is yielded, then the traversal ends.
//! 2. An object whose items key (`values`) holds a non-empty array: every element
//!    is yielded, then the `next` link is followed if present.
//! 3. Anything else, including a page with empty `values`: yielded as one item.
//!
//! An error ends the traversal; it is returned once and never resumed.

use super::model::Item;
use crate::api::client::Client;
use crate::api::error::Result;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt;

/// Items key used by Bitbucket 2.0 pages
pub const DEFAULT_ITEMS_KEY: &str = "values";

pub struct Traversal {
    client: Client,
    cursor: Option<String>,
    pending: VecDeque<Value>,
    items_key: String,
    pages: usize,
}

impl Traversal {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            cursor: Some(url.into()),
            pending: VecDeque::new(),
            items_key: DEFAULT_ITEMS_KEY.to_string(),
            pages: 0,
        }
    }

    /// Read page items from another key, for endpoints predating `values`
    pub fn with_items_key(mut self, items_key: impl Into<String>) -> Self {
        self.items_key = items_key.into();
        self
    }

    /// No buffered items and no page left to fetch
    pub fn is_exhausted(&self) -> bool {
        self.cursor.is_none() && self.pending.is_empty()
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }

    /// Pull the next item, fetching a page if needed
    pub async fn next(&mut self) -> Option<Result<Item>> {
        loop {
            if let Some(data) = self.pending.pop_front() {
                return Some(Ok(self.client.convert_to_object(data)));
            }

            let url = self.cursor.take()?;
            if let Err(e) = self.fetch(&url).await {
                tracing::warn!("Traversal of {} failed: {}", url, e);
                self.pending.clear();
                return Some(Err(e));
            }
        }
    }

    async fn fetch(&mut self, url: &str) -> Result<()> {
        let body = self.client.get_json(url).await?;
        self.pages += 1;

        match body {
            Value::Array(items) => {
                tracing::debug!("Page {} is a bare list of {} items", self.pages, items.len());
                self.pending.extend(items);
            }
            Value::Object(mut page) => {
                let has_items = matches!(
                    page.get(&self.items_key),
                    Some(Value::Array(items)) if !items.is_empty()
                );
                if !has_items {
                    self.pending.push_back(Value::Object(page));
                    return Ok(());
                }

                let next = page.get("next").and_then(Value::as_str).map(str::to_string);
                if next.as_deref() == Some(url) {
                    tracing::warn!("Page {} links to itself as next", url);
                }
                if let Some(Value::Array(items)) = page.remove(&self.items_key) {
                    tracing::debug!(
                        "Page {} holds {} items, next: {:?}",
                        self.pages,
                        items.len(),
                        next
                    );
                    self.pending.extend(items);
                }
                self.cursor = next;
            }
            other => self.pending.push_back(other),
        }

        Ok(())
    }

    /// The first item, fetching at most one page
    pub async fn first(mut self) -> Result<Option<Item>> {
        self.next().await.transpose()
    }

    /// Drain the traversal, stopping at the first error
    pub async fn try_collect(mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await {
            items.push(item?);
        }
        Ok(items)
    }

    /// Drain at most `limit` items
    pub async fn take(mut self, limit: usize) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        while items.len() < limit {
            match self.next().await {
                Some(item) => items.push(item?),
                None => break,
            }
        }
        Ok(items)
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<Item>> + Send {
        stream::unfold(self, |mut traversal| async move {
            traversal.next().await.map(|item| (item, traversal))
        })
    }
}

impl fmt::Debug for Traversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Traversal")
            .field("cursor", &self.cursor)
            .field("pending", &self.pending.len())
            .field("items_key", &self.items_key)
            .field("pages", &self.pages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::Error;
    use crate::resource::{ResourceKind, TypeRegistry};
    use crate::testing::ScriptedTransport;
    use futures::StreamExt;
    use serde_json::json;
    use std::sync::Arc;

    const API: &str = "https://api.bitbucket.org/2.0";

    fn client(transport: ScriptedTransport) -> Client {
        Client::with_transport(
            Arc::new(transport),
            Arc::new(TypeRegistry::bitbucket()),
            "https://api.bitbucket.org",
        )
    }

    fn user(name: &str) -> Value {
        json!({"username": name, "type": "user"})
    }

    #[tokio::test]
    async fn test_nothing_fetched_before_first_pull() {
        let transport = ScriptedTransport::new();
        let recorder = transport.clone();
        let traversal = client(transport).traverse(format!("{}/users", API));
        assert!(!traversal.is_exhausted());
        assert_eq!(traversal.pages_fetched(), 0);
        assert!(recorder.requests().is_empty());
    }

    #[tokio::test]
    async fn test_follows_next_across_pages() {
        let transport = ScriptedTransport::new()
            .respond(
                200,
                json!({"values": [user("a"), user("b")], "next": format!("{}/users?page=2", API)}),
            )
            .respond(200, json!({"values": [user("c")]}));
        let recorder = transport.clone();
        let mut traversal = client(transport).traverse(format!("{}/users", API));

        let mut names = Vec::new();
        while let Some(item) = traversal.next().await {
            let item = item.unwrap();
            assert_eq!(item.kind(), Some(ResourceKind::User));
            names.push(item.raw()["username"].as_str().unwrap().to_string());
            if names.len() == 1 {
                // Only the first page is fetched so far
                assert_eq!(recorder.requests().len(), 1);
            }
        }

        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(traversal.pages_fetched(), 2);
        assert!(traversal.is_exhausted());
        assert_eq!(recorder.requests()[1].url, format!("{}/users?page=2", API));
    }

    #[tokio::test]
    async fn test_bare_list_ends_traversal() {
        let transport = ScriptedTransport::new().respond(200, json!([user("a"), {"x": 1}]));
        let items = client(transport)
            .traverse(format!("{}/list", API))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[1].as_raw().is_some());
    }

    #[tokio::test]
    async fn test_single_object_is_one_item() {
        let transport = ScriptedTransport::new().respond(200, user("evzijst"));
        let item = client(transport)
            .traverse(format!("{}/user", API))
            .first()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item.kind(), Some(ResourceKind::User));
    }

    #[tokio::test]
    async fn test_empty_page_is_emitted_whole() {
        let transport = ScriptedTransport::new()
            .respond(200, json!({"values": [], "pagelen": 10, "size": 0, "page": 1}));
        let items = client(transport)
            .traverse(format!("{}/repositories/nobody", API))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].raw()["size"], 0);
    }

    #[tokio::test]
    async fn test_error_terminates() {
        let transport = ScriptedTransport::new()
            .respond(200, json!({"values": [user("a")], "next": format!("{}/users?page=2", API)}))
            .respond(500, json!({"error": {"message": "down"}}))
            .respond(200, json!({"values": [user("never")]}));
        let recorder = transport.clone();
        let mut traversal = client(transport).traverse(format!("{}/users", API));

        assert!(traversal.next().await.unwrap().is_ok());
        let err = traversal.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ServerError(_)));
        assert!(traversal.is_exhausted());
        assert!(traversal.next().await.is_none());
        assert_eq!(recorder.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_custom_items_key() {
        let transport = ScriptedTransport::new().respond(200, json!({"items": [{"a": 1}, {"a": 2}]}));
        let items = client(transport)
            .traverse(format!("{}/legacy", API))
            .with_items_key("items")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_take_stops_early() {
        let transport = ScriptedTransport::new()
            .respond(
                200,
                json!({"values": [user("a"), user("b")], "next": format!("{}/users?page=2", API)}),
            );
        let recorder = transport.clone();
        let items = client(transport)
            .traverse(format!("{}/users", API))
            .take(2)
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(recorder.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_into_stream() {
        let transport = ScriptedTransport::new()
            .respond(200, json!({"values": [user("a")], "next": format!("{}/users?page=2", API)}))
            .respond(200, json!({"values": [user("b")]}));
        let items: Vec<_> = client(transport)
            .traverse(format!("{}/users", API))
            .into_stream()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.is_ok()));
    }
}
