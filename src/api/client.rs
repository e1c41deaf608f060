//! Bitbucket Client
//!
//! Main client for the hypermedia engine, combining a [`Transport`], the
//! [`TypeRegistry`] used to classify payloads, and the server base URI that link
//! templates are rooted at.

use super::auth::Credentials;
use super::error::{expect_status, Result};
use super::http::{HttpClient, HttpRequest, HttpResponse, Transport};
use super::template;
use crate::config::Config;
use crate::resource::{entry_point, Item, Resource, Traversal, TypeRegistry};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Main Bitbucket client
///
/// Cloning is cheap; every resource reached through a client keeps a clone and
/// shares the same session.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    registry: Arc<TypeRegistry>,
    server_base_uri: String,
    username: Option<String>,
}

impl Client {
    /// Create a client from configuration, reading credentials from the environment
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_credentials(config, Credentials::from_env())
    }

    /// Create a client from configuration and explicit credentials
    pub fn with_credentials(config: &Config, credentials: Credentials) -> Result<Self> {
        let username = config
            .effective_username()
            .or_else(|| credentials.username().map(|s| s.to_string()));

        let http = HttpClient::new(credentials, config.email.as_deref())?;
        let mut client = Self::with_transport(
            Arc::new(http),
            Arc::new(TypeRegistry::bitbucket()),
            &config.effective_server(),
        );
        client.username = username;
        Ok(client)
    }

    /// Create a client over any transport
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        registry: Arc<TypeRegistry>,
        server_base_uri: &str,
    ) -> Self {
        Self {
            transport,
            registry,
            server_base_uri: server_base_uri.trim_end_matches('/').to_string(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Base URI that `{+bitbucket_url}` expands to
    pub fn bitbucket_url(&self) -> &str {
        &self.server_base_uri
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Classify `data` and materialize it, or hand it back unchanged
    pub fn convert_to_object(&self, data: Value) -> Item {
        match self.registry.classify(&data) {
            Some(resource_type) => Item::Resource(Resource::materialize(data, resource_type, self)),
            None => Item::Raw(data),
        }
    }

    /// Start a new lazy traversal rooted at `url`
    pub fn traverse(&self, url: impl Into<String>) -> Traversal {
        Traversal::new(self.clone(), url)
    }

    /// The service root, built from the embedded link document
    pub fn root(&self) -> Resource {
        entry_point(self)
    }

    /// Expand a link template. `bitbucket_url` is always available.
    pub fn expand(&self, href: &str, vars: &Value) -> String {
        if !template::is_template(href) {
            return href.to_string();
        }

        let mut merged = match vars {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        merged
            .entry("bitbucket_url")
            .or_insert_with(|| Value::String(self.server_base_uri.clone()));

        template::expand(href, &Value::Object(merged))
    }

    /// Send one request and classify the response against `expected`
    pub async fn execute(&self, request: HttpRequest, expected: u16) -> Result<HttpResponse> {
        let response = self.transport.send(request).await?;
        expect_status(&response, expected)?;
        Ok(response)
    }

    /// GET a URL and decode its JSON body
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        self.execute(HttpRequest::get(url), 200).await?.json()
    }

    /// GET a URL and return its body as text
    pub async fn get_text(&self, url: &str) -> Result<String> {
        Ok(self.execute(HttpRequest::get(url), 200).await?.body)
    }

    /// POST a new resource and materialize the server's answer
    pub async fn create(&self, url: &str, body: &Value) -> Result<Item> {
        let response = self
            .execute(HttpRequest::post(url, Some(body.clone())), 200)
            .await?;
        Ok(self.convert_to_object(response.json()?))
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("server_base_uri", &self.server_base_uri)
            .field("username", &self.username)
            .field("registry", &self.registry.kinds())
            .finish_non_exhaustive()
    }
}
