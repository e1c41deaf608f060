//! hyperbucket - hypermedia client for the Bitbucket API
//!
//! Payloads are classified by shape into typed resources whose links become lazy,
//! paginated traversals. Start from [`Client::root`] and follow relationships.

pub mod api;
pub mod config;
pub mod resource;

#[cfg(test)]
mod testing;

pub use api::auth::Credentials;
pub use api::client::Client;
pub use api::error::{Error, ErrorDetails, Result};
pub use api::http::{HttpClient, HttpRequest, HttpResponse, Transport};
pub use config::Config;
pub use resource::{
    Embedded, Item, Relationship, Resource, ResourceKind, ResourceType, SpecialAction, Traversal,
    TypeRegistry,
};
