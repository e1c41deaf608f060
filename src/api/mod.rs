//! Bitbucket API plumbing
//!
//! - [`http`] - Transport trait and the reqwest-backed client
//! - [`auth`] - Credentials attached to every request
//! - [`error`] - Status classification and the crate error type
//! - [`template`] - URI template expansion for link hrefs
//! - [`client`] - The session shared by every resource

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod template;
