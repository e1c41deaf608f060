//! Bitbucket Authentication
//!
//! Credentials are attached to every outgoing request by the transport. Obtaining
//! OAuth tokens is left to the caller; an access token is simply passed through
//! as a bearer token.

use reqwest::RequestBuilder;
use std::fmt;

/// Credentials attached to every request
#[derive(Clone, Default)]
pub enum Credentials {
    /// No authentication (public resources only)
    #[default]
    Anonymous,
    /// HTTP basic authentication with username and app password
    Basic { username: String, password: String },
    /// Pre-obtained OAuth2 access token
    Bearer { token: String },
}

impl Credentials {
    /// Read credentials from the environment
    ///
    /// `BITBUCKET_TOKEN` wins over `BITBUCKET_USERNAME`/`BITBUCKET_PASSWORD`.
    /// A username without a password is not enough for basic auth.
    pub fn from_env() -> Self {
        if let Some(token) = non_empty_var("BITBUCKET_TOKEN") {
            return Self::Bearer { token };
        }

        match (
            non_empty_var("BITBUCKET_USERNAME"),
            non_empty_var("BITBUCKET_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Self::Basic { username, password },
            (Some(_), None) => {
                tracing::warn!("BITBUCKET_USERNAME set without BITBUCKET_PASSWORD, using anonymous access");
                Self::Anonymous
            }
            _ => Self::Anonymous,
        }
    }

    /// Username known from the credentials themselves
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Basic { username, .. } => Some(username),
            _ => None,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }

    /// Attach these credentials to a request
    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::Anonymous => request,
            Self::Basic { username, password } => request.basic_auth(username, Some(password)),
            Self::Bearer { token } => request.bearer_auth(token),
        }
    }
}

// Security: never print secrets
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Basic { username, .. } => write!(f, "Basic({}, ***)", username),
            Self::Bearer { .. } => write!(f, "Bearer(***)"),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
