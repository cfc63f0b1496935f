//! Upstream identity provider connectors.
//!
//! A [`Connector`] turns an upstream login into an [`Identity`]:
//!
//! - [`gitlab::GitLabConnector`]: GitLab OAuth2 with REST profile and groups
//! - [`google::GoogleConnector`]: Google OIDC with Admin Directory groups
//!
//! Connectors are opened by type name through [`registry::open`].

pub mod callback;
pub mod config;
pub mod connector;
pub mod context;
pub mod directory;
pub mod error;
pub mod gitlab;
pub mod google;
pub mod groups;
pub(crate) mod http;
pub mod identity;
pub mod oauth;
pub mod oidc;
pub mod registry;

#[cfg(test)]
mod testutil;

pub use callback::CallbackRequest;
pub use config::{GitLabConfig, GoogleConfig, GroupsSource};
pub use connector::{Connector, LoginRequest};
pub use context::CallContext;
pub use directory::{AdminDirectory, GroupDirectory, ServiceAccount};
pub use error::{ConnectorError, ErrorCategory};
pub use gitlab::GitLabConnector;
pub use google::GoogleConnector;
pub use identity::{Identity, Scopes};

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
