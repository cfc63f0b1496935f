//! The redirect request an upstream provider sends back after login.

use std::collections::HashMap;

use url::Url;

use crate::{ConnectorError, ConnectorResult};

/// Query parameters of an incoming callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackRequest {
    params: HashMap<String, String>,
}

impl CallbackRequest {
    /// Parses a raw query string, without the leading `?`.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let params = url::form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();
        Self { params }
    }

    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.get("code").filter(|c| !c.is_empty())
    }

    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.get("state")
    }

    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.get("error").filter(|e| !e.is_empty())
    }

    #[must_use]
    pub fn error_description(&self) -> Option<&str> {
        self.get("error_description")
    }

    /// Returns the authorization code, or the upstream's own error if it
    /// reported one. Connectors call this before any code exchange.
    pub fn authorization_code(&self) -> ConnectorResult<&str> {
        if let Some(error) = self.error() {
            return Err(ConnectorError::upstream_rejected(
                error,
                self.error_description().unwrap_or_default(),
            ));
        }
        self.code()
            .ok_or_else(|| ConnectorError::invalid_request("missing code parameter"))
    }
}
