//! Connector configuration.
//!
//! Field names follow the upstream-facing JSON vocabulary (`clientID`,
//! `redirectURI`, ...), so stored connector configs and static config files
//! share one format.
//!
//! # Example
//!
//! ```ignore
//! use idbroker_connector::config::GitLabConfig;
//!
//! let config = GitLabConfig::new("client", "secret", "https://broker.example.com/callback")
//!     .with_groups(vec!["ops"])
//!     .with_groups_permission(true);
//! config.validate()?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{ConnectorError, ConnectorResult};

pub const DEFAULT_GITLAB_URL: &str = "https://gitlab.com";
pub const DEFAULT_GOOGLE_ISSUER: &str = "https://accounts.google.com";
pub const DEFAULT_DIRECTORY_URL: &str = "https://admin.googleapis.com";
/// Key of the admin binding used for domains without their own entry.
pub const WILDCARD_DOMAIN: &str = "*";

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_gitlab_url() -> String {
    DEFAULT_GITLAB_URL.to_string()
}

fn default_google_issuer() -> String {
    DEFAULT_GOOGLE_ISSUER.to_string()
}

fn default_directory_url() -> String {
    DEFAULT_DIRECTORY_URL.to_string()
}

fn require(value: &str, field: &str) -> ConnectorResult<()> {
    if value.trim().is_empty() {
        return Err(ConnectorError::configuration(format!("{field} is required")));
    }
    Ok(())
}

fn require_url(value: &str, field: &str) -> ConnectorResult<Url> {
    Url::parse(value)
        .map_err(|e| ConnectorError::configuration(format!("{field} {value:?} is not a valid URL: {e}")))
}

/// How the GitLab connector resolves group memberships.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupsSource {
    /// One call to the OIDC userinfo endpoint; groups are embedded in claims.
    #[default]
    Userinfo,
    /// List every visible group, then probe the user's membership in each.
    /// Costs one request per visible group on every login, so it only suits
    /// instances where the service sees a small number of groups.
    Membership,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabConfig {
    #[serde(rename = "baseURL", default = "default_gitlab_url")]
    pub base_url: String,

    #[serde(rename = "clientID")]
    pub client_id: String,

    #[serde(rename = "clientSecret")]
    pub client_secret: String,

    #[serde(rename = "redirectURI")]
    pub redirect_uri: String,

    /// Allow-list of group full paths.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Use the login handle instead of the numeric id as the user id.
    #[serde(rename = "useLoginAsID", default)]
    pub use_login_as_id: bool,

    /// Add `"<group>:<role>"` entries next to plain group names.
    #[serde(rename = "getGroupsPermission", default)]
    pub get_groups_permission: bool,

    #[serde(rename = "groupsSource", default)]
    pub groups_source: GroupsSource,

    #[serde(rename = "requestTimeout", default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl GitLabConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            base_url: default_gitlab_url(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            groups: Vec::new(),
            use_login_as_id: false,
            get_groups_permission: false,
            groups_source: GroupsSource::default(),
            request_timeout: default_request_timeout(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_groups(mut self, groups: Vec<impl Into<String>>) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_login_as_id(mut self, enabled: bool) -> Self {
        self.use_login_as_id = enabled;
        self
    }

    #[must_use]
    pub fn with_groups_permission(mut self, enabled: bool) -> Self {
        self.get_groups_permission = enabled;
        self
    }

    #[must_use]
    pub fn with_groups_source(mut self, source: GroupsSource) -> Self {
        self.groups_source = source;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        require(&self.client_id, "clientID")?;
        require(&self.client_secret, "clientSecret")?;
        require(&self.redirect_uri, "redirectURI")?;
        require_url(&self.base_url, "baseURL")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleConfig {
    /// OIDC issuer. Only overridden in tests.
    #[serde(default = "default_google_issuer")]
    pub issuer: String,

    #[serde(rename = "clientID")]
    pub client_id: String,

    #[serde(rename = "clientSecret")]
    pub client_secret: String,

    #[serde(rename = "redirectURI")]
    pub redirect_uri: String,

    /// Requested scopes besides `openid`; `profile` and `email` when empty.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Accepted values of the `hd` claim. `*` accepts any.
    #[serde(rename = "hostedDomains", default)]
    pub hosted_domains: Vec<String>,

    /// Allow-list of group emails.
    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(rename = "serviceAccountFilePath", default)]
    pub service_account_file_path: Option<String>,

    /// Admin to impersonate for any domain. Same as a `*` entry in
    /// `domainToAdminEmail`.
    #[serde(rename = "adminEmail", default)]
    pub admin_email: Option<String>,

    #[serde(rename = "domainToAdminEmail", default)]
    pub domain_to_admin_email: HashMap<String, String>,

    #[serde(rename = "fetchTransitiveGroupMembership", default)]
    pub fetch_transitive_group_membership: bool,

    /// `prompt` sent with offline access requests. Defaults to `consent`.
    #[serde(rename = "promptType", default)]
    pub prompt_type: Option<String>,

    #[serde(rename = "directoryURL", default = "default_directory_url")]
    pub directory_url: String,

    #[serde(rename = "requestTimeout", default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl GoogleConfig {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            issuer: default_google_issuer(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            hosted_domains: Vec::new(),
            groups: Vec::new(),
            service_account_file_path: None,
            admin_email: None,
            domain_to_admin_email: HashMap::new(),
            fetch_transitive_group_membership: false,
            prompt_type: None,
            directory_url: default_directory_url(),
            request_timeout: default_request_timeout(),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_hosted_domains(mut self, domains: Vec<impl Into<String>>) -> Self {
        self.hosted_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_groups(mut self, groups: Vec<impl Into<String>>) -> Self {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_service_account_file(mut self, path: impl Into<String>) -> Self {
        self.service_account_file_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_domain_admin(mut self, domain: impl Into<String>, admin: impl Into<String>) -> Self {
        self.domain_to_admin_email.insert(domain.into(), admin.into());
        self
    }

    #[must_use]
    pub fn with_transitive_groups(mut self, enabled: bool) -> Self {
        self.fetch_transitive_group_membership = enabled;
        self
    }

    #[must_use]
    pub fn with_prompt_type(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_type = Some(prompt.into());
        self
    }

    /// Domain to admin bindings, with `adminEmail` folded in as `*`.
    #[must_use]
    pub fn admin_bindings(&self) -> HashMap<String, String> {
        let mut bindings = self.domain_to_admin_email.clone();
        if let Some(admin) = &self.admin_email {
            bindings
                .entry(WILDCARD_DOMAIN.to_string())
                .or_insert_with(|| admin.clone());
        }
        bindings
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        self.prompt_type.as_deref().unwrap_or("consent")
    }

    pub fn validate(&self) -> ConnectorResult<()> {
        require(&self.client_id, "clientID")?;
        require(&self.client_secret, "clientSecret")?;
        require(&self.redirect_uri, "redirectURI")?;
        require_url(&self.issuer, "issuer")?;
        require_url(&self.directory_url, "directoryURL")?;
        if !self.admin_bindings().is_empty() && self.service_account_file_path.is_none() {
            return Err(ConnectorError::configuration(
                "directory service requires serviceAccountFilePath when admin emails are configured",
            ));
        }
        if self.service_account_file_path.is_some() && self.admin_bindings().is_empty() {
            return Err(ConnectorError::configuration(
                "directory service requires domainToAdminEmail or adminEmail to be configured",
            ));
        }
        Ok(())
    }
}
