//! Google connector.
//!
//! Logs users in with Google's OIDC provider and, when directory
//! credentials are configured, resolves group memberships through the
//! Admin Directory impersonating the admin bound to the user's domain.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::callback::CallbackRequest;
use crate::config::{DEFAULT_GOOGLE_ISSUER, GoogleConfig, WILDCARD_DOMAIN};
use crate::connector::{Connector, LoginRequest};
use crate::context::CallContext;
use crate::directory::{AdminDirectory, GroupDirectory, ServiceAccount};
use crate::groups::enforce_allowed;
use crate::http;
use crate::identity::{Identity, Scopes, username_or_email};
use crate::oauth::{OAuthClient, TokenResponse};
use crate::oidc::{self, IdTokenVerifier};
use crate::{ConnectorError, ConnectorResult};

/// Google also issues tokens with the scheme-less issuer.
const GOOGLE_ISSUER_ALIAS: &str = "accounts.google.com";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectorData {
    #[serde(default)]
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleClaims {
    sub: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    name: String,
    #[serde(default)]
    hd: String,
}

type WalkFuture<'a> = Pin<Box<dyn Future<Output = ConnectorResult<()>> + Send + 'a>>;

pub struct GoogleConnector {
    id: String,
    config: GoogleConfig,
    oauth: OAuthClient,
    verifier: IdTokenVerifier,
    directories: HashMap<String, Arc<dyn GroupDirectory>>,
}

impl GoogleConnector {
    /// Discovers the provider and loads directory credentials.
    pub async fn open(id: impl Into<String>, config: GoogleConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let http = http::build_client(config.request_timeout)?;
        let ctx = CallContext::new().with_timeout(config.request_timeout);

        let document = oidc::discover(&ctx, &http, &config.issuer).await?;
        let endpoint = |value: &str| {
            Url::parse(value).map_err(|e| {
                ConnectorError::configuration(format!("invalid endpoint in discovery document {value:?}: {e}"))
            })
        };
        let oauth = OAuthClient::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.redirect_uri.clone(),
            endpoint(&document.authorization_endpoint)?,
            endpoint(&document.token_endpoint)?,
            http.clone(),
        );

        let mut verifier =
            IdTokenVerifier::new(config.issuer.clone(), config.client_id.clone(), &document.jwks_uri, http.clone())?;
        if config.issuer.trim_end_matches('/') == DEFAULT_GOOGLE_ISSUER {
            verifier = verifier.with_issuer_alias(GOOGLE_ISSUER_ALIAS);
        }

        let mut directories: HashMap<String, Arc<dyn GroupDirectory>> = HashMap::new();
        if let Some(path) = &config.service_account_file_path {
            let account = ServiceAccount::from_file(path)?;
            for (domain, admin) in config.admin_bindings() {
                let directory =
                    AdminDirectory::new(account.clone(), admin, config.directory_url.clone(), http.clone())?;
                directories.insert(domain, Arc::new(directory));
            }
        }

        Ok(Self {
            id: id.into(),
            config,
            oauth,
            verifier,
            directories,
        })
    }

    /// Registers the directory used for members of `domain` (`*` for any).
    #[must_use]
    pub fn with_directory(mut self, domain: impl Into<String>, directory: Arc<dyn GroupDirectory>) -> Self {
        self.directories.insert(domain.into(), directory);
        self
    }

    fn upstream_scopes(&self) -> Vec<&str> {
        let mut scopes = vec!["openid"];
        if self.config.scopes.is_empty() {
            scopes.extend(["profile", "email"]);
        } else {
            scopes.extend(self.config.scopes.iter().map(String::as_str));
        }
        scopes
    }

    fn hosted_domain_allowed(&self, hd: &str) -> bool {
        self.config.hosted_domains.is_empty()
            || self
                .config
                .hosted_domains
                .iter()
                .any(|domain| domain == WILDCARD_DOMAIN || domain == hd)
    }

    fn directory_for(&self, member: &str) -> ConnectorResult<&Arc<dyn GroupDirectory>> {
        let domain = member.rsplit_once('@').map(|(_, domain)| domain).unwrap_or_default();
        self.directories
            .get(domain)
            .or_else(|| self.directories.get(WILDCARD_DOMAIN))
            .ok_or_else(|| {
                ConnectorError::configuration(format!(
                    "unable to find super admin email, domainToAdminEmail for domain {domain:?} not set and no {WILDCARD_DOMAIN:?} entry"
                ))
            })
    }

    /// Groups of `email`, and with transitive lookups enabled the groups of
    /// those groups, each listed once.
    async fn user_groups(&self, ctx: &CallContext, email: &str) -> ConnectorResult<Vec<String>> {
        let mut seen = HashSet::new();
        let mut groups = Vec::new();
        self.walk(ctx, email.to_string(), &mut seen, &mut groups).await?;
        Ok(groups)
    }

    fn walk<'a>(
        &'a self,
        ctx: &'a CallContext,
        member: String,
        seen: &'a mut HashSet<String>,
        groups: &'a mut Vec<String>,
    ) -> WalkFuture<'a> {
        Box::pin(async move {
            let directory = self.directory_for(&member)?;
            let direct = directory.groups_for(ctx, &member).await?;
            tracing::debug!(connector = %self.id, member = %member, groups = direct.len(), "fetched directory groups");

            for group in direct {
                if !seen.insert(group.clone()) {
                    continue;
                }
                groups.push(group.clone());
                if self.config.fetch_transitive_group_membership {
                    self.walk(ctx, group, seen, groups).await?;
                }
            }
            Ok(())
        })
    }

    async fn identity(&self, ctx: &CallContext, scopes: Scopes, tokens: &TokenResponse) -> ConnectorResult<Identity> {
        let raw = tokens
            .id_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ConnectorError::malformed("google: token exchange", "no id_token in token response"))?;
        let claims: GoogleClaims = self.verifier.verify(ctx, raw).await?;

        if !self.hosted_domain_allowed(&claims.hd) {
            tracing::warn!(connector = %self.id, domain = %claims.hd, "hosted domain not allowed");
            return Err(ConnectorError::invalid_id_token(format!(
                "unexpected hd claim {:?}",
                claims.hd
            )));
        }

        let mut groups = Vec::new();
        if (scopes.groups || !self.config.groups.is_empty()) && !self.directories.is_empty() {
            groups = self.user_groups(ctx, &claims.email).await?;
        }
        let groups = enforce_allowed(&claims.email, groups, &self.config.groups, scopes.groups)?;

        Ok(Identity {
            user_id: claims.sub,
            username: username_or_email(&claims.name, &claims.email),
            preferred_username: String::new(),
            email: claims.email,
            email_verified: claims.email_verified,
            groups,
            connector_data: Vec::new(),
        })
    }
}

fn encode_data(refresh_token: String) -> ConnectorResult<Vec<u8>> {
    serde_json::to_vec(&ConnectorData { refresh_token })
        .map_err(|e| ConnectorError::configuration(format!("failed to encode connector data: {e}")))
}

#[async_trait]
impl Connector for GoogleConnector {
    fn connector_type(&self) -> &'static str {
        "google"
    }

    fn login_url(&self, scopes: Scopes, callback_url: &str, state: &str) -> ConnectorResult<LoginRequest> {
        self.oauth.check_callback_url(callback_url)?;

        let mut extra: Vec<(&str, &str)> = Vec::new();
        match self.config.hosted_domains.as_slice() {
            [] => {}
            [domain] => extra.push(("hd", domain.as_str())),
            _ => extra.push(("hd", WILDCARD_DOMAIN)),
        }
        if scopes.offline_access {
            extra.push(("access_type", "offline"));
            let prompt = self.config.prompt();
            if !prompt.is_empty() {
                extra.push(("prompt", prompt));
            }
        }

        let url = self.oauth.authorize_url(&self.upstream_scopes(), state, &extra);
        Ok(LoginRequest {
            url,
            continuation: Vec::new(),
        })
    }

    async fn handle_callback(
        &self,
        ctx: &CallContext,
        scopes: Scopes,
        _continuation: &[u8],
        request: &CallbackRequest,
    ) -> ConnectorResult<Identity> {
        let code = request.authorization_code()?;
        let tokens = self.oauth.exchange_code(ctx, code).await?;
        let mut identity = self.identity(ctx, scopes, &tokens).await?;

        if scopes.offline_access {
            identity.connector_data = encode_data(tokens.refresh_token.unwrap_or_default())?;
        }

        tracing::info!(
            connector = %self.id,
            user_id = %identity.user_id,
            groups = identity.groups.len(),
            "Google login succeeded"
        );
        Ok(identity)
    }

    async fn refresh(&self, ctx: &CallContext, scopes: Scopes, identity: Identity) -> ConnectorResult<Identity> {
        if identity.connector_data.is_empty() {
            return Err(ConnectorError::configuration("google: no connector data to refresh with"));
        }
        let stored: ConnectorData = serde_json::from_slice(&identity.connector_data)
            .map_err(|e| ConnectorError::configuration(format!("google: unparseable connector data: {e}")))?;
        if stored.refresh_token.is_empty() {
            return Err(ConnectorError::configuration("google: connector data holds no refresh token"));
        }

        let tokens = self.oauth.refresh(ctx, &stored.refresh_token).await?;
        let mut fresh = self.identity(ctx, scopes, &tokens).await?;
        let refresh_token = tokens
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or(stored.refresh_token);
        fresh.connector_data = encode_data(refresh_token)?;

        tracing::debug!(connector = %self.id, user_id = %fresh.user_id, "Google identity refreshed");
        Ok(fresh)
    }
}
