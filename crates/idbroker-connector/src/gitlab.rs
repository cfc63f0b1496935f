//! GitLab connector.
//!
//! Users are identified through `/api/v4/user`. Groups come either from the
//! OIDC userinfo endpoint (one call, role claims included) or from listing
//! every visible group and probing the user's membership in each, see
//! [`GroupsSource`].

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::callback::CallbackRequest;
use crate::config::{GitLabConfig, GroupsSource};
use crate::connector::{Connector, LoginRequest};
use crate::context::CallContext;
use crate::groups::{access_level_role, enforce_allowed, with_role};
use crate::http::{self, JsonResponse};
use crate::identity::{Identity, Scopes, username_or_email};
use crate::oauth::OAuthClient;
use crate::{ConnectorError, ConnectorResult};

const SCOPE_USER: &str = "read_user";
const SCOPE_API: &str = "read_api";
const SCOPE_OPENID: &str = "openid";

static LINK_NEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>; rel="next""#).expect("valid regex"));
static LINK_LAST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>; rel="last""#).expect("valid regex"));

/// Refresh state kept in `Identity::connector_data`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectorData {
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GitLabUser {
    id: i64,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
    username: String,
}

#[derive(Debug, Default, Deserialize)]
struct UserInfo {
    #[serde(default)]
    groups: Vec<String>,
    #[serde(rename = "https://gitlab.org/claims/groups/owner", default)]
    owner: Vec<String>,
    #[serde(rename = "https://gitlab.org/claims/groups/maintainer", default)]
    maintainer: Vec<String>,
    #[serde(rename = "https://gitlab.org/claims/groups/developer", default)]
    developer: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabGroup {
    id: i64,
    #[serde(default)]
    full_path: String,
    #[serde(default)]
    name: String,
}

impl GitLabGroup {
    fn display_name(&self) -> &str {
        if self.full_path.is_empty() {
            &self.name
        } else {
            &self.full_path
        }
    }
}

#[derive(Debug, Deserialize)]
struct Membership {
    #[serde(default)]
    access_level: Option<u32>,
}

/// Returns the next page URL from a `Link` header, or `None` when `current`
/// is the last page.
fn next_page(current: &str, link: &str) -> Option<String> {
    if link.is_empty() {
        return None;
    }
    let last = LINK_LAST.captures(link)?;
    if &last[1] == current {
        return None;
    }
    LINK_NEXT.captures(link).map(|next| next[1].to_string())
}

fn endpoint(base: &Url, path: &str) -> ConnectorResult<Url> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&joined)
        .map_err(|e| ConnectorError::configuration(format!("invalid GitLab endpoint {joined:?}: {e}")))
}

pub struct GitLabConnector {
    id: String,
    config: GitLabConfig,
    base_url: Url,
    oauth: OAuthClient,
    http: reqwest::Client,
}

impl GitLabConnector {
    pub fn new(id: impl Into<String>, config: GitLabConfig) -> ConnectorResult<Self> {
        config.validate()?;
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ConnectorError::configuration(format!("invalid baseURL: {e}")))?;
        let http = http::build_client(config.request_timeout)?;
        let oauth = OAuthClient::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.redirect_uri.clone(),
            endpoint(&base_url, "oauth/authorize")?,
            endpoint(&base_url, "oauth/token")?,
            http.clone(),
        );

        Ok(Self {
            id: id.into(),
            config,
            base_url,
            oauth,
            http,
        })
    }

    fn groups_required(&self, scopes: Scopes) -> bool {
        !self.config.groups.is_empty() || scopes.groups
    }

    fn upstream_scopes(&self, scopes: Scopes) -> Vec<&'static str> {
        if !self.groups_required(scopes) {
            return vec![SCOPE_USER];
        }
        match self.config.groups_source {
            GroupsSource::Userinfo => vec![SCOPE_USER, SCOPE_OPENID],
            GroupsSource::Membership => vec![SCOPE_USER, SCOPE_API],
        }
    }

    async fn user(&self, ctx: &CallContext, token: &str) -> ConnectorResult<GitLabUser> {
        let url = endpoint(&self.base_url, "api/v4/user")?;
        let response: JsonResponse<GitLabUser> = http::fetch_json(
            ctx,
            "gitlab: get user",
            self.http.get(url).bearer_auth(token),
        )
        .await?;
        Ok(response.body)
    }

    async fn userinfo_groups(&self, ctx: &CallContext, token: &str) -> ConnectorResult<Vec<String>> {
        let url = endpoint(&self.base_url, "oauth/userinfo")?;
        let info: UserInfo = http::fetch_json(
            ctx,
            "gitlab: get userinfo",
            self.http.get(url).bearer_auth(token),
        )
        .await?
        .body;

        let mut groups = info.groups;
        if self.config.get_groups_permission {
            let annotated = [
                (&info.owner, "owner"),
                (&info.maintainer, "maintainer"),
                (&info.developer, "developer"),
            ];
            for (names, role) in annotated {
                groups.extend(names.iter().map(|name| with_role(name, role)));
            }
        }
        Ok(groups)
    }

    /// Every group visible to the token, following `Link` pagination.
    async fn visible_groups(&self, ctx: &CallContext, token: &str) -> ConnectorResult<Vec<GitLabGroup>> {
        let mut groups = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(endpoint(&self.base_url, "api/v4/groups?per_page=100")?.to_string());

        while let Some(url) = next.take() {
            if !seen.insert(url.clone()) {
                break;
            }
            tracing::debug!(connector = %self.id, url = %url, "fetching GitLab groups page");

            let page: JsonResponse<Vec<GitLabGroup>> = http::fetch_json(
                ctx,
                "gitlab: list groups",
                self.http.get(&url).bearer_auth(token),
            )
            .await?;
            groups.extend(page.body);

            let link = page
                .headers
                .get(reqwest::header::LINK)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            next = next_page(&url, link);
        }
        Ok(groups)
    }

    /// The user's access level in a group; `None` when not a member.
    async fn access_level(
        &self,
        ctx: &CallContext,
        token: &str,
        group_id: i64,
        user_id: i64,
    ) -> ConnectorResult<Option<u32>> {
        let operation = "gitlab: get group membership";
        let url = endpoint(
            &self.base_url,
            &format!("api/v4/groups/{group_id}/members/all/{user_id}"),
        )?;
        let response = http::send(ctx, operation, self.http.get(url).bearer_auth(token)).await?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let body = http::read_text(ctx, operation, response).await?;
        let membership: Membership = serde_json::from_str(&body)
            .map_err(|e| ConnectorError::malformed(operation, e))?;
        Ok(membership.access_level)
    }

    async fn membership_groups(
        &self,
        ctx: &CallContext,
        token: &str,
        user_id: i64,
    ) -> ConnectorResult<Vec<String>> {
        let visible = self.visible_groups(ctx, token).await?;
        let mut groups = Vec::new();
        for group in &visible {
            let level = self.access_level(ctx, token, group.id, user_id).await?;
            let Some(role) = level.and_then(access_level_role) else {
                continue;
            };
            let name = group.display_name();
            groups.push(name.to_string());
            if self.config.get_groups_permission {
                groups.push(with_role(name, role));
            }
        }
        Ok(groups)
    }

    async fn identity(&self, ctx: &CallContext, scopes: Scopes, token: &str) -> ConnectorResult<Identity> {
        let user = self.user(ctx, token).await?;

        let mut identity = Identity {
            user_id: user.id.to_string(),
            username: username_or_email(&user.name, &user.email),
            preferred_username: user.username.clone(),
            email: user.email.clone(),
            email_verified: true,
            ..Identity::default()
        };
        if self.config.use_login_as_id {
            identity.user_id = user.username.clone();
        }

        if self.groups_required(scopes) {
            let groups = match self.config.groups_source {
                GroupsSource::Userinfo => self.userinfo_groups(ctx, token).await?,
                GroupsSource::Membership => self.membership_groups(ctx, token, user.id).await?,
            };
            identity.groups = enforce_allowed(&user.username, groups, &self.config.groups, scopes.groups)?;
        }
        Ok(identity)
    }
}

fn encode_data(data: &ConnectorData) -> ConnectorResult<Vec<u8>> {
    serde_json::to_vec(data)
        .map_err(|e| ConnectorError::configuration(format!("failed to encode connector data: {e}")))
}

fn decode_data(bytes: &[u8]) -> ConnectorResult<ConnectorData> {
    if bytes.is_empty() {
        return Err(ConnectorError::configuration("gitlab: no connector data to refresh with"));
    }
    serde_json::from_slice(bytes)
        .map_err(|e| ConnectorError::configuration(format!("gitlab: unparseable connector data: {e}")))
}

#[async_trait]
impl Connector for GitLabConnector {
    fn connector_type(&self) -> &'static str {
        "gitlab"
    }

    fn login_url(&self, scopes: Scopes, callback_url: &str, state: &str) -> ConnectorResult<LoginRequest> {
        self.oauth.check_callback_url(callback_url)?;
        let url = self.oauth.authorize_url(&self.upstream_scopes(scopes), state, &[]);
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
        let mut identity = self.identity(ctx, scopes, &tokens.access_token).await?;

        if scopes.offline_access {
            identity.connector_data = encode_data(&ConnectorData {
                refresh_token: tokens.refresh_token.unwrap_or_default(),
                access_token: tokens.access_token,
            })?;
        }

        tracing::info!(
            connector = %self.id,
            user_id = %identity.user_id,
            groups = identity.groups.len(),
            "GitLab login succeeded"
        );
        Ok(identity)
    }

    async fn refresh(&self, ctx: &CallContext, scopes: Scopes, identity: Identity) -> ConnectorResult<Identity> {
        let stored = decode_data(&identity.connector_data)?;

        let data = if !stored.refresh_token.is_empty() {
            let tokens = self.oauth.refresh(ctx, &stored.refresh_token).await?;
            ConnectorData {
                refresh_token: tokens.refresh_token.unwrap_or(stored.refresh_token),
                access_token: tokens.access_token,
            }
        } else if !stored.access_token.is_empty() {
            stored
        } else {
            return Err(ConnectorError::configuration(
                "gitlab: connector data holds neither a refresh nor an access token",
            ));
        };

        let mut fresh = self.identity(ctx, scopes, &data.access_token).await?;
        fresh.connector_data = encode_data(&data)?;
        tracing::debug!(connector = %self.id, user_id = %fresh.user_id, "GitLab identity refreshed");
        Ok(fresh)
    }
}
