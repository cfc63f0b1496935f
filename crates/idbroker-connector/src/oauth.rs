//! OAuth2 authorization code client used by the connectors.

use serde::Deserialize;
use url::Url;

use crate::context::CallContext;
use crate::http;
use crate::{ConnectorError, ConnectorResult};

/// Token endpoint response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// OAuth error response from a token endpoint.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Client credentials and endpoints of one upstream OAuth2 application.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_url: Url,
    token_url: Url,
    http: reqwest::Client,
}

impl OAuthClient {
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        auth_url: Url,
        token_url: Url,
        http: reqwest::Client,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_url,
            token_url,
            http,
        }
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Fails unless `callback_url` is exactly the configured redirect URI.
    pub fn check_callback_url(&self, callback_url: &str) -> ConnectorResult<()> {
        if callback_url != self.redirect_uri {
            return Err(ConnectorError::configuration(format!(
                "expected callback URL {callback_url:?} did not match the URL in the config {:?}",
                self.redirect_uri
            )));
        }
        Ok(())
    }

    /// Builds the authorization request URL.
    #[must_use]
    pub fn authorize_url(&self, scopes: &[&str], state: &str, extra: &[(&str, &str)]) -> Url {
        let mut url = self.auth_url.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("client_id", &self.client_id);
            params.append_pair("redirect_uri", &self.redirect_uri);
            params.append_pair("response_type", "code");
            params.append_pair("scope", &scopes.join(" "));
            params.append_pair("state", state);
            for (key, value) in extra {
                params.append_pair(key, value);
            }
        }
        url
    }

    /// Exchanges an authorization code for tokens.
    pub async fn exchange_code(&self, ctx: &CallContext, code: &str) -> ConnectorResult<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        self.token_request(ctx, "exchange authorization code", &params)
            .await
    }

    /// Obtains fresh tokens with a refresh token.
    pub async fn refresh(&self, ctx: &CallContext, refresh_token: &str) -> ConnectorResult<TokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        self.token_request(ctx, "refresh token", &params).await
    }

    async fn token_request(
        &self,
        ctx: &CallContext,
        operation: &str,
        params: &[(&str, &str)],
    ) -> ConnectorResult<TokenResponse> {
        tracing::debug!(token_url = %self.token_url, "{operation}");

        let request = self
            .http
            .post(self.token_url.as_str())
            .header("Accept", "application/json")
            .form(params);
        let response = http::send(ctx, operation, request).await?;
        let status = response.status();
        let body = http::read_text(ctx, operation, response).await?;

        if !status.is_success() {
            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(ConnectorError::upstream_rejected(
                    oauth_error.error,
                    oauth_error.error_description.unwrap_or_default(),
                ));
            }
            return Err(ConnectorError::malformed(
                operation,
                format!("HTTP {status}: {body}"),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            ConnectorError::malformed(operation, format!("failed to parse token response: {e}"))
        })
    }
}
