//! Group lookups against the Google Workspace Admin Directory.
//!
//! Requests are authorized with a service account that impersonates a
//! domain admin (JWT bearer grant, RFC 7523).

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::context::CallContext;
use crate::http;
use crate::{ConnectorError, ConnectorResult};

pub const DIRECTORY_GROUP_SCOPE: &str =
    "https://www.googleapis.com/auth/admin.directory.group.readonly";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: i64 = 3600;
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Resolves the groups a member belongs to.
#[async_trait]
pub trait GroupDirectory: Send + Sync {
    /// Emails of the groups `member` (a user or group email) directly
    /// belongs to.
    async fn groups_for(&self, ctx: &CallContext, member: &str) -> ConnectorResult<Vec<String>>;
}

/// The fields of a service account key file the directory client needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    pub fn from_json(json: &str) -> ConnectorResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ConnectorError::configuration(format!("invalid service account key: {e}")))
    }

    pub fn from_file(path: impl AsRef<Path>) -> ConnectorResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ConnectorError::configuration(format!(
                "unable to read service account file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_json(&json)
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupsPage {
    #[serde(default)]
    groups: Vec<DirectoryGroup>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DirectoryGroup {
    email: String,
}

/// Admin Directory client acting as one admin.
pub struct AdminDirectory {
    account: ServiceAccount,
    admin_email: String,
    directory_url: String,
    signing_key: EncodingKey,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl AdminDirectory {
    pub fn new(
        account: ServiceAccount,
        admin_email: impl Into<String>,
        directory_url: impl Into<String>,
        http: reqwest::Client,
    ) -> ConnectorResult<Self> {
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes()).map_err(|e| {
            ConnectorError::configuration(format!("invalid service account private key: {e}"))
        })?;
        let directory_url: String = directory_url.into();
        Ok(Self {
            account,
            admin_email: admin_email.into(),
            directory_url: directory_url.trim_end_matches('/').to_string(),
            signing_key,
            http,
            token: Mutex::new(None),
        })
    }

    fn assertion(&self) -> ConnectorResult<String> {
        let iat = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            iss: &self.account.client_email,
            sub: &self.admin_email,
            scope: DIRECTORY_GROUP_SCOPE,
            aud: &self.account.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();
        encode(&header, &claims, &self.signing_key)
            .map_err(|e| ConnectorError::configuration(format!("unable to sign service account assertion: {e}")))
    }

    async fn access_token(&self, ctx: &CallContext) -> ConnectorResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.value.clone());
        }

        let assertion = self.assertion()?;
        let params = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        let token: AccessToken = http::fetch_json(
            ctx,
            "directory: service account token",
            self.http.post(&self.account.token_uri).form(&params),
        )
        .await?
        .body;

        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));
        tracing::debug!(
            admin = %self.admin_email,
            expires_in_secs = lifetime.as_secs(),
            "obtained directory access token"
        );
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });
        Ok(token.access_token)
    }
}

#[async_trait]
impl GroupDirectory for AdminDirectory {
    async fn groups_for(&self, ctx: &CallContext, member: &str) -> ConnectorResult<Vec<String>> {
        let token = self.access_token(ctx).await?;
        let url = format!("{}/admin/directory/v1/groups", self.directory_url);

        let mut groups = Vec::new();
        let mut requested = HashSet::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(&[("userKey", member)]);
            if let Some(page) = &page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let page: GroupsPage = http::fetch_json(ctx, "directory: list groups", request)
                .await?
                .body;
            groups.extend(page.groups.into_iter().map(|group| group.email));

            match page.next_page_token {
                Some(next) if !next.is_empty() => {
                    if !requested.insert(next.clone()) {
                        tracing::warn!(member, page_token = %next, "directory repeated a page token");
                        break;
                    }
                    page_token = Some(next);
                }
                _ => break,
            }
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testutil::PRIVATE_KEY_PEM;

    fn account(server: &MockServer) -> ServiceAccount {
        ServiceAccount {
            client_email: "broker@project.iam.gserviceaccount.com".into(),
            private_key: PRIVATE_KEY_PEM.into(),
            private_key_id: Some("sa-key".into()),
            token_uri: format!("{}/token", server.uri()),
        }
    }

    #[test]
    fn test_service_account_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let json = serde_json::json!({
            "type": "service_account",
            "client_email": "broker@project.iam.gserviceaccount.com",
            "private_key": PRIVATE_KEY_PEM,
            "private_key_id": "abc",
        });
        file.write_all(json.to_string().as_bytes()).unwrap();

        let account = ServiceAccount::from_file(file.path()).unwrap();
        assert_eq!(account.client_email, "broker@project.iam.gserviceaccount.com");
        assert_eq!(account.token_uri, "https://oauth2.googleapis.com/token");
        assert!(!format!("{account:?}").contains("PRIVATE KEY"));

        let err = ServiceAccount::from_file("/nonexistent/sa.json").unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_groups_for_pages_and_caches_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"))
            .and(body_string_contains("assertion="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "directory-token",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/directory/v1/groups"))
            .and(query_param("userKey", "user@example.com"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "groups": [{"email": "b@example.com"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/directory/v1/groups"))
            .and(query_param("userKey", "user@example.com"))
            .and(header("authorization", "Bearer directory-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "groups": [{"email": "a@example.com"}],
                "nextPageToken": "p2"
            })))
            .mount(&server)
            .await;

        let directory = AdminDirectory::new(
            account(&server),
            "admin@example.com",
            server.uri(),
            http::build_client(Duration::from_secs(5)).unwrap(),
        )
        .unwrap();

        let ctx = CallContext::new();
        let groups = directory.groups_for(&ctx, "user@example.com").await.unwrap();
        assert_eq!(groups, vec!["a@example.com", "b@example.com"]);

        let again = directory.groups_for(&ctx, "user@example.com").await.unwrap();
        assert_eq!(again, groups);
    }

    #[tokio::test]
    async fn test_groups_for_stops_on_repeated_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "directory-token",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/directory/v1/groups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "groups": [{"email": "a@example.com"}],
                "nextPageToken": "same"
            })))
            .expect(2)
            .mount(&server)
            .await;

        let directory = AdminDirectory::new(
            account(&server),
            "admin@example.com",
            server.uri(),
            http::build_client(Duration::from_secs(5)).unwrap(),
        )
        .unwrap();

        let groups = tokio::time::timeout(
            Duration::from_secs(3),
            directory.groups_for(&CallContext::new(), "user@example.com"),
        )
        .await
        .expect("paging must terminate")
        .unwrap();
        assert_eq!(groups, vec!["a@example.com", "a@example.com"]);
    }

    #[tokio::test]
    async fn test_assertion_claims() {
        let server = MockServer::start().await;
        let directory = AdminDirectory::new(
            account(&server),
            "admin@example.com",
            server.uri(),
            http::build_client(Duration::from_secs(5)).unwrap(),
        )
        .unwrap();

        let assertion = directory.assertion().unwrap();
        let header = jsonwebtoken::decode_header(&assertion).unwrap();
        assert_eq!(header.kid.as_deref(), Some("sa-key"));

        let payload = assertion.split('.').nth(1).unwrap();
        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(claims["aud"], format!("{}/token", server.uri()));
        assert_eq!(claims["iss"], "broker@project.iam.gserviceaccount.com");
        assert_eq!(claims["sub"], "admin@example.com");
        assert_eq!(claims["scope"], DIRECTORY_GROUP_SCOPE);
    }

    #[tokio::test]
    async fn test_invalid_private_key() {
        let server = MockServer::start().await;
        let mut account = account(&server);
        account.private_key = "not a key".into();
        let result = AdminDirectory::new(
            account,
            "admin@example.com",
            server.uri(),
            http::build_client(Duration::from_secs(5)).unwrap(),
        );
        assert!(matches!(result, Err(ConnectorError::Configuration { .. })));
    }
}
