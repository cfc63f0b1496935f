//! OIDC discovery and ID token verification against a provider's JWKS.
//!
//! Keys are cached for the `Cache-Control: max-age` the provider sends,
//! clamped to [`MIN_KEYS_TTL`, `MAX_KEYS_TTL`]. A token signed with an
//! unknown `kid` forces one refetch, which picks up provider key rotation.
//! Forced refetches happen at most once per [`MIN_KEYS_TTL`].

use std::time::Duration;

use jsonwebtoken::jwk::{Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::time::Instant;
use url::Url;

use crate::context::CallContext;
use crate::http::{self, JsonResponse};
use crate::{ConnectorError, ConnectorResult};

pub const DEFAULT_KEYS_TTL: Duration = Duration::from_secs(3600);
pub const MIN_KEYS_TTL: Duration = Duration::from_secs(60);
pub const MAX_KEYS_TTL: Duration = Duration::from_secs(86400);

/// The parts of an OpenID provider configuration the connectors use.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
}

/// Fetches `{issuer}/.well-known/openid-configuration` and checks that the
/// document names the same issuer.
pub async fn discover(
    ctx: &CallContext,
    http: &reqwest::Client,
    issuer: &str,
) -> ConnectorResult<DiscoveryDocument> {
    let operation = "oidc: discovery";
    let expected = issuer.trim_end_matches('/');
    let url = format!("{expected}/.well-known/openid-configuration");

    let document: DiscoveryDocument = http::fetch_json(ctx, operation, http.get(&url))
        .await?
        .body;
    if document.issuer.trim_end_matches('/') != expected {
        return Err(ConnectorError::configuration(format!(
            "oidc: issuer did not match the issuer returned by provider, expected {expected:?} got {:?}",
            document.issuer
        )));
    }

    tracing::debug!(issuer = expected, jwks_uri = %document.jwks_uri, "OIDC provider discovered");
    Ok(document)
}

struct CachedKeys {
    keys: JwkSet,
    fetched_at: Instant,
    expires_at: Instant,
}

impl CachedKeys {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }

    /// A live key set fetched less than [`MIN_KEYS_TTL`] ago is not refetched.
    fn refetch_allowed(&self, now: Instant) -> bool {
        !self.is_fresh(now) || now.duration_since(self.fetched_at) >= MIN_KEYS_TTL
    }

    fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.keys.iter().find(|jwk| {
            jwk.common.key_id.as_deref() == Some(kid)
                && !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
        })
    }
}

fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    jwk.common.key_algorithm.as_ref().and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        _ => None,
    })
}

fn max_age(headers: &reqwest::header::HeaderMap) -> Duration {
    headers
        .get(reqwest::header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            v.split(',')
                .find_map(|directive| directive.trim().strip_prefix("max-age=")?.parse::<u64>().ok())
        })
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_KEYS_TTL)
        .clamp(MIN_KEYS_TTL, MAX_KEYS_TTL)
}

/// Verifies ID tokens issued to one client.
pub struct IdTokenVerifier {
    issuers: Vec<String>,
    audience: String,
    jwks_uri: Url,
    leeway: Duration,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl IdTokenVerifier {
    pub fn new(
        issuer: impl Into<String>,
        audience: impl Into<String>,
        jwks_uri: &str,
        http: reqwest::Client,
    ) -> ConnectorResult<Self> {
        let jwks_uri = Url::parse(jwks_uri)
            .map_err(|e| ConnectorError::configuration(format!("invalid jwks_uri {jwks_uri:?}: {e}")))?;
        let issuer: String = issuer.into();
        Ok(Self {
            issuers: vec![issuer.trim_end_matches('/').to_string()],
            audience: audience.into(),
            jwks_uri,
            leeway: Duration::from_secs(60),
            http,
            cache: RwLock::new(None),
        })
    }

    /// Also accepts tokens whose `iss` is `issuer`.
    #[must_use]
    pub fn with_issuer_alias(mut self, issuer: impl Into<String>) -> Self {
        self.issuers.push(issuer.into());
        self
    }

    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Checks signature, audience, issuer and expiry, and decodes the claims.
    pub async fn verify<C: DeserializeOwned>(&self, ctx: &CallContext, token: &str) -> ConnectorResult<C> {
        let header = decode_header(token).map_err(ConnectorError::invalid_id_token)?;
        let kid = header
            .kid
            .ok_or_else(|| ConnectorError::invalid_id_token("token header has no kid"))?;

        let (key, key_alg) = self.key(ctx, &kid).await?;
        let alg = key_alg.unwrap_or(header.alg);
        if alg != header.alg {
            return Err(ConnectorError::invalid_id_token(format!(
                "token algorithm {:?} does not match key algorithm {alg:?}",
                header.alg
            )));
        }

        let mut validation = Validation::new(alg);
        validation.set_audience(&[&self.audience]);
        validation.set_issuer(&self.issuers);
        validation.leeway = self.leeway.as_secs();

        decode::<C>(token, &key, &validation)
            .map(|data| data.claims)
            .map_err(ConnectorError::invalid_id_token)
    }

    async fn key(&self, ctx: &CallContext, kid: &str) -> ConnectorResult<(DecodingKey, Option<Algorithm>)> {
        if let Some(found) = self.cached_key(kid).await? {
            tracing::trace!(kid, "JWKS cache hit");
            return Ok(found);
        }

        let allowed = self
            .cache
            .read()
            .await
            .as_ref()
            .is_none_or(|cached| cached.refetch_allowed(Instant::now()));
        if !allowed {
            tracing::debug!(kid, "JWKS refetched recently, not fetching again");
            return Err(ConnectorError::invalid_id_token(format!("no signing key with kid {kid:?}")));
        }

        tracing::debug!(kid, jwks_uri = %self.jwks_uri, "JWKS cache miss");
        self.refresh(ctx).await?;
        self.cached_key(kid)
            .await?
            .ok_or_else(|| ConnectorError::invalid_id_token(format!("no signing key with kid {kid:?}")))
    }

    async fn cached_key(&self, kid: &str) -> ConnectorResult<Option<(DecodingKey, Option<Algorithm>)>> {
        let cache = self.cache.read().await;
        let Some(jwk) = cache
            .as_ref()
            .filter(|cached| cached.is_fresh(Instant::now()))
            .and_then(|cached| cached.find(kid))
        else {
            return Ok(None);
        };
        let key = DecodingKey::from_jwk(jwk).map_err(ConnectorError::invalid_id_token)?;
        Ok(Some((key, jwk_algorithm(jwk))))
    }

    async fn refresh(&self, ctx: &CallContext) -> ConnectorResult<()> {
        let response: JsonResponse<JwkSet> = http::fetch_json(
            ctx,
            "oidc: fetch keys",
            self.http.get(self.jwks_uri.as_str()),
        )
        .await?;
        let ttl = max_age(&response.headers);

        tracing::debug!(keys = response.body.keys.len(), ttl_secs = ttl.as_secs(), "JWKS refreshed");
        let now = Instant::now();
        *self.cache.write().await = Some(CachedKeys {
            keys: response.body,
            fetched_at: now,
            expires_at: now + ttl,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue};
    use serde::Serialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::testutil;

    #[derive(Debug, Serialize, Deserialize)]
    struct TestClaims {
        iss: String,
        aud: String,
        sub: String,
        exp: i64,
        iat: i64,
    }

    fn claims(server: &MockServer, aud: &str, exp_offset: i64) -> TestClaims {
        let now = testutil::unix_now();
        TestClaims {
            iss: server.uri(),
            aud: aud.into(),
            sub: "user-1".into(),
            exp: now + exp_offset,
            iat: now,
        }
    }

    async fn verifier(server: &MockServer) -> IdTokenVerifier {
        let http = http::build_client(Duration::from_secs(5)).unwrap();
        let document = discover(&CallContext::new(), &http, &server.uri()).await.unwrap();
        IdTokenVerifier::new(server.uri(), "client", &document.jwks_uri, http).unwrap()
    }

    async fn jwks_requests(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/oauth2/v3/certs")
            .count()
    }

    #[test]
    fn test_max_age_is_clamped() {
        let mut headers = HeaderMap::new();
        assert_eq!(max_age(&headers), DEFAULT_KEYS_TTL);

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=19000, must-revalidate"));
        assert_eq!(max_age(&headers), Duration::from_secs(19000));

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=1"));
        assert_eq!(max_age(&headers), MIN_KEYS_TTL);

        headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=9999999"));
        assert_eq!(max_age(&headers), MAX_KEYS_TTL);
    }

    #[tokio::test]
    async fn test_discovery_rejects_issuer_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": "https://elsewhere.example.com",
                "authorization_endpoint": "https://elsewhere.example.com/auth",
                "token_endpoint": "https://elsewhere.example.com/token",
                "jwks_uri": "https://elsewhere.example.com/keys"
            })))
            .mount(&server)
            .await;

        let http = http::build_client(Duration::from_secs(5)).unwrap();
        let err = discover(&CallContext::new(), &http, &server.uri()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_verify_valid_token() {
        let server = MockServer::start().await;
        testutil::mount_provider(&server).await;
        let verifier = verifier(&server).await;

        let token = testutil::sign(&claims(&server, "client", 600));
        let decoded: TestClaims = verifier.verify(&CallContext::new(), &token).await.unwrap();
        assert_eq!(decoded.sub, "user-1");

        // second verification is served from cache
        let _: TestClaims = verifier.verify(&CallContext::new(), &token).await.unwrap();
        let jwks_requests = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/oauth2/v3/certs")
            .count();
        assert_eq!(jwks_requests, 1);
    }

    #[tokio::test]
    async fn test_verify_rejects_wrong_audience_and_expired() {
        let server = MockServer::start().await;
        testutil::mount_provider(&server).await;
        let verifier = verifier(&server).await;

        let token = testutil::sign(&claims(&server, "someone-else", 600));
        let err = verifier
            .verify::<TestClaims>(&CallContext::new(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidIdToken { .. }));

        let token = testutil::sign(&claims(&server, "client", -3600));
        let err = verifier
            .verify::<TestClaims>(&CallContext::new(), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidIdToken { .. }));
    }

    #[tokio::test]
    async fn test_verify_rejects_tampered_token() {
        let server = MockServer::start().await;
        testutil::mount_provider(&server).await;
        let verifier = verifier(&server).await;

        let token = testutil::sign(&claims(&server, "client", 600));
        let forged = testutil::sign(&TestClaims {
            sub: "admin".into(),
            ..claims(&server, "client", 600)
        });
        let original: Vec<&str> = token.split('.').collect();
        let forged_payload = forged.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", original[0], forged_payload, original[2]);

        let err = verifier
            .verify::<TestClaims>(&CallContext::new(), &spliced)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidIdToken { .. }));
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_at_most_once_per_min_ttl() {
        let server = MockServer::start().await;
        testutil::mount_provider(&server).await;
        let verifier = verifier(&server).await;

        let token = testutil::sign(&claims(&server, "client", 600));
        let _: TestClaims = verifier.verify(&CallContext::new(), &token).await.unwrap();
        assert_eq!(jwks_requests(&server).await, 1);

        let unknown = testutil::sign_with_kid(&claims(&server, "client", 600), "rotated-away");
        for _ in 0..3 {
            let err = verifier
                .verify::<TestClaims>(&CallContext::new(), &unknown)
                .await
                .unwrap_err();
            assert!(matches!(err, ConnectorError::InvalidIdToken { .. }));
        }
        assert_eq!(jwks_requests(&server).await, 1);

        // Once the cooldown has passed the next miss fetches again.
        verifier.cache.write().await.as_mut().unwrap().fetched_at -= MIN_KEYS_TTL;
        let _ = verifier.verify::<TestClaims>(&CallContext::new(), &unknown).await;
        assert_eq!(jwks_requests(&server).await, 2);
    }

    #[test]
    fn test_refetch_allowed_after_expiry_or_cooldown() {
        let now = Instant::now();
        let cached = CachedKeys {
            keys: JwkSet { keys: Vec::new() },
            fetched_at: now,
            expires_at: now + DEFAULT_KEYS_TTL,
        };
        assert!(!cached.refetch_allowed(now));
        assert!(cached.refetch_allowed(now + MIN_KEYS_TTL));

        let expired = CachedKeys {
            expires_at: now,
            ..cached
        };
        assert!(expired.refetch_allowed(now));
    }
}
