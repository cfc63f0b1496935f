//! Signing helpers for tests that stand up a fake OIDC provider.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use serde::Serialize;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub(crate) const PRIVATE_KEY_PEM: &str = include_str!("testdata/rsa_private.pem");
pub(crate) const KID: &str = "test-key";

pub(crate) fn jwks() -> serde_json::Value {
    let key = rsa::RsaPrivateKey::from_pkcs1_pem(PRIVATE_KEY_PEM).unwrap();
    serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": KID,
            "n": URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }]
    })
}

pub(crate) fn sign(claims: &impl Serialize) -> String {
    sign_with_kid(claims, KID)
}

pub(crate) fn sign_with_kid(claims: &impl Serialize, kid: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(PRIVATE_KEY_PEM.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

pub(crate) fn unix_now() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

/// Mounts discovery and JWKS documents for an issuer at `server.uri()`.
pub(crate) async fn mount_provider(server: &MockServer) {
    let issuer = server.uri();
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": issuer,
            "authorization_endpoint": format!("{issuer}/o/oauth2/v2/auth"),
            "token_endpoint": format!("{issuer}/token"),
            "jwks_uri": format!("{issuer}/oauth2/v3/certs"),
            "userinfo_endpoint": format!("{issuer}/v1/userinfo"),
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/oauth2/v3/certs"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Cache-Control", "public, max-age=600")
                .set_body_json(jwks()),
        )
        .mount(server)
        .await;
}
