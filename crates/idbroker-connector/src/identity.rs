//! The identity record produced by connectors, and the scopes that shape it.

use idbroker_storage::Claims;

/// A user as authenticated by an upstream provider.
///
/// Built fresh by every callback and refresh. `connector_data` is opaque
/// outside the connector that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub preferred_username: String,
    pub email: String,
    pub email_verified: bool,
    pub groups: Vec<String>,
    pub connector_data: Vec<u8>,
}

/// Display name, or the email when the provider has none.
#[must_use]
pub fn username_or_email(name: &str, email: &str) -> String {
    if name.is_empty() {
        email.to_string()
    } else {
        name.to_string()
    }
}

impl From<&Identity> for Claims {
    fn from(identity: &Identity) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            username: identity.username.clone(),
            preferred_username: identity.preferred_username.clone(),
            email: identity.email.clone(),
            email_verified: identity.email_verified,
            groups: identity.groups.clone(),
        }
    }
}

/// What the client asked for, as far as connectors care.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scopes {
    /// The client wants a refresh token; connectors must emit connector data.
    pub offline_access: bool,
    /// The client wants group claims.
    pub groups: bool,
}

impl Scopes {
    pub const OFFLINE_ACCESS: &'static str = "offline_access";
    pub const GROUPS: &'static str = "groups";

    /// Extracts connector scopes from requested OAuth2 scope values.
    #[must_use]
    pub fn from_requested<S: AsRef<str>>(requested: &[S]) -> Self {
        let mut scopes = Self::default();
        for scope in requested {
            match scope.as_ref() {
                Self::OFFLINE_ACCESS => scopes.offline_access = true,
                Self::GROUPS => scopes.groups = true,
                _ => {}
            }
        }
        scopes
    }
}
