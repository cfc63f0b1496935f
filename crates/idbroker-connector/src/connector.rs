//! The capability set every upstream connector implements.

use async_trait::async_trait;
use url::Url;

use crate::callback::CallbackRequest;
use crate::context::CallContext;
use crate::identity::{Identity, Scopes};
use crate::ConnectorResult;

/// Where to send the user, and what to hand back at callback time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub url: Url,
    /// Opaque state the caller returns to [`Connector::handle_callback`].
    pub continuation: Vec<u8>,
}

/// Logs users in through one upstream identity provider.
///
/// Instances are configured once and shared by concurrent login flows; all
/// per-flow state travels through arguments and return values.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Registry type name, e.g. `gitlab`.
    fn connector_type(&self) -> &'static str;

    /// Builds the upstream authorization URL.
    ///
    /// `callback_url` must equal the configured redirect URI exactly.
    fn login_url(
        &self,
        scopes: Scopes,
        callback_url: &str,
        state: &str,
    ) -> ConnectorResult<LoginRequest>;

    /// Completes a login from the upstream redirect.
    ///
    /// An `error` parameter on the request is returned as
    /// `UpstreamRejected` without attempting a code exchange.
    async fn handle_callback(
        &self,
        ctx: &CallContext,
        scopes: Scopes,
        continuation: &[u8],
        request: &CallbackRequest,
    ) -> ConnectorResult<Identity>;

    /// Re-derives an identity from its connector data without user
    /// interaction.
    async fn refresh(
        &self,
        ctx: &CallContext,
        scopes: Scopes,
        identity: Identity,
    ) -> ConnectorResult<Identity>;
}
