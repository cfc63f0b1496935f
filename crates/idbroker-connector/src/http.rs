//! Upstream request helpers shared by the connectors.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::context::CallContext;
use crate::{ConnectorError, ConnectorResult};

/// Builds the HTTP client a connector uses for all upstream calls.
pub(crate) fn build_client(timeout: Duration) -> ConnectorResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ConnectorError::configuration(format!("failed to create HTTP client: {e}")))
}

/// A successful upstream response with its decoded body.
pub(crate) struct JsonResponse<T> {
    pub body: T,
    pub headers: HeaderMap,
}

/// Sends `request` under `ctx` and returns the raw response.
pub(crate) async fn send(
    ctx: &CallContext,
    operation: &str,
    request: reqwest::RequestBuilder,
) -> ConnectorResult<reqwest::Response> {
    ctx.run(operation, async {
        request
            .send()
            .await
            .map_err(|e| ConnectorError::unreachable(operation, e))
    })
    .await
}

/// Reads the body of `response` under `ctx`.
pub(crate) async fn read_text(
    ctx: &CallContext,
    operation: &str,
    response: reqwest::Response,
) -> ConnectorResult<String> {
    ctx.run(operation, async {
        response
            .text()
            .await
            .map_err(|e| ConnectorError::unreachable(operation, e))
    })
    .await
}

/// Sends `request` and decodes a 2xx JSON body. Any other status is
/// reported with its body.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    ctx: &CallContext,
    operation: &str,
    request: reqwest::RequestBuilder,
) -> ConnectorResult<JsonResponse<T>> {
    let response = send(ctx, operation, request).await?;
    let status = response.status();
    let headers = response.headers().clone();
    let body = read_text(ctx, operation, response).await?;

    if !status.is_success() {
        return Err(ConnectorError::malformed(
            operation,
            format!("HTTP {status}: {body}"),
        ));
    }

    let body = serde_json::from_str(&body)
        .map_err(|e| ConnectorError::malformed(operation, format!("failed to decode body: {e}")))?;
    Ok(JsonResponse { body, headers })
}
