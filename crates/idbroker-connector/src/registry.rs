//! Opens connectors by type name from their JSON configuration.

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::config::{GitLabConfig, GoogleConfig};
use crate::connector::Connector;
use crate::gitlab::GitLabConnector;
use crate::google::GoogleConnector;
use crate::{ConnectorError, ConnectorResult};

pub const GITLAB: &str = "gitlab";
pub const GOOGLE: &str = "google";

/// Connector types [`open`] understands.
#[must_use]
pub fn supported_types() -> &'static [&'static str] {
    &[GITLAB, GOOGLE]
}

fn parse<T: DeserializeOwned>(connector_type: &str, config: &[u8]) -> ConnectorResult<T> {
    serde_json::from_slice(config).map_err(|e| {
        ConnectorError::configuration(format!("invalid {connector_type} connector config: {e}"))
    })
}

/// Builds the connector `id` of type `connector_type`.
///
/// Google connectors perform OIDC discovery here, so opening one needs the
/// provider to be reachable.
pub async fn open(
    id: &str,
    connector_type: &str,
    config: &[u8],
) -> ConnectorResult<Arc<dyn Connector>> {
    let connector: Arc<dyn Connector> = match connector_type {
        GITLAB => Arc::new(GitLabConnector::new(id, parse::<GitLabConfig>(connector_type, config)?)?),
        GOOGLE => Arc::new(GoogleConnector::open(id, parse::<GoogleConfig>(connector_type, config)?).await?),
        other => {
            return Err(ConnectorError::configuration(format!(
                "unknown connector type {other:?}, expected one of {:?}",
                supported_types()
            )));
        }
    };
    tracing::debug!(connector = id, connector_type, "connector opened");
    Ok(connector)
}

/// Opens a connector stored through the storage contract.
pub async fn open_stored(
    connector: &idbroker_storage::Connector,
) -> ConnectorResult<Arc<dyn Connector>> {
    open(&connector.id, &connector.connector_type, &connector.config).await
}
