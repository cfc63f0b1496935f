//! Daemon wiring: storage, connectors and background maintenance.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use idbroker_connector::{Connector, ConnectorError, registry};
use idbroker_storage::{
    GarbageCollector, KeyGenerator, KeyRotator, MemoryStorage, Storage, StorageError,
};
use idbroker_storage_postgres::PostgresStorage;

use crate::config::{AppConfig, StaticConnector, StorageConfig};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("connector \"{id}\": {source}")]
    Connector {
        id: String,
        #[source]
        source: ConnectorError,
    },

    #[error("connector \"{id}\" config is not valid JSON: {source}")]
    ConnectorConfig {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Opens the configured storage backend.
pub async fn open_storage(config: &StorageConfig) -> Result<Arc<dyn Storage>, DaemonError> {
    let storage: Arc<dyn Storage> = match config {
        StorageConfig::Memory => Arc::new(MemoryStorage::new()),
        StorageConfig::Postgres(pg) => Arc::new(PostgresStorage::connect(pg).await?),
    };
    info!(backend = storage.backend_name(), "Storage opened");
    Ok(storage)
}

/// Writes static connectors into storage, replacing stored versions with
/// the same id.
#[instrument(skip_all, fields(count = connectors.len()))]
pub async fn register_connectors(
    storage: &dyn Storage,
    connectors: &[StaticConnector],
) -> Result<(), DaemonError> {
    for connector in connectors {
        let config = connector
            .config_bytes()
            .map_err(|source| DaemonError::ConnectorConfig {
                id: connector.id.clone(),
                source,
            })?;
        let entity = idbroker_storage::Connector {
            id: connector.id.clone(),
            connector_type: connector.connector_type.clone(),
            name: connector.display_name().to_string(),
            resource_version: String::new(),
            config,
        };

        match storage.create_connector(entity.clone()).await {
            Ok(()) => info!(connector = %entity.id, "Connector registered"),
            Err(e) if e.is_already_exists() => {
                let id = entity.id.clone();
                storage
                    .update_connector(&id, Box::new(move |_| Ok(entity)))
                    .await?;
                info!(connector = %id, "Connector updated");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Opens every connector held in storage, keyed by id.
pub async fn open_connectors(
    storage: &dyn Storage,
) -> Result<BTreeMap<String, Arc<dyn Connector>>, DaemonError> {
    let mut opened = BTreeMap::new();
    for stored in storage.list_connectors().await? {
        let connector = registry::open_stored(&stored)
            .await
            .map_err(|source| DaemonError::Connector {
                id: stored.id.clone(),
                source,
            })?;
        info!(
            connector = %stored.id,
            connector_type = connector.connector_type(),
            "Connector opened"
        );
        opened.insert(stored.id, connector);
    }
    Ok(opened)
}

/// A started broker: storage plus opened connectors.
pub struct Daemon {
    config: AppConfig,
    storage: Arc<dyn Storage>,
    connectors: BTreeMap<String, Arc<dyn Connector>>,
    key_generator: Option<Arc<dyn KeyGenerator>>,
}

impl Daemon {
    /// Opens storage, registers static connectors and opens all connectors.
    pub async fn start(config: AppConfig) -> Result<Self, DaemonError> {
        let storage = open_storage(&config.storage).await?;
        Self::with_storage(config, storage).await
    }

    pub async fn with_storage(
        config: AppConfig,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, DaemonError> {
        register_connectors(storage.as_ref(), &config.connectors).await?;
        let connectors = open_connectors(storage.as_ref()).await?;
        Ok(Self {
            config,
            storage,
            connectors,
            key_generator: None,
        })
    }

    #[must_use]
    pub fn with_key_generator(mut self, generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = Some(generator);
        self
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    #[must_use]
    pub fn connector(&self, id: &str) -> Option<&Arc<dyn Connector>> {
        self.connectors.get(id)
    }

    pub fn connector_ids(&self) -> impl Iterator<Item = &str> {
        self.connectors.keys().map(String::as_str)
    }

    /// Runs garbage collection and key rotation until `shutdown` resolves,
    /// then stops both loops and closes storage.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<(), DaemonError> {
        let cancel = CancellationToken::new();

        let gc = GarbageCollector::new(self.storage.clone(), self.config.gc.interval)
            .spawn(cancel.clone());

        let mut rotator = KeyRotator::new(self.storage.clone(), self.config.keys.strategy());
        if let Some(generator) = self.key_generator.clone() {
            rotator = rotator.with_generator(generator);
        }
        let rotation = Arc::new(rotator).spawn(self.config.keys.check_interval, cancel.clone());

        info!(
            backend = self.storage.backend_name(),
            connectors = self.connectors.len(),
            gc_interval = ?self.config.gc.interval,
            "idbroker running"
        );

        shutdown.await;
        info!("Shutting down");
        cancel.cancel();

        for (name, handle) in [("garbage collector", gc), ("key rotator", rotation)] {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "background task ended abnormally");
            }
        }

        self.storage.close().await?;
        Ok(())
    }
}
