use crate::backend::{BackendConfig, BackendFactory, BackendKind, Capabilities, RecordStore};
use crate::error::StoreResult;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// A live backend handle shared by every caller of one manager.
#[derive(Clone)]
pub struct Connection {
    kind: BackendKind,
    store: Arc<dyn RecordStore>,
}

impl Connection {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            kind: store.kind(),
            store,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.store.capabilities()
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("kind", &self.kind).finish()
    }
}

/// Establishes at most one connection for the configured backend.
///
/// `connect` is idempotent: once a connection exists it is returned without
/// re-dialing. A failed attempt is not cached, so the next call dials again.
pub struct ConnectionManager {
    config: BackendConfig,
    connection: OnceCell<Connection>,
}

impl ConnectionManager {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            connection: OnceCell::new(),
        }
    }

    /// Manager wrapping an already-established connection
    pub fn with_connection(config: BackendConfig, connection: Connection) -> Self {
        Self {
            config,
            connection: OnceCell::new_with(Some(connection)),
        }
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }

    pub async fn connect(&self) -> StoreResult<Connection> {
        let connection = self
            .connection
            .get_or_try_init(|| async {
                self.config.validate()?;
                info!(
                    "Connecting to {} backend ({:?})",
                    self.config.kind, self.config.locality
                );
                let store = BackendFactory::create(&self.config).await?;
                Ok::<_, crate::error::StoreError>(Connection::new(store))
            })
            .await?;
        Ok(connection.clone())
    }
}
