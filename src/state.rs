use crate::db::{BillingStore, MemoryBillingStore, PgBillingStore};
use crate::domains::billing::BillingService;
use shared::config::StorageBackend;
use shared::{AuthService, Config, DatabaseService};
use std::sync::Arc;
use tracing::info;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub billing: BillingService,
    pub auth: Arc<AuthService>,
}

impl AppState {
    /// Builds the store selected by `STORAGE_BACKEND`. Postgres runs migrations first.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let store: Arc<dyn BillingStore> = match config.app.storage {
            StorageBackend::Postgres => {
                let database = DatabaseService::new(&config.database).await?;
                let store = PgBillingStore::new(database.pool().clone());
                store.migrate().await?;
                Arc::new(store)
            }
            StorageBackend::Memory => {
                info!("Using in-memory billing store; data is lost on restart");
                Arc::new(MemoryBillingStore::new())
            }
        };

        Ok(Self::with_store(store, Arc::new(AuthService::new(&config.auth))))
    }

    pub fn with_store(store: Arc<dyn BillingStore>, auth: Arc<AuthService>) -> Self {
        Self {
            billing: BillingService::new(store),
            auth,
        }
    }
}
