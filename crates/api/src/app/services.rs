use std::sync::Arc;

use taskmill_infra::{
    analytics::AnalyticsAggregator, Engine, EngineConfig, InMemoryStore, JobManager, RecordStore,
};

#[cfg(feature = "postgres")]
use taskmill_infra::store::PostgresStore;

/// Shared state handed to every handler.
pub struct AppServices {
    engine: Engine,
}

impl AppServices {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Engine over a fresh in-memory store. Must be called inside a tokio runtime.
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::new(Engine::start(config, InMemoryStore::arc()))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn jobs(&self) -> &JobManager {
        self.engine.manager()
    }

    pub fn analytics(&self) -> &AnalyticsAggregator {
        self.engine.analytics()
    }
}

/// Pick the record store: Postgres when compiled in and configured, memory otherwise.
pub async fn build_store(database_url: Option<&str>) -> anyhow::Result<Arc<dyn RecordStore>> {
    match database_url {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let store = PostgresStore::connect(url).await?;
            tracing::info!("using postgres record store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => {
            tracing::warn!("DATABASE_URL is set but the postgres feature is disabled; using in-memory store");
            Ok(InMemoryStore::arc())
        }
        None => {
            tracing::info!("using in-memory record store");
            Ok(InMemoryStore::arc())
        }
    }
}

/// Wire the engine and its store.
pub async fn build_services(
    config: EngineConfig,
    database_url: Option<&str>,
) -> anyhow::Result<AppServices> {
    let store = build_store(database_url).await?;
    Ok(AppServices::new(Engine::start(config, store)))
}
