use std::sync::Arc;

use crate::app::error::{MirrorError, Result};
use crate::assets::{AssetFetcher, HttpAssetFetcher, ProfileImages};
use crate::config::{ConfigError, Settings};
use crate::harvest::{HarvestConfig, HarvestEngine};
use crate::server::AppState;
use crate::store::sqlite::SqliteStore;
use crate::upstream::{TwitterClient, Upstream};

/// Wires the configured components together.
pub struct AppContext {
    pub settings: Settings,
    pub store: Arc<SqliteStore>,
    pub upstream: Arc<dyn Upstream + Send + Sync>,
    pub assets: Arc<dyn AssetFetcher + Send + Sync>,
    pub images: ProfileImages,
}

impl AppContext {
    pub fn new(settings: Settings) -> Result<Self> {
        let db_path = settings.database_path().map_err(config_error)?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %db_path.display(), "opening database");
        let store = Arc::new(SqliteStore::new(&db_path)?);
        Self::with_store(settings, store)
    }

    pub fn in_memory(settings: Settings) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Self::with_store(settings, store)
    }

    fn with_store(settings: Settings, store: Arc<SqliteStore>) -> Result<Self> {
        let images = ProfileImages::new(settings.storage_path().map_err(config_error)?);
        std::fs::create_dir_all(images.dir())?;

        let upstream: Arc<dyn Upstream + Send + Sync> =
            Arc::new(TwitterClient::new(&settings.harvest.upstream_base_url)?);
        let assets: Arc<dyn AssetFetcher + Send + Sync> = Arc::new(HttpAssetFetcher::new()?);

        Ok(Self {
            settings,
            store,
            upstream,
            assets,
            images,
        })
    }

    pub fn harvest_engine(&self) -> HarvestEngine {
        HarvestEngine::new(
            self.store.clone(),
            self.upstream.clone(),
            self.assets.clone(),
            self.images.clone(),
            self.settings.accounts.clone(),
            HarvestConfig::from_settings(&self.settings.harvest),
        )
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(&self.settings, self.store.clone(), self.images.clone())
    }
}

fn config_error(e: ConfigError) -> MirrorError {
    MirrorError::Config(e.to_string())
}
