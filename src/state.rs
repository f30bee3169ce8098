use crate::config::{ConfigError, GameConfig};
use crate::db::{Db, CACHE_FILE, EVENTS_FILE, STORE_CONFIG_FILE};
use crate::error::PersistError;
use crate::services::announce::{Announcer, LogAnnouncer, StoreAnnouncer, WebhookAnnouncer};
use crate::services::cooldown::Cooldowns;
use crate::services::draw::DrawEngine;
use crate::services::events::EventStore;
use crate::services::leaderboard::{LeaderboardCache, RebuildPolicy};
use crate::services::monitor::StoreMonitor;
use crate::services::trade::Trades;
use crate::services::upstream::{OsuClient, RankingSource};
use crate::settings::Settings;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid game configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Everything the handlers share.
pub struct AppState {
    pub settings: Settings,
    pub config: Arc<GameConfig>,
    pub db: Arc<Db>,
    pub cache: Arc<LeaderboardCache>,
    pub engine: DrawEngine,
    pub cooldowns: Cooldowns,
    pub events: EventStore,
    pub trades: Trades,
    pub announcer: Arc<StoreAnnouncer>,
    pub monitor: Arc<StoreMonitor>,
}

impl AppState {
    pub fn open(settings: Settings) -> Result<Self, StartupError> {
        let config = Arc::new(GameConfig::load(settings.store_refresh_interval_secs)?);
        let dir = settings.data_dir.clone();
        let db = Arc::new(Db::open(&dir)?);

        let source: Arc<dyn RankingSource> = Arc::new(OsuClient::new(
            &settings.osu_api_base,
            &settings.osu_client_id,
            &settings.osu_client_secret,
        ));
        let policy = RebuildPolicy {
            ttl_secs: settings.cache_ttl_secs,
            max_pages: settings.cache_max_pages,
            ..RebuildPolicy::default()
        };
        let cache = Arc::new(LeaderboardCache::new(source, policy, Some(dir.join(CACHE_FILE))));
        if let Err(e) = cache.load_from_disk() {
            log::warn!("ignoring unreadable leaderboard cache: {}", e);
        }

        let transport: Arc<dyn Announcer> = match &settings.announce_webhook_url {
            Some(url) => Arc::new(WebhookAnnouncer::new(url)),
            None => Arc::new(LogAnnouncer::default()),
        };
        let announcer = Arc::new(StoreAnnouncer::load(
            config.clone(),
            transport,
            Some(dir.join(STORE_CONFIG_FILE)),
        )?);
        let events = EventStore::open(&dir.join(EVENTS_FILE))?;

        Ok(Self::assemble(settings, config, db, cache, events, announcer))
    }

    fn assemble(
        settings: Settings,
        config: Arc<GameConfig>,
        db: Arc<Db>,
        cache: Arc<LeaderboardCache>,
        events: EventStore,
        announcer: Arc<StoreAnnouncer>,
    ) -> Self {
        let monitor = Arc::new(StoreMonitor::new(config.store.clone(), announcer.clone()));
        AppState {
            engine: DrawEngine::new(config.clone(), cache.clone()),
            cooldowns: Cooldowns::new(config.cooldown),
            trades: Trades::new(),
            settings,
            config,
            db,
            cache,
            events,
            announcer,
            monitor,
        }
    }

    /// State with no files behind it.
    #[cfg(test)]
    pub fn in_memory(
        settings: Settings,
        config: GameConfig,
        source: Arc<dyn RankingSource>,
        policy: RebuildPolicy,
    ) -> Self {
        let config = Arc::new(config);
        let cache = Arc::new(LeaderboardCache::new(source, policy, None));
        let announcer = Arc::new(StoreAnnouncer::detached(
            config.clone(),
            Arc::new(LogAnnouncer::default()),
        ));
        Self::assemble(
            settings,
            config,
            Arc::new(Db::open_in_memory()),
            cache,
            EventStore::in_memory(),
            announcer,
        )
    }

    pub fn is_admin(&self, token: Option<&str>) -> bool {
        match (&self.settings.admin_token, token) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        }
    }
}
