//! In-memory snapshot of the top ranked players, mirrored to disk and
//! rebuilt from upstream at most once at a time.

use crate::db::{load_json, save_json};
use crate::error::{GachaError, PersistError};
use crate::models::player::{CacheFile, CacheStatus, PlayerSnapshot};
use crate::services::upstream::{RankingSource, UpstreamError};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

/// After a failed rebuild, further attempts wait this long.
const FAILED_REBUILD_COOLDOWN_SECS: f64 = 60.0;

fn unix_secs(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}

/// One immutable generation of the cache. Indexes are built on first lookup
/// and discarded with the generation.
#[derive(Debug, Default)]
pub struct CacheSnapshot {
    players: Vec<PlayerSnapshot>,
    built_at: f64,
    rank_index: OnceLock<HashMap<u32, usize>>,
    name_index: OnceLock<HashMap<String, usize>>,
}

impl CacheSnapshot {
    pub fn new(mut players: Vec<PlayerSnapshot>, built_at: f64) -> Self {
        players.sort_by_key(|p| p.rank);
        CacheSnapshot {
            players,
            built_at,
            rank_index: OnceLock::new(),
            name_index: OnceLock::new(),
        }
    }

    pub fn players(&self) -> &[PlayerSnapshot] {
        &self.players
    }

    pub fn built_at(&self) -> f64 {
        self.built_at
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn is_valid(&self, now: f64, ttl_secs: f64) -> bool {
        !self.players.is_empty() && now - self.built_at < ttl_secs
    }

    pub fn by_rank(&self, rank: u32) -> Option<&PlayerSnapshot> {
        let index = self.rank_index.get_or_init(|| {
            self.players
                .iter()
                .enumerate()
                .map(|(i, p)| (p.rank, i))
                .collect()
        });
        index.get(&rank).map(|&i| &self.players[i])
    }

    pub fn by_username(&self, username: &str) -> Option<&PlayerSnapshot> {
        let index = self.name_index.get_or_init(|| {
            self.players
                .iter()
                .enumerate()
                .map(|(i, p)| (p.username.to_lowercase(), i))
                .collect()
        });
        index
            .get(&username.trim().to_lowercase())
            .map(|&i| &self.players[i])
    }

    /// Uniform pick among players with `lo <= rank <= hi`.
    pub fn random_in_range<R: Rng + ?Sized>(
        &self,
        lo: u32,
        hi: u32,
        rng: &mut R,
    ) -> Option<&PlayerSnapshot> {
        let start = self.players.partition_point(|p| p.rank < lo);
        let end = self.players.partition_point(|p| p.rank <= hi);
        if start >= end {
            return None;
        }
        Some(&self.players[rng.gen_range(start..end)])
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&PlayerSnapshot> {
        if self.players.is_empty() {
            return None;
        }
        Some(&self.players[rng.gen_range(0..self.players.len())])
    }
}

#[derive(Debug, Clone)]
pub struct RebuildPolicy {
    pub ttl_secs: f64,
    pub max_pages: u32,
    /// Delay before each retry of a failing page; its length is the retry budget.
    pub retry_delays: Vec<Duration>,
    pub rate_limit_backoff: Duration,
    pub max_rate_limit_waits: u32,
}

impl Default for RebuildPolicy {
    fn default() -> Self {
        RebuildPolicy {
            ttl_secs: 86_400.0,
            max_pages: 200,
            retry_delays: [1, 2, 3].into_iter().map(Duration::from_secs).collect(),
            rate_limit_backoff: Duration::from_secs(60),
            max_rate_limit_waits: 10,
        }
    }
}

pub struct LeaderboardCache {
    source: Arc<dyn RankingSource>,
    policy: RebuildPolicy,
    path: Option<PathBuf>,
    current: RwLock<Arc<CacheSnapshot>>,
    rebuild_lock: tokio::sync::Mutex<()>,
    last_failure: Mutex<Option<f64>>,
}

impl LeaderboardCache {
    pub fn new(source: Arc<dyn RankingSource>, policy: RebuildPolicy, path: Option<PathBuf>) -> Self {
        LeaderboardCache {
            source,
            policy,
            path,
            current: RwLock::new(Arc::new(CacheSnapshot::default())),
            rebuild_lock: tokio::sync::Mutex::new(()),
            last_failure: Mutex::new(None),
        }
    }

    /// Loads the disk mirror, if any. Returns the number of players loaded.
    pub fn load_from_disk(&self) -> Result<usize, PersistError> {
        let Some(path) = &self.path else {
            return Ok(0);
        };
        let Some(file) = load_json::<CacheFile>(path)? else {
            return Ok(0);
        };
        let count = file.players.len();
        self.swap(CacheSnapshot::new(file.players, file.timestamp));
        log::info!("loaded {} cached players from {}", count, path.display());
        Ok(count)
    }

    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn swap(&self, snapshot: CacheSnapshot) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(snapshot);
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.snapshot().is_valid(unix_secs(now), self.policy.ttl_secs)
    }

    pub fn status(&self, now: DateTime<Utc>) -> CacheStatus {
        let snapshot = self.snapshot();
        CacheStatus {
            players: snapshot.len(),
            built_at: snapshot.built_at(),
            valid: snapshot.is_valid(unix_secs(now), self.policy.ttl_secs),
        }
    }

    pub fn get_player_by_rank(&self, rank: u32) -> Option<PlayerSnapshot> {
        self.snapshot().by_rank(rank).cloned()
    }

    pub fn get_player_by_username(&self, username: &str) -> Option<PlayerSnapshot> {
        self.snapshot().by_username(username).cloned()
    }

    pub fn get_random_player_in_range(&self, lo: u32, hi: u32) -> Option<PlayerSnapshot> {
        self.snapshot()
            .random_in_range(lo, hi, &mut rand::thread_rng())
            .cloned()
    }

    fn recently_failed(&self, now: f64) -> bool {
        let last = *self.last_failure.lock().unwrap_or_else(|e| e.into_inner());
        matches!(last, Some(t) if now - t < FAILED_REBUILD_COOLDOWN_SECS)
    }

    /// Rebuilds when stale. Concurrent callers wait for the running rebuild
    /// and then observe its result. Only an empty cache surfaces an error.
    pub async fn ensure_valid(&self, now: DateTime<Utc>) -> Result<Arc<CacheSnapshot>, GachaError> {
        let secs = unix_secs(now);
        let snapshot = self.snapshot();
        if snapshot.is_valid(secs, self.policy.ttl_secs) {
            return Ok(snapshot);
        }
        if self.recently_failed(secs) {
            return self.stale_or_unavailable(snapshot, "previous rebuild failed recently");
        }

        let _guard = self.rebuild_lock.lock().await;
        let snapshot = self.snapshot();
        if snapshot.is_valid(secs, self.policy.ttl_secs) {
            return Ok(snapshot);
        }
        if self.recently_failed(secs) {
            return self.stale_or_unavailable(snapshot, "previous rebuild failed recently");
        }
        self.rebuild_locked(now).await
    }

    /// Snapshot for user-facing reads. A stale but non-empty cache is served
    /// as is while a detached task rebuilds it; only an empty cache waits for
    /// the rebuild.
    pub async fn fresh_or_stale(self: &Arc<Self>, now: DateTime<Utc>) -> Result<Arc<CacheSnapshot>, GachaError> {
        let secs = unix_secs(now);
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return self.ensure_valid(now).await;
        }
        if !snapshot.is_valid(secs, self.policy.ttl_secs) && !self.recently_failed(secs) {
            self.spawn_rebuild(now);
        }
        Ok(snapshot)
    }

    fn spawn_rebuild(self: &Arc<Self>, now: DateTime<Utc>) {
        if self.rebuild_lock.try_lock().is_err() {
            return;
        }
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let Ok(_guard) = cache.rebuild_lock.try_lock() else {
                return;
            };
            let secs = unix_secs(now);
            if cache.snapshot().is_valid(secs, cache.policy.ttl_secs) || cache.recently_failed(secs) {
                return;
            }
            if let Err(e) = cache.rebuild_locked(now).await {
                log::warn!("background leaderboard rebuild failed: {}", e);
            }
        });
    }

    /// Unconditional rebuild, still single-flight.
    pub async fn rebuild(&self, now: DateTime<Utc>) -> Result<Arc<CacheSnapshot>, GachaError> {
        let _guard = self.rebuild_lock.lock().await;
        self.rebuild_locked(now).await
    }

    fn stale_or_unavailable(
        &self,
        snapshot: Arc<CacheSnapshot>,
        reason: &str,
    ) -> Result<Arc<CacheSnapshot>, GachaError> {
        if snapshot.is_empty() {
            Err(GachaError::UpstreamUnavailable(reason.to_string()))
        } else {
            Ok(snapshot)
        }
    }

    async fn rebuild_locked(&self, now: DateTime<Utc>) -> Result<Arc<CacheSnapshot>, GachaError> {
        log::info!("rebuilding leaderboard cache (up to {} pages)", self.policy.max_pages);
        match self.fetch_all().await {
            Ok(players) if !players.is_empty() => {
                let built_at = unix_secs(now);
                let count = players.len();
                self.swap(CacheSnapshot::new(players, built_at));
                *self.last_failure.lock().unwrap_or_else(|e| e.into_inner()) = None;
                self.mirror();
                log::info!("leaderboard cache rebuilt with {} players", count);
                Ok(self.snapshot())
            }
            Ok(_) => {
                self.record_failure(now);
                log::warn!("upstream returned no players");
                self.stale_or_unavailable(self.snapshot(), "upstream returned no players")
            }
            Err(e) => {
                self.record_failure(now);
                log::warn!("leaderboard rebuild failed: {}", e);
                self.stale_or_unavailable(self.snapshot(), &e.to_string())
            }
        }
    }

    fn record_failure(&self, now: DateTime<Utc>) {
        *self.last_failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(unix_secs(now));
    }

    fn mirror(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let snapshot = self.snapshot();
        let file = CacheFile {
            players: snapshot.players().to_vec(),
            timestamp: snapshot.built_at(),
        };
        if let Err(e) = save_json(path, &file) {
            log::error!("failed to mirror leaderboard cache: {}", e);
        }
    }

    async fn fetch_all(&self) -> Result<Vec<PlayerSnapshot>, UpstreamError> {
        let mut players = Vec::new();
        // shared by every page of one rebuild
        let mut rate_limit_waits = 0;
        for page in 1..=self.policy.max_pages {
            let batch = self.fetch_page_with_retry(page, &mut rate_limit_waits).await?;
            if batch.is_empty() {
                break;
            }
            log::debug!("fetched ranking page {} ({} players)", page, batch.len());
            players.extend(batch);
        }
        Ok(players)
    }

    async fn fetch_page_with_retry(
        &self,
        page: u32,
        rate_limit_waits: &mut u32,
    ) -> Result<Vec<PlayerSnapshot>, UpstreamError> {
        let mut failures = 0;
        loop {
            match self.source.fetch_page(page).await {
                Ok(batch) => return Ok(batch),
                Err(UpstreamError::RateLimited) => {
                    *rate_limit_waits += 1;
                    if *rate_limit_waits > self.policy.max_rate_limit_waits {
                        return Err(UpstreamError::RateLimited);
                    }
                    log::warn!(
                        "rate limited on page {}, backing off {:?} (wait {} of {})",
                        page,
                        self.policy.rate_limit_backoff,
                        rate_limit_waits,
                        self.policy.max_rate_limit_waits
                    );
                    tokio::time::sleep(self.policy.rate_limit_backoff).await;
                }
                Err(UpstreamError::MissingCredentials) => {
                    return Err(UpstreamError::MissingCredentials)
                }
                Err(e) => {
                    let Some(delay) = self.policy.retry_delays.get(failures) else {
                        return Err(e);
                    };
                    failures += 1;
                    log::warn!("page {} failed ({}), retry {} in {:?}", page, e, failures, delay);
                    tokio::time::sleep(*delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::services::upstream::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub fn player(rank: u32) -> PlayerSnapshot {
        PlayerSnapshot {
            user_id: format!("{}", 100_000 + rank),
            username: format!("Player{}", rank),
            rank,
            pp: 30_000.0 - rank as f64 * 2.0,
            accuracy: 98.0,
            play_count: 10_000,
            country: "JP".into(),
            level: 100.0,
            avatar_url: String::new(),
        }
    }

    /// Serves `total` players in pages of 50 and counts calls.
    pub struct FakeRanking {
        pub total: u32,
        pub calls: AtomicUsize,
        pub fail_first: AtomicUsize,
        pub rate_limit_first: AtomicUsize,
        /// Every page answers 429 this many times before serving.
        pub rate_limit_each_page: u32,
        pub page_attempts: std::sync::Mutex<HashMap<u32, u32>>,
        pub delay: Duration,
    }

    impl FakeRanking {
        pub fn new(total: u32) -> Self {
            FakeRanking {
                total,
                calls: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
                rate_limit_first: AtomicUsize::new(0),
                rate_limit_each_page: 0,
                page_attempts: std::sync::Mutex::new(HashMap::new()),
                delay: Duration::ZERO,
            }
        }
    }

    impl RankingSource for FakeRanking {
        fn fetch_page(&self, page: u32) -> BoxFuture<'_, Result<Vec<PlayerSnapshot>, UpstreamError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                if self
                    .rate_limit_first
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(UpstreamError::RateLimited);
                }
                let attempts = {
                    let mut seen = self.page_attempts.lock().unwrap();
                    let n = seen.entry(page).or_insert(0);
                    *n += 1;
                    *n
                };
                if attempts <= self.rate_limit_each_page {
                    return Err(UpstreamError::RateLimited);
                }
                if self
                    .fail_first
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
                {
                    return Err(UpstreamError::Status(502));
                }
                let start = (page - 1) * 50 + 1;
                let end = (page * 50).min(self.total);
                Ok((start..=end).map(player).collect())
            })
        }
    }

    /// Always unreachable.
    pub struct DownRanking;

    impl RankingSource for DownRanking {
        fn fetch_page(&self, _page: u32) -> BoxFuture<'_, Result<Vec<PlayerSnapshot>, UpstreamError>> {
            Box::pin(async { Err(UpstreamError::Transport("connection refused".into())) })
        }
    }

    pub fn fast_policy(max_pages: u32) -> RebuildPolicy {
        RebuildPolicy {
            ttl_secs: 3_600.0,
            max_pages,
            retry_delays: vec![Duration::ZERO; 3],
            rate_limit_backoff: Duration::ZERO,
            max_rate_limit_waits: 10,
        }
    }

    pub fn snapshot_of(ranks: impl IntoIterator<Item = u32>) -> CacheSnapshot {
        CacheSnapshot::new(ranks.into_iter().map(player).collect(), 0.0)
    }
}
