//! Draw engine: mutation roll, flashback substitution, weighted range
//! sampling, rarity lookup, event upgrades and pricing.

use crate::config::mutations::{Mutation, FLASHBACK, MUTATION_CHANCE};
use crate::config::rarity::{RarityBand, FLASHBACK_COLOR, FLASHBACK_STARS};
use crate::config::{CrateDef, GameConfig, RankRange};
use crate::error::GachaError;
use crate::models::card::{CardInstance, EventBonusRecord};
use crate::models::event::EventBoost;
use crate::models::player::{round2, PlayerSnapshot};
use crate::services::leaderboard::{CacheSnapshot, LeaderboardCache};
use crate::services::pricing::price_card;
use chrono::{DateTime, Utc};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const SYNTHETIC_RANK_MIN: u32 = 5_000;
pub const SYNTHETIC_RANK_MAX: u32 = 9_999;

/// Where the drawn player came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerSource {
    Ranged,
    WholeCache,
    Synthesized,
    Flashback,
}

#[derive(Debug, Clone)]
pub struct Draw {
    pub card: CardInstance,
    pub source: PlayerSource,
}

/// 10% chance of a mutation, then a pick weighted by `rarity` among the
/// mutations the crate allows.
pub fn roll_mutation<'c, R: Rng + ?Sized>(
    config: &'c GameConfig,
    crate_def: &CrateDef,
    rng: &mut R,
) -> Option<&'c Mutation> {
    if !rng.gen_bool(MUTATION_CHANCE) {
        return None;
    }
    let eligible = config.eligible_mutations(crate_def);
    let index = WeightedIndex::new(eligible.iter().map(|m| m.rarity)).ok()?;
    Some(eligible[index.sample(rng)])
}

pub fn sample_range<'c, R: Rng + ?Sized>(crate_def: &'c CrateDef, rng: &mut R) -> &'c RankRange {
    &crate_def.ranges[crate_def.range_index.sample(rng)]
}

/// Stand-in player used when there is nothing cached to draw from. Every
/// field is a function of the rolled rank.
pub fn synthesize_player<R: Rng + ?Sized>(rng: &mut R) -> PlayerSnapshot {
    let rank = rng.gen_range(SYNTHETIC_RANK_MIN..=SYNTHETIC_RANK_MAX);
    let pp = round2(9_000.0 - (rank - SYNTHETIC_RANK_MIN) as f64 * 0.4);
    PlayerSnapshot {
        user_id: format!("synthetic{}", rank),
        username: format!("Unknown Player #{}", rank),
        rank,
        pp,
        accuracy: round2(96.0 + (rank % 300) as f64 / 100.0),
        play_count: 20_000 + (rank as u64 % 7_919) * 7,
        country: "XX".to_string(),
        level: round2(95.0 + (rank % 500) as f64 / 100.0),
        avatar_url: String::new(),
    }
}

pub fn select_player<R: Rng + ?Sized>(
    config: &GameConfig,
    crate_def: &CrateDef,
    cache: &CacheSnapshot,
    rng: &mut R,
) -> (PlayerSnapshot, PlayerSource) {
    if !cache.is_empty() {
        for _ in 0..config.max_rank_attempts {
            let range = sample_range(crate_def, rng);
            if let Some(player) = cache.random_in_range(range.min_rank, range.max_rank, rng) {
                return (player.clone(), PlayerSource::Ranged);
            }
        }
        if let Some(player) = cache.random(rng) {
            log::debug!("no cached player in {} ranges, using whole cache", crate_def.key);
            return (player.clone(), PlayerSource::WholeCache);
        }
    }
    log::warn!("leaderboard cache empty, synthesizing a player");
    (synthesize_player(rng), PlayerSource::Synthesized)
}

/// Tries each boosted band better than `band`, best first; the first
/// successful roll wins.
pub fn apply_event_boost<'c, R: Rng + ?Sized>(
    config: &'c GameConfig,
    band: &RarityBand,
    boost: &EventBoost,
    rng: &mut R,
) -> Option<&'c RarityBand> {
    let current = config.bands.iter().position(|b| b.key == band.key)?;
    for candidate in &config.bands[..current] {
        let Some(&percent) = boost.rarity_boosts.get(candidate.key) else {
            continue;
        };
        let chance = percent / 100.0;
        if !(chance > 0.0) {
            continue;
        }
        if rng.gen_bool(chance.min(1.0)) {
            return Some(candidate);
        }
    }
    None
}

static CARD_SEQ: AtomicU64 = AtomicU64::new(0);

/// Ids carry a process-wide sequence number, so two cards drawn in the same
/// second never share one and a card keeps its id for life.
pub fn card_id(player_id: &str, stars: u8, now: DateTime<Utc>, mutation: Option<&str>) -> String {
    let seq = CARD_SEQ.fetch_add(1, Ordering::Relaxed);
    match mutation {
        Some(m) => format!("{}_{}_{}_{}_{}", player_id, stars, now.timestamp(), seq, m),
        None => format!("{}_{}_{}_{}", player_id, stars, now.timestamp(), seq),
    }
}

pub fn draw_card<R: Rng + ?Sized>(
    config: &GameConfig,
    cache: &CacheSnapshot,
    crate_def: &CrateDef,
    boost: Option<&EventBoost>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Draw {
    // Rolled first: flashback replaces the player entirely.
    let mutation = roll_mutation(config, crate_def, rng);
    draw_with_mutation(config, cache, crate_def, mutation, boost, now, rng)
}

pub fn draw_with_mutation<R: Rng + ?Sized>(
    config: &GameConfig,
    cache: &CacheSnapshot,
    crate_def: &CrateDef,
    mutation: Option<&Mutation>,
    boost: Option<&EventBoost>,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Draw {
    let bonus_record = |upgraded_from: Option<String>| {
        boost.map(|b| EventBonusRecord {
            event_id: b.event_id.clone(),
            item_index: b.item_index,
            upgraded_from,
        })
    };

    if let Some(m) = mutation.filter(|m| m.key == FLASHBACK) {
        if !config.flashbacks.is_empty() {
            let entry = &config.flashbacks[rng.gen_range(0..config.flashbacks.len())];
            let price = price_card(
                entry.player.rank,
                FLASHBACK_STARS,
                entry.player.pp,
                Some(m.multiplier),
                Some(entry.multiplier),
            );
            let card = CardInstance {
                card_id: card_id(&entry.player.user_id, FLASHBACK_STARS, now, Some(m.key)),
                player: entry.player.clone(),
                stars: FLASHBACK_STARS,
                rarity_name: entry.year.clone(),
                rarity_color: FLASHBACK_COLOR,
                mutation: Some(m.key.to_string()),
                price: price.price,
                obtained_at: now.timestamp(),
                crate_key: crate_def.key.clone(),
                favorite: false,
                flashback_year: Some(entry.year.clone()),
                event_bonus: bonus_record(None),
            };
            return Draw {
                card,
                source: PlayerSource::Flashback,
            };
        }
    }

    let (player, source) = select_player(config, crate_def, cache, rng);
    // Stand-in players never carry a mutation.
    let mutation = if source == PlayerSource::Synthesized {
        None
    } else {
        mutation
    };

    let mut band = config.band_for_rank(player.rank);
    let mut upgraded_from = None;
    if let Some(boost) = boost {
        if let Some(better) = apply_event_boost(config, band, boost, rng) {
            upgraded_from = Some(band.key.to_string());
            band = better;
        }
    }

    let price = price_card(
        player.rank,
        band.stars,
        player.pp,
        mutation.map(|m| m.multiplier),
        None,
    );

    let card = CardInstance {
        card_id: card_id(&player.user_id, band.stars, now, mutation.map(|m| m.key)),
        stars: band.stars,
        rarity_name: band.name.to_string(),
        rarity_color: mutation.map(|m| m.color).unwrap_or(band.color),
        mutation: mutation.map(|m| m.key.to_string()),
        price: price.price,
        obtained_at: now.timestamp(),
        crate_key: crate_def.key.clone(),
        favorite: false,
        flashback_year: None,
        event_bonus: bonus_record(upgraded_from),
        player,
    };
    Draw { card, source }
}

/// Async front of the draw engine: keeps the cache fresh and never fails
/// once the crate is known.
pub struct DrawEngine {
    config: Arc<GameConfig>,
    cache: Arc<LeaderboardCache>,
}

impl DrawEngine {
    pub fn new(config: Arc<GameConfig>, cache: Arc<LeaderboardCache>) -> Self {
        DrawEngine { config, cache }
    }

    /// Current snapshot; a stale one triggers a background rebuild. May be empty.
    pub async fn prepare(&self, now: DateTime<Utc>) -> Arc<CacheSnapshot> {
        match self.cache.fresh_or_stale(now).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                log::warn!("drawing without a fresh cache: {}", e);
                self.cache.snapshot()
            }
        }
    }

    pub async fn open_crate(
        &self,
        crate_key: &str,
        boost: Option<&EventBoost>,
        now: DateTime<Utc>,
    ) -> Result<CardInstance, GachaError> {
        let crate_def = self
            .config
            .resolve_crate(crate_key)
            .ok_or_else(|| GachaError::UnknownCrate(crate_key.to_string()))?;
        let snapshot = self.prepare(now).await;
        let draw = draw_card(
            &self.config,
            &snapshot,
            crate_def,
            boost,
            now,
            &mut rand::thread_rng(),
        );
        Ok(draw.card)
    }
}
