//! Immutable game configuration assembled once at startup from the static
//! tables in the submodules.

pub mod crates;
pub mod flashback;
pub mod mutations;
pub mod rarity;
pub mod store;

use crate::models::player::PlayerSnapshot;
use chrono::Duration;
use mutations::{Mutation, FLASHBACK, MUTATIONS};
use rand::distributions::WeightedIndex;
use rarity::{RarityBand, FALLBACK_BAND, RARITY_BANDS};
use std::collections::HashMap;
use store::StorePolicy;
use thiserror::Error;

/// Draw cooldown per user, 12.5 s.
pub const CRATE_COOLDOWN_MS: i64 = 12_500;
/// Range re-samples before falling back to the whole cache.
pub const MAX_RANK_ATTEMPTS: usize = 10;
pub const DAILY_REWARD: u64 = 2_500;
pub const DAILY_INTERVAL_SECS: i64 = 24 * 60 * 60;
pub const STARTING_COINS: u64 = 10_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("crate {0} has no rank ranges")]
    NoRanges(String),
    #[error("crate {crate_key} has an invalid range {min}..{max} (weight {weight})")]
    InvalidRange {
        crate_key: String,
        min: u32,
        max: u32,
        weight: f64,
    },
    #[error("alias {alias} is used by both {first} and {second}")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
    #[error("store rule references unknown crate {0}")]
    UnknownStoreCrate(String),
    #[error("refresh interval must be positive")]
    RefreshInterval,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankRange {
    pub min_rank: u32,
    pub max_rank: u32,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct CrateDef {
    pub key: String,
    pub name: String,
    pub price: u64,
    pub ranges: Vec<RankRange>,
    pub aliases: Vec<String>,
    pub top_tier: bool,
    pub(crate) range_index: WeightedIndex<f64>,
}

#[derive(Debug, Clone)]
pub struct FlashbackEntry {
    pub player: PlayerSnapshot,
    pub year: String,
    pub multiplier: f64,
}

#[derive(Debug, Clone)]
pub struct GameConfig {
    pub crates: Vec<CrateDef>,
    aliases: HashMap<String, usize>,
    pub bands: Vec<RarityBand>,
    pub mutations: Vec<Mutation>,
    pub flashbacks: Vec<FlashbackEntry>,
    pub store: StorePolicy,
    pub cooldown: Duration,
    pub max_rank_attempts: usize,
}

impl GameConfig {
    pub fn load(refresh_interval_secs: i64) -> Result<Self, ConfigError> {
        Self::with_store_policy(StorePolicy::standard(refresh_interval_secs))
    }

    pub fn with_store_policy(store: StorePolicy) -> Result<Self, ConfigError> {
        if store.refresh_interval_secs <= 0 {
            return Err(ConfigError::RefreshInterval);
        }

        let top_tier_from = crates::CRATES
            .len()
            .saturating_sub(crates::TOP_TIER_CRATES);
        let mut defs = Vec::with_capacity(crates::CRATES.len());
        let mut aliases: HashMap<String, usize> = HashMap::new();

        for (i, entry) in crates::CRATES.iter().enumerate() {
            if entry.ranges.is_empty() {
                return Err(ConfigError::NoRanges(entry.key.to_string()));
            }
            let ranges: Vec<RankRange> = entry
                .ranges
                .iter()
                .map(|r| RankRange {
                    min_rank: r.min_rank,
                    max_rank: r.max_rank,
                    weight: r.weight,
                })
                .collect();
            for r in &ranges {
                if r.min_rank == 0 || r.min_rank > r.max_rank || !(r.weight > 0.0) {
                    return Err(ConfigError::InvalidRange {
                        crate_key: entry.key.to_string(),
                        min: r.min_rank,
                        max: r.max_rank,
                        weight: r.weight,
                    });
                }
            }
            let range_index = WeightedIndex::new(ranges.iter().map(|r| r.weight)).map_err(|_| {
                ConfigError::NoRanges(entry.key.to_string())
            })?;

            let mut names: Vec<String> = entry.aliases.iter().map(|a| a.to_lowercase()).collect();
            names.push(entry.key.to_string());
            names.push(entry.name.to_lowercase());
            names.sort();
            names.dedup();
            for alias in &names {
                if let Some(&other) = aliases.get(alias) {
                    if other != i {
                        return Err(ConfigError::DuplicateAlias {
                            alias: alias.clone(),
                            first: crates::CRATES[other].key.to_string(),
                            second: entry.key.to_string(),
                        });
                    }
                }
                aliases.insert(alias.clone(), i);
            }

            defs.push(CrateDef {
                key: entry.key.to_string(),
                name: entry.name.to_string(),
                price: entry.price,
                ranges,
                aliases: names,
                top_tier: i >= top_tier_from,
                range_index,
            });
        }

        for rule in &store.rules {
            if !defs.iter().any(|d| d.key == rule.crate_key) {
                return Err(ConfigError::UnknownStoreCrate(rule.crate_key.clone()));
            }
        }

        let flashbacks = flashback::FLASHBACK_TABLE
            .iter()
            .map(|f| FlashbackEntry {
                player: PlayerSnapshot {
                    user_id: f.user_id.to_string(),
                    username: f.username.to_string(),
                    rank: f.rank,
                    pp: f.pp,
                    accuracy: f.accuracy,
                    play_count: f.play_count,
                    country: f.country.to_string(),
                    level: f.level,
                    avatar_url: format!("https://a.ppy.sh/{}", f.user_id),
                },
                year: f.year.to_string(),
                multiplier: f.multiplier,
            })
            .collect();

        Ok(GameConfig {
            crates: defs,
            aliases,
            bands: RARITY_BANDS.to_vec(),
            mutations: MUTATIONS.to_vec(),
            flashbacks,
            store,
            cooldown: Duration::milliseconds(CRATE_COOLDOWN_MS),
            max_rank_attempts: MAX_RANK_ATTEMPTS,
        })
    }

    /// Resolves user input (key, display name or alias) to a crate.
    pub fn resolve_crate(&self, input: &str) -> Option<&CrateDef> {
        let needle = input.trim().to_lowercase();
        self.aliases.get(&needle).map(|&i| &self.crates[i])
    }

    pub fn crate_def(&self, key: &str) -> Option<&CrateDef> {
        self.crates.iter().find(|c| c.key == key)
    }

    pub fn emergency_crate(&self) -> Option<&CrateDef> {
        self.crate_def(crates::EMERGENCY_CRATE)
    }

    pub fn band_for_rank(&self, rank: u32) -> &RarityBand {
        self.bands
            .iter()
            .find(|b| rank >= b.min_rank && rank <= b.max_rank)
            .unwrap_or(&self.bands[FALLBACK_BAND])
    }

    pub fn band_by_key(&self, key: &str) -> Option<&RarityBand> {
        self.bands.iter().find(|b| b.key == key)
    }

    /// Mutations that may roll from the given crate.
    pub fn eligible_mutations(&self, crate_def: &CrateDef) -> Vec<&Mutation> {
        self.mutations
            .iter()
            .filter(|m| m.key != FLASHBACK || crate_def.top_tier)
            .collect()
    }

    pub fn mutation(&self, key: &str) -> Option<&Mutation> {
        self.mutations.iter().find(|m| m.key == key)
    }
}
