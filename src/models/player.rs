use serde::{Deserialize, Serialize};

/// Immutable projection of a ranked upstream player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub user_id: String,
    pub username: String,
    pub rank: u32,
    pub pp: f64,
    pub accuracy: f64,
    pub play_count: u64,
    pub country: String,
    pub level: f64,
    pub avatar_url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheFile {
    pub players: Vec<PlayerSnapshot>,
    /// Unix seconds of the build.
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub players: usize,
    pub built_at: f64,
    pub valid: bool,
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
