//! Store appearance policy. Evaluation order is the order of this table.

/// How a crate's stock is rolled for a period.
#[derive(Debug, Clone, PartialEq)]
pub enum AppearanceMode {
    /// One Bernoulli roll, then a uniform stock in `[min, max]`.
    Simple { weight: f64, min: u32, max: u32 },
    /// Keep adding one unit while `base * (1 - decay_rate)^(q - 1)` succeeds.
    Decay {
        base: f64,
        decay_rate: f64,
        min_stock: u32,
        max_stock: u32,
    },
    /// `(quantity, chance)` pairs, tried from the highest quantity down.
    Fixed { chances: Vec<(u32, f64)> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockRule {
    pub crate_key: String,
    pub mode: AppearanceMode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorePolicy {
    pub refresh_interval_secs: i64,
    pub rules: Vec<StockRule>,
}

pub const DEFAULT_REFRESH_INTERVAL_SECS: i64 = 600;
pub const MAX_PURCHASE_QUANTITY: u32 = 50;
pub const MAX_OPEN_QUANTITY: u32 = 50;

/// Periods of purchase history kept per user.
pub const PURCHASE_HISTORY_WINDOW: usize = 10;

impl StorePolicy {
    pub fn standard(refresh_interval_secs: i64) -> Self {
        let rule = |key: &str, mode: AppearanceMode| StockRule {
            crate_key: key.to_string(),
            mode,
        };
        StorePolicy {
            refresh_interval_secs,
            rules: vec![
                rule(
                    "copper",
                    AppearanceMode::Simple {
                        weight: 1.0,
                        min: 20,
                        max: 50,
                    },
                ),
                rule(
                    "common",
                    AppearanceMode::Simple {
                        weight: 0.95,
                        min: 10,
                        max: 30,
                    },
                ),
                rule(
                    "uncommon",
                    AppearanceMode::Simple {
                        weight: 0.8,
                        min: 5,
                        max: 15,
                    },
                ),
                rule(
                    "rare",
                    AppearanceMode::Decay {
                        base: 0.85,
                        decay_rate: 0.15,
                        min_stock: 1,
                        max_stock: 10,
                    },
                ),
                rule(
                    "epic",
                    AppearanceMode::Decay {
                        base: 0.6,
                        decay_rate: 0.3,
                        min_stock: 1,
                        max_stock: 5,
                    },
                ),
                rule(
                    "legendary",
                    AppearanceMode::Fixed {
                        chances: vec![(1, 0.25), (2, 0.08), (3, 0.02)],
                    },
                ),
                rule(
                    "rainbow",
                    AppearanceMode::Fixed {
                        chances: vec![(1, 0.05)],
                    },
                ),
            ],
        }
    }
}
