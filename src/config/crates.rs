//! Crate catalogue. Ordered cheapest first; the last two entries are the
//! top-tier crates that can roll the flashback mutation.

pub struct RankRangeDef {
    pub min_rank: u32,
    pub max_rank: u32,
    pub weight: f64,
}

pub struct CrateEntry {
    pub key: &'static str,
    pub name: &'static str,
    pub price: u64,
    pub ranges: &'static [RankRangeDef],
    pub aliases: &'static [&'static str],
}

const fn range(min_rank: u32, max_rank: u32, weight: f64) -> RankRangeDef {
    RankRangeDef {
        min_rank,
        max_rank,
        weight,
    }
}

/// Crate whose cheapest purchase doubles as the emergency safety valve.
pub const EMERGENCY_CRATE: &str = "copper";

/// Number of crates, counted from the top, that may roll `flashback`.
pub const TOP_TIER_CRATES: usize = 2;

pub const CRATES: &[CrateEntry] = &[
    CrateEntry {
        key: "copper",
        name: "Cardboard Box",
        price: 500,
        ranges: &[
            range(8001, 10000, 70.0),
            range(6001, 8000, 25.0),
            range(4001, 6000, 4.5),
            range(2001, 4000, 0.5),
        ],
        aliases: &["copper", "cardboard", "box", "cb"],
    },
    CrateEntry {
        key: "common",
        name: "Common Crate",
        price: 5_000,
        ranges: &[
            range(6001, 10000, 60.0),
            range(4001, 6000, 30.0),
            range(2001, 4000, 9.0),
            range(1001, 2000, 0.95),
            range(501, 1000, 0.05),
        ],
        aliases: &["common", "c"],
    },
    CrateEntry {
        key: "uncommon",
        name: "Uncommon Crate",
        price: 25_000,
        ranges: &[
            range(4001, 8000, 55.0),
            range(2001, 4000, 32.0),
            range(1001, 2000, 11.5),
            range(501, 1000, 1.4),
            range(101, 500, 0.1),
        ],
        aliases: &["uncommon", "u", "unc"],
    },
    CrateEntry {
        key: "rare",
        name: "Rare Crate",
        price: 100_000,
        ranges: &[
            range(2001, 6000, 50.0),
            range(1001, 2000, 35.0),
            range(501, 1000, 12.0),
            range(101, 500, 2.8),
            range(51, 100, 0.2),
        ],
        aliases: &["rare", "r"],
    },
    CrateEntry {
        key: "epic",
        name: "Epic Crate",
        price: 500_000,
        ranges: &[
            range(1001, 4000, 50.0),
            range(501, 1000, 33.0),
            range(101, 500, 14.0),
            range(51, 100, 2.6),
            range(11, 50, 0.4),
        ],
        aliases: &["epic", "e"],
    },
    CrateEntry {
        key: "legendary",
        name: "Legendary Crate",
        price: 2_500_000,
        ranges: &[
            range(501, 2000, 45.0),
            range(101, 500, 38.0),
            range(51, 100, 12.0),
            range(11, 50, 4.5),
            range(2, 10, 0.45),
            range(1, 1, 0.05),
        ],
        aliases: &["legendary", "l", "leg"],
    },
    CrateEntry {
        key: "rainbow",
        name: "Rainbow Crate",
        price: 10_000_000,
        ranges: &[
            range(101, 1000, 40.0),
            range(51, 100, 35.0),
            range(11, 50, 20.0),
            range(2, 10, 4.7),
            range(1, 1, 0.3),
        ],
        aliases: &["rainbow", "rb", "rainbow crate"],
    },
];
