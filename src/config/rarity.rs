/// Rank interval mapped to a star count and display attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct RarityBand {
    pub key: &'static str,
    pub name: &'static str,
    pub stars: u8,
    pub color: u32,
    pub min_rank: u32,
    pub max_rank: u32,
}

const fn band(
    key: &'static str,
    name: &'static str,
    stars: u8,
    color: u32,
    min_rank: u32,
    max_rank: u32,
) -> RarityBand {
    RarityBand {
        key,
        name,
        stars,
        color,
        min_rank,
        max_rank,
    }
}

/// Best band first. Rank 1 is a band of its own.
pub const RARITY_BANDS: &[RarityBand] = &[
    band("apex", "Apex", 6, 0xFF0055, 1, 1),
    band("mythic", "Mythic", 5, 0xFF4500, 2, 5),
    band("legendary", "Legendary", 5, 0xFFD700, 6, 50),
    band("epic", "Epic", 4, 0xA020F0, 51, 500),
    band("rare", "Rare", 3, 0x1E90FF, 501, 2000),
    band("uncommon", "Uncommon", 2, 0x2ECC71, 2001, 5000),
    band("common", "Common", 1, 0x95A5A6, 5001, 10000),
];

/// Band used for ranks outside every configured interval.
pub const FALLBACK_BAND: usize = RARITY_BANDS.len() - 1;

/// Forced star count for flashback cards.
pub const FLASHBACK_STARS: u8 = 6;
pub const FLASHBACK_COLOR: u32 = 0xC0C0C0;
