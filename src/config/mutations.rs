/// Chance that any mutation is rolled at all.
pub const MUTATION_CHANCE: f64 = 0.10;

pub const FLASHBACK: &str = "flashback";

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub key: &'static str,
    pub name: &'static str,
    /// Absolute weight inside the mutation window. The weights do not sum to 1.
    pub rarity: f64,
    pub multiplier: f64,
    pub color: u32,
    pub effect: &'static str,
}

const fn mutation(
    key: &'static str,
    name: &'static str,
    rarity: f64,
    multiplier: f64,
    color: u32,
    effect: &'static str,
) -> Mutation {
    Mutation {
        key,
        name,
        rarity,
        multiplier,
        color,
        effect,
    }
}

pub const MUTATIONS: &[Mutation] = &[
    mutation("shiny", "Shiny", 0.04, 1.5, 0xFFF68F, "sparkle"),
    mutation("golden", "Golden", 0.025, 2.0, 0xFFD700, "gold_frame"),
    mutation("holographic", "Holographic", 0.015, 3.0, 0x7FFFD4, "holo"),
    mutation("corrupted", "Corrupted", 0.01, 2.5, 0x8B0000, "glitch"),
    mutation("prismatic", "Prismatic", 0.006, 5.0, 0xFF00FF, "prism"),
    mutation(FLASHBACK, "Flashback", 0.004, 4.0, 0xC0C0C0, "sepia"),
];
