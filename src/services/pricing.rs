//! Card pricing. The base price is a piecewise curve over global rank,
//! cheapest at rank 10 000 and steepest near the top.

pub const MIN_PRICE: u64 = 100;
const STAR_STEP: f64 = 0.35;
const SCORE_SCALE: f64 = 25_000.0;
const SCORE_WEIGHT: f64 = 0.15;

/// Interpolation curve within a band.
#[derive(Clone, Copy)]
enum Curve {
    Linear,
    Power(f64),
}

/// `(best_rank, worst_rank, price_at_worst, price_at_best, curve)`
const BANDS: &[(u32, u32, f64, f64, Curve)] = &[
    (8001, 10000, 200.0, 600.0, Curve::Linear),
    (6001, 8000, 600.0, 1_500.0, Curve::Linear),
    (4001, 6000, 1_500.0, 4_000.0, Curve::Linear),
    (2001, 4000, 4_000.0, 12_000.0, Curve::Linear),
    (1001, 2000, 12_000.0, 50_000.0, Curve::Linear),
    (501, 1000, 50_000.0, 200_000.0, Curve::Linear),
    (101, 500, 200_000.0, 2_000_000.0, Curve::Power(2.0)),
    (51, 100, 2_000_000.0, 20_000_000.0, Curve::Power(2.5)),
    (11, 50, 20_000_000.0, 200_000_000.0, Curve::Power(3.0)),
    (6, 10, 200_000_000.0, 400_000_000.0, Curve::Power(2.0)),
];

const TOP_FIVE: [f64; 5] = [1.5e9, 1.0e9, 7.0e8, 5.0e8, 4.0e8];

/// Base price for a rank before any multiplier.
pub fn base_price(rank: u32) -> f64 {
    if rank == 0 {
        return TOP_FIVE[0];
    }
    if rank <= 5 {
        return TOP_FIVE[(rank - 1) as usize];
    }
    for &(best, worst, low, high, curve) in BANDS {
        if rank >= best && rank <= worst {
            // 0 at the worst rank of the band, 1 at the best.
            let t = (worst - rank) as f64 / (worst - best) as f64;
            let shaped = match curve {
                Curve::Linear => t,
                Curve::Power(p) => t.powf(p),
            };
            return low + (high - low) * shaped;
        }
    }
    BANDS[0].2
}

pub fn star_multiplier(stars: u8) -> f64 {
    1.0 + (stars.max(1) - 1) as f64 * STAR_STEP
}

pub fn score_factor(pp: f64) -> f64 {
    1.0 + (pp.max(0.0) / SCORE_SCALE) * SCORE_WEIGHT
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceBreakdown {
    /// Price before mutation and flashback multipliers.
    pub pre_mutation: f64,
    pub mutation_multiplier: f64,
    pub flashback_multiplier: f64,
    pub price: u64,
}

pub fn price_card(
    rank: u32,
    stars: u8,
    pp: f64,
    mutation_multiplier: Option<f64>,
    flashback_multiplier: Option<f64>,
) -> PriceBreakdown {
    let pre_mutation = base_price(rank) * star_multiplier(stars) * score_factor(pp);
    let mutation_multiplier = mutation_multiplier.unwrap_or(1.0);
    let flashback_multiplier = flashback_multiplier.unwrap_or(1.0);
    let raw = pre_mutation * mutation_multiplier * flashback_multiplier;
    let price = if raw.is_finite() && raw > 0.0 {
        (raw.trunc() as u64).max(MIN_PRICE)
    } else {
        MIN_PRICE
    };
    PriceBreakdown {
        pre_mutation,
        mutation_multiplier,
        flashback_multiplier,
        price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_endpoints() {
        assert_eq!(base_price(10_000), 200.0);
        assert_eq!(base_price(8_001), 600.0);
        assert_eq!(base_price(1_001), 50_000.0);
        assert_eq!(base_price(101), 2_000_000.0);
        assert_eq!(base_price(500), 200_000.0);
        assert_eq!(base_price(11), 200_000_000.0);
        assert_eq!(base_price(10), 200_000_000.0);
        assert_eq!(base_price(6), 400_000_000.0);
    }

    #[test]
    fn top_five_table() {
        assert_eq!(base_price(1), 1.5e9);
        assert_eq!(base_price(2), 1.0e9);
        assert_eq!(base_price(3), 7.0e8);
        assert_eq!(base_price(4), 5.0e8);
        assert_eq!(base_price(5), 4.0e8);
    }

    #[test]
    fn base_price_never_increases_with_rank() {
        let mut previous = f64::MAX;
        for rank in 1..=10_000 {
            let price = base_price(rank);
            assert!(price <= previous, "rank {rank}: {price} > {previous}");
            previous = price;
        }
    }

    #[test]
    fn quadratic_band_midpoint() {
        // rank 300 sits at t = 200/399 of the 101..500 band.
        let t = 200.0 / 399.0;
        let expected = 200_000.0 + 1_800_000.0 * t * t;
        assert!((base_price(300) - expected).abs() < 1e-6);
    }

    #[test]
    fn multipliers_compose_and_truncate() {
        let plain = price_card(5_000, 1, 0.0, None, None);
        let expected = base_price(5_000);
        assert_eq!(plain.price, expected.trunc() as u64);

        let mutated = price_card(5_000, 3, 10_000.0, Some(2.5), None);
        let pre = base_price(5_000) * 1.7 * (1.0 + 0.4 * 0.15);
        assert!((mutated.pre_mutation - pre).abs() < 1e-6);
        let expected = (pre * 2.5).trunc() as u64;
        assert!(mutated.price.abs_diff(expected) <= 1);
    }

    #[test]
    fn clamps_to_minimum() {
        assert_eq!(price_card(50_000, 1, 0.0, Some(0.1), None).price, MIN_PRICE);
    }
}
