//! Global store: one deterministic inventory per refresh period, shared by
//! every user, minus each user's own purchases in that period.

use crate::config::store::{AppearanceMode, StorePolicy, MAX_PURCHASE_QUANTITY};
use crate::config::{CrateDef, GameConfig};
use crate::db::Db;
use crate::error::{AppError, EmergencyDenial, GachaError};
use crate::models::store::*;
use crate::models::user::UserState;
use crate::services::cooldown::Cooldowns;
use crate::validation;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub fn period(now: DateTime<Utc>, interval_secs: i64) -> i64 {
    now.timestamp().div_euclid(interval_secs)
}

pub fn next_refresh(period: i64, interval_secs: i64) -> i64 {
    (period + 1) * interval_secs
}

/// Private generator for one period's inventory. Seeded from
/// `"global_store_{period}"` so every process agrees on the stock.
pub fn inventory_rng(period: i64) -> StdRng {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(format!("global_store_{}", period).as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&hasher.finalize());
    StdRng::from_seed(seed)
}

fn roll<R: Rng + ?Sized>(rng: &mut R, chance: f64) -> bool {
    chance >= 1.0 || (chance > 0.0 && rng.gen_bool(chance))
}

fn roll_stock<R: Rng + ?Sized>(mode: &AppearanceMode, rng: &mut R) -> u32 {
    match mode {
        AppearanceMode::Simple { weight, min, max } => {
            if roll(rng, *weight) {
                rng.gen_range(*min..=(*max).max(*min))
            } else {
                0
            }
        }
        AppearanceMode::Decay {
            base,
            decay_rate,
            min_stock,
            max_stock,
        } => {
            for q in *min_stock..=*max_stock {
                let chance = base * (1.0 - decay_rate).powi(q as i32 - 1);
                if !roll(rng, chance) {
                    return q.saturating_sub(1);
                }
            }
            *max_stock
        }
        AppearanceMode::Fixed { chances } => {
            let mut ordered = chances.clone();
            ordered.sort_by(|a, b| b.0.cmp(&a.0));
            for (quantity, chance) in ordered {
                if roll(rng, chance) {
                    return quantity;
                }
            }
            0
        }
    }
}

pub fn generate_inventory(period: i64, policy: &StorePolicy) -> Inventory {
    let mut rng = inventory_rng(period);
    let lines = policy
        .rules
        .iter()
        .map(|rule| StockLine {
            crate_key: rule.crate_key.clone(),
            stock: roll_stock(&rule.mode, &mut rng),
        })
        .collect();
    Inventory { period, lines }
}

pub fn current_inventory(config: &GameConfig, now: DateTime<Utc>) -> Inventory {
    generate_inventory(period(now, config.store.refresh_interval_secs), &config.store)
}

pub fn remaining(user: &UserState, inventory: &Inventory, crate_key: &str) -> u32 {
    inventory
        .stock(crate_key)
        .saturating_sub(user.purchases_in_period(inventory.period, crate_key))
}

/// First failing emergency precondition, if any.
pub fn check_emergency(
    user: &UserState,
    price: u64,
    quantity: u32,
    cooldown_remaining_ms: i64,
) -> Result<(), EmergencyDenial> {
    if user.coins >= price {
        return Err(EmergencyDenial::BalanceSufficient {
            balance: user.coins,
            price,
        });
    }
    let owned = user.total_crates();
    if owned > 0 {
        return Err(EmergencyDenial::OwnsCrates { owned });
    }
    if !user.cards.is_empty() {
        return Err(EmergencyDenial::OwnsCards {
            owned: user.cards.len(),
        });
    }
    if quantity != 1 {
        return Err(EmergencyDenial::QuantityNotOne { requested: quantity });
    }
    if cooldown_remaining_ms > 0 {
        return Err(EmergencyDenial::CooldownActive {
            remaining_ms: cooldown_remaining_ms,
        });
    }
    Ok(())
}

fn emergency_crate(config: &GameConfig) -> Result<&CrateDef, GachaError> {
    config
        .emergency_crate()
        .ok_or_else(|| GachaError::UnknownCrate("copper".into()))
}

pub fn purchase(
    db: &Db,
    config: &GameConfig,
    cooldowns: &Cooldowns,
    user_id: &str,
    req: PurchaseRequest,
    now: DateTime<Utc>,
) -> Result<PurchaseResult, AppError> {
    let quantity = validation::validate_quantity(req.quantity, MAX_PURCHASE_QUANTITY)?;
    let crate_def = validation::resolve_crate(config, &req.crate_name)?;

    let is_emergency_crate = config
        .emergency_crate()
        .map(|c| c.key == crate_def.key)
        .unwrap_or(false);
    if is_emergency_crate && db.with_user(user_id, |u| u.coins < crate_def.price) {
        return emergency_purchase(db, config, cooldowns, user_id, Some(quantity), now);
    }

    let inventory = current_inventory(config, now);
    let global = inventory.stock(&crate_def.key);

    let result = db.update_user(user_id, |user| {
        if global == 0 {
            return Err(GachaError::OutOfStock {
                crate_key: crate_def.key.clone(),
            });
        }
        let left = remaining(user, &inventory, &crate_def.key);
        if left < quantity {
            return Err(GachaError::InsufficientStock {
                crate_key: crate_def.key.clone(),
                remaining: left,
                requested: quantity,
            });
        }
        let cost = crate_def.price * quantity as u64;
        if user.coins < cost {
            return Err(GachaError::InsufficientCoins {
                needed: cost,
                balance: user.coins,
            });
        }

        user.coins -= cost;
        user.add_crates(&crate_def.key, quantity);
        user.record_purchase(inventory.period, &crate_def.key, quantity);
        Ok(PurchaseResult {
            crate_key: crate_def.key.clone(),
            quantity,
            spent: cost,
            coins: user.coins,
            owned: user.owned_crates(&crate_def.key),
            remaining: left - quantity,
            emergency: false,
        })
    })?;

    log::info!(
        "user {} bought {}x {} for {} (period {})",
        user_id,
        result.quantity,
        result.crate_key,
        result.spent,
        inventory.period
    );
    Ok(result)
}

/// Safety valve for broke players: one cardboard box for whatever they have
/// left. Does not draw from the store's stock.
pub fn emergency_purchase(
    db: &Db,
    config: &GameConfig,
    cooldowns: &Cooldowns,
    user_id: &str,
    quantity: Option<u32>,
    now: DateTime<Utc>,
) -> Result<PurchaseResult, AppError> {
    let quantity = quantity.unwrap_or(1);
    let crate_def = emergency_crate(config)?;
    let cooldown_ms = cooldowns.remaining_ms(user_id, now);

    let result = db.update_user(user_id, |user| {
        check_emergency(user, crate_def.price, quantity, cooldown_ms)
            .map_err(GachaError::EmergencyNotPermitted)?;
        let spent = user.coins;
        user.coins = 0;
        user.add_crates(&crate_def.key, 1);
        Ok(PurchaseResult {
            crate_key: crate_def.key.clone(),
            quantity: 1,
            spent,
            coins: user.coins,
            owned: user.owned_crates(&crate_def.key),
            remaining: 0,
            emergency: true,
        })
    })?;

    log::info!("user {} used the emergency {} for {}", user_id, crate_def.key, result.spent);
    Ok(result)
}

pub fn store_view(
    db: &Db,
    config: &GameConfig,
    cooldowns: &Cooldowns,
    user_id: Option<&str>,
    now: DateTime<Utc>,
) -> StoreView {
    let interval = config.store.refresh_interval_secs;
    let inventory = current_inventory(config, now);
    let next = next_refresh(inventory.period, interval);
    let user = match user_id {
        Some(id) => db.with_user(id, |u| u.clone()),
        None => UserState::default(),
    };

    let items = inventory
        .lines
        .iter()
        .filter_map(|line| {
            let def = config.crate_def(&line.crate_key)?;
            Some(StoreItemView {
                crate_key: def.key.clone(),
                name: def.name.clone(),
                price: def.price,
                global_stock: line.stock,
                remaining: remaining(&user, &inventory, &def.key),
            })
        })
        .collect();

    let emergency_available = match (user_id, config.emergency_crate()) {
        (Some(id), Some(def)) => {
            check_emergency(&user, def.price, 1, cooldowns.remaining_ms(id, now)).is_ok()
        }
        _ => false,
    };

    StoreView {
        period: inventory.period,
        next_refresh: next,
        seconds_until_refresh: next - now.timestamp(),
        items,
        coins: user.coins,
        emergency_available,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::StockRule;
    use chrono::{Duration, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn copper_only(min: u32, max: u32) -> StorePolicy {
        StorePolicy {
            refresh_interval_secs: 600,
            rules: vec![StockRule {
                crate_key: "copper".into(),
                mode: AppearanceMode::Simple {
                    weight: 1.0,
                    min,
                    max,
                },
            }],
        }
    }

    /// Policy that always stocks plenty of everything.
    fn generous() -> GameConfig {
        let rules = crate::config::crates::CRATES
            .iter()
            .map(|c| StockRule {
                crate_key: c.key.to_string(),
                mode: AppearanceMode::Simple {
                    weight: 1.0,
                    min: 40,
                    max: 40,
                },
            })
            .collect();
        GameConfig::with_store_policy(StorePolicy {
            refresh_interval_secs: 600,
            rules,
        })
        .unwrap()
    }

    fn request(name: &str, quantity: u32) -> PurchaseRequest {
        PurchaseRequest {
            crate_name: name.into(),
            quantity: Some(quantity),
        }
    }

    #[test]
    fn inventory_is_seeded_by_period() {
        let policy = copper_only(5, 15);
        let p = period(at(600_000), 600);
        assert_eq!(p, 1000);

        let first = generate_inventory(p, &policy);
        let k: u32 = inventory_rng(1000).gen_range(5..=15);
        assert_eq!(first.stock("copper"), k);
        assert_eq!(generate_inventory(p, &policy), first);
    }

    #[test]
    fn standard_inventory_is_reproducible() {
        let policy = StorePolicy::standard(600);
        for p in 0..200 {
            let a = serde_json::to_vec(&generate_inventory(p, &policy)).unwrap();
            let b = serde_json::to_vec(&generate_inventory(p, &policy)).unwrap();
            assert_eq!(a, b);
        }
        // Inventory generation leaves the draw RNG alone.
        let mut rng = StdRng::seed_from_u64(1);
        let before: u64 = rng.clone().gen();
        generate_inventory(5, &policy);
        assert_eq!(rng.gen::<u64>(), before);
    }

    #[test]
    fn modes_stay_in_bounds() {
        let decay = AppearanceMode::Decay {
            base: 0.9,
            decay_rate: 0.1,
            min_stock: 1,
            max_stock: 4,
        };
        let fixed = AppearanceMode::Fixed {
            chances: vec![(1, 0.5), (3, 0.2)],
        };
        let mut rng = StdRng::seed_from_u64(2);
        let mut seen_zero = false;
        for _ in 0..2_000 {
            let d = roll_stock(&decay, &mut rng);
            assert!(d <= 4);
            seen_zero |= d == 0;
            assert!([0, 1, 3].contains(&roll_stock(&fixed, &mut rng)));
        }
        assert!(seen_zero);

        let certain = AppearanceMode::Fixed {
            chances: vec![(1, 1.0), (2, 1.0)],
        };
        assert_eq!(roll_stock(&certain, &mut rng), 2);
    }

    #[test]
    fn purchase_accounting() {
        let config = generous();
        let db = Db::open_in_memory();
        let cooldowns = Cooldowns::new(config.cooldown);
        let now = at(600_000);

        let err = purchase(&db, &config, &cooldowns, "u", request("common", 3), now).unwrap_err();
        assert!(matches!(
            err,
            AppError::Gacha(GachaError::InsufficientCoins { needed: 15_000, balance: 10_000 })
        ));
        db.with_user("u", |u| assert_eq!(u.coins, 10_000));

        let result = purchase(&db, &config, &cooldowns, "u", request("Common", 2), now).unwrap();
        assert_eq!(result.coins, 0);
        assert_eq!(result.remaining, 38);
        db.with_user("u", |u| {
            assert_eq!(u.coins, 0);
            assert_eq!(u.owned_crates("common"), 2);
            assert_eq!(u.purchases_in_period(1000, "common"), 2);
        });
    }

    #[test]
    fn preconditions_are_checked_in_order() {
        let config = generous();
        let db = Db::open_in_memory();
        let cooldowns = Cooldowns::new(config.cooldown);
        let now = at(600_000);

        for qty in [0, 51] {
            let err = purchase(&db, &config, &cooldowns, "u", request("common", qty), now).unwrap_err();
            assert!(matches!(err, AppError::Gacha(GachaError::InvalidQuantity { .. })));
        }
        let err = purchase(&db, &config, &cooldowns, "u", request("diamond", 1), now).unwrap_err();
        assert!(matches!(err, AppError::Gacha(GachaError::UnknownCrate(_))));

        db.update_user("u", |u| {
            u.coins = 100_000_000;
            Ok(())
        })
        .unwrap();
        purchase(&db, &config, &cooldowns, "u", request("rare", 40), now).unwrap();
        let err = purchase(&db, &config, &cooldowns, "u", request("rare", 1), now).unwrap_err();
        assert!(matches!(
            err,
            AppError::Gacha(GachaError::InsufficientStock { remaining: 0, .. })
        ));
        // the next period restocks
        purchase(&db, &config, &cooldowns, "u", request("rare", 1), now + Duration::seconds(600)).unwrap();
    }

    #[test]
    fn out_of_stock_when_global_is_zero() {
        let mut policy = StorePolicy::standard(600);
        for rule in &mut policy.rules {
            rule.mode = AppearanceMode::Fixed { chances: vec![] };
        }
        let config = GameConfig::with_store_policy(policy).unwrap();
        let db = Db::open_in_memory();
        let cooldowns = Cooldowns::new(config.cooldown);
        let err = purchase(&db, &config, &cooldowns, "u", request("common", 1), at(0)).unwrap_err();
        assert!(matches!(err, AppError::Gacha(GachaError::OutOfStock { .. })));
    }

    #[test]
    fn emergency_purchase_flow() {
        let config = generous();
        let db = Db::open_in_memory();
        let cooldowns = Cooldowns::new(config.cooldown);
        let now = at(600_000);
        db.update_user("broke", |u| {
            u.coins = 120;
            Ok(())
        })
        .unwrap();

        let result = purchase(&db, &config, &cooldowns, "broke", request("cardboard", 1), now).unwrap();
        assert!(result.emergency);
        assert_eq!(result.spent, 120);
        assert_eq!(result.coins, 0);
        db.with_user("broke", |u| {
            assert_eq!(u.owned_crates("copper"), 1);
            assert_eq!(u.purchases_in_period(1000, "copper"), 0);
        });

        let err = purchase(&db, &config, &cooldowns, "broke", request("cardboard", 1), now).unwrap_err();
        assert!(matches!(
            err,
            AppError::Gacha(GachaError::EmergencyNotPermitted(EmergencyDenial::OwnsCrates { owned: 1 }))
        ));
    }

    #[test]
    fn each_emergency_predicate_rejects_on_its_own() {
        let price = 500;
        let eligible = UserState::with_coins(0);
        assert!(check_emergency(&eligible, price, 1, 0).is_ok());

        let rich = UserState::with_coins(500);
        assert!(matches!(
            check_emergency(&rich, price, 1, 0),
            Err(EmergencyDenial::BalanceSufficient { .. })
        ));

        let mut with_crate = UserState::with_coins(0);
        with_crate.add_crates("epic", 1);
        assert!(matches!(
            check_emergency(&with_crate, price, 1, 0),
            Err(EmergencyDenial::OwnsCrates { owned: 1 })
        ));

        let mut with_card = UserState::with_coins(0);
        let card = crate::services::draw::synthesize_player(&mut StdRng::seed_from_u64(0));
        with_card.insert_card(crate::models::card::CardInstance {
            card_id: "x".into(),
            player: card,
            stars: 1,
            rarity_name: "Common".into(),
            rarity_color: 0,
            mutation: None,
            price: 100,
            obtained_at: 0,
            crate_key: "copper".into(),
            favorite: false,
            flashback_year: None,
            event_bonus: None,
        });
        assert!(matches!(
            check_emergency(&with_card, price, 1, 0),
            Err(EmergencyDenial::OwnsCards { owned: 1 })
        ));

        assert!(matches!(
            check_emergency(&eligible, price, 2, 0),
            Err(EmergencyDenial::QuantityNotOne { requested: 2 })
        ));
        assert!(matches!(
            check_emergency(&eligible, price, 1, 4_000),
            Err(EmergencyDenial::CooldownActive { remaining_ms: 4_000 })
        ));
    }

    #[test]
    fn view_reports_remaining_per_user() {
        let config = generous();
        let db = Db::open_in_memory();
        let cooldowns = Cooldowns::new(config.cooldown);
        let now = at(600_123);
        purchase(&db, &config, &cooldowns, "u", request("copper", 5), now).unwrap();

        let view = store_view(&db, &config, &cooldowns, Some("u"), now);
        assert_eq!(view.period, 1000);
        assert_eq!(view.next_refresh, 600_600);
        assert_eq!(view.seconds_until_refresh, 477);
        let copper = view.items.iter().find(|i| i.crate_key == "copper").unwrap();
        assert_eq!(copper.global_stock, 40);
        assert_eq!(copper.remaining, 35);
        assert!(!view.emergency_available);

        let anonymous = store_view(&db, &config, &cooldowns, None, now);
        assert!(anonymous.items.iter().all(|i| i.remaining == 40));
    }
}
