use crate::config::store::MAX_OPEN_QUANTITY;
use crate::config::{DAILY_INTERVAL_SECS, DAILY_REWARD};
use crate::db::Db;
use crate::error::{AppError, GachaError};
use crate::models::card::*;
use crate::services::draw::draw_card;
use crate::state::AppState;
use crate::validation;
use chrono::{DateTime, Utc};

/// Opens `quantity` owned crates. Cards from event-bought crates carry the
/// event's rarity boost, bonus coins and extra cards.
pub async fn open_crates(
    state: &AppState,
    user_id: &str,
    req: OpenRequest,
    now: DateTime<Utc>,
) -> Result<OpenResult, AppError> {
    let quantity = validation::validate_quantity(req.quantity, MAX_OPEN_QUANTITY)?;
    let crate_def = validation::resolve_crate(&state.config, &req.crate_name)?;
    state.cooldowns.check(user_id, now)?;

    let owned = state.db.with_user(user_id, |u| u.owned_crates(&crate_def.key));
    if owned < quantity {
        return Err(GachaError::InsufficientCrates {
            crate_key: crate_def.key.clone(),
            owned,
            requested: quantity,
        }
        .into());
    }

    let snapshot = state.engine.prepare(now).await;

    let result = state.db.update_user(user_id, |user| {
        // another request may have opened in the meantime
        state.cooldowns.check(user_id, now)?;
        if !user.take_crates(&crate_def.key, quantity) {
            return Err(GachaError::InsufficientCrates {
                crate_key: crate_def.key.clone(),
                owned: user.owned_crates(&crate_def.key),
                requested: quantity,
            });
        }

        let mut rng = rand::thread_rng();
        let mut cards = Vec::new();
        let mut bonus_coins: u64 = 0;
        for _ in 0..quantity {
            let boost = state.events.consume_source(user, &crate_def.key, now);
            let extra = boost.as_ref().map(|b| b.extra_cards).unwrap_or(0);
            bonus_coins = bonus_coins.saturating_add(boost.as_ref().map(|b| b.bonus_coins).unwrap_or(0));

            let mut card = draw_card(&state.config, &snapshot, crate_def, boost.as_ref(), now, &mut rng).card;
            card.card_id = user.insert_card(card.clone());
            cards.push(card);
            for _ in 0..extra {
                let mut card = draw_card(&state.config, &snapshot, crate_def, None, now, &mut rng).card;
                card.card_id = user.insert_card(card.clone());
                cards.push(card);
            }
        }

        user.coins = user.coins.saturating_add(bonus_coins);
        user.total_opens += quantity as u64;
        state.cooldowns.stamp(user_id, now);
        Ok(OpenResult {
            cards,
            bonus_coins,
            coins: user.coins,
            crates_left: user.owned_crates(&crate_def.key),
        })
    })?;

    log::info!(
        "user {} opened {}x {} ({} cards)",
        user_id,
        quantity,
        crate_def.key,
        result.cards.len()
    );
    Ok(result)
}

/// Most valuable first.
pub fn list_cards(db: &Db, user_id: &str) -> Vec<CardInstance> {
    let mut cards: Vec<CardInstance> = db.with_user(user_id, |u| u.cards.values().cloned().collect());
    cards.sort_by(|a, b| b.price.cmp(&a.price).then_with(|| a.card_id.cmp(&b.card_id)));
    cards
}

pub fn set_favorite(db: &Db, user_id: &str, req: FavoriteRequest) -> Result<CardInstance, AppError> {
    db.update_user(user_id, |user| {
        if !user.set_favorite(&req.card_id, req.favorite) {
            return Err(GachaError::CardNotFound(req.card_id.clone()));
        }
        user.cards
            .get(&req.card_id)
            .cloned()
            .ok_or_else(|| GachaError::CardNotFound(req.card_id.clone()))
    })
}

/// Sells the listed cards, or every non-favourite with `all`. A favourite
/// in the list refuses the whole sale.
pub fn sell_cards(db: &Db, user_id: &str, req: SellRequest) -> Result<SellResult, AppError> {
    if !req.all {
        validation::validate_card_ids(&req.card_ids)?;
    }
    db.update_user(user_id, |user| {
        let ids: Vec<String> = if req.all {
            user.cards
                .values()
                .filter(|c| !c.favorite)
                .map(|c| c.card_id.clone())
                .collect()
        } else {
            for id in &req.card_ids {
                let card = user
                    .cards
                    .get(id)
                    .ok_or_else(|| GachaError::CardNotFound(id.clone()))?;
                if card.favorite {
                    return Err(GachaError::ProtectedCard(id.clone()));
                }
            }
            req.card_ids.clone()
        };

        let mut earned = 0;
        let mut sold = 0;
        for id in &ids {
            if let Some(card) = user.cards.remove(id) {
                earned += card.price;
                sold += 1;
            }
        }
        user.coins += earned;
        Ok(SellResult {
            sold,
            earned,
            coins: user.coins,
        })
    })
}

pub fn claim_daily(db: &Db, user_id: &str, now: DateTime<Utc>) -> Result<DailyResult, AppError> {
    db.update_user(user_id, |user| {
        let now = now.timestamp();
        if let Some(last) = user.last_daily {
            let elapsed = now - last;
            if elapsed < DAILY_INTERVAL_SECS {
                return Err(GachaError::DailyNotReady {
                    remaining_secs: DAILY_INTERVAL_SECS - elapsed,
                });
            }
        }
        user.last_daily = Some(now);
        user.coins += DAILY_REWARD;
        Ok(DailyResult {
            reward: DAILY_REWARD,
            coins: user.coins,
        })
    })
}

pub fn profile(db: &Db, user_id: &str) -> Profile {
    db.with_user(user_id, |u| Profile {
        user_id: user_id.to_string(),
        coins: u.coins,
        crates: u.crates.clone(),
        cards: u.cards.len(),
        favorites: u.cards.values().filter(|c| c.favorite).count(),
        total_opens: u.total_opens,
        collection_value: u.collection_value(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::services::leaderboard::testing::{fast_policy, FakeRanking};
    use crate::settings::Settings;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn state() -> AppState {
        AppState::in_memory(
            Settings::from_lookup(|_| None),
            GameConfig::load(600).unwrap(),
            Arc::new(FakeRanking::new(500)),
            fast_policy(10),
        )
    }

    fn give_crates(state: &AppState, user: &str, key: &str, n: u32) {
        state
            .db
            .update_user(user, |u| {
                u.add_crates(key, n);
                Ok(())
            })
            .unwrap();
    }

    fn open(key: &str, quantity: u32) -> OpenRequest {
        OpenRequest {
            crate_name: key.into(),
            quantity: Some(quantity),
        }
    }

    #[tokio::test]
    async fn opening_consumes_crates_and_stores_cards() {
        let state = state();
        give_crates(&state, "u", "rare", 5);
        let result = open_crates(&state, "u", open("r", 3), at(0)).await.unwrap();
        assert_eq!(result.cards.len(), 3);
        assert_eq!(result.crates_left, 2);

        let profile = profile(&state.db, "u");
        assert_eq!(profile.cards, 3);
        assert_eq!(profile.total_opens, 3);
        for card in &result.cards {
            state.db.with_user("u", |u| assert!(u.cards.contains_key(&card.card_id)));
        }
    }

    #[tokio::test]
    async fn opening_needs_owned_crates() {
        let state = state();
        let err = open_crates(&state, "u", open("epic", 1), at(0)).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Gacha(GachaError::InsufficientCrates { owned: 0, requested: 1, .. })
        ));
        let err = open_crates(&state, "u", open("epic", 0), at(0)).await.unwrap_err();
        assert!(matches!(err, AppError::Gacha(GachaError::InvalidQuantity { .. })));
    }

    #[tokio::test]
    async fn cooldown_blocks_second_open() {
        let state = state();
        give_crates(&state, "u", "copper", 3);
        open_crates(&state, "u", open("copper", 1), at(0)).await.unwrap();

        let err = open_crates(&state, "u", open("copper", 1), at(5)).await.unwrap_err();
        assert_eq!(err.to_string(), "cooldown active: 7.5 s remaining");
        state.db.with_user("u", |u| assert_eq!(u.owned_crates("copper"), 2));

        open_crates(&state, "u", open("copper", 1), at(13)).await.unwrap();
    }

    #[test]
    fn favourites_are_protected_from_sale() {
        let state = state();
        let cards: Vec<String> = state
            .db
            .update_user("u", |u| {
                let mut rng = rand::thread_rng();
                let snapshot = crate::services::leaderboard::testing::snapshot_of(1..=100);
                let def = state.config.crate_def("epic").unwrap();
                Ok((0..3)
                    .map(|_| u.insert_card(draw_card(&state.config, &snapshot, def, None, at(0), &mut rng).card))
                    .collect())
            })
            .unwrap();

        set_favorite(
            &state.db,
            "u",
            FavoriteRequest {
                card_id: cards[0].clone(),
                favorite: true,
            },
        )
        .unwrap();

        let before = state.db.with_user("u", |u| u.clone());
        let err = sell_cards(
            &state.db,
            "u",
            SellRequest {
                card_ids: cards.clone(),
                all: false,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Gacha(GachaError::ProtectedCard(_))));
        state.db.with_user("u", |u| assert_eq!(*u, before));

        let result = sell_cards(
            &state.db,
            "u",
            SellRequest {
                card_ids: vec![],
                all: true,
            },
        )
        .unwrap();
        assert_eq!(result.sold, 2);
        assert_eq!(result.coins, before.coins + result.earned);
        assert_eq!(list_cards(&state.db, "u").len(), 1);
        assert!(list_cards(&state.db, "u")[0].favorite);
    }

    #[test]
    fn daily_reward_once_per_day() {
        let db = Db::open_in_memory();
        let first = claim_daily(&db, "u", at(0)).unwrap();
        assert_eq!(first.coins, 12_500);
        let err = claim_daily(&db, "u", at(3_600)).unwrap_err();
        assert!(matches!(
            err,
            AppError::Gacha(GachaError::DailyNotReady { remaining_secs: 82_800 })
        ));
        claim_daily(&db, "u", at(0) + Duration::days(1)).unwrap();
    }
}
