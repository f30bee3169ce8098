mod config;
mod db;
mod error;
mod handlers;
mod models;
mod services;
mod settings;
mod state;
mod validation;

use chrono::Utc;
use ntex::web;
use ntex_cors::Cors;
use services::trade::CLEANUP_INTERVAL;
use settings::Settings;
use state::AppState;
use std::sync::Arc;

#[ntex::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::from_env();
    let host = settings.host.clone();
    let port = settings.port;

    let state = Arc::new(AppState::open(settings).expect("Failed to load server state"));
    spawn_background(state.clone());

    log::info!("osu! gacha server starting on {}:{}", host, port);

    web::HttpServer::new(move || {
        web::App::new()
            .state(state.clone())
            .wrap(
                Cors::new()
                    .allowed_origin("*")
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec!["Content-Type", handlers::ADMIN_TOKEN_HEADER])
                    .max_age(3600)
                    .finish(),
            )
            // Health check
            .route("/api/health", web::get().to(health))
            .route("/api/cache", web::get().to(handlers::players::cache_status))
            // Users and collections
            .route("/api/users/{id}", web::get().to(handlers::users::get_profile))
            .route("/api/users/{id}/cards", web::get().to(handlers::users::list_cards))
            .route("/api/users/{id}/open", web::post().to(handlers::users::open_crates))
            .route("/api/users/{id}/buy", web::post().to(handlers::users::buy_crates))
            .route("/api/users/{id}/emergency", web::post().to(handlers::users::emergency_purchase))
            .route("/api/users/{id}/sell", web::post().to(handlers::users::sell_cards))
            .route("/api/users/{id}/favorite", web::post().to(handlers::users::set_favorite))
            .route("/api/users/{id}/daily", web::post().to(handlers::users::claim_daily))
            .route("/api/users/{id}/events/buy", web::post().to(handlers::users::buy_event_item))
            // Store
            .route("/api/store", web::get().to(handlers::store::get_store))
            // Leaderboard
            .route("/api/players/rank/{rank}", web::get().to(handlers::players::by_rank))
            .route("/api/players/name/{name}", web::get().to(handlers::players::by_name))
            // Trades
            .route("/api/trades", web::post().to(handlers::trades::start_trade))
            .route("/api/trades/{id}", web::get().to(handlers::trades::view_trade))
            .route("/api/trades/{id}/accept", web::post().to(handlers::trades::accept_trade))
            .route("/api/trades/{id}/cancel", web::post().to(handlers::trades::cancel_trade))
            // Events
            .route("/api/events", web::get().to(handlers::events::active_events))
            // Admin
            .route("/api/admin/store/refresh", web::post().to(handlers::store::force_refresh))
            .route(
                "/api/admin/store/announcements",
                web::post().to(handlers::store::update_announcements),
            )
            .route("/api/admin/events", web::post().to(handlers::events::create_event))
            .route("/api/admin/events/{id}/end", web::post().to(handlers::events::end_event))
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}

/// Cache warm-up, the store monitor and trade cleanup.
fn spawn_background(state: Arc<AppState>) {
    let warm = state.clone();
    ntex::rt::spawn(async move {
        if let Err(e) = warm.cache.ensure_valid(Utc::now()).await {
            log::warn!("initial leaderboard build failed: {}", e);
        }
    });

    ntex::rt::spawn(state.monitor.clone().run());

    ntex::rt::spawn(async move {
        let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = state.trades.cleanup(Utc::now());
            if evicted > 0 {
                log::info!("evicted {} expired trades", evicted);
            }
        }
    });
}

async fn health(state: web::types::State<Arc<AppState>>) -> web::HttpResponse {
    web::HttpResponse::Ok().json(&serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "users": state.db.user_count(),
        "cached_players": state.cache.snapshot().len(),
        "pending_trades": state.trades.len(),
        "active_cooldowns": state.cooldowns.tracked(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone};
    use crate::config::GameConfig;
    use crate::error::{AppError, EmergencyDenial, GachaError};
    use crate::services::leaderboard::testing::{fast_policy, DownRanking, FakeRanking};
    use crate::services::upstream::RankingSource;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn test_state(source: Arc<dyn RankingSource>) -> AppState {
        AppState::in_memory(
            Settings::from_lookup(|k| (k == "ADMIN_TOKEN").then(|| "secret".to_string())),
            GameConfig::load(600).unwrap(),
            source,
            fast_policy(20),
        )
    }

    fn buy(
        state: &AppState,
        user: &str,
        name: &str,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<models::store::PurchaseResult, AppError> {
        services::store::purchase(
            &state.db,
            &state.config,
            &state.cooldowns,
            user,
            models::store::PurchaseRequest {
                crate_name: name.into(),
                quantity: Some(quantity),
            },
            now,
        )
    }

    async fn open(
        state: &AppState,
        user: &str,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<models::card::OpenResult, AppError> {
        services::collection::open_crates(
            state,
            user,
            models::card::OpenRequest {
                crate_name: name.into(),
                quantity: Some(1),
            },
            now,
        )
        .await
    }

    /// First period in the standard policy that stocks at least two commons.
    fn period_with_common_stock(state: &AppState) -> i64 {
        (1000..)
            .find(|p| services::store::generate_inventory(*p, &state.config.store).stock("common") >= 2)
            .unwrap()
    }

    #[test]
    fn test_inventory_matches_across_calls() {
        let state = test_state(Arc::new(FakeRanking::new(100)));
        let now = at(600_000);
        let a = services::store::current_inventory(&state.config, now);
        let b = services::store::current_inventory(&state.config, now);
        assert_eq!(a.period, 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_purchase_accounting() {
        let state = test_state(Arc::new(FakeRanking::new(100)));
        let p = period_with_common_stock(&state);
        let now = at(p * 600 + 1);

        let err = buy(&state, "player", "common", 3, now).unwrap_err();
        assert!(matches!(
            err,
            AppError::Gacha(GachaError::InsufficientCoins { .. }) | AppError::Gacha(GachaError::InsufficientStock { .. })
        ));

        let before = services::store::store_view(&state.db, &state.config, &state.cooldowns, Some("player"), now);
        let result = buy(&state, "player", "common", 2, now).unwrap();
        assert_eq!(result.coins, 0);
        let after = services::store::store_view(&state.db, &state.config, &state.cooldowns, Some("player"), now);
        let remaining = |v: &models::store::StoreView| {
            v.items.iter().find(|i| i.crate_key == "common").map(|i| i.remaining).unwrap()
        };
        assert_eq!(remaining(&before) - remaining(&after), 2);
        state.db.with_user("player", |u| {
            assert_eq!(u.owned_crates("common"), 2);
            assert_eq!(u.purchases_in_period(p, "common"), 2);
        });
    }

    #[tokio::test]
    async fn test_cooldown_between_opens() {
        let state = test_state(Arc::new(FakeRanking::new(200)));
        state
            .db
            .update_user("player", |u| {
                u.add_crates("uncommon", 2);
                Ok(())
            })
            .unwrap();

        open(&state, "player", "uncommon", at(0)).await.unwrap();
        let err = open(&state, "player", "uncommon", at(5)).await.unwrap_err();
        assert!(err.to_string().contains("7.5 s remaining"));
        open(&state, "player", "uncommon", at(13)).await.unwrap();
    }

    #[tokio::test]
    async fn test_emergency_purchase_then_denied() {
        let state = test_state(Arc::new(FakeRanking::new(200)));
        state
            .db
            .update_user("broke", |u| {
                u.coins = 120;
                Ok(())
            })
            .unwrap();

        let result = services::store::emergency_purchase(
            &state.db,
            &state.config,
            &state.cooldowns,
            "broke",
            None,
            at(0),
        )
        .unwrap();
        assert_eq!(result.spent, 120);
        assert_eq!(result.coins, 0);

        let err = buy(&state, "broke", "Cardboard Box", 1, at(1)).unwrap_err();
        assert!(matches!(
            err,
            AppError::Gacha(GachaError::EmergencyNotPermitted(EmergencyDenial::OwnsCrates { owned: 1 }))
        ));

        // opening the box starts a cooldown and leaves a card behind
        open(&state, "broke", "copper", at(2)).await.unwrap();
        let err = services::store::emergency_purchase(&state.db, &state.config, &state.cooldowns, "broke", None, at(3))
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Gacha(GachaError::EmergencyNotPermitted(EmergencyDenial::OwnsCards { owned: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_open_degrades_without_upstream() {
        let state = test_state(Arc::new(DownRanking));
        state
            .db
            .update_user("player", |u| {
                u.add_crates("rainbow", 1);
                Ok(())
            })
            .unwrap();
        let result = open(&state, "player", "rainbow", at(0)).await.unwrap();
        let card = &result.cards[0];
        if card.flashback_year.is_none() {
            assert!((5_000..=9_999).contains(&card.player.rank));
            assert!(card.mutation.is_none());
        }
    }

    #[tokio::test]
    async fn test_event_crate_carries_bonuses() {
        let state = test_state(Arc::new(FakeRanking::new(1_000)));
        let now = Utc::now();
        let event = state
            .events
            .create_event(
                &state.config,
                services::events::testing::create_request(
                    vec![services::events::testing::boosted_item("copper", 100)],
                    3_600,
                ),
                now,
            )
            .unwrap();
        state
            .events
            .purchase_item(
                &state.db,
                "player",
                models::event::EventPurchaseRequest {
                    event_id: event.id.clone(),
                    item_index: 0,
                    quantity: Some(1),
                },
                now,
            )
            .unwrap();

        let result = open(&state, "player", "copper", now).await.unwrap();
        assert_eq!(result.cards.len(), 2);
        assert_eq!(result.bonus_coins, 250);
        assert_eq!(result.coins, 10_000 - 100 + 250);
        let boosted = &result.cards[0];
        assert!(boosted.stars >= 4);
        assert_eq!(boosted.event_bonus.as_ref().unwrap().event_id, event.id);
        state.db.with_user("player", |u| assert!(u.event_crate_sources.is_empty()));
    }

    #[tokio::test]
    async fn test_force_refresh_and_admin_token() {
        let state = test_state(Arc::new(FakeRanking::new(50)));
        assert!(state.is_admin(Some("secret")));
        assert!(!state.is_admin(Some("guess")));
        assert!(!state.is_admin(None));

        let now = Utc::now();
        state.monitor.tick(now).await.unwrap();
        let event = state.monitor.force_refresh(now).await.unwrap();
        let current = services::store::period(now, 600);
        assert_eq!(event.period, current + 1);
        assert!(state.monitor.tick(now + Duration::seconds(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_player_lookup_after_warmup() {
        let state = test_state(Arc::new(FakeRanking::new(120)));
        let snapshot = state.cache.ensure_valid(Utc::now()).await.unwrap();
        assert_eq!(snapshot.len(), 120);
        assert_eq!(state.cache.get_player_by_rank(77).unwrap().username, "Player77");
        assert_eq!(state.cache.get_player_by_username("player5").unwrap().rank, 5);
        let p = state.cache.get_random_player_in_range(10, 20).unwrap();
        assert!((10..=20).contains(&p.rank));
    }
}
