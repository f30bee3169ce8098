//! Card trades between two users. Pending trades live in memory only and
//! expire after ten minutes.

use crate::db::Db;
use crate::error::{AppError, GachaError};
use crate::models::card::CardInstance;
use crate::models::trade::*;
use crate::models::user::UserState;
use crate::validation;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

pub const TRADE_TTL_SECS: i64 = 10 * 60;
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Every id must be owned and not favourited.
fn check_tradeable(user: &UserState, card_ids: &[String]) -> Result<(), GachaError> {
    for id in card_ids {
        let card = user
            .cards
            .get(id)
            .ok_or_else(|| GachaError::CardNotFound(id.clone()))?;
        if card.favorite {
            return Err(GachaError::ProtectedCard(id.clone()));
        }
    }
    Ok(())
}

/// The receiver must not already hold any of the ids.
fn check_receivable(receiver: &UserState, card_ids: &[String]) -> Result<(), GachaError> {
    match card_ids.iter().find(|id| receiver.cards.contains_key(*id)) {
        Some(id) => Err(GachaError::InvalidInput(format!(
            "the other side already holds a card with id {}",
            id
        ))),
        None => Ok(()),
    }
}

/// Cards keep their ids when they change hands.
fn move_cards(from: &mut UserState, to: &mut UserState, card_ids: &[String]) -> Vec<String> {
    card_ids
        .iter()
        .filter_map(|id| from.cards.remove(id))
        .map(|card| {
            let id = card.card_id.clone();
            to.cards.insert(id.clone(), card);
            id
        })
        .collect()
}

fn dedup(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[derive(Default)]
pub struct Trades {
    pending: Mutex<HashMap<String, Trade>>,
}

impl Trades {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Trade>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Looks up a live trade for one of its parties. Expired trades are
    /// removed on sight.
    fn live(&self, trade_id: &str, user: &str, now: DateTime<Utc>) -> Result<Trade, GachaError> {
        let mut pending = self.lock();
        let trade = pending
            .get(trade_id)
            .cloned()
            .ok_or_else(|| GachaError::TradeNotFound(trade_id.to_string()))?;
        if now.timestamp() - trade.created_at > TRADE_TTL_SECS {
            pending.remove(trade_id);
            return Err(GachaError::TradeExpired(trade_id.to_string()));
        }
        if trade.initiator != user && trade.partner != user {
            return Err(GachaError::TradePartnerMismatch(trade_id.to_string()));
        }
        Ok(trade)
    }

    pub fn start(&self, db: &Db, req: StartTradeRequest, now: DateTime<Utc>) -> Result<Trade, AppError> {
        let initiator = validation::validate_user_id(&req.initiator)?.to_string();
        let partner = validation::validate_user_id(&req.partner)?.to_string();
        if initiator == partner {
            return Err(GachaError::InvalidInput("Cannot trade with yourself".into()).into());
        }
        let offered = dedup(req.offered);
        let requested = dedup(req.requested);
        if offered.is_empty() && requested.is_empty() {
            return Err(GachaError::InvalidInput("Trade needs at least one card".into()).into());
        }

        db.with_user(&initiator, |u| {
            check_tradeable(u, &offered)?;
            check_receivable(u, &requested)
        })?;
        db.with_user(&partner, |u| {
            check_tradeable(u, &requested)?;
            check_receivable(u, &offered)
        })?;

        let trade = Trade {
            id: Uuid::new_v4().to_string(),
            initiator,
            partner,
            offered,
            requested,
            created_at: now.timestamp(),
        };
        self.lock().insert(trade.id.clone(), trade.clone());
        log::info!("trade {} opened by {} with {}", trade.id, trade.initiator, trade.partner);
        Ok(trade)
    }

    pub fn view(&self, db: &Db, trade_id: &str, viewer: &str, now: DateTime<Utc>) -> Result<TradeView, AppError> {
        let trade = self.live(trade_id, viewer, now)?;
        let pick = |user: &UserState, ids: &[String]| -> Vec<CardInstance> {
            ids.iter().filter_map(|id| user.cards.get(id).cloned()).collect()
        };
        let offered_cards = db.with_user(&trade.initiator, |u| pick(u, &trade.offered));
        let requested_cards = db.with_user(&trade.partner, |u| pick(u, &trade.requested));
        Ok(TradeView {
            expires_at: trade.created_at + TRADE_TTL_SECS,
            trade,
            offered_cards,
            requested_cards,
        })
    }

    /// Only the invited partner can accept. Ownership and favourites are
    /// checked again, then both sides swap in one commit.
    pub fn accept(&self, db: &Db, trade_id: &str, user: &str, now: DateTime<Utc>) -> Result<TradeOutcome, AppError> {
        let trade = self.live(trade_id, user, now)?;
        if trade.partner != user {
            return Err(GachaError::TradePartnerMismatch(trade_id.to_string()).into());
        }

        let outcome = db.update_pair(&trade.initiator, &trade.partner, |initiator, partner| {
            check_tradeable(initiator, &trade.offered)?;
            check_tradeable(partner, &trade.requested)?;
            check_receivable(partner, &trade.offered)?;
            check_receivable(initiator, &trade.requested)?;
            let partner_received = move_cards(initiator, partner, &trade.offered);
            let initiator_received = move_cards(partner, initiator, &trade.requested);
            Ok(TradeOutcome {
                trade_id: trade.id.clone(),
                initiator_received,
                partner_received,
            })
        })?;

        self.lock().remove(trade_id);
        log::info!("trade {} completed", trade_id);
        Ok(outcome)
    }

    pub fn cancel(&self, trade_id: &str, user: &str, now: DateTime<Utc>) -> Result<Trade, GachaError> {
        let trade = self.live(trade_id, user, now)?;
        self.lock().remove(trade_id);
        log::info!("trade {} cancelled by {}", trade_id, user);
        Ok(trade)
    }

    /// Evicts trades older than the ttl. Returns how many were dropped.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let mut pending = self.lock();
        let before = pending.len();
        pending.retain(|_, t| now.timestamp() - t.created_at <= TRADE_TTL_SECS);
        before - pending.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
