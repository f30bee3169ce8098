use crate::models::card::CardInstance;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub id: String,
    pub initiator: String,
    pub partner: String,
    pub offered: Vec<String>,
    pub requested: Vec<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct StartTradeRequest {
    pub initiator: String,
    pub partner: String,
    #[serde(default)]
    pub offered: Vec<String>,
    #[serde(default)]
    pub requested: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TradeActionRequest {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct TradeQuery {
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct TradeView {
    pub trade: Trade,
    pub offered_cards: Vec<CardInstance>,
    pub requested_cards: Vec<CardInstance>,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct TradeOutcome {
    pub trade_id: String,
    /// Ids the cards were stored under on the receiving side.
    pub initiator_received: Vec<String>,
    pub partner_received: Vec<String>,
}
