use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventItem {
    pub name: String,
    pub crate_key: String,
    pub price: u64,
    /// Rarity band key -> chance in percent to upgrade into that band.
    #[serde(default)]
    pub rarity_boosts: BTreeMap<String, f64>,
    #[serde(default)]
    pub bonus_coins: u64,
    #[serde(default)]
    pub extra_cards: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    #[serde(default)]
    pub items: Vec<EventItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub guild_id: Option<u64>,
    #[serde(default)]
    pub channel_id: Option<u64>,
    pub start_time: i64,
    pub end_time: i64,
    #[serde(default)]
    pub definition: EventDefinition,
    /// user id -> item index -> quantity bought
    #[serde(default)]
    pub user_purchases: HashMap<String, BTreeMap<usize, u32>>,
}

impl EventRecord {
    pub fn is_active(&self, now: i64) -> bool {
        now >= self.start_time && now < self.end_time
    }
}

/// Bonuses carried by one crate opened from an event purchase.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBoost {
    pub event_id: String,
    pub item_index: usize,
    pub rarity_boosts: BTreeMap<String, f64>,
    pub bonus_coins: u64,
    pub extra_cards: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub guild_id: Option<u64>,
    #[serde(default)]
    pub channel_id: Option<u64>,
    pub start_time: Option<i64>,
    pub duration_secs: i64,
    pub items: Vec<EventItem>,
}

fn default_kind() -> String {
    "shop".to_string()
}

#[derive(Debug, Deserialize)]
pub struct EventPurchaseRequest {
    pub event_id: String,
    pub item_index: usize,
    pub quantity: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct EventPurchaseResult {
    pub crate_key: String,
    pub quantity: u32,
    pub spent: u64,
    pub coins: u64,
}
