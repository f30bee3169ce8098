use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLine {
    pub crate_key: String,
    pub stock: u32,
}

/// Global stock for one period, in policy order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub period: i64,
    pub lines: Vec<StockLine>,
}

impl Inventory {
    pub fn stock(&self, crate_key: &str) -> u32 {
        self.lines
            .iter()
            .find(|l| l.crate_key == crate_key)
            .map(|l| l.stock)
            .unwrap_or(0)
    }
}

#[derive(Debug, Serialize)]
pub struct StoreItemView {
    pub crate_key: String,
    pub name: String,
    pub price: u64,
    pub global_stock: u32,
    pub remaining: u32,
}

#[derive(Debug, Serialize)]
pub struct StoreView {
    pub period: i64,
    pub next_refresh: i64,
    pub seconds_until_refresh: i64,
    pub items: Vec<StoreItemView>,
    pub coins: u64,
    pub emergency_available: bool,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    #[serde(rename = "crate")]
    pub crate_name: String,
    pub quantity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseResult {
    pub crate_key: String,
    pub quantity: u32,
    pub spent: u64,
    pub coins: u64,
    pub owned: u32,
    pub remaining: u32,
    pub emergency: bool,
}

#[derive(Debug, Deserialize)]
pub struct StoreQuery {
    pub user: Option<String>,
}

/// Persisted toggles for refresh announcements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub channel_id: Option<u64>,
    #[serde(default)]
    pub mention_role_id: Option<u64>,
    #[serde(default)]
    pub last_message_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct AnnouncementUpdate {
    pub enabled: Option<bool>,
    pub channel_id: Option<u64>,
    pub mention_role_id: Option<u64>,
    #[serde(default)]
    pub clear_mention_role: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshEvent {
    pub period: i64,
    pub inventory: Inventory,
    pub next_refresh: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct EmergencyRequest {
    pub quantity: Option<u32>,
}
