use crate::models::card::CardInstance;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Ledger entry linking an owned crate to the event item it was bought as.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCrateSource {
    pub event_id: String,
    pub item_index: usize,
    pub purchased_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserState {
    pub coins: u64,
    pub cards: HashMap<String, CardInstance>,
    pub crates: BTreeMap<String, u32>,
    pub last_daily: Option<i64>,
    pub total_opens: u64,
    pub achievements: serde_json::Value,
    pub favorites: Vec<String>,
    pub confirm_purchases: bool,
    /// period -> crate key -> count bought in that period
    pub purchase_history: BTreeMap<i64, BTreeMap<String, u32>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub event_crate_sources: BTreeMap<String, Vec<EventCrateSource>>,
}

impl UserState {
    pub fn with_coins(coins: u64) -> Self {
        UserState {
            coins,
            confirm_purchases: true,
            ..Default::default()
        }
    }

    pub fn owned_crates(&self, key: &str) -> u32 {
        self.crates.get(key).copied().unwrap_or(0)
    }

    pub fn total_crates(&self) -> u32 {
        self.crates.values().sum()
    }

    pub fn add_crates(&mut self, key: &str, count: u32) {
        *self.crates.entry(key.to_string()).or_insert(0) += count;
    }

    /// Removes `count` crates; returns false and leaves state untouched when
    /// fewer are owned.
    pub fn take_crates(&mut self, key: &str, count: u32) -> bool {
        let owned = self.owned_crates(key);
        if owned < count {
            return false;
        }
        if owned == count {
            self.crates.remove(key);
        } else {
            self.crates.insert(key.to_string(), owned - count);
        }
        true
    }

    pub fn purchases_in_period(&self, period: i64, key: &str) -> u32 {
        self.purchase_history
            .get(&period)
            .and_then(|p| p.get(key))
            .copied()
            .unwrap_or(0)
    }

    pub fn record_purchase(&mut self, period: i64, key: &str, count: u32) {
        *self
            .purchase_history
            .entry(period)
            .or_default()
            .entry(key.to_string())
            .or_insert(0) += count;
    }

    /// Keeps only the `keep` most recent periods.
    pub fn prune_purchase_history(&mut self, keep: usize) {
        while self.purchase_history.len() > keep {
            let Some(oldest) = self.purchase_history.keys().next().copied() else {
                break;
            };
            self.purchase_history.remove(&oldest);
        }
    }

    /// Inserts a freshly drawn card. Drawn ids are unique, so the `-n` suffix
    /// only guards against ids restored from an older save. Returns the id the
    /// card was stored under.
    pub fn insert_card(&mut self, mut card: CardInstance) -> String {
        if self.cards.contains_key(&card.card_id) {
            let base = card.card_id.clone();
            let mut n = 1;
            while self.cards.contains_key(&format!("{base}-{n}")) {
                n += 1;
            }
            card.card_id = format!("{base}-{n}");
        }
        let id = card.card_id.clone();
        if card.favorite && !self.favorites.contains(&id) {
            self.favorites.push(id.clone());
        }
        self.cards.insert(id.clone(), card);
        id
    }

    pub fn is_favorite(&self, card_id: &str) -> bool {
        self.cards.get(card_id).map(|c| c.favorite).unwrap_or(false)
    }

    pub fn set_favorite(&mut self, card_id: &str, favorite: bool) -> bool {
        let Some(card) = self.cards.get_mut(card_id) else {
            return false;
        };
        card.favorite = favorite;
        self.favorites.retain(|id| id != card_id);
        if favorite {
            self.favorites.push(card_id.to_string());
        }
        true
    }

    /// Brings the favourites list in line with the per-card flags after load.
    pub fn normalize_favorites(&mut self) {
        for id in self.favorites.clone() {
            if let Some(card) = self.cards.get_mut(&id) {
                card.favorite = true;
            }
        }
        let mut favorites: Vec<String> = self
            .cards
            .values()
            .filter(|c| c.favorite)
            .map(|c| c.card_id.clone())
            .collect();
        favorites.sort();
        self.favorites = favorites;
    }

    pub fn collection_value(&self) -> u64 {
        self.cards.values().map(|c| c.price).sum()
    }
}
