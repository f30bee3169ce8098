use crate::models::player::PlayerSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bonus applied to a card opened from an event-sourced crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBonusRecord {
    pub event_id: String,
    pub item_index: usize,
    /// Band key the card was upgraded from, when the rarity boost hit.
    #[serde(default)]
    pub upgraded_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredCard")]
pub struct CardInstance {
    pub card_id: String,
    pub player: PlayerSnapshot,
    pub stars: u8,
    pub rarity_name: String,
    pub rarity_color: u32,
    pub mutation: Option<String>,
    pub price: u64,
    pub obtained_at: i64,
    pub crate_key: String,
    pub favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flashback_year: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_bonus: Option<EventBonusRecord>,
}

/// On-disk shape. Older saves spell the favourite flag three different ways.
#[derive(Deserialize)]
struct StoredCard {
    card_id: String,
    player: PlayerSnapshot,
    stars: u8,
    #[serde(default)]
    rarity_name: String,
    #[serde(default)]
    rarity_color: u32,
    #[serde(default)]
    mutation: Option<String>,
    price: u64,
    #[serde(default)]
    obtained_at: i64,
    #[serde(default)]
    crate_key: String,
    #[serde(default)]
    favorite: Option<bool>,
    #[serde(default)]
    is_favorite: Option<bool>,
    #[serde(default)]
    favourited: Option<bool>,
    #[serde(default)]
    flashback_year: Option<String>,
    #[serde(default)]
    event_bonus: Option<EventBonusRecord>,
}

impl From<StoredCard> for CardInstance {
    fn from(raw: StoredCard) -> Self {
        let favorite = [raw.favorite, raw.is_favorite, raw.favourited]
            .iter()
            .any(|flag| flag.unwrap_or(false));
        CardInstance {
            card_id: raw.card_id,
            player: raw.player,
            stars: raw.stars,
            rarity_name: raw.rarity_name,
            rarity_color: raw.rarity_color,
            mutation: raw.mutation,
            price: raw.price,
            obtained_at: raw.obtained_at,
            crate_key: raw.crate_key,
            favorite,
            flashback_year: raw.flashback_year,
            event_bonus: raw.event_bonus,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    #[serde(rename = "crate")]
    pub crate_name: String,
    pub quantity: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct OpenResult {
    pub cards: Vec<CardInstance>,
    pub bonus_coins: u64,
    pub coins: u64,
    pub crates_left: u32,
}

#[derive(Debug, Deserialize)]
pub struct SellRequest {
    #[serde(default)]
    pub card_ids: Vec<String>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct SellResult {
    pub sold: usize,
    pub earned: u64,
    pub coins: u64,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteRequest {
    pub card_id: String,
    pub favorite: bool,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub user_id: String,
    pub coins: u64,
    pub crates: BTreeMap<String, u32>,
    pub cards: usize,
    pub favorites: usize,
    pub total_opens: u64,
    pub collection_value: u64,
}

#[derive(Debug, Serialize)]
pub struct DailyResult {
    pub reward: u64,
    pub coins: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_json(flag: &str) -> String {
        format!(
            r#"{{
                "card_id": "2_5_100",
                "player": {{
                    "user_id": "2", "username": "someone", "rank": 3, "pp": 20000.0,
                    "accuracy": 98.5, "play_count": 1000, "country": "US",
                    "level": 100.0, "avatar_url": ""
                }},
                "stars": 5,
                "price": 1000
                {flag}
            }}"#
        )
    }

    #[test]
    fn legacy_favorite_keys_normalize() {
        for key in ["favorite", "is_favorite", "favourited"] {
            let json = card_json(&format!(r#", "{key}": true"#));
            let card: CardInstance = serde_json::from_str(&json).unwrap();
            assert!(card.favorite, "{key} should mark the card favourite");
        }

        let card: CardInstance = serde_json::from_str(&card_json("")).unwrap();
        assert!(!card.favorite);
    }

    #[test]
    fn saves_single_favorite_field() {
        let json = card_json(r#", "is_favorite": true, "favorite": false"#);
        let card: CardInstance = serde_json::from_str(&json).unwrap();
        let out = serde_json::to_value(&card).unwrap();
        assert_eq!(out["favorite"], serde_json::Value::Bool(true));
        assert!(out.get("is_favorite").is_none());
        assert!(out.get("favourited").is_none());
    }
}
