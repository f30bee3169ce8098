use crate::config::store::{MAX_OPEN_QUANTITY, MAX_PURCHASE_QUANTITY};
use crate::config::GameConfig;
use crate::db::{load_json, save_json, Db};
use crate::error::{AppError, GachaError, PersistError};
use crate::models::event::*;
use crate::models::user::{EventCrateSource, UserState};
use crate::validation;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Time-boxed shop events, persisted as `{event_id: EventRecord}`.
pub struct EventStore {
    path: Option<PathBuf>,
    events: Mutex<BTreeMap<String, EventRecord>>,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self, PersistError> {
        let events: BTreeMap<String, EventRecord> = load_json(path)?.unwrap_or_default();
        log::info!("loaded {} events from {}", events.len(), path.display());
        Ok(EventStore {
            path: Some(path.to_path_buf()),
            events: Mutex::new(events),
        })
    }

    pub fn in_memory() -> Self {
        EventStore {
            path: None,
            events: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, EventRecord>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, events: &BTreeMap<String, EventRecord>) {
        if let Some(path) = &self.path {
            if let Err(e) = save_json(path, events) {
                log::error!("failed to persist events: {}", e);
            }
        }
    }

    pub fn create_event(
        &self,
        config: &GameConfig,
        req: CreateEventRequest,
        now: DateTime<Utc>,
    ) -> Result<EventRecord, GachaError> {
        let name = validation::validate_event_name(&req.name)?;
        if req.duration_secs <= 0 {
            return Err(GachaError::InvalidInput("Event duration must be positive".into()));
        }
        if req.items.is_empty() {
            return Err(GachaError::InvalidInput("Event needs at least one item".into()));
        }
        let mut items = req.items;
        for item in &mut items {
            item.crate_key = validation::resolve_crate(config, &item.crate_key)?.key.clone();
            if let Some(band) = item
                .rarity_boosts
                .keys()
                .find(|k| config.band_by_key(k).is_none())
            {
                return Err(GachaError::InvalidInput(format!("Unknown rarity: {}", band)));
            }
            if item.extra_cards > MAX_OPEN_QUANTITY {
                return Err(GachaError::InvalidInput(format!(
                    "At most {} extra cards per crate",
                    MAX_OPEN_QUANTITY
                )));
            }
        }

        let start_time = req.start_time.unwrap_or_else(|| now.timestamp());
        let end_time = start_time
            .checked_add(req.duration_secs)
            .ok_or_else(|| GachaError::InvalidInput("Event end time is out of range".into()))?;
        let event = EventRecord {
            id: Uuid::new_v4().to_string(),
            kind: req.kind,
            name,
            description: req.description,
            guild_id: req.guild_id,
            channel_id: req.channel_id,
            start_time,
            end_time,
            definition: EventDefinition { items },
            user_purchases: Default::default(),
        };

        let mut events = self.lock();
        events.insert(event.id.clone(), event.clone());
        self.flush(&events);
        log::info!("event {} ({}) created", event.name, event.id);
        Ok(event)
    }

    /// Ends an event now. Ending an already finished event is a no-op.
    pub fn end_event(&self, event_id: &str, now: DateTime<Utc>) -> Result<EventRecord, AppError> {
        let mut events = self.lock();
        let event = events
            .get_mut(event_id)
            .ok_or_else(|| AppError::NotFound(format!("Event {}", event_id)))?;
        if event.end_time > now.timestamp() {
            event.end_time = now.timestamp();
            log::info!("event {} ended early", event_id);
        }
        let ended = event.clone();
        self.flush(&events);
        Ok(ended)
    }

    pub fn active_events(&self, now: DateTime<Utc>) -> Vec<EventRecord> {
        let now = now.timestamp();
        self.lock()
            .values()
            .filter(|e| e.is_active(now))
            .cloned()
            .collect()
    }

    pub fn get(&self, event_id: &str) -> Option<EventRecord> {
        self.lock().get(event_id).cloned()
    }

    pub fn purchase_item(
        &self,
        db: &Db,
        user_id: &str,
        req: EventPurchaseRequest,
        now: DateTime<Utc>,
    ) -> Result<EventPurchaseResult, AppError> {
        let quantity = validation::validate_quantity(req.quantity, MAX_PURCHASE_QUANTITY)?;
        let event = self
            .get(&req.event_id)
            .ok_or_else(|| AppError::NotFound(format!("Event {}", req.event_id)))?;
        if !event.is_active(now.timestamp()) {
            return Err(GachaError::EventNotActive(event.id).into());
        }
        let item = event
            .definition
            .items
            .get(req.item_index)
            .ok_or_else(|| GachaError::InvalidInput(format!("No item {} in event", req.item_index)))?;

        let cost = item
            .price
            .checked_mul(quantity as u64)
            .ok_or_else(|| GachaError::InvalidInput("Purchase total is out of range".into()))?;
        let result = db.update_user(user_id, |user| {
            if user.coins < cost {
                return Err(GachaError::InsufficientCoins {
                    needed: cost,
                    balance: user.coins,
                });
            }
            user.coins -= cost;
            user.add_crates(&item.crate_key, quantity);
            let ledger = user
                .event_crate_sources
                .entry(item.crate_key.clone())
                .or_default();
            for _ in 0..quantity {
                ledger.push(EventCrateSource {
                    event_id: event.id.clone(),
                    item_index: req.item_index,
                    purchased_at: now.timestamp(),
                });
            }
            Ok(EventPurchaseResult {
                crate_key: item.crate_key.clone(),
                quantity,
                spent: cost,
                coins: user.coins,
            })
        })?;

        let mut events = self.lock();
        if let Some(record) = events.get_mut(&event.id) {
            *record
                .user_purchases
                .entry(user_id.to_string())
                .or_default()
                .entry(req.item_index)
                .or_insert(0) += quantity;
        }
        self.flush(&events);
        Ok(result)
    }

    /// Takes the oldest ledger record for `crate_key` whose event is running
    /// and returns its bonuses. Records of finished or deleted events are
    /// dropped on the way.
    pub fn consume_source(
        &self,
        user: &mut UserState,
        crate_key: &str,
        now: DateTime<Utc>,
    ) -> Option<EventBoost> {
        let ledger = user.event_crate_sources.get_mut(crate_key)?;
        let now = now.timestamp();
        let events = self.lock();

        ledger.retain(|source| {
            events
                .get(&source.event_id)
                .map(|e| e.end_time > now)
                .unwrap_or(false)
        });
        let position = ledger.iter().position(|source| {
            events
                .get(&source.event_id)
                .map(|e| e.is_active(now))
                .unwrap_or(false)
        });
        let boost = position.and_then(|i| {
            let source = ledger.remove(i);
            let item = events
                .get(&source.event_id)?
                .definition
                .items
                .get(source.item_index)?;
            Some(EventBoost {
                event_id: source.event_id,
                item_index: source.item_index,
                rarity_boosts: item.rarity_boosts.clone(),
                bonus_coins: item.bonus_coins,
                extra_cards: item.extra_cards,
            })
        });
        if ledger.is_empty() {
            user.event_crate_sources.remove(crate_key);
        }
        boost
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    pub fn boosted_item(crate_key: &str, price: u64) -> EventItem {
        let mut rarity_boosts = BTreeMap::new();
        rarity_boosts.insert("epic".to_string(), 100.0);
        EventItem {
            name: "Festival Box".into(),
            crate_key: crate_key.into(),
            price,
            rarity_boosts,
            bonus_coins: 250,
            extra_cards: 1,
        }
    }

    pub fn create_request(items: Vec<EventItem>, duration_secs: i64) -> CreateEventRequest {
        CreateEventRequest {
            kind: "shop".into(),
            name: "Summer Festival".into(),
            description: String::new(),
            guild_id: None,
            channel_id: None,
            start_time: None,
            duration_secs,
            items,
        }
    }
}
