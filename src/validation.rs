use crate::config::{CrateDef, GameConfig};
use crate::error::GachaError;

const MAX_USER_ID_LEN: usize = 32;
const MAX_CARDS_PER_REQUEST: usize = 500;
const MAX_EVENT_NAME_LEN: usize = 100;

/// Missing quantities mean one.
pub fn validate_quantity(quantity: Option<u32>, max: u32) -> Result<u32, GachaError> {
    let requested = quantity.unwrap_or(1);
    if requested < 1 || requested > max {
        Err(GachaError::InvalidQuantity { requested, max })
    } else {
        Ok(requested)
    }
}

pub fn resolve_crate<'c>(config: &'c GameConfig, input: &str) -> Result<&'c CrateDef, GachaError> {
    config
        .resolve_crate(input)
        .ok_or_else(|| GachaError::UnknownCrate(input.trim().to_string()))
}

pub fn validate_user_id(user_id: &str) -> Result<&str, GachaError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_USER_ID_LEN {
        return Err(GachaError::InvalidInput(format!("Invalid user id: {}", user_id)));
    }
    if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(GachaError::InvalidInput(format!("Invalid user id: {}", user_id)));
    }
    Ok(trimmed)
}

pub fn validate_card_ids(card_ids: &[String]) -> Result<(), GachaError> {
    if card_ids.is_empty() {
        Err(GachaError::InvalidInput("No cards given".into()))
    } else if card_ids.len() > MAX_CARDS_PER_REQUEST {
        Err(GachaError::InvalidInput("Too many cards in one request".into()))
    } else {
        Ok(())
    }
}

pub fn validate_event_name(name: &str) -> Result<String, GachaError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        Err(GachaError::InvalidInput("Event name cannot be empty".into()))
    } else {
        Ok(trimmed.chars().take(MAX_EVENT_NAME_LEN).collect())
    }
}
