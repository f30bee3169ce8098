use ntex::http::StatusCode;
use ntex::web::{HttpResponse, WebResponseError};
use std::fmt;
use thiserror::Error;

/// Which emergency-purchase precondition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyDenial {
    BalanceSufficient { balance: u64, price: u64 },
    OwnsCrates { owned: u32 },
    OwnsCards { owned: usize },
    QuantityNotOne { requested: u32 },
    CooldownActive { remaining_ms: i64 },
}

impl fmt::Display for EmergencyDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmergencyDenial::BalanceSufficient { balance, price } => write!(
                f,
                "you have {} coins, enough for a regular purchase at {}",
                balance, price
            ),
            EmergencyDenial::OwnsCrates { owned } => {
                write!(f, "you still own {} unopened crate(s)", owned)
            }
            EmergencyDenial::OwnsCards { owned } => {
                write!(f, "you still own {} card(s) you can sell", owned)
            }
            EmergencyDenial::QuantityNotOne { requested } => {
                write!(f, "emergency purchases are limited to 1 crate, not {}", requested)
            }
            EmergencyDenial::CooldownActive { remaining_ms } => write!(
                f,
                "your crate cooldown has {:.1} s remaining",
                as_secs(remaining_ms)
            ),
        }
    }
}

fn shortfall(needed: &u64, balance: &u64) -> u64 {
    needed.saturating_sub(*balance)
}

fn as_secs(ms: &i64) -> f64 {
    *ms as f64 / 1000.0
}

#[derive(Debug, Error)]
pub enum GachaError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("quantity must be between 1 and {max}, got {requested}")]
    InvalidQuantity { requested: u32, max: u32 },
    #[error("unknown crate: {0}")]
    UnknownCrate(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not enough coins: need {needed}, have {balance} ({} short)", shortfall(.needed, .balance))]
    InsufficientCoins { needed: u64, balance: u64 },
    #[error("{crate_key} is out of stock this period")]
    OutOfStock { crate_key: String },
    #[error("not enough {crate_key} stock: {remaining} left for you, requested {requested}")]
    InsufficientStock {
        crate_key: String,
        remaining: u32,
        requested: u32,
    },
    #[error("not enough {crate_key} crates: own {owned}, requested {requested}")]
    InsufficientCrates {
        crate_key: String,
        owned: u32,
        requested: u32,
    },
    #[error("cooldown active: {:.1} s remaining", as_secs(.remaining_ms))]
    CooldownActive { remaining_ms: i64 },
    #[error("card {0} is favourited and protected")]
    ProtectedCard(String),
    #[error("card {0} not found")]
    CardNotFound(String),
    #[error("emergency purchase not permitted: {0}")]
    EmergencyNotPermitted(EmergencyDenial),
    #[error("trade {0} has expired")]
    TradeExpired(String),
    #[error("trade {0} does not involve you")]
    TradePartnerMismatch(String),
    #[error("trade {0} not found")]
    TradeNotFound(String),
    #[error("daily reward ready in {remaining_secs} s")]
    DailyNotReady { remaining_secs: i64 },
    #[error("event {0} is not active")]
    EventNotActive(String),
}

impl GachaError {
    pub fn kind(&self) -> &'static str {
        match self {
            GachaError::UpstreamUnavailable(_) => "upstream_unavailable",
            GachaError::InvalidQuantity { .. }
            | GachaError::UnknownCrate(_)
            | GachaError::InvalidInput(_) => "invalid_input",
            GachaError::InsufficientCoins { .. } => "insufficient_coins",
            GachaError::OutOfStock { .. }
            | GachaError::InsufficientStock { .. }
            | GachaError::InsufficientCrates { .. } => "insufficient_stock",
            GachaError::CooldownActive { .. } => "cooldown_active",
            GachaError::ProtectedCard(_) => "protected_card",
            GachaError::CardNotFound(_) | GachaError::TradeNotFound(_) => "not_found",
            GachaError::EmergencyNotPermitted(_) => "emergency_not_permitted",
            GachaError::TradeExpired(_) => "trade_expired",
            GachaError::TradePartnerMismatch(_) => "trade_partner_mismatch",
            GachaError::DailyNotReady { .. } => "daily_not_ready",
            GachaError::EventNotActive(_) => "event_not_active",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            GachaError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GachaError::InvalidQuantity { .. }
            | GachaError::UnknownCrate(_)
            | GachaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GachaError::CardNotFound(_) | GachaError::TradeNotFound(_) => StatusCode::NOT_FOUND,
            GachaError::TradePartnerMismatch(_) => StatusCode::FORBIDDEN,
            GachaError::TradeExpired(_) => StatusCode::GONE,
            GachaError::CooldownActive { .. } | GachaError::DailyNotReady { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("json error on {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug)]
pub enum AppError {
    Gacha(GachaError),
    Persist(PersistError),
    NotFound(String),
    BadRequest(String),
    Forbidden,
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Gacha(e) => write!(f, "{}", e),
            AppError::Persist(e) => write!(f, "Persistence error: {}", e),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Forbidden => write!(f, "Forbidden"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl WebResponseError for AppError {
    fn error_response(&self, _: &ntex::web::HttpRequest) -> HttpResponse {
        let (status, kind, message) = match self {
            AppError::Gacha(e) => (e.status(), e.kind(), e.to_string()),
            AppError::Persist(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "persistence",
                "Persistence error".to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg.clone()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", "Forbidden".to_string()),
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                "Internal error".to_string(),
            ),
        };
        HttpResponse::build(status).json(&serde_json::json!({ "error": message, "kind": kind }))
    }
}

impl From<GachaError> for AppError {
    fn from(e: GachaError) -> Self {
        AppError::Gacha(e)
    }
}

impl From<PersistError> for AppError {
    fn from(e: PersistError) -> Self {
        AppError::Persist(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_message_names_remaining_seconds() {
        let err = GachaError::CooldownActive { remaining_ms: 7_500 };
        assert_eq!(err.to_string(), "cooldown active: 7.5 s remaining");
        assert_eq!(err.kind(), "cooldown_active");
    }

    #[test]
    fn insufficient_coins_reports_missing_amount() {
        let err = GachaError::InsufficientCoins {
            needed: 15_000,
            balance: 10_000,
        };
        assert!(err.to_string().contains("5000 short"));
    }
}
