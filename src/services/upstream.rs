//! osu! API v2 client: client-credentials token lifecycle and the global
//! performance ranking, one page at a time.

use crate::models::player::{round2, PlayerSnapshot};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Tokens are treated as expired this long before the server says so.
const TOKEN_EXPIRY_BUFFER_SECS: i64 = 300;
/// Lifetime assumed when the server reports an unusable `expires_in`.
const FALLBACK_TOKEN_LIFETIME_SECS: i64 = 600;
pub const PAGE_SIZE: u32 = 50;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("rate limited")]
    RateLimited,
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("client credentials are not configured")]
    MissingCredentials,
}

/// A paginated source of ranked players.
pub trait RankingSource: Send + Sync {
    fn fetch_page(&self, page: u32) -> BoxFuture<'_, Result<Vec<PlayerSnapshot>, UpstreamError>>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: DateTime<Utc>,
}

fn token_expiry(now: DateTime<Utc>, expires_in: i64) -> DateTime<Utc> {
    Some(expires_in)
        .filter(|secs| *secs > 0)
        .and_then(ChronoDuration::try_seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .unwrap_or_else(|| {
            log::warn!("token reported expires_in={}, assuming {} s", expires_in, FALLBACK_TOKEN_LIFETIME_SECS);
            now + ChronoDuration::seconds(FALLBACK_TOKEN_LIFETIME_SECS)
        })
}

impl AccessToken {
    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(TOKEN_EXPIRY_BUFFER_SECS) > self.expires_at
    }
}

#[derive(Debug, Deserialize)]
pub struct RankingResponse {
    #[serde(default)]
    pub ranking: Vec<RankingEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RankingEntry {
    pub user: RankingUser,
    #[serde(default)]
    pub global_rank: Option<u32>,
    #[serde(default)]
    pub pp: Option<f64>,
    #[serde(default)]
    pub hit_accuracy: f64,
    #[serde(default)]
    pub play_count: u64,
    #[serde(default)]
    pub level: Level,
}

#[derive(Debug, Deserialize)]
pub struct RankingUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub avatar_url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct Level {
    #[serde(default)]
    pub current: f64,
}

/// Projects an upstream entry. `position_rank` stands in when the entry has
/// no global rank of its own.
pub fn project_entry(entry: RankingEntry, position_rank: u32) -> PlayerSnapshot {
    PlayerSnapshot {
        user_id: entry.user.id.to_string(),
        username: entry.user.username,
        rank: entry.global_rank.unwrap_or(position_rank),
        pp: round2(entry.pp.unwrap_or(0.0)),
        accuracy: round2(entry.hit_accuracy),
        play_count: entry.play_count,
        country: entry.user.country_code,
        level: round2(entry.level.current),
        avatar_url: entry.user.avatar_url,
    }
}

pub fn project_page(response: RankingResponse, page: u32) -> Vec<PlayerSnapshot> {
    let offset = page.saturating_sub(1) * PAGE_SIZE;
    response
        .ranking
        .into_iter()
        .enumerate()
        .map(|(i, entry)| project_entry(entry, offset + i as u32 + 1))
        .collect()
}

pub struct OsuClient {
    agent: ureq::Agent,
    base_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
    token_retry_delays: Vec<Duration>,
}

impl OsuClient {
    pub fn new(base_url: &str, client_id: &str, client_secret: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        OsuClient {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Mutex::new(None),
            token_retry_delays: [1, 2, 3].into_iter().map(Duration::from_secs).collect(),
        }
    }

    async fn request_token(&self) -> Result<AccessToken, UpstreamError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(UpstreamError::MissingCredentials);
        }
        let agent = self.agent.clone();
        let url = format!("{}/oauth/token", self.base_url);
        let client_id = self.client_id.clone();
        let client_secret = self.client_secret.clone();

        let response: TokenResponse = tokio::task::spawn_blocking(move || {
            let response = agent
                .post(&url)
                .send_form(&[
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("grant_type", "client_credentials"),
                    ("scope", "public"),
                ])
                .map_err(map_ureq_error)?;
            response
                .into_json::<TokenResponse>()
                .map_err(|e| UpstreamError::Decode(e.to_string()))
        })
        .await
        .map_err(|e| UpstreamError::Transport(e.to_string()))??;

        Ok(AccessToken {
            value: response.access_token,
            expires_at: token_expiry(Utc::now(), response.expires_in),
        })
    }

    /// Returns a cached token, refreshing it when it is about to expire.
    async fn access_token(&self) -> Result<String, UpstreamError> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref() {
            if !token.needs_refresh(Utc::now()) {
                return Ok(token.value.clone());
            }
        }

        let mut attempt = 0;
        let token = loop {
            match self.request_token().await {
                Ok(token) => break token,
                Err(UpstreamError::MissingCredentials) => {
                    return Err(UpstreamError::MissingCredentials)
                }
                Err(e) => {
                    let Some(delay) = self.token_retry_delays.get(attempt) else {
                        return Err(e);
                    };
                    log::warn!("token request failed ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(*delay).await;
                    attempt += 1;
                }
            }
        };
        log::info!("obtained upstream token valid until {}", token.expires_at);
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    async fn get_page(&self, page: u32) -> Result<Vec<PlayerSnapshot>, UpstreamError> {
        let token = self.access_token().await?;
        let agent = self.agent.clone();
        let url = format!("{}/api/v2/rankings/osu/performance", self.base_url);

        let result = tokio::task::spawn_blocking(move || {
            let response = agent
                .get(&url)
                .query("page", &page.to_string())
                .set("Authorization", &format!("Bearer {}", token))
                .set("Accept", "application/json")
                .call()
                .map_err(map_ureq_error)?;
            response
                .into_json::<RankingResponse>()
                .map_err(|e| UpstreamError::Decode(e.to_string()))
        })
        .await
        .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        match result {
            Ok(response) => Ok(project_page(response, page)),
            Err(UpstreamError::Status(401)) => {
                self.invalidate_token().await;
                Err(UpstreamError::Status(401))
            }
            Err(e) => Err(e),
        }
    }
}

impl RankingSource for OsuClient {
    fn fetch_page(&self, page: u32) -> BoxFuture<'_, Result<Vec<PlayerSnapshot>, UpstreamError>> {
        Box::pin(self.get_page(page))
    }
}

fn map_ureq_error(e: ureq::Error) -> UpstreamError {
    match e {
        ureq::Error::Status(429, _) => UpstreamError::RateLimited,
        ureq::Error::Status(code, _) => UpstreamError::Status(code),
        ureq::Error::Transport(t) => UpstreamError::Transport(t.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absurd_token_lifetimes_fall_back() {
        let now = Utc::now();
        assert_eq!(token_expiry(now, 86_400), now + ChronoDuration::seconds(86_400));
        for bad in [i64::MAX, i64::MIN, 0, -5] {
            assert_eq!(
                token_expiry(now, bad),
                now + ChronoDuration::seconds(FALLBACK_TOKEN_LIFETIME_SECS)
            );
        }
    }

    const SAMPLE: &str = r#"{
        "ranking": [
            {
                "global_rank": 1,
                "pp": 24512.3456,
                "hit_accuracy": 98.87654,
                "play_count": 123456,
                "level": {"current": 103.4567, "progress": 12},
                "user": {"id": 7562902, "username": "mrekk", "country_code": "AU",
                         "avatar_url": "https://a.ppy.sh/7562902"}
            },
            {
                "pp": 20000.0,
                "hit_accuracy": 97.0,
                "play_count": 10,
                "user": {"id": 1, "username": "norank"}
            }
        ],
        "total": 10000
    }"#;

    #[test]
    fn projects_and_rounds_entries() {
        let response: RankingResponse = serde_json::from_str(SAMPLE).unwrap();
        let players = project_page(response, 3);
        assert_eq!(players.len(), 2);

        let top = &players[0];
        assert_eq!(top.user_id, "7562902");
        assert_eq!(top.rank, 1);
        assert_eq!(top.pp, 24512.35);
        assert_eq!(top.accuracy, 98.88);
        assert_eq!(top.level, 103.46);
        assert_eq!(top.country, "AU");

        // Missing global rank falls back to the position on page 3.
        assert_eq!(players[1].rank, 102);
        assert_eq!(players[1].level, 0.0);
    }

    #[test]
    fn token_refreshes_inside_buffer() {
        let now = Utc::now();
        let token = AccessToken {
            value: "t".into(),
            expires_at: now + ChronoDuration::seconds(299),
        };
        assert!(token.needs_refresh(now));
        let token = AccessToken {
            value: "t".into(),
            expires_at: now + ChronoDuration::seconds(3600),
        };
        assert!(!token.needs_refresh(now));
    }

    #[tokio::test]
    async fn missing_credentials_fail_fast() {
        let client = OsuClient::new("http://127.0.0.1:9", "", "");
        assert!(matches!(
            client.fetch_page(1).await,
            Err(UpstreamError::MissingCredentials)
        ));
    }
}
