//! Store refresh announcements. One tracked message is edited in place;
//! when editing fails a fresh message is posted and tracked instead.

use crate::config::GameConfig;
use crate::db::{load_json, save_json};
use crate::error::PersistError;
use crate::models::store::{AnnouncementConfig, AnnouncementUpdate, RefreshEvent};
use crate::services::monitor::{AnnounceError, RefreshSink};
use crate::services::upstream::BoxFuture;
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Message transport. Returns ids of posted messages.
pub trait Announcer: Send + Sync {
    fn post(&self, channel_id: u64, content: String) -> BoxFuture<'_, Result<u64, AnnounceError>>;
    fn edit(
        &self,
        channel_id: u64,
        message_id: u64,
        content: String,
    ) -> BoxFuture<'_, Result<(), AnnounceError>>;
}

/// Posts through a chat webhook bound to the announcement channel.
pub struct WebhookAnnouncer {
    agent: ureq::Agent,
    url: String,
}

#[derive(Deserialize)]
struct PostedMessage {
    id: String,
}

impl WebhookAnnouncer {
    pub fn new(url: &str) -> Self {
        WebhookAnnouncer {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(15))
                .build(),
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

fn map_ureq_error(e: ureq::Error) -> AnnounceError {
    match e {
        ureq::Error::Status(code, _) => AnnounceError::Status(code),
        ureq::Error::Transport(t) => AnnounceError::Transport(t.to_string()),
    }
}

impl Announcer for WebhookAnnouncer {
    fn post(&self, _channel_id: u64, content: String) -> BoxFuture<'_, Result<u64, AnnounceError>> {
        let agent = self.agent.clone();
        let url = format!("{}?wait=true", self.url);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                let response = agent
                    .post(&url)
                    .send_json(serde_json::json!({ "content": content }))
                    .map_err(map_ureq_error)?;
                let message: PostedMessage = response
                    .into_json()
                    .map_err(|e| AnnounceError::Decode(e.to_string()))?;
                message
                    .id
                    .parse()
                    .map_err(|_| AnnounceError::Decode(format!("bad message id {}", message.id)))
            })
            .await
            .map_err(|e| AnnounceError::Transport(e.to_string()))?
        })
    }

    fn edit(
        &self,
        _channel_id: u64,
        message_id: u64,
        content: String,
    ) -> BoxFuture<'_, Result<(), AnnounceError>> {
        let agent = self.agent.clone();
        let url = format!("{}/messages/{}", self.url, message_id);
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                agent
                    .request("PATCH", &url)
                    .send_json(serde_json::json!({ "content": content }))
                    .map(|_| ())
                    .map_err(map_ureq_error)
            })
            .await
            .map_err(|e| AnnounceError::Transport(e.to_string()))?
        })
    }
}

/// Used when no webhook is configured.
#[derive(Default)]
pub struct LogAnnouncer {
    next_id: AtomicU64,
}

impl Announcer for LogAnnouncer {
    fn post(&self, channel_id: u64, content: String) -> BoxFuture<'_, Result<u64, AnnounceError>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!("[announce #{} -> {}] {}", id, channel_id, content);
        Box::pin(async move { Ok(id) })
    }

    fn edit(
        &self,
        channel_id: u64,
        message_id: u64,
        content: String,
    ) -> BoxFuture<'_, Result<(), AnnounceError>> {
        log::info!("[announce #{} -> {} edited] {}", message_id, channel_id, content);
        Box::pin(async { Ok(()) })
    }
}

pub struct StoreAnnouncer {
    config: Arc<GameConfig>,
    announcer: Arc<dyn Announcer>,
    state: Mutex<AnnouncementConfig>,
    path: Option<PathBuf>,
}

impl StoreAnnouncer {
    pub fn load(
        config: Arc<GameConfig>,
        announcer: Arc<dyn Announcer>,
        path: Option<PathBuf>,
    ) -> Result<Self, PersistError> {
        let state = match &path {
            Some(p) => load_json::<AnnouncementConfig>(p)?.unwrap_or_default(),
            None => AnnouncementConfig::default(),
        };
        Ok(StoreAnnouncer {
            config,
            announcer,
            state: Mutex::new(state),
            path,
        })
    }

    /// Announcer whose settings are never written to disk.
    #[cfg(test)]
    pub fn detached(config: Arc<GameConfig>, announcer: Arc<dyn Announcer>) -> Self {
        StoreAnnouncer {
            config,
            announcer,
            state: Mutex::new(AnnouncementConfig::default()),
            path: None,
        }
    }

    pub fn settings(&self) -> AnnouncementConfig {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn store(&self, state: &AnnouncementConfig) -> Result<(), PersistError> {
        match &self.path {
            Some(path) => save_json(path, state),
            None => Ok(()),
        }
    }

    /// Applies the change to a copy and commits it only once it is saved.
    pub fn update(&self, update: AnnouncementUpdate) -> Result<AnnouncementConfig, PersistError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut draft = state.clone();
        if let Some(enabled) = update.enabled {
            draft.enabled = enabled;
        }
        if let Some(channel_id) = update.channel_id {
            if draft.channel_id != Some(channel_id) {
                draft.last_message_id = None;
            }
            draft.channel_id = Some(channel_id);
        }
        if update.clear_mention_role {
            draft.mention_role_id = None;
        } else if let Some(role) = update.mention_role_id {
            draft.mention_role_id = Some(role);
        }
        self.store(&draft)?;
        *state = draft.clone();
        Ok(draft)
    }

    fn track(&self, message_id: u64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_message_id = Some(message_id);
        if let Err(e) = self.store(&state) {
            log::error!("failed to save announcement config: {}", e);
        }
    }

    pub fn render(&self, event: &RefreshEvent, mention_role_id: Option<u64>) -> String {
        let mut out = String::new();
        if let Some(role) = mention_role_id {
            let _ = write!(out, "<@&{}> ", role);
        }
        let _ = writeln!(out, "**The store has restocked!** (period {})", event.period);
        for line in &event.inventory.lines {
            let Some(def) = self.config.crate_def(&line.crate_key) else {
                continue;
            };
            if line.stock == 0 {
                let _ = writeln!(out, "- {}: sold out", def.name);
            } else {
                let _ = writeln!(out, "- {} x{} ({} coins)", def.name, line.stock, def.price);
            }
        }
        let _ = write!(out, "Next restock <t:{}:R>", event.next_refresh);
        out
    }
}

impl RefreshSink for StoreAnnouncer {
    fn publish(&self, event: RefreshEvent) -> BoxFuture<'_, Result<(), AnnounceError>> {
        Box::pin(async move {
            let settings = self.settings();
            let Some(channel_id) = settings.channel_id.filter(|_| settings.enabled) else {
                return Ok(());
            };
            let content = self.render(&event, settings.mention_role_id);

            if let Some(message_id) = settings.last_message_id {
                match self
                    .announcer
                    .edit(channel_id, message_id, content.clone())
                    .await
                {
                    Ok(()) => return Ok(()),
                    Err(e) => log::warn!("editing announcement {} failed ({}), posting anew", message_id, e),
                }
            }

            let message_id = self.announcer.post(channel_id, content).await?;
            self.track(message_id);
            Ok(())
        })
    }
}
