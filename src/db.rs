use crate::config::store::PURCHASE_HISTORY_WINDOW;
use crate::config::STARTING_COINS;
use crate::error::{AppError, GachaError, PersistError};
use crate::models::user::UserState;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub const USERS_FILE: &str = "users.json";
pub const CACHE_FILE: &str = "leaderboard_cache.json";
pub const STORE_CONFIG_FILE: &str = "store_config.json";
pub const EVENTS_FILE: &str = "events.json";

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Writes `value` as JSON through a temp file, keeping the previous file as
/// `.bak`.
pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistError> {
    let display = path.display().to_string();
    let io_err = |source| PersistError::Io {
        path: display.clone(),
        source,
    };

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
    }

    let json = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Json {
        path: display.clone(),
        source,
    })?;

    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, &json).map_err(io_err)?;
    if path.exists() {
        let bak = sibling(path, ".bak");
        if let Err(e) = fs::copy(path, &bak) {
            log::warn!("could not back up {} to {}: {}", display, bak.display(), e);
        }
    }
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

/// Reads a JSON file, falling back to its `.bak` copy. Missing files yield
/// `None`.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PersistError> {
    let bak = sibling(path, ".bak");
    let source = if path.exists() {
        path.to_path_buf()
    } else if bak.exists() {
        log::warn!("{} missing, loading backup", path.display());
        bak
    } else {
        return Ok(None);
    };

    let display = source.display().to_string();
    let data = fs::read(&source).map_err(|source| PersistError::Io {
        path: display.clone(),
        source,
    })?;
    let value = serde_json::from_slice(&data).map_err(|source| PersistError::Json {
        path: display,
        source,
    })?;
    Ok(Some(value))
}

/// Process-wide user store, flushed to disk after every committed mutation.
pub struct Db {
    users_path: Option<PathBuf>,
    users: Mutex<HashMap<String, UserState>>,
}

impl Db {
    pub fn open(data_dir: &Path) -> Result<Self, PersistError> {
        let users_path = data_dir.join(USERS_FILE);
        let mut users: HashMap<String, UserState> = load_json(&users_path)?.unwrap_or_default();
        for user in users.values_mut() {
            user.normalize_favorites();
        }
        log::info!("loaded {} users from {}", users.len(), users_path.display());
        Ok(Db {
            users_path: Some(users_path),
            users: Mutex::new(users),
        })
    }

    pub fn open_in_memory() -> Self {
        Db {
            users_path: None,
            users: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserState>> {
        // A poisoned map is still the authoritative state.
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, users: &HashMap<String, UserState>) {
        if let Some(path) = &self.users_path {
            if let Err(e) = save_json(path, users) {
                log::error!("failed to persist users, keeping in-memory state: {}", e);
            }
        }
    }

    /// Runs `f` against the user's current state. Unknown users read as a
    /// fresh account.
    pub fn with_user<F, T>(&self, user_id: &str, f: F) -> T
    where
        F: FnOnce(&UserState) -> T,
    {
        let users = self.lock();
        match users.get(user_id) {
            Some(user) => f(user),
            None => f(&UserState::with_coins(STARTING_COINS)),
        }
    }

    /// Runs `f` on a copy of the user's state and commits it only when `f`
    /// succeeds, so a failed operation never leaves a partial write.
    pub fn update_user<F, T>(&self, user_id: &str, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut UserState) -> Result<T, GachaError>,
    {
        let mut users = self.lock();
        let mut draft = users
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserState::with_coins(STARTING_COINS));
        let out = f(&mut draft)?;
        draft.prune_purchase_history(PURCHASE_HISTORY_WINDOW);
        users.insert(user_id.to_string(), draft);
        self.flush(&users);
        Ok(out)
    }

    /// Two-user variant of [`Db::update_user`]; both states commit or neither.
    pub fn update_pair<F, T>(&self, first: &str, second: &str, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut UserState, &mut UserState) -> Result<T, GachaError>,
    {
        if first == second {
            return Err(GachaError::InvalidInput("cannot pair a user with themselves".into()).into());
        }
        let mut users = self.lock();
        let fresh = || UserState::with_coins(STARTING_COINS);
        let mut a = users.get(first).cloned().unwrap_or_else(fresh);
        let mut b = users.get(second).cloned().unwrap_or_else(fresh);
        let out = f(&mut a, &mut b)?;
        users.insert(first.to_string(), a);
        users.insert(second.to_string(), b);
        self.flush(&users);
        Ok(out)
    }

    pub fn user_count(&self) -> usize {
        self.lock().len()
    }
}
