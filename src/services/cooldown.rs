use crate::error::GachaError;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

const SWEEP_ODDS: u32 = 20;
const MAX_TRACKED_USERS: usize = 10_000;

/// Per-user crate-open cooldown.
pub struct Cooldowns {
    window: Duration,
    last_open: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl Cooldowns {
    pub fn new(window: Duration) -> Self {
        Cooldowns {
            window,
            last_open: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self, now: DateTime<Utc>) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        let mut map = self.last_open.lock().unwrap_or_else(|e| e.into_inner());
        if map.len() > MAX_TRACKED_USERS || rand::thread_rng().gen_ratio(1, SWEEP_ODDS) {
            let window = self.window;
            map.retain(|_, at| now - *at < window);
        }
        map
    }

    /// Milliseconds until `user_id` may open again; 0 when free.
    pub fn remaining_ms(&self, user_id: &str, now: DateTime<Utc>) -> i64 {
        let map = self.lock(now);
        match map.get(user_id) {
            Some(at) => (self.window - (now - *at)).num_milliseconds().max(0),
            None => 0,
        }
    }

    pub fn check(&self, user_id: &str, now: DateTime<Utc>) -> Result<(), GachaError> {
        match self.remaining_ms(user_id, now) {
            0 => Ok(()),
            remaining_ms => Err(GachaError::CooldownActive { remaining_ms }),
        }
    }

    pub fn stamp(&self, user_id: &str, now: DateTime<Utc>) {
        self.lock(now).insert(user_id.to_string(), now);
    }

    pub fn tracked(&self) -> usize {
        self.last_open
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn blocks_for_twelve_and_a_half_seconds() {
        let cooldowns = Cooldowns::new(Duration::milliseconds(12_500));
        cooldowns.check("u", at(0)).unwrap();
        cooldowns.stamp("u", at(0));

        let err = cooldowns.check("u", at(5)).unwrap_err();
        assert!(matches!(err, GachaError::CooldownActive { remaining_ms: 7_500 }));
        assert_eq!(err.to_string(), "cooldown active: 7.5 s remaining");

        assert!(cooldowns.check("u", at(12)).is_err());
        cooldowns.check("u", at(13)).unwrap();
        cooldowns.check("someone-else", at(1)).unwrap();
    }

    #[test]
    fn oversized_map_is_swept() {
        let cooldowns = Cooldowns::new(Duration::milliseconds(12_500));
        for i in 0..=MAX_TRACKED_USERS {
            cooldowns.stamp(&i.to_string(), at(0));
        }
        cooldowns.stamp("late", at(100));
        assert_eq!(cooldowns.tracked(), 1);
    }
}
