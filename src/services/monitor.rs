//! Background watcher that notices store period changes.

use crate::config::store::StorePolicy;
use crate::error::PersistError;
use crate::models::store::RefreshEvent;
use crate::services::store::{generate_inventory, next_refresh, period};
use crate::services::upstream::BoxFuture;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

const TICK_INTERVAL: Duration = Duration::from_secs(10);
const ERROR_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("announcement transport failed: {0}")]
    Transport(String),
    #[error("announcement rejected with status {0}")]
    Status(u16),
    #[error("announcement response invalid: {0}")]
    Decode(String),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Receives refresh events.
pub trait RefreshSink: Send + Sync {
    fn publish(&self, event: RefreshEvent) -> BoxFuture<'_, Result<(), AnnounceError>>;
}

pub struct StoreMonitor {
    policy: StorePolicy,
    last_period: Mutex<Option<i64>>,
    sink: Arc<dyn RefreshSink>,
}

impl StoreMonitor {
    pub fn new(policy: StorePolicy, sink: Arc<dyn RefreshSink>) -> Self {
        StoreMonitor {
            policy,
            last_period: Mutex::new(None),
            sink,
        }
    }

    pub fn last_period(&self) -> Option<i64> {
        *self.last_period.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn event_for(&self, period: i64) -> RefreshEvent {
        RefreshEvent {
            period,
            inventory: generate_inventory(period, &self.policy),
            next_refresh: next_refresh(period, self.policy.refresh_interval_secs),
        }
    }

    /// Samples the period once. The first sample only records it; a later
    /// period emits exactly one event. The period is recorded before the
    /// sink runs, so a failing sink does not cause a second emission.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Option<RefreshEvent>, AnnounceError> {
        let current = period(now, self.policy.refresh_interval_secs);
        {
            let mut last = self.last_period.lock().unwrap_or_else(|e| e.into_inner());
            match *last {
                None => {
                    *last = Some(current);
                    log::info!("store monitor starting at period {}", current);
                    return Ok(None);
                }
                Some(seen) if current > seen => *last = Some(current),
                Some(_) => return Ok(None),
            }
        }

        let event = self.event_for(current);
        log::info!("store refreshed to period {}", current);
        self.sink.publish(event.clone()).await?;
        Ok(Some(event))
    }

    /// Moves the monitor's notion of the last period forward by one and
    /// announces that period. The clock is not touched.
    pub async fn force_refresh(&self, now: DateTime<Utc>) -> Result<RefreshEvent, AnnounceError> {
        let forced = {
            let mut last = self.last_period.lock().unwrap_or_else(|e| e.into_inner());
            let base = last.unwrap_or_else(|| period(now, self.policy.refresh_interval_secs));
            *last = Some(base + 1);
            base + 1
        };
        let event = self.event_for(forced);
        log::info!("store refresh forced to period {}", forced);
        self.sink.publish(event.clone()).await?;
        Ok(event)
    }

    pub async fn run(self: Arc<Self>) {
        loop {
            match self.tick(Utc::now()).await {
                Ok(_) => tokio::time::sleep(TICK_INTERVAL).await,
                Err(e) => {
                    log::error!("store monitor tick failed: {}", e);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<RefreshEvent>>,
    }

    impl RecordingSink {
        pub fn periods(&self) -> Vec<i64> {
            self.events.lock().unwrap().iter().map(|e| e.period).collect()
        }
    }

    impl RefreshSink for RecordingSink {
        fn publish(&self, event: RefreshEvent) -> BoxFuture<'_, Result<(), AnnounceError>> {
            self.events.lock().unwrap().push(event);
            Box::pin(async { Ok(()) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn monitor() -> (StoreMonitor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (StoreMonitor::new(StorePolicy::standard(600), sink.clone()), sink)
    }

    #[tokio::test]
    async fn first_tick_is_silent_and_transition_fires_once() {
        let (monitor, sink) = monitor();
        assert!(monitor.tick(at(600_000)).await.unwrap().is_none());
        assert!(monitor.tick(at(600_599)).await.unwrap().is_none());

        let event = monitor.tick(at(600_600)).await.unwrap().unwrap();
        assert_eq!(event.period, 1001);
        assert_eq!(event.next_refresh, 601_200);
        assert_eq!(event.inventory, generate_inventory(1001, &StorePolicy::standard(600)));

        assert!(monitor.tick(at(600_610)).await.unwrap().is_none());
        assert_eq!(sink.periods(), vec![1001]);
    }

    #[tokio::test]
    async fn force_refresh_shifts_recorded_period() {
        let (monitor, sink) = monitor();
        monitor.tick(at(600_000)).await.unwrap();

        let forced = monitor.force_refresh(at(600_010)).await.unwrap();
        assert_eq!(forced.period, 1001);
        assert_eq!(monitor.last_period(), Some(1001));

        // the real transition into 1001 was already announced
        assert!(monitor.tick(at(600_600)).await.unwrap().is_none());
        assert!(monitor.tick(at(601_200)).await.unwrap().is_some());
        assert_eq!(sink.periods(), vec![1001, 1002]);
    }

    struct FailingSink;

    impl RefreshSink for FailingSink {
        fn publish(&self, _event: RefreshEvent) -> BoxFuture<'_, Result<(), AnnounceError>> {
            Box::pin(async { Err(AnnounceError::Status(500)) })
        }
    }

    #[tokio::test]
    async fn failing_sink_does_not_replay_the_period() {
        let monitor = StoreMonitor::new(StorePolicy::standard(600), Arc::new(FailingSink));
        monitor.tick(at(0)).await.unwrap();
        assert!(monitor.tick(at(600)).await.is_err());
        assert!(monitor.tick(at(601)).await.unwrap().is_none());
    }
}
