//! Per-plugin "last identified" bookkeeping for analytics hooks.
//!
//! A plugin is identified at most once per interval. The timestamp of the
//! last identification is kept in an injected [`KeyValueStore`] under
//! `ledgerline.identified.<plugin>` as RFC 3339, and "now" comes from an
//! injected [`Clock`] so tests can move time explicitly.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

const KEY_PREFIX: &str = "ledgerline.identified.";

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// String storage that outlives one session (cookies, a settings file).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
}

#[derive(Debug, Default)]
pub struct MemoryStore(Mutex<HashMap<String, String>>);

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }
}

pub struct IdentifyTracker<C, S> {
    clock: C,
    store: S,
    interval: Duration,
}

impl<C: Clock, S: KeyValueStore> IdentifyTracker<C, S> {
    #[must_use]
    pub fn new(clock: C, store: S) -> Self {
        Self {
            clock,
            store,
            interval: Duration::hours(24),
        }
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn key(plugin: &str) -> String {
        format!("{KEY_PREFIX}{plugin}")
    }

    /// When `plugin` was last identified. Unparseable entries count as never.
    #[must_use]
    pub fn last_identified(&self, plugin: &str) -> Option<DateTime<Utc>> {
        let raw = self.store.get(&Self::key(plugin))?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(err) => {
                warn!(plugin, raw, "ignoring unparseable identify timestamp: {err}");
                None
            }
        }
    }

    #[must_use]
    pub fn should_identify(&self, plugin: &str) -> bool {
        self.last_identified(plugin)
            .is_none_or(|at| self.clock.now() - at >= self.interval)
    }

    pub fn mark_identified(&self, plugin: &str) {
        let now = self.clock.now();
        debug!(plugin, %now, "plugin identified");
        self.store.set(&Self::key(plugin), now.to_rfc3339());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        fn at(at: DateTime<Utc>) -> Self {
            Self(Arc::new(Mutex::new(at)))
        }

        fn advance(&self, by: Duration) {
            let mut now = self.0.lock().expect("clock lock");
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().expect("clock lock")
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).single().expect("valid time")
    }

    #[test]
    fn identifies_once_per_interval() {
        let clock = ManualClock::at(start());
        let tracker = IdentifyTracker::new(clock.clone(), MemoryStore::default());

        assert!(tracker.should_identify("intercom"));
        tracker.mark_identified("intercom");
        assert!(!tracker.should_identify("intercom"));
        assert!(tracker.should_identify("segment"), "plugins are tracked separately");

        clock.advance(Duration::hours(23));
        assert!(!tracker.should_identify("intercom"));
        clock.advance(Duration::hours(1));
        assert!(tracker.should_identify("intercom"));
    }

    #[test]
    fn stores_rfc3339_under_prefixed_key() {
        let store = MemoryStore::default();
        let tracker = IdentifyTracker::new(ManualClock::at(start()), store);
        tracker.mark_identified("intercom");
        assert_eq!(
            tracker.store.get("ledgerline.identified.intercom").as_deref(),
            Some("2024-03-01T09:00:00+00:00")
        );
    }

    #[test]
    fn garbage_timestamp_counts_as_never() {
        let store = MemoryStore::default();
        store.set("ledgerline.identified.intercom", "yesterday".into());
        let tracker = IdentifyTracker::new(ManualClock::at(start()), store)
            .with_interval(Duration::minutes(5));
        assert_eq!(tracker.last_identified("intercom"), None);
        assert!(tracker.should_identify("intercom"));
    }
}
