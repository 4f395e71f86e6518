//! Clock and identity sources used to stamp versions.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::config::{IdStrategy, VersioningConfig};

/// Source of `last_modified` / `recorded_at` timestamps.
pub trait Clock: Send + Sync {
    /// Current time. Successive calls never go backwards.
    fn now(&self) -> DateTime<Utc>;
}

/// Source of owner identities.
pub trait IdGenerator: Send + Sync {
    /// Produce a fresh, globally unique identifier.
    fn next_id(&self) -> Uuid;
}

/// Wall clock with a high-water mark so readings never decrease,
/// even if the system clock is stepped backwards.
///
/// Readings are truncated to whole microseconds, the precision version
/// stores keep.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_micros: AtomicI64,
}

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now();
        let micros = wall.timestamp_micros();
        let previous = self.last_micros.fetch_max(micros, Ordering::AcqRel);
        DateTime::from_timestamp_micros(previous.max(micros)).unwrap_or(wall)
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) += by;
    }

    /// Jump to an absolute time. Earlier times are ignored.
    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        if to > *now {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Random (v4) identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV4;

impl IdGenerator for UuidV4 {
    fn next_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Time-ordered (v7) identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7;

impl IdGenerator for UuidV7 {
    fn next_id(&self) -> Uuid {
        Uuid::now_v7()
    }
}

/// Clock and id generator shared by the versioned values of an application.
#[derive(Clone)]
pub struct Environment {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

static GLOBAL: Lazy<Arc<Environment>> = Lazy::new(|| Arc::new(Environment::system()));

impl Environment {
    /// Create an environment from explicit parts.
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }

    /// System clock with random identifiers.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemClock::new()), Arc::new(UuidV4))
    }

    /// Build an environment from configuration.
    pub fn from_config(config: &VersioningConfig) -> Self {
        let ids: Arc<dyn IdGenerator> = match config.identity.strategy {
            IdStrategy::V4 => Arc::new(UuidV4),
            IdStrategy::V7 => Arc::new(UuidV7),
        };
        Self::new(Arc::new(SystemClock::new()), ids)
    }

    /// Process-wide default used by values built without an explicit environment.
    pub fn global() -> Arc<Environment> {
        Arc::clone(&GLOBAL)
    }

    /// Current time from the configured clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fresh identity from the configured generator.
    pub fn next_id(&self) -> Uuid {
        self.ids.next_id()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}
