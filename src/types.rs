//! Core types for the log engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unique identifier for a log record.
///
/// Assigned by the store on append; strictly increasing, never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct RecordId(pub u64);

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timestamp(duration.as_micros() as i64)
    }

    /// The smallest representable instant after this one.
    pub fn next(self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }

    /// This instant moved back by `window`, saturating at the epoch.
    pub fn minus(self, window: Duration) -> Self {
        Timestamp(self.0.saturating_sub(window.as_micros() as i64).max(0))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Severity of a log record, as a bitmask.
///
/// Trace is the zero value: it carries no bits, so it can only be selected
/// by an unset [`LevelFilter`]. The named levels combine with `|` when a
/// record spans severities.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Level(pub u32);

impl Level {
    pub const TRACE: Level = Level(0);
    pub const INFO: Level = Level(1);
    pub const WARNING: Level = Level(2);
    pub const ERROR: Level = Level(4);
    pub const CRITICAL: Level = Level(8);
}

impl BitOr for Level {
    type Output = Level;

    fn bitor(self, rhs: Level) -> Level {
        Level(self.0 | rhs.0)
    }
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "Trace");
        }
        let names = [
            (Level::INFO, "Info"),
            (Level::WARNING, "Warning"),
            (Level::ERROR, "Error"),
            (Level::CRITICAL, "Critical"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.0 & bit.0 != 0 {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Severity filter: an integer whose set bits each select one level.
///
/// A record passes when `record.level & filter != 0`, or when the filter is
/// unset (zero), which selects every record including Trace.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LevelFilter(pub u32);

impl LevelFilter {
    /// The unset filter: every record passes.
    pub const ALL: LevelFilter = LevelFilter(0);

    /// Whether a record at `level` passes this filter.
    pub fn passes(self, level: Level) -> bool {
        self.0 == 0 || (level.0 & self.0) != 0
    }
}

impl From<Level> for LevelFilter {
    fn from(level: Level) -> Self {
        LevelFilter(level.0)
    }
}

impl BitOr<Level> for LevelFilter {
    type Output = LevelFilter;

    fn bitor(self, rhs: Level) -> LevelFilter {
        LevelFilter(self.0 | rhs.0)
    }
}

impl fmt::Debug for LevelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "LevelFilter(all)")
        } else {
            write!(f, "LevelFilter({:?})", Level(self.0))
        }
    }
}

/// Customer selection: an exact id, or the wildcard that disables filtering.
///
/// The wildcard token is the literal `"all"`, case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CustomerFilter {
    All,
    Exact(String),
}

impl CustomerFilter {
    /// Parse a filter token. `"all"` (any casing) is the wildcard.
    pub fn parse(token: &str) -> Self {
        if token.eq_ignore_ascii_case("all") {
            CustomerFilter::All
        } else {
            CustomerFilter::Exact(token.to_string())
        }
    }

    /// Whether a record with the given customer id passes this filter.
    ///
    /// Records without a customer id never match an `Exact` filter.
    pub fn matches(&self, customer_id: Option<&str>) -> bool {
        match self {
            CustomerFilter::All => true,
            CustomerFilter::Exact(wanted) => customer_id == Some(wanted.as_str()),
        }
    }
}

/// A single stored log record.
///
/// Immutable once persisted; destroyed only by retention or bulk delete.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unique identifier (assigned by the store).
    pub id: RecordId,

    /// Partition key for filtering.
    pub customer_id: Option<String>,

    /// When the record was sent. Client-supplied timestamps may arrive
    /// out of order; `sent_at` is monotonic only within one sender.
    pub sent_at: Timestamp,

    /// Free-form source tag.
    pub module: Option<String>,

    /// Severity bitmask.
    pub level: Level,

    /// Free-form payload.
    pub message: Option<String>,
}

/// An incoming record before identity and timestamp are assigned.
///
/// All fields are optional by design; ingestion never rejects a draft for
/// missing fields.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RecordDraft {
    pub customer_id: Option<String>,

    /// Send time; defaults to ingestion time when absent.
    #[serde(default)]
    pub sent_at: Option<Timestamp>,

    pub module: Option<String>,

    #[serde(default)]
    pub level: Level,

    pub message: Option<String>,
}

impl RecordDraft {
    /// Create an empty draft at the given level.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_sent_at(mut self, sent_at: Timestamp) -> Self {
        self.sent_at = Some(sent_at);
        self
    }
}

/// A draft with its timestamp resolved, ready for appending.
#[derive(Clone, Debug)]
pub struct RecordInput {
    pub customer_id: Option<String>,
    pub sent_at: Timestamp,
    pub module: Option<String>,
    pub level: Level,
    pub message: Option<String>,
}

impl RecordInput {
    /// Resolve a draft, defaulting `sent_at` to `default_sent_at`.
    pub fn from_draft(draft: RecordDraft, default_sent_at: Timestamp) -> Self {
        Self {
            customer_id: draft.customer_id,
            sent_at: draft.sent_at.unwrap_or(default_sent_at),
            module: draft.module,
            level: draft.level,
            message: draft.message,
        }
    }
}
