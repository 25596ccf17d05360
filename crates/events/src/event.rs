use chrono::{DateTime, Utc};

/// A domain event (a fact that already happened).
///
/// Events are immutable and versioned. The storage services log
/// `event_type()` and `version()` at debug level for every event they persist.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable dotted name (e.g. "sales.transaction.completed").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Business time of the event.
    fn occurred_at(&self) -> DateTime<Utc>;
}
