// Clock Port

use chrono::{TimeZone, Utc};

/// Wall-clock access behind a trait so the store, queue, scheduler, and
/// notifier can all run against a scripted clock in tests.
pub trait TimeProvider: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// The same instant as ISO-8601, for outbound event envelopes.
    fn now_iso(&self) -> String {
        Utc.timestamp_millis_opt(self.now_millis())
            .single()
            .unwrap_or_default()
            .to_rfc3339()
    }
}

/// System clock used outside tests.
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedTime(i64);
    impl TimeProvider for FixedTime {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    #[test]
    fn iso_rendering_follows_the_clock() {
        assert!(FixedTime(0).now_iso().starts_with("1970-01-01T00:00:00"));
        assert!(FixedTime(1_700_000_000_000).now_iso().starts_with("2023-11-14T"));
    }
}
