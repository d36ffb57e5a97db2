use chrono::{NaiveDateTime, Utc};
use mockall::automock;

/// Source of "now" for enrollment windows. Stored timestamps are naive UTC.
#[automock]
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().naive_utc()
    }
}
