use chrono::NaiveDateTime;

/// Source of "now" for open-ended windows, in local wall-clock time.
pub trait Clock: Send + Sync {
    fn now_local(&self) -> NaiveDateTime;
}

/// Host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_local(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}

/// Clock pinned to one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now_local(&self) -> NaiveDateTime {
        self.0
    }
}
