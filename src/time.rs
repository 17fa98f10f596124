// Wall-clock access for report timestamps

pub trait Clock {
    fn unix_millis() -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn unix_millis() -> u64 {
        #[cfg(miri)]
        {
            0
        }
        #[cfg(not(miri))]
        {
            chrono::Utc::now().timestamp_millis().max(0) as u64
        }
    }
}

/// Milliseconds since the Unix epoch, the unit of every report timestamp.
pub fn now_unix_millis() -> u64 {
    SystemClock::unix_millis()
}
