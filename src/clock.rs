use chrono::{DateTime, Utc};

/// Source of the current time, so spend windows can be tested deterministically.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[cfg(test)]
pub(crate) use fixed::FixedClock;

#[cfg(test)]
mod fixed {
  use std::sync::Mutex;

  use chrono::{DateTime, Duration, TimeZone, Utc};

  use super::Clock;

  /// A clock that only moves when told to.
  #[derive(Debug)]
  pub struct FixedClock(Mutex<DateTime<Utc>>);

  impl FixedClock {
    pub fn at(year: i32, month: u32, day: u32, hour: u32) -> Self {
      Self(Mutex::new(
        Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap(),
      ))
    }

    pub fn advance(&self, duration: Duration) {
      let mut now = self.0.lock().unwrap();
      *now += duration;
    }
  }

  impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
      *self.0.lock().unwrap()
    }
  }
}
