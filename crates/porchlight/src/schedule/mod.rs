//! Sunrise/sunset schedule.
//!
//! The controller only needs two questions answered: when does the sun rise
//! and set on a given date, and what time is it now. `ScheduleOracle` and
//! `Clock` are the seams; `Schedule` combines them with the local timezone to
//! classify the current instant into a `SunPhase`.

mod solar;

use std::sync::Arc;

use chrono::DateTime;
use chrono::Days;
use chrono::NaiveDate;
use chrono::Utc;
use chrono_tz::Tz;
use serde::Serialize;
use strum::Display;

pub use solar::SolarOracle;

use crate::controller::LightPreset;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("sunrise {sunrise} is not before sunset {sunset} on {date}")]
    Inconsistent {
        date: NaiveDate,
        sunrise: DateTime<Utc>,
        sunset: DateTime<Utc>,
    },

    #[error("the sun does not cross the horizon threshold on {0}")]
    NoEvent(NaiveDate),

    #[error("next phase change {boundary} is not after {now}")]
    BoundaryPassed {
        now: DateTime<Utc>,
        boundary: DateTime<Utc>,
    },

    #[error("schedule oracle unavailable: {0}")]
    Unavailable(String),
}

/// Source of sunrise and sunset instants.
pub trait ScheduleOracle: Send + Sync {
    fn sunrise(&self, date: NaiveDate) -> Result<DateTime<Utc>, OracleError>;

    fn sunset(&self, date: NaiveDate) -> Result<DateTime<Utc>, OracleError>;
}

/// Source of the current wall-clock time.
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

/// Position of an instant relative to one day's sunrise and sunset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum SunPhase {
    PreSunrise,
    Daytime,
    PostSunset,
}

impl SunPhase {
    pub fn classify(now: DateTime<Utc>, times: &SunTimes) -> Self {
        if now < times.sunrise {
            SunPhase::PreSunrise
        } else if now < times.sunset {
            SunPhase::Daytime
        } else {
            SunPhase::PostSunset
        }
    }

    pub fn is_daytime(self) -> bool {
        self == SunPhase::Daytime
    }

    /// Light state used when there is no recent motion.
    pub fn default_preset(self) -> LightPreset {
        match self {
            SunPhase::Daytime => LightPreset::OFF,
            SunPhase::PreSunrise | SunPhase::PostSunset => LightPreset::NIGHT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// One consistent reading of the clock and the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunObservation {
    pub now: DateTime<Utc>,
    pub date: NaiveDate,
    pub times: SunTimes,
    pub phase: SunPhase,
}

#[derive(Clone)]
pub struct Schedule {
    oracle: Arc<dyn ScheduleOracle>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl Schedule {
    pub fn new(oracle: Arc<dyn ScheduleOracle>, clock: Arc<dyn Clock>, timezone: Tz) -> Self {
        Self {
            oracle,
            clock,
            timezone,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Calendar date of `now` in the configured timezone.
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn sun_times(&self, date: NaiveDate) -> Result<SunTimes, OracleError> {
        let sunrise = self.oracle.sunrise(date)?;
        let sunset = self.oracle.sunset(date)?;
        if sunrise >= sunset {
            return Err(OracleError::Inconsistent {
                date,
                sunrise,
                sunset,
            });
        }
        Ok(SunTimes { sunrise, sunset })
    }

    pub fn observe(&self) -> Result<SunObservation, OracleError> {
        let now = self.clock.now();
        let date = self.local_date(now);
        let times = self.sun_times(date)?;
        Ok(SunObservation {
            now,
            date,
            times,
            phase: SunPhase::classify(now, &times),
        })
    }

    /// Whether it is daytime right now. Always asks the oracle.
    pub fn is_daytime(&self) -> Result<bool, OracleError> {
        Ok(self.observe()?.phase.is_daytime())
    }

    /// Instant of the phase change following `obs`.
    ///
    /// After sunset this is tomorrow's sunrise, which goes through the same
    /// consistency check as today's times. The result is always after
    /// `obs.now`.
    pub fn next_boundary(&self, obs: &SunObservation) -> Result<DateTime<Utc>, OracleError> {
        let boundary = match obs.phase {
            SunPhase::PreSunrise => obs.times.sunrise,
            SunPhase::Daytime => obs.times.sunset,
            SunPhase::PostSunset => {
                let tomorrow = obs
                    .date
                    .checked_add_days(Days::new(1))
                    .ok_or_else(|| OracleError::Unavailable(format!("no date after {}", obs.date)))?;
                self.sun_times(tomorrow)?.sunrise
            }
        };
        if boundary <= obs.now {
            return Err(OracleError::BoundaryPassed {
                now: obs.now,
                boundary,
            });
        }
        Ok(boundary)
    }
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schedule")
            .field("timezone", &self.timezone)
            .field("oracle", &"<oracle>")
            .finish()
    }
}

/// Oracle with fixed sunrise/sunset times of day (UTC) for tests.
#[cfg(test)]
#[derive(Debug)]
pub struct FixedOracle {
    pub sunrise: chrono::NaiveTime,
    pub sunset: chrono::NaiveTime,
    pub unavailable: std::sync::atomic::AtomicBool,
    no_events_from: std::sync::Mutex<Option<NaiveDate>>,
}

#[cfg(test)]
impl FixedOracle {
    /// Sunrise 06:00, sunset 18:00.
    pub fn new() -> Self {
        Self {
            sunrise: chrono::NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            sunset: chrono::NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            unavailable: std::sync::atomic::AtomicBool::new(false),
            no_events_from: std::sync::Mutex::new(None),
        }
    }

    /// From `date` on, report the epoch for every event, the way a solar
    /// calculation does when the sun never crosses the threshold.
    pub fn set_no_events_from(&self, date: NaiveDate) {
        *self.no_events_from.lock().unwrap() = Some(date);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable
            .store(unavailable, std::sync::atomic::Ordering::SeqCst);
    }

    fn event(&self, date: NaiveDate, time: chrono::NaiveTime) -> Result<DateTime<Utc>, OracleError> {
        if self.unavailable.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(OracleError::Unavailable("test oracle offline".to_string()));
        }
        if self.no_events_from.lock().unwrap().is_some_and(|from| date >= from) {
            return Ok(DateTime::UNIX_EPOCH);
        }
        Ok(date.and_time(time).and_utc())
    }
}

#[cfg(test)]
impl ScheduleOracle for FixedOracle {
    fn sunrise(&self, date: NaiveDate) -> Result<DateTime<Utc>, OracleError> {
        self.event(date, self.sunrise)
    }

    fn sunset(&self, date: NaiveDate) -> Result<DateTime<Utc>, OracleError> {
        self.event(date, self.sunset)
    }
}

/// Wall clock that follows tokio's (possibly paused) clock from a fixed start.
#[cfg(test)]
#[derive(Debug)]
pub struct PausedClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

#[cfg(test)]
impl PausedClock {
    pub fn starting_at(base: DateTime<Utc>) -> Self {
        Self {
            base,
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(test)]
impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = tokio::time::Instant::now() - self.origin;
        self.base + chrono::Duration::from_std(elapsed).unwrap()
    }
}

#[cfg(test)]
pub fn utc(date: &str, time: &str) -> DateTime<Utc> {
    let naive = chrono::NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S")
        .unwrap();
    naive.and_utc()
}
