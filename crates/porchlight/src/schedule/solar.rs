use chrono::DateTime;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::Utc;
use sunrise::Coordinates;
use sunrise::SolarDay;
use sunrise::SolarEvent;

use super::OracleError;
use super::ScheduleOracle;
use crate::config::LocationConfig;

/// Computes sunrise and sunset from coordinates.
///
/// With an elevation set, "sunrise" and "sunset" are the instants the sun
/// crosses that many degrees above the horizon instead of the horizon
/// itself. The offsets then shift the events towards solar noon (positive)
/// or away from it (negative), narrowing or widening the "daytime" window.
#[derive(Debug, Clone)]
pub struct SolarOracle {
    latitude: f64,
    longitude: f64,
    elevation_degrees: Option<f64>,
    sunrise_offset: Duration,
    sunset_offset: Duration,
}

impl SolarOracle {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, OracleError> {
        Coordinates::new(latitude, longitude).ok_or_else(|| {
            OracleError::Unavailable(format!("invalid coordinates {latitude}, {longitude}"))
        })?;
        Ok(Self {
            latitude,
            longitude,
            elevation_degrees: None,
            sunrise_offset: Duration::zero(),
            sunset_offset: Duration::zero(),
        })
    }

    pub fn from_config(location: &LocationConfig) -> Result<Self, OracleError> {
        Ok(Self::new(location.latitude, location.longitude)?
            .with_elevation(location.elevation_degrees)
            .with_offsets(
                Duration::minutes(location.sunrise_offset_minutes),
                Duration::minutes(location.sunset_offset_minutes),
            ))
    }

    pub fn with_elevation(mut self, degrees: f64) -> Self {
        self.elevation_degrees = Some(degrees);
        self
    }

    pub fn with_offsets(mut self, sunrise_offset: Duration, sunset_offset: Duration) -> Self {
        self.sunrise_offset = sunrise_offset;
        self.sunset_offset = sunset_offset;
        self
    }

    fn event(&self, date: NaiveDate, event: SolarEvent) -> Result<DateTime<Utc>, OracleError> {
        let coord = Coordinates::new(self.latitude, self.longitude).ok_or_else(|| {
            OracleError::Unavailable(format!(
                "invalid coordinates {}, {}",
                self.latitude, self.longitude
            ))
        })?;
        // sunrise reports the epoch when the sun never reaches the
        // threshold, e.g. polar day or night.
        let time = SolarDay::new(coord, date).event_time(event);
        if time == DateTime::UNIX_EPOCH {
            return Err(OracleError::NoEvent(date));
        }
        Ok(time)
    }

    fn crossing(&self, morning: bool) -> SolarEvent {
        match self.elevation_degrees {
            // The crate measures the angle below the horizon.
            Some(degrees) => SolarEvent::Elevation {
                elevation: -degrees.to_radians(),
                morning,
            },
            None if morning => SolarEvent::Sunrise,
            None => SolarEvent::Sunset,
        }
    }
}

impl ScheduleOracle for SolarOracle {
    fn sunrise(&self, date: NaiveDate) -> Result<DateTime<Utc>, OracleError> {
        Ok(self.event(date, self.crossing(true))? + self.sunrise_offset)
    }

    fn sunset(&self, date: NaiveDate) -> Result<DateTime<Utc>, OracleError> {
        Ok(self.event(date, self.crossing(false))? - self.sunset_offset)
    }
}
