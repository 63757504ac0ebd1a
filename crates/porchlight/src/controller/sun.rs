//! Sun-phase loop.
//!
//! Recomputes day/night, pushes the matching default state into the
//! controller and sleeps until the next sunrise or sunset.

use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tracing::info;
use tracing::warn;

use super::dispatcher::Controller;
use crate::schedule::OracleError;
use crate::schedule::SunObservation;
use crate::schedule::SunPhase;

/// Render a duration as `[N days ]HH:MM:SS`.
pub fn format_duration(duration: Duration) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    let mut seconds = duration.as_secs();
    let mut out = String::new();

    if seconds > DAY {
        let days = seconds / DAY;
        out.push_str(&format!("{days} days "));
        seconds -= days * DAY;
    }

    let hours = seconds / HOUR;
    seconds -= hours * HOUR;
    let minutes = seconds / MINUTE;
    seconds -= minutes * MINUTE;

    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    out
}

/// Exponential backoff for schedule lookups.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: None,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.initial,
            Some(current) => current.saturating_mul(2).min(self.max),
        };
        self.current = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

/// What one iteration decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SunPlan {
    pub observation: SunObservation,
    pub wake_at: DateTime<Utc>,
}

impl SunPlan {
    pub fn phase(&self) -> SunPhase {
        self.observation.phase
    }

    pub fn sleep(&self) -> Duration {
        (self.wake_at - self.observation.now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

pub struct SunPhaseLoop {
    controller: Controller,
    backoff: Backoff,
}

impl SunPhaseLoop {
    pub fn new(controller: Controller, retry_initial: Duration, retry_max: Duration) -> Self {
        Self {
            controller,
            backoff: Backoff::new(retry_initial, retry_max),
        }
    }

    /// Run forever.
    pub async fn run(mut self) {
        info!("Sun phase loop starting");
        loop {
            let delay = self.step().await;
            tokio::time::sleep(delay).await;
        }
    }

    /// Run one iteration and return how long to sleep before the next.
    ///
    /// If the schedule is unavailable the default state is left untouched
    /// and the returned delay comes from the backoff.
    pub async fn step(&mut self) -> Duration {
        match self.plan() {
            Ok(plan) => {
                self.backoff.reset();
                self.log_plan(&plan);
                self.controller.set_sun_phase(plan.phase()).await;
                plan.sleep()
            }
            Err(e) => {
                let delay = self.backoff.next_delay();
                warn!(
                    "Schedule unavailable ({}), keeping current default state; retrying in {}",
                    e,
                    format_duration(delay)
                );
                delay
            }
        }
    }

    fn plan(&self) -> Result<SunPlan, OracleError> {
        let schedule = self.controller.schedule();
        let observation = schedule.observe()?;
        let wake_at = schedule.next_boundary(&observation)?;
        Ok(SunPlan {
            observation,
            wake_at,
        })
    }

    fn log_plan(&self, plan: &SunPlan) {
        let tz = self.controller.schedule().timezone();
        let local = |t: DateTime<Utc>| t.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string();
        let obs = &plan.observation;

        info!(
            "Thinking about the sun: now {}, sunrise {}, sunset {}",
            local(obs.now),
            local(obs.times.sunrise),
            local(obs.times.sunset)
        );

        let (situation, action, until) = match plan.phase() {
            SunPhase::PreSunrise => ("before sunrise", "turning on night light", "sunrise"),
            SunPhase::Daytime => ("between sunrise and sunset", "turning off light", "sunset"),
            SunPhase::PostSunset => ("after sunset", "turning on night light", "sunrise tomorrow"),
        };
        info!(
            "It's {}, {}; sleeping until {} ({}, in {})",
            situation,
            action,
            until,
            local(plan.wake_at),
            format_duration(plan.sleep())
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::alert::LogAlertSink;
    use crate::controller::LightPreset;
    use crate::controller::PresetName;
    use crate::gateway::DeviceBinding;
    use crate::gateway::LightId;
    use crate::gateway::RecordingGateway;
    use crate::gateway::SensorId;
    use crate::schedule::FixedOracle;
    use crate::schedule::PausedClock;
    use crate::schedule::Schedule;
    use crate::schedule::utc;

    const RETRY: Duration = Duration::from_secs(30);
    const RETRY_MAX: Duration = Duration::from_secs(300);

    struct Harness {
        sun: SunPhaseLoop,
        controller: Controller,
        gateway: Arc<RecordingGateway>,
        oracle: Arc<FixedOracle>,
    }

    fn harness(time: &str) -> Harness {
        let oracle = Arc::new(FixedOracle::new());
        let clock = Arc::new(PausedClock::starting_at(utc("2024-03-20", time)));
        let gateway = Arc::new(RecordingGateway::default());
        let controller = Controller::new(
            DeviceBinding {
                motion_device: "Motion".to_string(),
                motion_sensor: SensorId("motion".to_string()),
                light_level_sensor: SensorId("illuminance".to_string()),
                lights: vec![LightId::from("Porch")],
            },
            Schedule::new(oracle.clone(), clock, chrono_tz::UTC),
            gateway.clone(),
            Arc::new(LogAlertSink),
            Duration::from_secs(300),
        );
        Harness {
            sun: SunPhaseLoop::new(controller.clone(), RETRY, RETRY_MAX),
            controller,
            gateway,
            oracle,
        }
    }

    #[test]
    fn test_format_duration() {
        insta::assert_snapshot!(format_duration(Duration::from_secs(300)), @"00:05:00");
        insta::assert_snapshot!(format_duration(Duration::from_secs(7 * 3600 + 12 * 60 + 3)), @"07:12:03");
        insta::assert_snapshot!(format_duration(Duration::from_secs(2 * 86400 + 3661)), @"2 days 01:01:01");
    }

    #[test]
    fn test_format_duration_exactly_one_day() {
        assert_eq!(format_duration(Duration::from_secs(86400)), "24:00:00");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(RETRY, RETRY_MAX);
        let delays: Vec<u64> = (0..6).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 120, 240, 300, 300]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), RETRY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pre_sunrise_sets_night() {
        let mut h = harness("04:00:00");
        let sleep = h.sun.step().await;

        assert_eq!(sleep, Duration::from_secs(2 * 3600));
        assert_eq!(h.gateway.last(), Some(LightPreset::NIGHT));
        let snapshot = h.controller.snapshot().await;
        assert_eq!(snapshot.default_state, PresetName::Night);
        assert_eq!(snapshot.sun_phase, Some(SunPhase::PreSunrise));
    }

    #[tokio::test(start_paused = true)]
    async fn test_daytime_sets_off() {
        let mut h = harness("12:00:00");
        let sleep = h.sun.step().await;

        assert_eq!(sleep, Duration::from_secs(6 * 3600));
        assert_eq!(h.gateway.last(), Some(LightPreset::OFF));
    }

    #[tokio::test(start_paused = true)]
    async fn test_post_sunset_sleeps_until_tomorrow() {
        let mut h = harness("20:00:00");
        let sleep = h.sun.step().await;

        assert_eq!(sleep, Duration::from_secs(10 * 3600));
        assert_eq!(h.gateway.last(), Some(LightPreset::NIGHT));
        assert_eq!(
            h.controller.snapshot().await.sun_phase,
            Some(SunPhase::PostSunset)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_oracle_failure_keeps_default_and_backs_off() {
        let mut h = harness("20:00:00");
        h.sun.step().await;
        let calls = h.gateway.calls().len();

        h.oracle.set_unavailable(true);
        assert_eq!(h.sun.step().await, Duration::from_secs(30));
        assert_eq!(h.sun.step().await, Duration::from_secs(60));

        assert_eq!(h.gateway.calls().len(), calls);
        assert_eq!(
            h.controller.snapshot().await.default_state,
            PresetName::Night
        );

        h.oracle.set_unavailable(false);
        h.sun.step().await;
        h.oracle.set_unavailable(true);
        assert_eq!(h.sun.step().await, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_sunrise_tomorrow_backs_off() {
        let mut h = harness("20:00:00");
        h.sun.step().await;
        let calls = h.gateway.calls().len();

        // Tonight is known but tomorrow the sun never rises.
        h.oracle
            .set_no_events_from(chrono::NaiveDate::from_ymd_opt(2024, 3, 21).unwrap());
        assert_eq!(h.sun.step().await, RETRY);
        assert_eq!(h.sun.step().await, RETRY * 2);

        assert_eq!(h.gateway.calls().len(), calls);
        assert_eq!(
            h.controller.snapshot().await.default_state,
            PresetName::Night
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_does_not_spin_without_sunrise() {
        let h = harness("20:00:00");
        h.oracle
            .set_no_events_from(chrono::NaiveDate::from_ymd_opt(2024, 3, 21).unwrap());
        let gateway = h.gateway.clone();
        let task = tokio::spawn(h.sun.run());

        // Backoff 30, 60, 120, 240, then 300s: a handful of attempts an hour.
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert!(gateway.calls().is_empty());
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_follows_phase_boundaries() {
        let h = harness("17:00:00");
        let controller = h.controller.clone();
        let task = tokio::spawn(h.sun.run());

        tokio::time::sleep(Duration::from_secs(1800)).await;
        assert_eq!(
            controller.snapshot().await.default_state,
            PresetName::Off
        );

        // Sunset at 18:00
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(
            controller.snapshot().await.default_state,
            PresetName::Night
        );

        // Sunrise at 06:00 the next day
        tokio::time::sleep(Duration::from_secs(12 * 3600)).await;
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.default_state, PresetName::Off);
        assert_eq!(snapshot.sun_phase, Some(SunPhase::Daytime));

        task.abort();
    }
}
