use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::debouncer::TimerId;
use super::event::Event;
use super::resolver::resolve;
use super::state::ControllerState;
use super::state::StateSnapshot;
use super::sun::format_duration;
use crate::alert::AlertSink;
use crate::gateway::DeviceBinding;
use crate::gateway::DeviceGateway;
use crate::schedule::Schedule;
use crate::schedule::SunPhase;

/// Capacity for the gateway→controller event channel
const EVENT_CHANNEL_SIZE: usize = 1024;

pub type EventSender = mpsc::Sender<Event>;
pub type EventReceiver = mpsc::Receiver<Event>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_SIZE)
}

/// Motion light controller
///
/// Serializes sensor events, debounce timer expiries and sun-phase changes
/// through a single gate, resolves the light preset and pushes it to every
/// light in the group. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

struct Shared {
    /// The gate. Held for a whole resolution cycle, gateway round-trips
    /// included.
    state: Mutex<ControllerState>,

    schedule: Schedule,
    gateway: Arc<dyn DeviceGateway>,
    alerts: Arc<dyn AlertSink>,
    binding: DeviceBinding,
}

impl Controller {
    pub fn new(
        binding: DeviceBinding,
        schedule: Schedule,
        gateway: Arc<dyn DeviceGateway>,
        alerts: Arc<dyn AlertSink>,
        motion_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState::new(motion_timeout)),
                schedule,
                gateway,
                alerts,
                binding,
            }),
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.shared.schedule
    }

    pub fn binding(&self) -> &DeviceBinding {
        &self.shared.binding
    }

    /// Process events until every sender is dropped.
    pub async fn run(&self, mut events: EventReceiver) {
        info!("Controller starting");
        while let Some(event) = events.recv().await {
            self.handle(event).await;
        }
        info!("Controller shutting down");
    }

    /// Handle a single inbound event.
    pub async fn handle(&self, event: Event) {
        let mut state = self.shared.state.lock().await;

        match event {
            Event::MotionChanged { active } => {
                info!("Motion: {}", if active { "detected" } else { "ended" });
                let weak = Arc::downgrade(&self.shared);
                state
                    .motion
                    .on_motion_changed(active, move |id| Self::motion_timeout(weak, id));
                self.resolve_and_apply(&mut state).await;
            }
            Event::LightLevelChanged { level } => {
                debug!("Light level: {}", level);
                state.light_level = Some(level);
            }
            Event::DevicePowerChanged { battery } => {
                info!("Device power: battery_level={}%", battery);
                self.send_alert(format!(
                    "{} battery level is {}%",
                    self.shared.binding.motion_device, battery
                ));
            }
            Event::Unrecognized { source } => {
                debug!("Ignoring unrecognized event from {}", source);
            }
        }
    }

    /// Record the sun phase, switch the default state to match and re-resolve.
    pub async fn set_sun_phase(&self, phase: SunPhase) {
        let mut state = self.shared.state.lock().await;
        state.sun_phase = Some(phase);
        state.default_state = phase.default_preset();
        self.resolve_and_apply(&mut state).await;
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.shared.state.lock().await.snapshot()
    }

    async fn motion_timeout(shared: Weak<Shared>, id: TimerId) {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        let controller = Controller { shared };

        let mut state = controller.shared.state.lock().await;
        if !state.motion.expire(id) {
            debug!("Ignoring expiry of superseded motion timer {:?}", id);
            return;
        }

        info!(
            "Motion timeout: it's been {} since the end of motion",
            format_duration(state.motion.timeout())
        );
        controller.resolve_and_apply(&mut state).await;
    }

    /// One resolution cycle. Must be called with the gate held.
    async fn resolve_and_apply(&self, state: &mut ControllerState) {
        let motion = state.motion.is_active();
        let is_daytime = self.is_daytime(state);
        let preset = resolve(motion, is_daytime, state.default_state);

        info!(
            "Handling state: motion_active={}, recently_active={}, daytime={}, light_level={:?} -> {}",
            state.motion.motion_active(),
            state.motion.recently_active(),
            is_daytime,
            state.light_level,
            preset.name
        );
        debug!(
            "Setting lights: on={}, brightness={:?}, color_xy={:?}, color_temp={:?}",
            preset.on, preset.brightness, preset.color_xy, preset.color_temp
        );

        for light in &self.shared.binding.lights {
            if let Err(e) = self.shared.gateway.apply(light, &preset).await {
                warn!("Failed to control light '{}': {}", light, e);
            }
        }

        state.last_applied = Some(preset.name);
    }

    /// Ask the oracle; fall back to the last phase the sun loop saw.
    fn is_daytime(&self, state: &ControllerState) -> bool {
        match self.shared.schedule.is_daytime() {
            Ok(daytime) => daytime,
            Err(e) => {
                let fallback = state.sun_phase.is_some_and(SunPhase::is_daytime);
                warn!(
                    "Schedule unavailable ({}), assuming daytime={} from last sun phase",
                    e, fallback
                );
                fallback
            }
        }
    }

    fn send_alert(&self, message: String) {
        let alerts = self.shared.alerts.clone();
        tokio::spawn(async move {
            if let Err(e) = alerts.notify(&message).await {
                warn!("Failed to send alert: {}", e);
            }
        });
    }
}
