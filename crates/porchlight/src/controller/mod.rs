mod debouncer;
mod dispatcher;
mod event;
mod preset;
mod resolver;
mod state;
mod sun;

pub use debouncer::MotionDebouncer;
pub use debouncer::TimerId;
pub use dispatcher::Controller;
pub use dispatcher::EventReceiver;
pub use dispatcher::EventSender;
pub use dispatcher::event_channel;
pub use event::Event;
pub use preset::ColorXy;
pub use preset::LightPreset;
pub use preset::PresetName;
pub use resolver::resolve;
pub use state::ControllerState;
pub use state::StateSnapshot;
pub use sun::Backoff;
pub use sun::SunPhaseLoop;
pub use sun::format_duration;
