mod console_error;
mod decoder_config;
mod device_events_action;
mod device_events_state;
mod event_monitoring_state_machine;
mod events_console_config;
mod form_mode;
mod monitor_api;
mod monitor_poller;
mod notifier;

pub use console_error::*;
pub use decoder_config::*;
pub use device_events_action::*;
pub use device_events_state::*;
pub use event_monitoring_state_machine::*;
pub use events_console_config::*;
pub use form_mode::*;
pub use monitor_api::*;
pub use monitor_poller::*;
pub use notifier::*;
