mod event_hub;
mod message;
mod monitor_params;
mod result;

pub use event_hub::*;
pub use message::*;
pub use monitor_params::*;
pub use result::*;
