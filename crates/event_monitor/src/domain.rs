mod envelope_collector;
mod event_monitor_config;
mod partition_receiver_pool;
mod session_manager;

pub use envelope_collector::*;
pub use event_monitor_config::*;
pub use partition_receiver_pool::*;
pub use session_manager::*;
