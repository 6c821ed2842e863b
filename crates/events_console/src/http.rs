mod http_monitor_api;

pub use http_monitor_api::*;
