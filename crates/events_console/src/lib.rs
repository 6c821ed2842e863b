//! Console side of eventscope: keeps the telemetry history for one device,
//! polls the proxy for new batches and decodes them with the configured
//! schema.

pub mod domain;
pub mod http;
