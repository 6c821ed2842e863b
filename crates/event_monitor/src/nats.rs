mod connection_string;
mod envelope_converter;
mod nats_event_hub;
mod nats_partition_receiver;

pub use connection_string::*;
pub use envelope_converter::*;
pub use nats_event_hub::*;
pub use nats_partition_receiver::*;
