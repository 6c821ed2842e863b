//! Console-side message decoding.
//!
//! - [`parse`] turns raw byte bodies into structured values, either through a
//!   resolved [`DecoderPrototype`] or as plain text.
//! - [`filter`] and [`ComponentFilter`] scope telemetry to a device component.
//! - [`DecoderRegistry`] compiles a user-supplied `.proto` schema and resolves
//!   a message type from it.

mod decode_type;
mod error;
mod filter;
mod parser;
mod prototype;
mod registry;

pub use decode_type::*;
pub use error::*;
pub use filter::*;
pub use parser::*;
pub use prototype::*;
pub use registry::*;
