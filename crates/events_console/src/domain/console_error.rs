use message_decoder::DecoderError;
use thiserror::Error;

pub type ConsoleResult<T> = Result<T, ConsoleError>;

#[derive(Error, Debug)]
pub enum ConsoleError {
    /// The proxy could not be reached or answered with an error
    #[error("Monitor API error: {0}")]
    Api(String),

    #[error(transparent)]
    Decoder(#[from] DecoderError),

    #[error("Invalid decoder settings: {0}")]
    InvalidDecoderInfo(String),
}
