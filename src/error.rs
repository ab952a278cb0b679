use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid detection: {reason}")]
    InvalidDetection { reason: &'static str },

    #[error("Frame {got} does not follow frame {last}")]
    FrameOrder { last: u64, got: u64 },

    #[error("Frame timestamp {got} is not valid after {last}")]
    Timestamp { last: f64, got: f64 },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Assignment could not be solved")]
    Assignment,

    #[error("Frame queue disconnected")]
    Disconnected,
}
