use std::path::PathBuf;

use thiserror::Error;

use crate::roi::StreamResolution;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("frames differ in shape: {left} with {left_channels} channels vs {right} with {right_channels} channels")]
    DimensionMismatch {
        left: StreamResolution,
        left_channels: i32,
        right: StreamResolution,
        right_channels: i32,
    },

    #[error("could not read image {}", path.display())]
    ImageRead { path: PathBuf },

    #[error("could not read tuning file: {0}")]
    TuningIo(#[from] std::io::Error),

    #[error("invalid tuning json: {0}")]
    TuningJson(#[from] serde_json::Error),

    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

#[derive(Debug, Error)]
pub enum EventError {
    /// Message with an unknown `type` and no `level` payload.
    #[error("malformed event message: type {0:?} with no level")]
    MalformedEvent(Option<String>),

    #[error("invalid event json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("event transport disconnected: {0}")]
    Disconnected(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("event receiver dropped")]
    ReceiverGone,
}
