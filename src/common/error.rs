use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceAttendError {
    /// Permission denied or no usable device. Terminal for the attempt.
    #[error("Camera unavailable: {0}")]
    CameraAcquisition(String),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Session expired, please log in again")]
    Unauthorized,

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::OrtError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaceAttendError>;
