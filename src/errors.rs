use thiserror::Error;

#[derive(Debug, Error)]
pub enum PilotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Detector error: {0}")]
    Detector(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Poller error: {0}")]
    Poller(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PilotError {
    /// Perception failures (capture or inference) leave the cache untouched and
    /// surface to callers as "absent".
    pub fn is_perception(&self) -> bool {
        matches!(self, PilotError::Capture(_) | PilotError::Detector(_))
    }
}

pub type PilotResult<T> = Result<T, PilotError>;
