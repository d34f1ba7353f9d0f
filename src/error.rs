use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimegrapherError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio stream error: {0}")]
    AudioStream(String),

    #[error("Sample source closed")]
    SourceClosed,

    #[error("Filter design failed: {0}")]
    FilterDesign(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Posture index {index} out of range (have {count} postures)")]
    InvalidPosture { index: usize, count: usize },

    #[error("Insufficient data: need {needed} cycles, have {available}")]
    InsufficientData { needed: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, TimegrapherError>;
