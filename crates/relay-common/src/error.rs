use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("Invalid {description}: '{url}' must start with http:// or https://")]
    InvalidUrl { description: &'static str, url: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Alert delivery failed: {0}")]
    Alert(String),
}

pub type Result<T> = std::result::Result<T, RelayError>;
