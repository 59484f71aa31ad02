use thiserror::Error;

/// Encoder error types.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("invalid encoder configuration: {0}")]
    InvalidConfig(String),

    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding inference failed: {0}")]
    Inference(String),
}
