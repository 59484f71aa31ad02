use thiserror::Error;

/// Matcher-level error types. These never leave the pipeline: the chain
/// records them as `status=error` entries and iteration continues.
#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("encoder error: {0}")]
    Encoder(#[from] embedding::EncoderError),

    #[error("LLM error: {0}")]
    Llm(#[from] ::llm::LlmError),
}
