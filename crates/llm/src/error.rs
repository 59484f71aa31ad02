use thiserror::Error;

/// Chat client error types. Every variant carries a stable reason code that
/// ends up in the recognition chain of failed requests.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM configuration incomplete")]
    MissingConfig,

    #[error("LLM API connection error: {0}")]
    Connection(String),

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM returned an unusable response: {0}")]
    InvalidResponse(String),

    #[error("LLM returned no content")]
    NoContent,
}

impl LlmError {
    /// Stable reason code recorded in chain entries.
    pub fn reason_code(&self) -> &'static str {
        match self {
            LlmError::MissingConfig => "missing_api_key_or_url",
            LlmError::Connection(_) => "api_connection_error",
            LlmError::Timeout => "timeout",
            LlmError::InvalidResponse(_) => "unknown_error",
            LlmError::NoContent => "llm_no_result",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(LlmError::MissingConfig.reason_code(), "missing_api_key_or_url");
        assert_eq!(
            LlmError::Connection("refused".into()).reason_code(),
            "api_connection_error"
        );
        assert_eq!(LlmError::Timeout.reason_code(), "timeout");
        assert_eq!(
            LlmError::InvalidResponse("bad".into()).reason_code(),
            "unknown_error"
        );
        assert_eq!(LlmError::NoContent.reason_code(), "llm_no_result");
    }
}
