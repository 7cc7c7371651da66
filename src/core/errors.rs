use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("service unavailable")]
    ServiceUnavailable,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

/// Failure to pull text out of an uploaded file.
///
/// Never crosses the extractor boundary as an error: `TextExtractor::extract`
/// logs it and yields empty text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    #[error("pdf extraction failed: {0}")]
    Pdf(String),
    #[error("docx extraction failed: {0}")]
    Docx(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding backend failed: {0}")]
    Backend(#[source] ApiError),
    #[error("embedding call timed out after {0:?}")]
    Timeout(Duration),
    #[error("embedding has dimension {actual}, expected {expected}")]
    Dimension { expected: usize, actual: usize },
    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    Count { expected: usize, actual: usize },
}

/// Failure of an LLM-backed generation step.
///
/// Callers treat this as "no plan/answer was produced" and fall back to a
/// template; it is distinct from a successful but empty result.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("llm call failed: {0}")]
    Llm(#[source] ApiError),
    #[error("llm call timed out after {0:?}")]
    Timeout(Duration),
    #[error("no JSON object found in llm response")]
    NoStructuredOutput,
    #[error("malformed JSON in llm response: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("llm response does not match the expected shape: {0}")]
    Schema(String),
}

/// Failure to index an uploaded course file.
#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("extracted text has {chars} characters, at least {required} are needed")]
    InsufficientContent { chars: usize, required: usize },
    #[error("storage failed: {0}")]
    Store(#[from] ApiError),
}
