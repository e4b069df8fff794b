use thiserror::Error;

/// Statements refused before the batch is sent, or a reply that does not
/// line up with the request
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BatchError {
    #[error("Statement {index}: parameter `{param}` cannot be bound directly ({reason}); serialize it before batching")]
    UnbindableParameter {
        index: usize,
        param: String,
        reason: String,
    },
    #[error("Backend returned {received} result(s) for {expected} statement(s)")]
    ResultCountMismatch { expected: usize, received: usize },
    #[error("Batch size must be at least 1")]
    InvalidBatchSize,
}

impl BatchError {
    pub fn unbindable_with_context(index: usize, param: impl Into<String>, reason: impl Into<String>) -> Self {
        BatchError::UnbindableParameter {
            index,
            param: param.into(),
            reason: reason.into(),
        }
    }
}
