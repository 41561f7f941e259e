//! Error types for pipetest

use thiserror::Error;

/// A rule expression that could not be parsed or evaluated.
///
/// Carries the raw expression and the namespace it was evaluated in so the
/// report can point at the offending rule.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid expression `{expression}` in {namespace}: {message}")]
pub struct ExpressionError {
    pub expression: String,
    pub namespace: String,
    pub message: String,
}

impl ExpressionError {
    pub fn new(expression: &str, namespace: &str, message: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            namespace: namespace.to_string(),
            message: message.into(),
        }
    }
}

/// Main error type for pipetest
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Document error: {0}")]
    Document(String),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Request error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("Worker error: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Shorthand for a document/reference error
    pub fn document(message: impl Into<String>) -> Self {
        PipelineError::Document(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_error_display() {
        let err = ExpressionError::new("body.[", "body", "unexpected end of input");
        let msg = err.to_string();
        assert!(msg.contains("body.["));
        assert!(msg.contains("in body"));
        assert!(msg.contains("unexpected end of input"));
    }

    #[test]
    fn test_document_error_display() {
        let err = PipelineError::document("test id ghost does not exist");
        assert_eq!(err.to_string(), "Document error: test id ghost does not exist");
    }
}
