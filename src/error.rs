//! Error types for sqlshift.

use thiserror::Error;

/// The main error type for sqlshift operations.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// A rule document entry does not match the rule schema.
    #[error("Invalid rule schema in '{origin}': {message}")]
    InvalidRuleSchema { origin: String, message: String },

    /// The same function name is defined by two rule documents.
    #[error("Duplicate rule '{name}': defined in '{first}' and '{second}'")]
    DuplicateRule {
        name: String,
        first: String,
        second: String,
    },

    /// Parentheses, brackets, quotes or comments do not close.
    #[error("Unbalanced syntax at position {position}: {message}")]
    UnbalancedSyntax { position: usize, message: String },

    /// Nesting exceeds the configured maximum depth.
    #[error("Nesting depth exceeds {limit} at position {position}")]
    RecursionDepth { limit: usize, position: usize },

    /// A ruled function was called with an unsupported number of arguments.
    #[error("Arity error for '{function}': expected {expected}, found {found}")]
    Arity {
        function: String,
        expected: String,
        found: usize,
    },

    /// An argument cannot be converted to the type its slot requires.
    #[error("Cannot use {value} as {data_type} in '{function}'")]
    Coercion {
        function: String,
        value: String,
        data_type: String,
    },

    /// A call is ruled but its arguments fall outside what the rule renders.
    #[error("Unsupported call to '{function}': {message}")]
    Unsupported { function: String, message: String },

    /// The INSERT clause does not match what the caller declared.
    #[error("Statement mismatch: {0}")]
    StatementMismatch(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslateError {
    /// Create a schema error for the given document origin.
    pub fn schema(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRuleSchema {
            origin: origin.into(),
            message: message.into(),
        }
    }

    /// Create an unbalanced syntax error at the given position.
    pub fn unbalanced(position: usize, message: impl Into<String>) -> Self {
        Self::UnbalancedSyntax {
            position,
            message: message.into(),
        }
    }

    /// Create an arity error.
    pub fn arity(function: impl Into<String>, expected: impl Into<String>, found: usize) -> Self {
        Self::Arity {
            function: function.into(),
            expected: expected.into(),
            found,
        }
    }

    /// Create an unsupported-call error.
    pub fn unsupported(function: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            function: function.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for sqlshift operations.
pub type TranslateResult<T> = Result<T, TranslateError>;
