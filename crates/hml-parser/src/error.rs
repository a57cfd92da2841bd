//! Error types for HML parsing.

use thiserror::Error;

/// Errors that can occur while parsing one embedded document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unexpected content after closing </site> at byte {0}")]
    TrailingContent(usize),

    #[error("Document ended before <{0}> was closed")]
    UnclosedElement(String),

    #[error("Expected root element <site>, found <{0}>")]
    UnexpectedRoot(String),

    #[error("Document has no root element")]
    Empty,

    #[error("Invalid attribute: {0}")]
    Attribute(String),

    #[error("Missing required element or attribute: {0}")]
    Missing(&'static str),
}

impl ParseError {
    /// Whether truncating trailing bytes could make the document parse.
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            ParseError::Syntax { .. }
                | ParseError::TrailingContent(_)
                | ParseError::UnclosedElement(_)
        )
    }
}

/// Result type for HML parsing.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
