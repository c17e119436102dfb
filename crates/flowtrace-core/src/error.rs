//! Error types for parsing, flow construction and graph lookups.
//!
//! Parse failures are per statement: a batch records them and keeps going, so
//! [`ParseError`] never escapes a batch operation. The remaining errors are returned
//! by single-target operations and always carry enough context to render a message
//! (lookup misses include suggested names).

use crate::types::Dialect;
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
#[cfg(feature = "tracing")]
use tracing::trace;

/// Error encountered while parsing one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    /// Position in the original source text, when sqlparser reported one.
    pub position: Option<Position>,
    pub dialect: Option<Dialect>,
    pub kind: ParseErrorKind,
}

/// 1-based line/column position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseErrorKind {
    #[default]
    SyntaxError,
    UnexpectedEof,
    MissingClause,
    UnsupportedFeature,
    LexerError,
}

impl ParseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
            dialect: None,
            kind: ParseErrorKind::SyntaxError,
        }
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    pub fn with_kind(mut self, kind: ParseErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Shifts the reported position by the number of lines preceding the statement.
    ///
    /// Statements are parsed one at a time, so sqlparser positions are relative to the
    /// start of the statement text.
    pub fn shifted(mut self, line_offset: usize) -> Self {
        if let Some(position) = self.position.as_mut() {
            position.line += line_offset;
        }
        self
    }

    pub fn line(&self) -> Option<usize> {
        self.position.map(|position| position.line)
    }

    /// sqlparser reports positions as "... at Line: X, Column: Y".
    fn position_from_message(message: &str) -> Option<Position> {
        static POSITION: OnceLock<Regex> = OnceLock::new();
        let re = POSITION.get_or_init(|| {
            Regex::new(r"Line:\s*(\d+)\s*,\s*Column:\s*(\d+)").expect("valid position regex")
        });

        let position = re.captures(message).and_then(|caps| {
            let line = caps.get(1)?.as_str().parse().ok()?;
            let column = caps.get(2)?.as_str().parse().ok()?;
            Some(Position { line, column })
        });

        #[cfg(feature = "tracing")]
        if position.is_none() && message.contains("Line") {
            trace!("no position recovered from parser message: {}", message);
        }

        position
    }

    fn kind_from_message(message: &str) -> ParseErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("unexpected end") || lower.contains("eof") {
            ParseErrorKind::UnexpectedEof
        } else if lower.contains("not supported") || lower.contains("unsupported") {
            ParseErrorKind::UnsupportedFeature
        } else if lower.contains("expected") {
            ParseErrorKind::MissingClause
        } else if lower.contains("tokenizer") || lower.contains("unterminated") {
            ParseErrorKind::LexerError
        } else {
            ParseErrorKind::SyntaxError
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error")?;
        if let Some(dialect) = self.dialect {
            write!(f, " ({dialect:?})")?;
        }
        if let Some(pos) = self.position {
            write!(f, " at line {}, column {}", pos.line, pos.column)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<sqlparser::parser::ParserError> for ParseError {
    fn from(err: sqlparser::parser::ParserError) -> Self {
        let message = err.to_string();
        Self {
            position: Self::position_from_message(&message),
            kind: Self::kind_from_message(&message),
            dialect: None,
            message,
        }
    }
}

impl From<sqlparser::tokenizer::TokenizerError> for ParseError {
    fn from(err: sqlparser::tokenizer::TokenizerError) -> Self {
        let message = err.to_string();
        Self {
            position: Self::position_from_message(&message),
            kind: ParseErrorKind::LexerError,
            dialect: None,
            message,
        }
    }
}

/// Failure to turn a parsed statement into a flow graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("statement kind '{0}' has no flow representation")]
    UnsupportedStatement(String),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// A node id that does not exist in the lineage graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("node '{query}' not found{}", format_suggestions(.suggestions))]
pub struct LookupError {
    pub query: String,
    /// Known names ranked by similarity to `query`.
    pub suggestions: Vec<String>,
}

fn format_suggestions(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!("; did you mean: {}", suggestions.join(", "))
    }
}

/// Failure of an impact analysis request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImpactError {
    #[error("column impact analysis requires the owning table name")]
    MissingTable,
    #[error("column impact analysis requires a column name")]
    MissingColumn,
    #[error(transparent)]
    NotFound(#[from] LookupError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_is_recovered_from_parser_message() {
        let pos = ParseError::position_from_message(
            "Expected: an expression, found: EOF at Line: 3, Column: 12",
        );
        assert_eq!(pos, Some(Position { line: 3, column: 12 }));
        assert_eq!(ParseError::position_from_message("Error at Column: 5"), None);
    }

    #[test]
    fn kind_is_inferred_from_message() {
        assert_eq!(
            ParseError::kind_from_message("Unexpected EOF while parsing"),
            ParseErrorKind::UnexpectedEof
        );
        assert_eq!(
            ParseError::kind_from_message("Expected: SELECT, found: FOO"),
            ParseErrorKind::MissingClause
        );
        assert_eq!(
            ParseError::kind_from_message("MERGE not supported here"),
            ParseErrorKind::UnsupportedFeature
        );
        assert_eq!(
            ParseError::kind_from_message("something odd"),
            ParseErrorKind::SyntaxError
        );
    }

    #[test]
    fn shifted_moves_line_only() {
        let mut err = ParseError::new("bad");
        err.position = Some(Position { line: 2, column: 4 });
        let err = err.shifted(10).with_dialect(Dialect::Postgres);
        assert_eq!(err.line(), Some(12));
        assert_eq!(
            err.to_string(),
            "Parse error (Postgres) at line 12, column 4: bad"
        );
    }

    #[test]
    fn lookup_error_lists_suggestions() {
        let err = LookupError {
            query: "custmers".to_string(),
            suggestions: vec!["table:customers".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "node 'custmers' not found; did you mean: table:customers"
        );

        let bare = LookupError {
            query: "x".to_string(),
            suggestions: Vec::new(),
        };
        assert_eq!(bare.to_string(), "node 'x' not found");
    }
}
