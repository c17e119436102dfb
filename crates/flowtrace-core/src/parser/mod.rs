//! Statement splitting and parsing.
//!
//! A SQL text is split on top-level semicolons using the sqlparser tokenizer, so
//! semicolons inside strings, quoted identifiers and comments never split a
//! statement. Each piece is then parsed on its own: one broken statement produces a
//! [`StatementFailure`] and the rest of the batch is still parsed.

use std::ops::Range;

use crate::error::ParseError;
use crate::types::{Dialect, LineRange};
use sqlparser::ast::{Spanned, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
#[cfg(feature = "tracing")]
use tracing::debug;

/// Parse SQL using the specified dialect.
pub fn parse_sql_with_dialect(sql: &str, dialect: Dialect) -> Result<Vec<Statement>, ParseError> {
    let sqlparser_dialect = dialect.to_sqlparser_dialect();
    match Parser::parse_sql(sqlparser_dialect.as_ref(), sql) {
        Ok(statements) => Ok(statements),
        Err(primary_err) => {
            // The generic dialect rejects `::` casts and JSON operators that are
            // common in warehouse SQL; retry those with the Postgres grammar.
            if matches!(dialect, Dialect::Generic) && looks_like_postgres_syntax(sql) {
                if let Ok(statements) = Parser::parse_sql(&PostgreSqlDialect {}, sql) {
                    return Ok(statements);
                }
            }
            Err(ParseError::from(primary_err).with_dialect(dialect))
        }
    }
}

fn looks_like_postgres_syntax(sql: &str) -> bool {
    sql.contains("::") || sql.contains("->") || sql.contains("?|") || sql.contains("?&")
}

/// A successfully parsed statement with its location in the source text.
#[derive(Debug, Clone)]
pub struct ParsedStatement {
    /// Position of the statement in the batch, failures included.
    pub index: usize,
    /// Lines preceding the statement; add to statement-relative span lines.
    pub line_offset: usize,
    pub lines: LineRange,
    pub statement: Statement,
}

/// A statement that failed to parse.
#[derive(Debug, Clone)]
pub struct StatementFailure {
    pub index: usize,
    /// First line of the failing statement.
    pub line: usize,
    pub error: ParseError,
}

/// Every statement of one SQL text, parsed independently.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub statements: Vec<ParsedStatement>,
    pub failures: Vec<StatementFailure>,
}

impl ParsedBatch {
    pub fn success_count(&self) -> usize {
        self.statements.len()
    }

    pub fn error_count(&self) -> usize {
        self.failures.len()
    }
}

struct Chunk {
    range: Range<usize>,
    first_line: usize,
    last_line: usize,
}

/// Splits `sql` into statements and parses each one separately.
pub fn parse_batch(sql: &str, dialect: Dialect) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    let mut index = 0usize;

    for chunk in split_chunks(sql, dialect) {
        let text = &sql[chunk.range.clone()];
        let line_offset = chunk.first_line.saturating_sub(1);

        match parse_sql_with_dialect(text, dialect) {
            Ok(statements) => {
                for statement in statements {
                    let lines = statement_lines(&statement, line_offset)
                        .unwrap_or_else(|| LineRange::new(chunk.first_line, chunk.last_line));
                    batch.statements.push(ParsedStatement {
                        index,
                        line_offset,
                        lines,
                        statement,
                    });
                    index += 1;
                }
            }
            Err(error) => {
                #[cfg(feature = "tracing")]
                debug!(index, line = chunk.first_line, "statement failed to parse: {error}");
                batch.failures.push(StatementFailure {
                    index,
                    line: chunk.first_line,
                    error: error.shifted(line_offset),
                });
                index += 1;
            }
        }
    }

    batch
}

fn statement_lines(statement: &Statement, line_offset: usize) -> Option<LineRange> {
    let span = statement.span();
    if span.start.line == 0 {
        return None;
    }
    Some(LineRange::new(
        span.start.line as usize + line_offset,
        span.end.line as usize + line_offset,
    ))
}

fn split_chunks(sql: &str, dialect: Dialect) -> Vec<Chunk> {
    let sqlparser_dialect = dialect.to_sqlparser_dialect();
    let mut tokenizer = Tokenizer::new(sqlparser_dialect.as_ref(), sql);
    let tokens = match tokenizer.tokenize_with_location() {
        Ok(tokens) => tokens,
        // Let the parser report the lexer error against the whole text.
        Err(_) => return whole_text_chunk(sql),
    };

    let lines = LineIndex::new(sql);
    let mut chunks = Vec::new();
    let mut start: Option<(usize, usize)> = None;
    let mut last_line = 0usize;

    for token in tokens {
        let line = token.span.start.line as usize;
        let column = token.span.start.column as usize;
        match token.token {
            Token::Whitespace(_) | Token::EOF => {}
            Token::SemiColon => {
                if let Some((offset, first_line)) = start.take() {
                    let end = lines.offset(line, column).unwrap_or(sql.len());
                    chunks.push(Chunk {
                        range: offset..end,
                        first_line,
                        last_line,
                    });
                }
            }
            _ => {
                if start.is_none() {
                    let offset = lines.offset(line, column).unwrap_or(0);
                    start = Some((offset, line.max(1)));
                }
                last_line = (token.span.end.line as usize).max(line);
            }
        }
    }

    if let Some((offset, first_line)) = start {
        chunks.push(Chunk {
            range: offset..sql.len(),
            first_line,
            last_line,
        });
    }

    chunks
}

fn whole_text_chunk(sql: &str) -> Vec<Chunk> {
    if sql.trim().is_empty() {
        return Vec::new();
    }
    let leading_lines = sql[..sql.len() - sql.trim_start().len()]
        .matches('\n')
        .count();
    vec![Chunk {
        range: 0..sql.len(),
        first_line: leading_lines + 1,
        last_line: sql.lines().count().max(1),
    }]
}

/// Byte offsets of line starts, so 1-based line/column positions from the
/// tokenizer convert to byte offsets without rescanning the text.
pub(crate) struct LineIndex<'a> {
    sql: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    pub(crate) fn new(sql: &'a str) -> Self {
        let starts = std::iter::once(0)
            .chain(sql.match_indices('\n').map(|(offset, _)| offset + 1))
            .collect();
        Self { sql, starts }
    }

    /// Converts a 1-based line/column (in characters) to a byte offset.
    ///
    /// Only the target line is scanned.
    pub(crate) fn offset(&self, line: usize, column: usize) -> Option<usize> {
        if line == 0 || column == 0 {
            return None;
        }
        let start = *self.starts.get(line - 1)?;
        let end = self.starts.get(line).copied().unwrap_or(self.sql.len());
        let text = &self.sql[start..end];
        let mut chars = text.char_indices().map(|(offset, _)| start + offset);
        match chars.nth(column - 1) {
            Some(offset) => Some(offset),
            // One past the last character of the final line.
            None if end == self.sql.len() && text.chars().count() + 1 == column => {
                Some(self.sql.len())
            }
            None => None,
        }
    }
}
