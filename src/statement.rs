//! Statement orchestration.
//!
//! Translation of a full statement runs in three stages, always in order:
//!
//! ```text
//! INSERT  OVERWRITE TABLE db.t PARTITION (dt)  SELECT datediff(a, b) FROM s
//! ──────────────────────┬─────────────────────        ───────┬───────
//!                       │                                    └── 1. call rewriting
//!                       └── 2. insert-clause reconciliation
//!                                                   3. assembly
//! ```

use std::ops::Range;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{multispace0, multispace1},
    combinator::{consumed, opt, value},
    error::{Error, ErrorKind},
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::error::{TranslateError, TranslateResult};
use crate::registry::RuleRegistry;
use crate::rewriter::CallRewriter;
use crate::scanner::{group_end, Scanner, Span};
use crate::translator::TranslationContext;

/// Which INSERT form a statement uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOperation {
    /// `INSERT OVERWRITE TABLE`
    Overwrite,
    /// `INSERT INTO [TABLE]`
    Into,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionColumn {
    pub name: String,
    /// Static partition value, `None` for dynamic partitions.
    pub value: Option<String>,
}

/// A `PARTITION (...)` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub text: String,
    pub columns: Vec<PartitionColumn>,
}

/// The INSERT clause of a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertClause {
    pub operation: InsertOperation,
    /// Target table as written, possibly database-qualified.
    pub table: String,
    pub partition: Option<Partition>,
    /// Clause text with whitespace outside literals collapsed to single spaces.
    pub text: String,
    pub span: Span,
}

impl InsertClause {
    /// Database qualifier of the target table, if any.
    pub fn database(&self) -> Option<&str> {
        self.table.rsplit_once('.').map(|(database, _)| database)
    }

    /// Unqualified target table name.
    pub fn table_name(&self) -> &str {
        self.table
            .rsplit_once('.')
            .map_or(self.table.as_str(), |(_, table)| table)
    }
}

/// Find the first INSERT clause outside literals and comments.
pub fn find_insert_clause(sql: &str) -> TranslateResult<Option<InsertClause>> {
    find_insert_clause_with(&Scanner::default(), sql)
}

/// [`find_insert_clause`], splitting partition columns with `scanner`.
pub fn find_insert_clause_with(
    scanner: &Scanner,
    sql: &str,
) -> TranslateResult<Option<InsertClause>> {
    let literals = scanner.literal_ranges(sql)?;
    let bytes = sql.as_bytes();

    let candidates = bytes
        .windows(6)
        .enumerate()
        .filter(|(_, window)| window.eq_ignore_ascii_case(b"insert"))
        .map(|(pos, _)| pos)
        .filter(|pos| *pos == 0 || !is_word_byte(bytes[*pos - 1]))
        .filter(|pos| !in_ranges(&literals, *pos));

    for start in candidates {
        let Ok((rest, (operation, table, partition))) = insert_clause(&sql[start..]) else {
            continue;
        };
        let end = sql.len() - rest.len();

        let partition = match partition {
            // The partition clause is the last thing parsed, so it ends at `end`.
            Some((text, inner)) => {
                Some(Partition {
                    text: collapse_whitespace(text, end - text.len(), &literals),
                    columns: partition_columns(scanner, inner)?,
                })
            }
            None => None,
        };

        return Ok(Some(InsertClause {
            operation,
            table: table.to_string(),
            partition,
            text: collapse_whitespace(&sql[start..end], start, &literals),
            span: Span { start, end },
        }));
    }
    Ok(None)
}

/// Parse `INSERT (OVERWRITE TABLE | INTO [TABLE]) name [PARTITION (...)]`.
fn insert_clause(input: &str) -> IResult<&str, (InsertOperation, &str, Option<(&str, &str)>)> {
    let (input, _) = tag_no_case("insert")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, operation) = alt((
        value(
            InsertOperation::Overwrite,
            tuple((
                tag_no_case("overwrite"),
                multispace1,
                tag_no_case("table"),
                multispace1,
            )),
        ),
        value(
            InsertOperation::Into,
            tuple((
                tag_no_case("into"),
                multispace1,
                opt(terminated(tag_no_case("table"), multispace1)),
            )),
        ),
    ))(input)?;
    let (input, table) = table_identifier(input)?;
    let (input, partition) = opt(preceded(multispace1, partition_clause))(input)?;
    Ok((input, (operation, table, partition)))
}

fn table_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| {
        c.is_alphanumeric() || matches!(c, '_' | '.' | '`' | '$' | '{' | '}')
    })(input)
}

/// Parse `PARTITION (...)`, returning the whole clause and the list inside.
fn partition_clause(input: &str) -> IResult<&str, (&str, &str)> {
    consumed(preceded(
        tuple((tag_no_case("partition"), multispace0)),
        parenthesized,
    ))(input)
}

/// A balanced `(...)` group, yielding its contents. Parentheses inside
/// literals and comments do not count.
fn parenthesized(input: &str) -> IResult<&str, &str> {
    match group_end(input) {
        Ok(Some(end)) if input.starts_with('(') => Ok((&input[end..], &input[1..end - 1])),
        _ => Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
    }
}

fn partition_columns(scanner: &Scanner, inner: &str) -> TranslateResult<Vec<PartitionColumn>> {
    Ok(scanner
        .split_arguments(inner)?
        .into_iter()
        .filter(|column| !column.is_empty())
        .map(|column| match column.split_once('=') {
            Some((name, value)) => PartitionColumn {
                name: name.trim().to_string(),
                value: Some(value.trim().to_string()),
            },
            None => PartitionColumn {
                name: column,
                value: None,
            },
        })
        .collect())
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'.'
}

fn in_ranges(ranges: &[Range<usize>], pos: usize) -> bool {
    ranges.iter().any(|range| range.contains(&pos))
}

/// Collapse whitespace runs outside literals. `offset` locates `text` in the
/// string `literals` was computed for.
fn collapse_whitespace(text: &str, offset: usize, literals: &[Range<usize>]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() && !in_ranges(literals, offset + i) {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }
    out
}

/// Runs the translation stages over one statement.
#[derive(Debug, Clone, Copy)]
pub struct StatementOrchestrator<'r> {
    registry: &'r RuleRegistry,
    scanner: Scanner,
}

impl<'r> StatementOrchestrator<'r> {
    pub fn new(registry: &'r RuleRegistry, scanner: Scanner) -> Self {
        Self { registry, scanner }
    }

    pub fn run(&self, sql: &str, context: &TranslationContext) -> TranslateResult<String> {
        tracing::debug!("Stage 1: rewriting calls ({} bytes)", sql.len());
        let nodes = self.scanner.scan(sql)?;
        let rewritten = CallRewriter::new(self.registry).rewrite(&nodes)?;

        tracing::debug!(
            "Stage 2: reconciling insert clause (declared: {})",
            context.has_insert_statement
        );
        let clause = find_insert_clause_with(&self.scanner, &rewritten)?;
        let clause = match (clause, context.has_insert_statement) {
            (None, true) => {
                return Err(TranslateError::StatementMismatch(
                    "expected an INSERT OVERWRITE TABLE or INSERT INTO clause, found none"
                        .to_string(),
                ));
            }
            (Some(clause), false) => {
                return Err(TranslateError::StatementMismatch(format!(
                    "found '{}' in a statement declared without an INSERT clause",
                    clause.text
                )));
            }
            (clause, _) => clause,
        };

        tracing::debug!("Stage 3: assembling");
        let Some(clause) = clause else {
            return Ok(rewritten);
        };
        if clause.operation == InsertOperation::Overwrite {
            tracing::warn!(
                "INSERT OVERWRITE into '{}' is kept as written; the target may not replace existing rows",
                clause.table
            );
        }
        Ok(format!(
            "{}{}{}",
            &rewritten[..clause.span.start],
            clause.text,
            &rewritten[clause.span.end..]
        ))
    }
}
