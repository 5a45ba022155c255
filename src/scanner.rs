//! Statement scanner.
//!
//! Splits raw SQL into a tree of text runs, argument separators and delimited
//! groups without understanding the statement itself:
//!
//! ```text
//! select datediff(to_date(a), b) from t
//! ───┬─── ───┬─── ──────┬───── ───┬──
//!    │       │          │         └── Text
//!    │       │          └── Group "to_date", Comma, Text " b"
//!    │       └── Group "datediff" (name + children)
//!    └── Text
//! ```
//!
//! Quoted literals and comments are opaque: nothing inside them opens a group
//! or separates arguments. The tree is built with an explicit stack so nesting
//! depth is bounded by configuration rather than by the call stack, and the
//! configured bound itself never exceeds [`MAX_DEPTH_LIMIT`].

use std::ops::Range;

use crate::error::{TranslateError, TranslateResult};
use crate::rewriter::ToSql;

/// Default bound on group nesting.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Hard ceiling on group nesting, whatever the configuration asks for.
pub const MAX_DEPTH_LIMIT: usize = 256;

/// Byte offsets into the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Paren,
    Bracket,
}

impl Delimiter {
    fn from_open(byte: u8) -> Option<Self> {
        match byte {
            b'(' => Some(Delimiter::Paren),
            b'[' => Some(Delimiter::Bracket),
            _ => None,
        }
    }

    pub fn open(&self) -> char {
        match self {
            Delimiter::Paren => '(',
            Delimiter::Bracket => '[',
        }
    }

    pub fn close(&self) -> char {
        match self {
            Delimiter::Paren => ')',
            Delimiter::Bracket => ']',
        }
    }
}

/// One element of the scanned tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node<'a> {
    /// Verbatim source text, literals and comments included.
    Text(&'a str),
    /// An argument separator at the top level of the enclosing group.
    Comma,
    Group(Group<'a>),
}

/// A delimited group, optionally preceded by a function name.
#[derive(Debug, Clone, PartialEq)]
pub struct Group<'a> {
    pub name: Option<&'a str>,
    /// Whitespace between the name and the opening delimiter.
    pub gap: &'a str,
    pub delimiter: Delimiter,
    pub children: Vec<Node<'a>>,
    /// From the start of the name (or the opening delimiter) through the closer.
    pub span: Span,
}

impl<'a> Group<'a> {
    /// A named parenthesized group, i.e. a function call.
    pub fn is_call(&self) -> bool {
        self.name.is_some() && self.delimiter == Delimiter::Paren
    }

    /// Children split at top-level commas.
    pub fn arguments(&self) -> Vec<&[Node<'a>]> {
        self.children
            .split(|node| matches!(node, Node::Comma))
            .collect()
    }
}

/// A function call matched during translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCall {
    pub name: String,
    pub raw_argument_texts: Vec<String>,
    pub source_span: Span,
}

impl ParsedCall {
    /// Build a call from trimmed argument texts. `f()` and `f( )` have no arguments.
    pub fn new(name: impl Into<String>, arguments: Vec<String>, source_span: Span) -> Self {
        let empty = arguments.len() == 1 && arguments[0].is_empty();
        let raw_argument_texts = if empty { Vec::new() } else { arguments };
        Self {
            name: name.into(),
            raw_argument_texts,
            source_span,
        }
    }
}

/// Scans statement text into a [`Node`] tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scanner {
    max_depth: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

struct Frame<'a> {
    name: Option<&'a str>,
    gap: &'a str,
    delimiter: Delimiter,
    start: usize,
    open_at: usize,
    children: Vec<Node<'a>>,
}

impl Scanner {
    /// A scanner rejecting nesting deeper than `max_depth`, capped at
    /// [`MAX_DEPTH_LIMIT`].
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.min(MAX_DEPTH_LIMIT),
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Scan a full statement.
    pub fn scan<'a>(&self, sql: &'a str) -> TranslateResult<Vec<Node<'a>>> {
        self.scan_inner(sql, false)
    }

    /// Top-level argument texts of an argument list such as `a, f(b, c), 'x,y'`.
    pub fn split_arguments(&self, text: &str) -> TranslateResult<Vec<String>> {
        let nodes = self.scan_inner(text, true)?;
        Ok(nodes
            .split(|node| matches!(node, Node::Comma))
            .map(|nodes| nodes.to_sql().trim().to_string())
            .collect())
    }

    /// Named calls at the root of the statement, with verbatim argument texts.
    pub fn top_level_calls(&self, sql: &str) -> TranslateResult<Vec<ParsedCall>> {
        let nodes = self.scan(sql)?;
        Ok(nodes
            .iter()
            .filter_map(|node| match node {
                Node::Group(group) if group.is_call() => Some(group),
                _ => None,
            })
            .map(|group| {
                let arguments = group
                    .arguments()
                    .into_iter()
                    .map(|nodes| nodes.to_sql().trim().to_string())
                    .collect();
                ParsedCall::new(group.name.unwrap_or_default(), arguments, group.span)
            })
            .collect())
    }

    /// Byte ranges covered by quoted literals and comments.
    pub fn literal_ranges(&self, sql: &str) -> TranslateResult<Vec<Range<usize>>> {
        let mut ranges = Vec::new();
        for lexeme in Lexer::new(sql) {
            if let Lexeme::Opaque(range) = lexeme? {
                ranges.push(range);
            }
        }
        Ok(ranges)
    }

    fn scan_inner<'a>(&self, sql: &'a str, split_root: bool) -> TranslateResult<Vec<Node<'a>>> {
        let mut root: Vec<Node<'a>> = Vec::new();
        let mut stack: Vec<Frame<'a>> = Vec::new();
        let mut run_start = 0;

        for lexeme in Lexer::new(sql) {
            let (pos, byte) = match lexeme? {
                Lexeme::Code(pos, byte) => (pos, byte),
                Lexeme::Opaque(_) => continue,
            };

            match byte {
                b'(' | b'[' => {
                    if stack.len() >= self.max_depth {
                        return Err(TranslateError::RecursionDepth {
                            limit: self.max_depth,
                            position: pos,
                        });
                    }
                    let delimiter = Delimiter::from_open(byte).unwrap_or(Delimiter::Paren);
                    let run = &sql[run_start..pos];
                    let (text, name, gap) = match delimiter {
                        Delimiter::Paren => split_call_name(run),
                        Delimiter::Bracket => (run, None, ""),
                    };
                    push_text(children_mut(&mut stack, &mut root), text);
                    let start = if name.is_some() {
                        run_start + text.len()
                    } else {
                        pos
                    };
                    stack.push(Frame {
                        name,
                        gap: if name.is_some() { gap } else { "" },
                        delimiter,
                        start,
                        open_at: pos,
                        children: Vec::new(),
                    });
                    run_start = pos + 1;
                }
                b')' | b']' => {
                    push_text(children_mut(&mut stack, &mut root), &sql[run_start..pos]);
                    let Some(frame) = stack.pop() else {
                        return Err(TranslateError::unbalanced(
                            pos,
                            format!("unexpected '{}'", byte as char),
                        ));
                    };
                    if frame.delimiter.close() != byte as char {
                        return Err(TranslateError::unbalanced(
                            pos,
                            format!(
                                "expected '{}' to close '{}' opened at position {}, found '{}'",
                                frame.delimiter.close(),
                                frame.delimiter.open(),
                                frame.open_at,
                                byte as char
                            ),
                        ));
                    }
                    let group = Group {
                        name: frame.name,
                        gap: frame.gap,
                        delimiter: frame.delimiter,
                        children: frame.children,
                        span: Span {
                            start: frame.start,
                            end: pos + 1,
                        },
                    };
                    children_mut(&mut stack, &mut root).push(Node::Group(group));
                    run_start = pos + 1;
                }
                b',' if split_root || !stack.is_empty() => {
                    let children = children_mut(&mut stack, &mut root);
                    push_text(children, &sql[run_start..pos]);
                    children.push(Node::Comma);
                    run_start = pos + 1;
                }
                _ => {}
            }
        }

        if let Some(frame) = stack.last() {
            return Err(TranslateError::unbalanced(
                frame.open_at,
                format!("unclosed '{}'", frame.delimiter.open()),
            ));
        }
        push_text(&mut root, &sql[run_start..]);
        Ok(root)
    }
}

fn children_mut<'s, 'a>(
    stack: &'s mut [Frame<'a>],
    root: &'s mut Vec<Node<'a>>,
) -> &'s mut Vec<Node<'a>> {
    match stack.last_mut() {
        Some(frame) => &mut frame.children,
        None => root,
    }
}

fn push_text<'a>(children: &mut Vec<Node<'a>>, text: &'a str) {
    if !text.is_empty() {
        children.push(Node::Text(text));
    }
}

/// Byte offset just past the group that opens at the start of `text`.
///
/// Returns `None` when `text` does not start with `(` or `[`, or when the
/// group never closes. Delimiters inside literals and comments are ignored.
pub fn group_end(text: &str) -> TranslateResult<Option<usize>> {
    if !text.starts_with(['(', '[']) {
        return Ok(None);
    }
    let mut depth = 0usize;
    for lexeme in Lexer::new(text) {
        match lexeme? {
            Lexeme::Code(_, b'(' | b'[') => depth += 1,
            Lexeme::Code(pos, b')' | b']') => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some(pos + 1));
                }
            }
            _ => {}
        }
    }
    Ok(None)
}

/// Positions of `keyword` as a whole word outside literals, comments and
/// nested groups, compared case-insensitively.
pub fn keyword_positions(text: &str, keyword: &str) -> TranslateResult<Vec<usize>> {
    let bytes = text.as_bytes();
    let needle = keyword.as_bytes();
    let is_word = |byte: u8| byte.is_ascii_alphanumeric() || byte == b'_';

    let mut depth = 0usize;
    let mut positions = Vec::new();
    for lexeme in Lexer::new(text) {
        let (pos, byte) = match lexeme? {
            Lexeme::Code(pos, byte) => (pos, byte),
            Lexeme::Opaque(_) => continue,
        };
        match byte {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                let end = pos + needle.len();
                let matches = bytes
                    .get(pos..end)
                    .is_some_and(|window| window.eq_ignore_ascii_case(needle));
                let bounded = (pos == 0 || !is_word(bytes[pos - 1]))
                    && bytes.get(end).is_none_or(|next| !is_word(*next));
                if matches && bounded {
                    positions.push(pos);
                }
            }
            _ => {}
        }
    }
    Ok(positions)
}

/// Whether `text` is exactly one `'...'` or `"..."` literal.
pub fn is_quoted_literal(text: &str) -> bool {
    if !text.starts_with(['\'', '"']) {
        return false;
    }
    let mut lexer = Lexer::new(text);
    matches!(lexer.next(), Some(Ok(Lexeme::Opaque(range))) if range.end == text.len())
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

/// Split a text run ending right before `(` into `(text, name, gap)`.
fn split_call_name(run: &str) -> (&str, Option<&str>, &str) {
    let trimmed = run.trim_end();
    let gap = &run[trimmed.len()..];
    let name_len: usize = trimmed
        .chars()
        .rev()
        .take_while(|c| is_name_char(*c))
        .map(char::len_utf8)
        .sum();
    let name = &trimmed[trimmed.len() - name_len..];

    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && !name.ends_with('.');
    if valid {
        (&trimmed[..trimmed.len() - name_len], Some(name), gap)
    } else {
        (run, None, "")
    }
}

/// What the lexer yields: a code byte, or a whole literal/comment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    Code(usize, u8),
    Opaque(Range<usize>),
}

/// Byte-level lexer separating code from quoted literals and comments.
///
/// Every structural character is ASCII, so byte positions it reports are
/// always char boundaries.
struct Lexer<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(sql: &'a str) -> Self {
        Self {
            bytes: sql.as_bytes(),
            pos: 0,
        }
    }

    fn fail(&mut self, position: usize, message: &str) -> Option<TranslateResult<Lexeme>> {
        self.pos = self.bytes.len();
        Some(Err(TranslateError::unbalanced(position, message)))
    }

    fn quoted(&mut self, quote: u8) -> Option<TranslateResult<Lexeme>> {
        let start = self.pos;
        let mut i = start + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' if quote != b'`' => i += 2,
                b if b == quote => {
                    self.pos = i + 1;
                    return Some(Ok(Lexeme::Opaque(start..i + 1)));
                }
                _ => i += 1,
            }
        }
        let message = format!("unterminated {} literal", quote as char);
        self.fail(start, &message)
    }
}

impl Iterator for Lexer<'_> {
    type Item = TranslateResult<Lexeme>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let byte = *self.bytes.get(start)?;
        let next = self.bytes.get(start + 1).copied();

        match (byte, next) {
            (b'\'' | b'"' | b'`', _) => self.quoted(byte),
            (b'-', Some(b'-')) => {
                let end = self.bytes[start..]
                    .iter()
                    .position(|b| *b == b'\n')
                    .map_or(self.bytes.len(), |offset| start + offset);
                self.pos = end;
                Some(Ok(Lexeme::Opaque(start..end)))
            }
            (b'/', Some(b'*')) => {
                let close = self.bytes[start + 2..]
                    .windows(2)
                    .position(|w| w == b"*/");
                match close {
                    Some(offset) => {
                        let end = start + 2 + offset + 2;
                        self.pos = end;
                        Some(Ok(Lexeme::Opaque(start..end)))
                    }
                    None => self.fail(start, "unterminated block comment"),
                }
            }
            _ => {
                self.pos += 1;
                Some(Ok(Lexeme::Code(start, byte)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scanner() -> Scanner {
        Scanner::default()
    }

    #[test]
    fn test_scan_nested_call() {
        let nodes = scanner().scan("select f(a, g(b)) from t").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], Node::Text("select "));
        let Node::Group(f) = &nodes[1] else {
            panic!("expected group, got {:?}", nodes[1]);
        };
        assert_eq!(f.name, Some("f"));
        assert_eq!(f.span, Span { start: 7, end: 17 });
        let args = f.arguments();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0], &[Node::Text("a")][..]);
        assert!(matches!(&args[1][1], Node::Group(g) if g.name == Some("g")));
        assert_eq!(nodes[2], Node::Text(" from t"));
    }

    #[test]
    fn test_split_arguments_respects_nesting_and_quotes() {
        let args = scanner()
            .split_arguments("a, f(b, c), 'x,y', \"p,q\", arr[1, 2] -- c,d\n, z")
            .unwrap();
        assert_eq!(
            args,
            vec!["a", "f(b, c)", "'x,y'", "\"p,q\"", "arr[1, 2] -- c,d", "z"]
        );
    }

    #[test]
    fn test_parens_inside_literals_and_comments() {
        let nodes = scanner()
            .scan("select ')(' /* ( */, `a)` from t -- (")
            .unwrap();
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_escaped_quote() {
        let args = scanner().split_arguments(r"'it\'s, fine', b").unwrap();
        assert_eq!(args, vec![r"'it\'s, fine'", "b"]);
    }

    #[test]
    fn test_call_name_and_gap() {
        let calls = scanner().top_level_calls("lag   \n(page, 1) + db.udf(x) + (1)").unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "lag");
        assert_eq!(calls[0].raw_argument_texts, vec!["page", "1"]);
        assert_eq!(calls[0].source_span, Span { start: 0, end: 16 });
        assert_eq!(calls[1].name, "db.udf");
        assert_eq!(calls[1].raw_argument_texts, vec!["x"]);
    }

    #[test]
    fn test_zero_argument_call() {
        let calls = scanner().top_level_calls("current_date() , now( )").unwrap();
        assert!(calls[0].raw_argument_texts.is_empty());
        assert!(calls[1].raw_argument_texts.is_empty());
    }

    #[test]
    fn test_root_commas_are_text() {
        let nodes = scanner().scan("select a, b from t").unwrap();
        assert_eq!(nodes, vec![Node::Text("select a, b from t")]);
    }

    #[test]
    fn test_numbers_are_not_names() {
        let nodes = scanner().scan("1(2)").unwrap();
        let Node::Group(group) = &nodes[1] else {
            panic!("expected group");
        };
        assert_eq!(group.name, None);
        assert_eq!(nodes[0], Node::Text("1"));
    }

    #[test]
    fn test_unbalanced() {
        for (sql, position) in [
            ("select f(a", 8),
            ("select a)", 8),
            ("select 'abc", 7),
            ("select f(a]", 10),
            ("select /* x", 7),
        ] {
            match scanner().scan(sql) {
                Err(TranslateError::UnbalancedSyntax { position: p, .. }) => {
                    assert_eq!(p, position, "{}", sql)
                }
                other => panic!("expected unbalanced error for {:?}, got {:?}", sql, other),
            }
        }
    }

    #[test]
    fn test_depth_limit() {
        let sql = format!("{}x{}", "f(".repeat(5), ")".repeat(5));
        assert!(Scanner::new(5).scan(&sql).is_ok());
        match Scanner::new(4).scan(&sql) {
            Err(TranslateError::RecursionDepth { limit, position }) => {
                assert_eq!(limit, 4);
                assert_eq!(position, 9);
            }
            other => panic!("expected depth error, got {:?}", other),
        }
    }

    #[test]
    fn test_deep_nesting_does_not_overflow() {
        let sql = format!("{}x{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(
            Scanner::default().scan(&sql),
            Err(TranslateError::RecursionDepth { .. })
        ));
    }

    #[test]
    fn test_configured_depth_is_capped() {
        assert_eq!(Scanner::new(100_000).max_depth(), MAX_DEPTH_LIMIT);
        assert_eq!(Scanner::new(8).max_depth(), 8);

        let sql = format!("{}x{}", "f(".repeat(5_000), ")".repeat(5_000));
        match Scanner::new(100_000).scan(&sql) {
            Err(TranslateError::RecursionDepth { limit, position }) => {
                assert_eq!(limit, MAX_DEPTH_LIMIT);
                assert_eq!(position, 2 * MAX_DEPTH_LIMIT + 1);
            }
            other => panic!("expected depth error, got {:?}", other),
        }
    }

    #[test]
    fn test_group_end() {
        assert_eq!(group_end("(k=')') select 1").unwrap(), Some(7));
        assert_eq!(group_end("(a, f(b)) rest").unwrap(), Some(9));
        assert_eq!(group_end("[1, (2)]").unwrap(), Some(8));
        assert_eq!(group_end("x(a)").unwrap(), None);
        assert_eq!(group_end("(a").unwrap(), None);
        assert!(group_end("('a)").is_err());
    }

    #[test]
    fn test_keyword_positions() {
        assert_eq!(keyword_positions("a as varchar", "as").unwrap(), vec![2]);
        assert_eq!(
            keyword_positions("cast(b AS int) AS decimal(15, 2)", "as").unwrap(),
            vec![15]
        );
        assert_eq!(keyword_positions("'as' as_x has as", "AS").unwrap(), vec![14]);
        assert!(keyword_positions("-- as\nx", "as").unwrap().is_empty());
    }

    #[test]
    fn test_is_quoted_literal() {
        assert!(is_quoted_literal("'abc'"));
        assert!(is_quoted_literal(r"'it\'s'"));
        assert!(is_quoted_literal("\"x\""));
        assert!(!is_quoted_literal("'a' || 'b'"));
        assert!(!is_quoted_literal("`a`"));
        assert!(!is_quoted_literal("abc"));
        assert!(!is_quoted_literal("'open"));
    }

    #[test]
    fn test_literal_ranges() {
        let ranges = scanner().literal_ranges("a 'b' -- c\n d").unwrap();
        assert_eq!(ranges, vec![2..5, 6..10]);
    }
}
