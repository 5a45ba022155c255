//! Call rewriting.
//!
//! Renders a scanned tree back to SQL, replacing every call that has a rule
//! with its translation. Arguments are rewritten before the call that
//! contains them, so nested ruled calls compose naturally. Rendering walks
//! the tree with an explicit stack of open groups.

use std::slice;

use crate::coercion::{coerce, ArgKind, Argument};
use crate::composition::apply_compositions;
use crate::error::{TranslateError, TranslateResult};
use crate::registry::RuleRegistry;
use crate::rule::Rule;
use crate::scanner::{Group, Node};
use crate::signature::match_arguments;
use crate::special::SpecialCall;

/// Trait for rendering tree nodes to SQL.
pub trait ToSql {
    /// Render this node verbatim.
    fn to_sql(&self) -> String;
}

impl ToSql for Node<'_> {
    fn to_sql(&self) -> String {
        match self {
            Node::Text(text) => text.to_string(),
            Node::Comma => ",".to_string(),
            Node::Group(group) => group.to_sql(),
        }
    }
}

impl ToSql for Group<'_> {
    fn to_sql(&self) -> String {
        let mut sql = String::new();
        sql.push_str(self.name.unwrap_or_default());
        sql.push_str(self.gap);
        sql.push(self.delimiter.open());
        sql.push_str(&self.children.to_sql());
        sql.push(self.delimiter.close());
        sql
    }
}

impl ToSql for [Node<'_>] {
    fn to_sql(&self) -> String {
        self.iter().map(|node| node.to_sql()).collect()
    }
}

/// A translated call and the kind of value it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub sql: String,
    pub kind: ArgKind,
}

/// Rewrites ruled calls using a registry.
#[derive(Debug, Clone, Copy)]
pub struct CallRewriter<'r> {
    registry: &'r RuleRegistry,
}

/// A group being rendered: the root, a pass-through group or a ruled call.
struct Open<'n, 'a, 'r> {
    group: Option<&'n Group<'a>>,
    rule: Option<&'r Rule>,
    nodes: slice::Iter<'n, Node<'a>>,
    /// Output so far; for a ruled call, the current argument only.
    out: String,
    arguments: Vec<Argument>,
    /// Kind of the last ruled call written into `out`.
    returned: Option<ArgKind>,
    groups: usize,
    has_text: bool,
}

impl<'n, 'a, 'r> Open<'n, 'a, 'r> {
    fn root(nodes: &'n [Node<'a>]) -> Self {
        Self {
            group: None,
            rule: None,
            nodes: nodes.iter(),
            out: String::new(),
            arguments: Vec::new(),
            returned: None,
            groups: 0,
            has_text: false,
        }
    }

    fn group(group: &'n Group<'a>, rule: Option<&'r Rule>) -> Self {
        let mut open = Self::root(&group.children);
        open.group = Some(group);
        open.rule = rule;
        if rule.is_none() {
            open.out.push_str(group.name.unwrap_or_default());
            open.out.push_str(group.gap);
            open.out.push(group.delimiter.open());
        }
        open
    }

    fn push_text(&mut self, text: &str) {
        self.has_text |= !text.trim().is_empty();
        self.out.push_str(text);
    }

    fn push_comma(&mut self) {
        if self.rule.is_some() {
            self.finish_argument();
        } else {
            self.out.push(',');
        }
    }

    fn push_group(&mut self, sql: &str, kind: Option<ArgKind>) {
        self.groups += 1;
        self.returned = kind;
        self.out.push_str(sql);
    }

    /// An argument that is exactly one ruled call takes that call's kind;
    /// anything else is classified by its text.
    fn finish_argument(&mut self) {
        let text = self.out.trim().to_string();
        let returned = self.returned.take().filter(|_| self.groups == 1 && !self.has_text);
        let argument = match returned {
            Some(kind) => Argument::with_kind(text, kind),
            None => Argument::new(text),
        };
        self.arguments.push(argument);
        self.out.clear();
        self.groups = 0;
        self.has_text = false;
    }

    /// Close the group, returning its SQL and, for ruled calls, its kind.
    fn close(mut self) -> TranslateResult<(String, Option<ArgKind>)> {
        let (Some(group), Some(rule)) = (self.group, self.rule) else {
            if let Some(group) = self.group {
                self.out.push(group.delimiter.close());
            }
            return Ok((self.out, None));
        };

        self.finish_argument();
        if self.arguments.len() == 1 && self.arguments[0].text.is_empty() {
            self.arguments.clear();
        }
        let rendered = rewrite_call(rule, &self.arguments, group.gap)?;
        tracing::debug!(
            "Rewrote {} at {}..{} -> {}",
            rule.name,
            group.span.start,
            group.span.end,
            rendered.sql
        );
        Ok((rendered.sql, Some(rendered.kind)))
    }
}

impl<'r> CallRewriter<'r> {
    pub fn new(registry: &'r RuleRegistry) -> Self {
        Self { registry }
    }

    /// Render the tree with every ruled call translated.
    pub fn rewrite(&self, nodes: &[Node<'_>]) -> TranslateResult<String> {
        let mut stack = vec![Open::root(nodes)];
        while let Some(open) = stack.last_mut() {
            match open.nodes.next() {
                Some(Node::Text(text)) => open.push_text(text),
                Some(Node::Comma) => open.push_comma(),
                Some(Node::Group(group)) => stack.push(Open::group(group, self.rule_for(group))),
                None => {
                    let Some(done) = stack.pop() else {
                        break;
                    };
                    let (sql, kind) = done.close()?;
                    match stack.last_mut() {
                        Some(parent) => parent.push_group(&sql, kind),
                        None => return Ok(sql),
                    }
                }
            }
        }
        Ok(String::new())
    }

    fn rule_for(&self, group: &Group<'_>) -> Option<&'r Rule> {
        group
            .name
            .filter(|_| group.is_call())
            .and_then(|name| self.registry.lookup(name))
    }
}

/// Translate one call whose arguments are already rewritten.
///
/// Arguments are matched to the signature, coerced to their slot types and
/// run through the compositions; a rule with a handler renders the result
/// itself. `gap` is the whitespace the source placed between the name and `(`.
pub fn rewrite_call(rule: &Rule, arguments: &[Argument], gap: &str) -> TranslateResult<Rendered> {
    let returns = ArgKind::returned(&rule.returns);
    let Some(signature) = &rule.signature else {
        if !arguments.is_empty() {
            return Err(TranslateError::arity(
                &rule.name,
                "0 argument(s)",
                arguments.len(),
            ));
        }
        return Ok(Rendered {
            sql: rule.translation.clone(),
            kind: returns,
        });
    };

    let (modifier, arguments) = detach_distinct(arguments);
    let matched = match_arguments(&rule.name, signature, &arguments)?;
    let coerced = matched
        .iter()
        .map(|slot| coerce(&rule.name, &slot.argument, slot.data_type))
        .collect::<TranslateResult<Vec<_>>>()?;
    let mut composed = apply_compositions(&rule.name, &rule.compositions, &coerced)?;
    if let (Some(modifier), Some(first)) = (modifier, composed.first_mut()) {
        *first = format!("{} {}", modifier, first);
    }

    if let Some(handler) = rule.handler {
        return handler.render(&SpecialCall {
            rule,
            gap,
            inputs: &arguments,
            outputs: &composed,
        });
    }
    Ok(Rendered {
        sql: format!("{}{}({})", rule.translation, gap, composed.join(", ")),
        kind: returns,
    })
}

/// Split a leading `DISTINCT` off the first argument, keeping its casing.
fn detach_distinct(arguments: &[Argument]) -> (Option<&'static str>, Vec<Argument>) {
    let mut arguments = arguments.to_vec();
    let modifier = arguments
        .first()
        .and_then(|first| distinct_modifier(&first.text));
    if let Some(modifier) = modifier {
        let rest = arguments[0].text[modifier.len()..].trim_start().to_string();
        arguments[0] = Argument::new(rest);
    }
    (modifier, arguments)
}

fn distinct_modifier(argument: &str) -> Option<&'static str> {
    let prefix = argument.get(..8)?;
    if !prefix.eq_ignore_ascii_case("distinct") || !argument[8..].starts_with(char::is_whitespace) {
        return None;
    }
    Some(if prefix == "DISTINCT" { "DISTINCT" } else { "distinct" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Scanner;
    use pretty_assertions::assert_eq;

    fn registry() -> RuleRegistry {
        RuleRegistry::from_json_str(
            "test.json",
            r#"{
                "datediff": {
                    "translation": "date_diff",
                    "returns": "bigint",
                    "signature": [
                        {"input_argument_nb": "'day'"},
                        {"input_argument_nb": 1},
                        {"input_argument_nb": 0}
                    ],
                    "compositions": [
                        {"formula": "cast(cast({arg} AS timestamp) AS date)", "args": [1, "end"]}
                    ]
                },
                "count": {
                    "translation": "count",
                    "returns": "bigint",
                    "signature": [{"input_argument_nb": "unlimited"}],
                    "compositions": [
                        {"formula": "|| ' ' || {arg}", "args": [1, "end"]},
                        {"formula": "{arg}", "args": "all", "merged": true}
                    ]
                },
                "to_date": {
                    "translation": "date",
                    "returns": "date",
                    "signature": [{"input_argument_nb": 0}]
                },
                "current_date": {
                    "translation": "current_date",
                    "returns": "date"
                }
            }"#,
        )
        .unwrap()
    }

    fn rewrite(sql: &str) -> TranslateResult<String> {
        let registry = registry();
        let nodes = Scanner::default().scan(sql)?;
        CallRewriter::new(&registry).rewrite(&nodes)
    }

    #[test]
    fn test_unknown_calls_pass_through() {
        let sql = "SELECT Upper(a), [1, 2], (b + c) FROM t";
        assert_eq!(rewrite(sql).unwrap(), sql);
    }

    #[test]
    fn test_nested_rewrite() {
        assert_eq!(
            rewrite("select datediff(to_date(a), b) from t").unwrap(),
            "select date_diff('day', cast(cast(b AS timestamp) AS date), cast(cast(date(a) AS timestamp) AS date)) from t"
        );
    }

    #[test]
    fn test_name_lookup_is_case_insensitive() {
        assert_eq!(rewrite("select TO_DATE(a)").unwrap(), "select date(a)");
    }

    #[test]
    fn test_gap_is_preserved() {
        assert_eq!(rewrite("to_date  (a)").unwrap(), "date  (a)");
    }

    #[test]
    fn test_count_distinct() {
        assert_eq!(
            rewrite("count(distinct st, st2)").unwrap(),
            "count(distinct st || ' ' || st2)"
        );
        assert_eq!(
            rewrite("count(DISTINCT 'Hello world!')").unwrap(),
            "count(DISTINCT 'Hello world!')"
        );
        assert_eq!(rewrite("count(*)").unwrap(), "count(*)");
    }

    #[test]
    fn test_no_signature_rule() {
        assert_eq!(rewrite("select current_date()").unwrap(), "select current_date");
        assert!(matches!(
            rewrite("select current_date(1)"),
            Err(TranslateError::Arity { .. })
        ));
    }

    #[test]
    fn test_arity_error_names_function() {
        match rewrite("datediff(a)") {
            Err(TranslateError::Arity { function, found, .. }) => {
                assert_eq!(function, "datediff");
                assert_eq!(found, 1);
            }
            other => panic!("expected arity error, got {:?}", other),
        }
    }

    #[test]
    fn test_detach_distinct() {
        let args = vec![Argument::new("distinct  a"), Argument::new("b")];
        let (modifier, rest) = detach_distinct(&args);
        assert_eq!(modifier, Some("distinct"));
        assert_eq!(rest, vec![Argument::new("a"), Argument::new("b")]);

        let (_, rest) = detach_distinct(&[Argument::new("DISTINCT 4")]);
        assert_eq!(rest[0].kind, ArgKind::IntegerLiteral);

        assert_eq!(detach_distinct(&[Argument::new("distinction")]).0, None);
    }

    fn typed_registry() -> RuleRegistry {
        RuleRegistry::from_json_str(
            "typed.json",
            r#"{
                "lcase": {
                    "translation": "lower",
                    "returns": "varchar",
                    "signature": [{"input_argument_nb": 0, "data_type": "varchar"}]
                },
                "concat": {
                    "translation": "concat",
                    "returns": "varchar",
                    "signature": [{"input_argument_nb": "unlimited", "data_type": "varchar"}]
                },
                "lag": {
                    "translation": "lag",
                    "returns": "any",
                    "signature": [
                        {"input_argument_nb": 0, "data_type": "any"},
                        {"input_argument_nb": 1, "data_type": "bigint", "optional": true}
                    ]
                }
            }"#,
        )
        .unwrap()
    }

    fn rewrite_typed(sql: &str) -> TranslateResult<String> {
        let registry = typed_registry();
        let nodes = Scanner::default().scan(sql)?;
        CallRewriter::new(&registry).rewrite(&nodes)
    }

    #[test]
    fn test_arguments_are_coerced_to_slot_types() {
        assert_eq!(
            rewrite_typed("select concat(a, 4, 'x')").unwrap(),
            "select concat(cast(a AS varchar), '4', 'x')"
        );
        assert_eq!(rewrite_typed("lag(a, '2')").unwrap(), "lag(a, 2)");
        assert!(matches!(
            rewrite_typed("lag(a, '3.5')"),
            Err(TranslateError::Coercion { .. })
        ));
    }

    #[test]
    fn test_nested_call_kind_skips_cast() {
        assert_eq!(
            rewrite_typed("concat(lcase(a), b)").unwrap(),
            "concat(lower(cast(a AS varchar)), cast(b AS varchar))"
        );
        // Anything beyond the single call is classified by its text.
        assert_eq!(
            rewrite_typed("concat(lcase(a) || 'x')").unwrap(),
            "concat(cast(lower(cast(a AS varchar)) || 'x' AS varchar))"
        );
        assert_eq!(
            rewrite_typed("concat((a), upper(b))").unwrap(),
            "concat(cast((a) AS varchar), cast(upper(b) AS varchar))"
        );
    }

    #[test]
    fn test_rewrite_call_reports_kind() {
        let rule = typed_registry().lookup("lcase").cloned().unwrap();
        let rendered = rewrite_call(&rule, &[Argument::new("'A'")], "").unwrap();
        assert_eq!(rendered.sql, "lower('A')");
        assert_eq!(rendered.kind, ArgKind::returned("varchar"));
    }

    #[test]
    fn test_to_sql_is_verbatim() {
        let sql = "f (a, [b,c]) -- (x\n";
        let nodes = Scanner::default().scan(sql).unwrap();
        assert_eq!(nodes.to_sql(), sql);
    }
}
