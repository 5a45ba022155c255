//! Composition formula templates.
//!
//! A formula is a string template with two placeholders:
//!
//! ```text
//! cast(cast({arg} AS timestamp) AS date)
//!           ──┬──
//!             └── the selected slot (or the joined selection)
//!
//! mod({args[0]}, {args[1]}) + {args[1]}
//!     ────┬────
//!         └── slot 0 of the target-ordered argument list
//! ```
//!
//! `{{` and `}}` stand for literal braces. Templates are parsed once, when the
//! rule document is loaded, into a closed [`FormulaExpr`].

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1},
    combinator::{map, map_res, value},
    multi::many0,
    sequence::delimited,
    IResult,
};

/// Closed expression form of a formula template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaExpr {
    /// `{args[i]}`
    ArgumentReference(usize),
    /// `{arg}`
    AllArguments,
    Literal(String),
    Concatenation(Vec<FormulaExpr>),
}

impl FormulaExpr {
    fn render_into(&self, arg: &str, args: &[String], out: &mut String) -> Result<(), usize> {
        match self {
            FormulaExpr::ArgumentReference(i) => out.push_str(args.get(*i).ok_or(*i)?),
            FormulaExpr::AllArguments => out.push_str(arg),
            FormulaExpr::Literal(text) => out.push_str(text),
            FormulaExpr::Concatenation(parts) => {
                for part in parts {
                    part.render_into(arg, args, out)?;
                }
            }
        }
        Ok(())
    }

    fn max_reference(&self) -> Option<usize> {
        match self {
            FormulaExpr::ArgumentReference(i) => Some(*i),
            FormulaExpr::Concatenation(parts) => {
                parts.iter().filter_map(|p| p.max_reference()).max()
            }
            _ => None,
        }
    }
}

/// A parsed formula together with its source template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formula {
    source: String,
    expr: FormulaExpr,
}

impl Formula {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &FormulaExpr {
        &self.expr
    }

    /// An empty formula drops the slots it is applied to.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Highest `{args[i]}` index referenced, if any.
    pub fn max_reference(&self) -> Option<usize> {
        self.expr.max_reference()
    }

    /// Render with `{arg}` bound to `arg` and `{args[i]}` to `args[i]`.
    ///
    /// Fails with the offending index when a reference is out of range.
    pub fn render(&self, arg: &str, args: &[String]) -> Result<String, usize> {
        let mut out = String::with_capacity(self.source.len() + arg.len());
        self.expr.render_into(arg, args, &mut out)?;
        Ok(out)
    }
}

/// Parse a formula template.
pub fn parse_formula(input: &str) -> Result<Formula, String> {
    match many0(parse_part)(input) {
        Ok(("", parts)) => Ok(Formula {
            source: input.to_string(),
            expr: FormulaExpr::Concatenation(merge_literals(parts)),
        }),
        Ok((remaining, _)) => Err(format!(
            "unexpected '{}' at position {} in formula '{}'",
            remaining.chars().next().unwrap_or_default(),
            input.len() - remaining.len(),
            input
        )),
        Err(e) => Err(format!("failed to parse formula '{}': {:?}", input, e)),
    }
}

/// Parse one template part: an escaped brace, a placeholder, or literal text.
fn parse_part(input: &str) -> IResult<&str, FormulaExpr> {
    alt((
        value(FormulaExpr::Literal("{".to_string()), tag("{{")),
        value(FormulaExpr::Literal("}".to_string()), tag("}}")),
        parse_placeholder,
        map(take_while1(|c| c != '{' && c != '}'), |s: &str| {
            FormulaExpr::Literal(s.to_string())
        }),
    ))(input)
}

/// Parse `{arg}` or `{args[N]}`.
fn parse_placeholder(input: &str) -> IResult<&str, FormulaExpr> {
    delimited(
        char('{'),
        alt((
            // `args[` before `arg`, which is its prefix
            map(
                delimited(tag("args["), map_res(digit1, str::parse::<usize>), char(']')),
                FormulaExpr::ArgumentReference,
            ),
            value(FormulaExpr::AllArguments, tag("arg")),
        )),
        char('}'),
    )(input)
}

fn merge_literals(parts: Vec<FormulaExpr>) -> Vec<FormulaExpr> {
    let mut merged: Vec<FormulaExpr> = Vec::with_capacity(parts.len());
    for part in parts {
        if let (Some(FormulaExpr::Literal(prev)), FormulaExpr::Literal(text)) =
            (merged.last_mut(), &part)
        {
            prev.push_str(text);
            continue;
        }
        merged.push(part);
    }
    merged
}
