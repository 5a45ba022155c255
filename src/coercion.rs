//! Argument typing and coercion.
//!
//! Every argument reaching a ruled call carries a coarse [`ArgKind`]: the
//! literal form it was written in, or the declared return type of the
//! translated call that produced it. A signature slot with a data type other
//! than `any` converts arguments of any other kind:
//!
//! | Argument            | Slot type        | Result                                  |
//! |---------------------|------------------|-----------------------------------------|
//! | `'5'`               | `bigint`/`double`| `5` (must read back unchanged)          |
//! | `4`, `1.5`          | `varchar`        | `'4'`, `'1.5'`                          |
//! | anything            | `date`           | `cast(cast(x AS timestamp) AS date)`    |
//! | anything            | other `T`        | `cast(x AS T)`                          |

use crate::error::{TranslateError, TranslateResult};
use crate::scanner::is_quoted_literal;

/// What is known about an argument's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    /// A single `'...'` or `"..."` literal.
    StringLiteral,
    /// An integer literal such as `4` or `-1`.
    IntegerLiteral,
    /// A decimal literal such as `3.1415` or `1e3`.
    FloatLiteral,
    /// Produced by a translated call declaring this return type.
    Typed(String),
    Unknown,
}

impl ArgKind {
    /// Classify argument text by its literal form.
    pub fn infer(text: &str) -> Self {
        if is_quoted_literal(text) {
            ArgKind::StringLiteral
        } else if is_integer_literal(text) {
            ArgKind::IntegerLiteral
        } else if is_float_literal(text) {
            ArgKind::FloatLiteral
        } else {
            ArgKind::Unknown
        }
    }

    /// Kind of a value returned by a call declaring `returns`.
    pub fn returned(returns: &str) -> Self {
        ArgKind::Typed(returns.to_lowercase())
    }

    /// Whether an argument of this kind fits `data_type` without conversion.
    pub fn satisfies(&self, data_type: &str) -> bool {
        match self {
            ArgKind::StringLiteral => data_type == "varchar",
            ArgKind::IntegerLiteral => data_type == "bigint",
            ArgKind::FloatLiteral => data_type == "double",
            ArgKind::Typed(returns) => returns == data_type,
            ArgKind::Unknown => false,
        }
    }
}

/// A rendered argument and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub text: String,
    pub kind: ArgKind,
}

impl Argument {
    /// An argument whose kind is inferred from its text.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = ArgKind::infer(&text);
        Self { text, kind }
    }

    pub fn with_kind(text: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }
}

/// Normalise a declared slot type; `any` and blanks accept every argument.
pub fn slot_type(declared: Option<&str>) -> Option<String> {
    let declared = declared?.trim().to_lowercase();
    (!declared.is_empty() && declared != "any").then_some(declared)
}

/// Render `argument` as `data_type` requires.
pub fn coerce(
    function: &str,
    argument: &Argument,
    data_type: Option<&str>,
) -> TranslateResult<String> {
    let Some(data_type) = data_type else {
        return Ok(argument.text.clone());
    };
    if argument.kind.satisfies(data_type) {
        return Ok(argument.text.clone());
    }

    match (&argument.kind, data_type) {
        (ArgKind::StringLiteral, "bigint" | "double") => {
            string_to_number(function, &argument.text, data_type)
        }
        (ArgKind::IntegerLiteral | ArgKind::FloatLiteral, "varchar") => {
            Ok(format!("'{}'", argument.text))
        }
        (_, "date") => Ok(format!("cast(cast({} AS timestamp) AS date)", argument.text)),
        _ => Ok(format!("cast({} AS {})", argument.text, data_type)),
    }
}

/// Unquote a string literal that spells a number of the required type.
fn string_to_number(function: &str, literal: &str, data_type: &str) -> TranslateResult<String> {
    let value = &literal[1..literal.len() - 1];
    let valid = match data_type {
        "bigint" => is_integer_literal(value) && value.parse::<i64>().is_ok(),
        _ => is_float_literal(value) && value.parse::<f64>().is_ok(),
    };
    if valid {
        Ok(value.to_string())
    } else {
        Err(TranslateError::Coercion {
            function: function.to_string(),
            value: literal.to_string(),
            data_type: data_type.to_string(),
        })
    }
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_float_literal(text: &str) -> bool {
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let (mantissa, exponent) = match unsigned.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, Some(exponent)),
        None => (unsigned, None),
    };
    let exponent_ok = exponent.is_none_or(|exponent| is_integer_literal(exponent));
    let mantissa_ok = match mantissa.split_once('.') {
        Some((whole, fraction)) => {
            let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
            digits(whole) && digits(fraction) && !(whole.is_empty() && fraction.is_empty())
        }
        None => exponent.is_some() && is_integer_literal(mantissa),
    };
    mantissa_ok && exponent_ok
}
