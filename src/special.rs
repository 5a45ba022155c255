//! Function-specific renderings.
//!
//! A rule names one of these in its `handler` field when its target cannot be
//! written as `translation(args)`. The handler runs after coercion and
//! compositions and sees both the source arguments and the finished target
//! arguments.

use crate::coercion::{coerce, ArgKind, Argument};
use crate::error::{TranslateError, TranslateResult};
use crate::rewriter::Rendered;
use crate::rule::Rule;
use crate::scanner::keyword_positions;

/// Java `SimpleDateFormat` fields and their Presto `date_format` equivalents.
const DATETIME_FIELDS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("y", "%Y"),
    ("MMMM", "%M"),
    ("MMM", "%b"),
    ("MM", "%m"),
    ("M", "%c"),
    ("dd", "%d"),
    ("d", "%e"),
    ("DDD", "%j"),
    ("D", "%j"),
    ("HH", "%k"),
    ("H", "%k"),
    ("hh", "%h"),
    ("h", "%l"),
    ("mm", "%i"),
    ("m", "%i"),
    ("ss", "%s"),
    ("s", "%s"),
    ("SSS", "%f"),
    ("a", "%p"),
    ("EEEE", "%W"),
];

/// Time zone abbreviations accepted by Hive, as region names.
const TIME_ZONES: &[(&str, &str)] = &[
    ("PST", "America/Los_Angeles"),
    ("PDT", "America/Los_Angeles"),
    ("MST", "America/Denver"),
    ("MDT", "America/Denver"),
    ("CST", "America/Chicago"),
    ("CDT", "America/Chicago"),
    ("EST", "America/New_York"),
    ("EDT", "America/New_York"),
    ("AKST", "America/Anchorage"),
    ("HST", "Pacific/Honolulu"),
    ("GMT", "UTC"),
    ("UTC", "UTC"),
    ("BST", "Europe/London"),
    ("CET", "Europe/Paris"),
    ("IST", "Asia/Kolkata"),
    ("JST", "Asia/Tokyo"),
];

/// Fields `extract` passes through unchanged.
const EXTRACT_FIELDS: &[&str] = &[
    "day", "hour", "minute", "month", "quarter", "second", "week", "year",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    /// `cast(x as T)`, with Hive's `string` spelled `varchar`.
    Cast,
    /// `date_format(ts, 'java pattern')`.
    DateFormat,
    /// `extract(field from ts)`.
    Extract,
    /// `format_number(x, places)` and `format_number(x, '000')`.
    FormatNumber,
    /// `from_utc_timestamp(ts, 'zone')`.
    FromUtcTimestamp,
    /// `unix_timestamp()`, `unix_timestamp(ts)` and `unix_timestamp(s, pattern)`.
    UnixTimestamp,
}

impl Handler {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cast" => Some(Handler::Cast),
            "date_format" => Some(Handler::DateFormat),
            "extract" => Some(Handler::Extract),
            "format_number" => Some(Handler::FormatNumber),
            "from_utc_timestamp" => Some(Handler::FromUtcTimestamp),
            "unix_timestamp" => Some(Handler::UnixTimestamp),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Handler::Cast => "cast",
            Handler::DateFormat => "date_format",
            Handler::Extract => "extract",
            Handler::FormatNumber => "format_number",
            Handler::FromUtcTimestamp => "from_utc_timestamp",
            Handler::UnixTimestamp => "unix_timestamp",
        }
    }

    pub fn render(&self, call: &SpecialCall<'_>) -> TranslateResult<Rendered> {
        match self {
            Handler::Cast => cast(call),
            Handler::DateFormat => date_format(call),
            Handler::Extract => extract(call),
            Handler::FormatNumber => format_number(call),
            Handler::FromUtcTimestamp => from_utc_timestamp(call),
            Handler::UnixTimestamp => unix_timestamp(call),
        }
    }
}

/// A ruled call handed to a [`Handler`].
#[derive(Debug)]
pub struct SpecialCall<'a> {
    pub rule: &'a Rule,
    /// Whitespace the source placed between the name and `(`.
    pub gap: &'a str,
    /// Source arguments after nested rewriting, before coercion.
    pub inputs: &'a [Argument],
    /// Target arguments after coercion and compositions.
    pub outputs: &'a [String],
}

impl SpecialCall<'_> {
    fn unsupported(&self, message: impl Into<String>) -> TranslateError {
        TranslateError::unsupported(&self.rule.name, message)
    }

    fn returning(&self, sql: String) -> Rendered {
        Rendered {
            sql,
            kind: ArgKind::returned(&self.rule.returns),
        }
    }

    /// `translation(outputs...)`, the plain rendering.
    fn call(&self, outputs: &[String]) -> String {
        format!("{}{}({})", self.rule.translation, self.gap, outputs.join(", "))
    }
}

fn cast(call: &SpecialCall<'_>) -> TranslateResult<Rendered> {
    let [expression] = call.outputs else {
        return Err(call.unsupported("expected a single 'expression AS type' argument"));
    };
    let Some(at) = keyword_positions(expression, "as")?.last().copied() else {
        return Err(call.unsupported(format!("no target type in '{}'", expression)));
    };
    let value = expression[..at].trim_end();
    let target = expression[at + 2..].trim().to_lowercase();
    if value.is_empty() || target.is_empty() {
        return Err(call.unsupported(format!("incomplete cast '{}'", expression)));
    }
    let target = if target == "string" {
        "varchar".to_string()
    } else {
        target
    };

    Ok(Rendered {
        sql: format!("{}{}({} AS {})", call.rule.translation, call.gap, value, target),
        kind: ArgKind::Typed(target),
    })
}

fn date_format(call: &SpecialCall<'_>) -> TranslateResult<Rendered> {
    let [value, pattern] = call.outputs else {
        return Err(call.unsupported("expected a value and a pattern"));
    };
    if pattern == "'u'" {
        return Ok(call.returning(day_of_week(&format!("day_of_week({})", value))));
    }
    let pattern = translate_datetime_pattern(&call.rule.name, pattern)?;
    Ok(call.returning(call.call(&[value.clone(), pattern])))
}

fn extract(call: &SpecialCall<'_>) -> TranslateResult<Rendered> {
    let [expression] = call.outputs else {
        return Err(call.unsupported("expected a single 'field FROM value' argument"));
    };
    let Some(at) = keyword_positions(expression, "from")?.first().copied() else {
        return Err(call.unsupported(format!("no FROM in '{}'", expression)));
    };
    let field = expression[..at].trim().to_lowercase();
    let source = Argument::new(expression[at + 4..].trim());
    let source = coerce(&call.rule.name, &source, Some("timestamp"))?;

    if field == "dayofweek" {
        return Ok(call.returning(day_of_week(&format!(
            "extract(day_of_week from {})",
            source
        ))));
    }
    if !EXTRACT_FIELDS.contains(&field.as_str()) {
        return Err(call.unsupported(format!("unknown field '{}'", field)));
    }
    Ok(call.returning(format!(
        "{}{}({} from {})",
        call.rule.translation, call.gap, field, source
    )))
}

fn format_number(call: &SpecialCall<'_>) -> TranslateResult<Rendered> {
    let [value, places] = call.inputs else {
        return Err(call.unsupported("expected a value and a format"));
    };
    match places.kind {
        ArgKind::IntegerLiteral => Ok(call.returning(format!(
            "cast(cast({} AS double) AS varchar)",
            call.call(call.outputs)
        ))),
        ArgKind::StringLiteral => {
            let zeros = &places.text[1..places.text.len() - 1];
            if zeros.is_empty() || zeros.bytes().any(|b| b != b'0') {
                return Err(call.unsupported(format!(
                    "only zero padding formats are supported, found {}",
                    places.text
                )));
            }
            Ok(call.returning(format!(
                "lpad(cast({}{}({}) AS varchar), {}, '0')",
                call.rule.translation,
                call.gap,
                value.text,
                zeros.len()
            )))
        }
        _ => Err(call.unsupported(format!(
            "the format must be an integer or a string literal, found {}",
            places.text
        ))),
    }
}

fn from_utc_timestamp(call: &SpecialCall<'_>) -> TranslateResult<Rendered> {
    let [value, zone] = call.outputs else {
        return Err(call.unsupported("expected a value and a time zone"));
    };
    let zone = time_zone(&call.rule.name, zone)?;
    Ok(call.returning(format!(
        "{}{}(cast({} as timestamp) AT TIME ZONE {} AS timestamp)",
        call.rule.translation, call.gap, value, zone
    )))
}

fn unix_timestamp(call: &SpecialCall<'_>) -> TranslateResult<Rendered> {
    let inner = match call.inputs {
        [] => call.call(&["cast(current_timestamp AS timestamp)".to_string()]),
        [_] => call.call(call.outputs),
        [value, pattern] => {
            let pattern = translate_datetime_pattern(&call.rule.name, &pattern.text)?;
            call.call(&[format!("date_parse({}, {})", value.text, pattern)])
        }
        _ => return Err(call.unsupported("expected at most a value and a pattern")),
    };
    Ok(call.returning(format!("cast({} AS bigint)", inner)))
}

/// Hive numbers days from Sunday = 1, Presto from Monday = 1.
fn day_of_week(expression: &str) -> String {
    format!("case when {0} = 7 then 1 else {0} + 1 end", expression)
}

/// Rewrite a quoted Java date pattern such as `'yyyy-MM-dd HH:mm:ss'` into
/// Presto's `'%Y-%m-%d %k:%i:%s'`.
///
/// Each run of one repeated letter is one field; everything else is copied.
pub fn translate_datetime_pattern(function: &str, literal: &str) -> TranslateResult<String> {
    let Some(pattern) = literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    else {
        return Err(TranslateError::unsupported(
            function,
            format!("the pattern must be a string literal, found {}", literal),
        ));
    };

    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('\'');
    let mut rest = pattern;
    while let Some(first) = rest.chars().next() {
        let run = rest.len() - rest.trim_start_matches(first).len();
        let (token, tail) = rest.split_at(run);
        if first.is_ascii_alphabetic() {
            let Some((_, field)) = DATETIME_FIELDS.iter().find(|(java, _)| *java == token) else {
                return Err(TranslateError::unsupported(
                    function,
                    format!("no translation for '{}' in {}", token, literal),
                ));
            };
            out.push_str(field);
        } else {
            out.push_str(token);
        }
        rest = tail;
    }
    out.push('\'');
    Ok(out)
}

fn time_zone(function: &str, literal: &str) -> TranslateResult<String> {
    let Some(zone) = literal
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    else {
        return Err(TranslateError::unsupported(
            function,
            format!("the time zone must be a string literal, found {}", literal),
        ));
    };
    if zone.contains('/') {
        return Ok(literal.to_string());
    }
    TIME_ZONES
        .iter()
        .find(|(abbreviation, _)| abbreviation.eq_ignore_ascii_case(zone))
        .map(|(_, region)| format!("'{}'", region))
        .ok_or_else(|| {
            TranslateError::unsupported(function, format!("unknown time zone {}", literal))
        })
}
