//! Rule registry.
//!
//! Loads rule documents (JSON objects keyed by lower-case source function
//! name), validates every entry into a [`Rule`] and merges the documents into
//! one immutable, case-insensitive lookup table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use walkdir::WalkDir;

use crate::coercion::slot_type;
use crate::error::{TranslateError, TranslateResult};
use crate::formula::parse_formula;
use crate::rule::{
    CompositionMode, CompositionStep, ParamSpec, Rule, RuleExample, Selection, Signature,
};
use crate::special::Handler;

/// Dictionaries compiled into the crate, as `(origin, json)` pairs.
const HIVE_TO_PRESTO: &[(&str, &str)] = &[
    (
        "hive_to_presto/aggregate.json",
        include_str!("../dictionaries/hive_to_presto/aggregate.json"),
    ),
    (
        "hive_to_presto/array.json",
        include_str!("../dictionaries/hive_to_presto/array.json"),
    ),
    (
        "hive_to_presto/conversion.json",
        include_str!("../dictionaries/hive_to_presto/conversion.json"),
    ),
    (
        "hive_to_presto/conditional.json",
        include_str!("../dictionaries/hive_to_presto/conditional.json"),
    ),
    (
        "hive_to_presto/datetime.json",
        include_str!("../dictionaries/hive_to_presto/datetime.json"),
    ),
    (
        "hive_to_presto/math.json",
        include_str!("../dictionaries/hive_to_presto/math.json"),
    ),
    (
        "hive_to_presto/string.json",
        include_str!("../dictionaries/hive_to_presto/string.json"),
    ),
    (
        "hive_to_presto/window.json",
        include_str!("../dictionaries/hive_to_presto/window.json"),
    ),
];

// Raw document shapes, as written in the JSON files.

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    translation: String,
    returns: String,
    #[serde(default)]
    signature: Option<Vec<RawParam>>,
    #[serde(default)]
    compositions: Vec<RawComposition>,
    #[serde(default)]
    handler: Option<String>,
    #[serde(default)]
    examples: Vec<RuleExample>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParam {
    input_argument_nb: RawSlot,
    /// Type the argument is coerced to; `any` or absent accepts anything.
    #[serde(default)]
    data_type: Option<String>,
    #[serde(default)]
    optional: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSlot {
    Index(usize),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawComposition {
    formula: String,
    args: RawTargets,
    #[serde(default)]
    as_group: bool,
    #[serde(default)]
    merged: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTargets {
    Keyword(String),
    List(Vec<RawSlot>),
}

/// One parsed rule document, not yet merged.
#[derive(Debug, Clone)]
pub struct RuleDocument {
    origin: String,
    rules: Vec<Rule>,
}

impl RuleDocument {
    /// Parse and validate a document. `origin` names it in error messages.
    pub fn from_json_str(origin: impl Into<String>, json: &str) -> TranslateResult<Self> {
        let origin = origin.into();
        let raw: BTreeMap<String, RawRule> = serde_json::from_str(json)
            .map_err(|e| TranslateError::schema(&origin, e.to_string()))?;

        let mut rules = Vec::with_capacity(raw.len());
        for (name, entry) in raw {
            if name != name.to_lowercase() {
                return Err(TranslateError::schema(
                    &origin,
                    format!("rule name '{}' must be lower-case", name),
                ));
            }
            let rule = validate_rule(name, entry)
                .map_err(|message| TranslateError::schema(&origin, message))?;
            rules.push(rule);
        }
        tracing::debug!("Loaded {} rule(s) from '{}'", rules.len(), origin);
        Ok(Self { origin, rules })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// Immutable, case-insensitive mapping from source function name to rule.
#[derive(Debug, Clone, Default)]
pub struct RuleRegistry {
    rules: HashMap<String, Rule>,
}

impl RuleRegistry {
    /// Merge documents, failing if a name is defined twice.
    pub fn from_documents(
        documents: impl IntoIterator<Item = RuleDocument>,
    ) -> TranslateResult<Self> {
        let mut rules: HashMap<String, Rule> = HashMap::new();
        let mut origins: HashMap<String, String> = HashMap::new();
        for document in documents {
            for rule in document.rules {
                if let Some(first) = origins.get(&rule.name) {
                    return Err(TranslateError::DuplicateRule {
                        name: rule.name,
                        first: first.clone(),
                        second: document.origin,
                    });
                }
                origins.insert(rule.name.clone(), document.origin.clone());
                rules.insert(rule.name.clone(), rule);
            }
        }
        tracing::info!("Rule registry built with {} rule(s)", rules.len());
        Ok(Self { rules })
    }

    /// Build a registry from a single JSON document.
    pub fn from_json_str(origin: &str, json: &str) -> TranslateResult<Self> {
        Self::from_documents([RuleDocument::from_json_str(origin, json)?])
    }

    /// The bundled Hive to Presto dictionary.
    pub fn hive_to_presto() -> TranslateResult<Self> {
        Self::from_documents(builtin_documents()?)
    }

    /// Load a single JSON file, or every `*.json` file under a directory.
    pub fn load_path(path: impl AsRef<Path>) -> TranslateResult<Self> {
        Self::from_documents(read_documents(path.as_ref())?)
    }

    /// Look up a rule by source function name, ignoring case.
    pub fn lookup(&self, name: &str) -> Option<&Rule> {
        self.rules.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        let mut rules: Vec<&Rule> = self.rules.values().collect();
        rules.sort_by(|a, b| a.name.cmp(&b.name));
        rules.into_iter()
    }
}

/// Parse the bundled dictionary documents.
pub fn builtin_documents() -> TranslateResult<Vec<RuleDocument>> {
    HIVE_TO_PRESTO
        .iter()
        .map(|(origin, json)| RuleDocument::from_json_str(*origin, json))
        .collect()
}

/// Read one file or every `*.json` file below a directory, in path order.
pub fn read_documents(path: &Path) -> TranslateResult<Vec<RuleDocument>> {
    if path.is_file() {
        let json = fs::read_to_string(path)?;
        return Ok(vec![RuleDocument::from_json_str(path.display().to_string(), &json)?]);
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| TranslateError::Io(e.into()))?;
        let is_json = entry.path().extension().is_some_and(|ext| ext == "json");
        if entry.file_type().is_file() && is_json {
            let json = fs::read_to_string(entry.path())?;
            documents.push(RuleDocument::from_json_str(entry.path().display().to_string(), &json)?);
        }
    }
    Ok(documents)
}

fn validate_rule(name: String, raw: RawRule) -> Result<Rule, String> {
    let signature = match raw.signature {
        Some(params) if !params.is_empty() => Some(validate_signature(&name, params)?),
        _ => None,
    };

    if signature.is_none() && !raw.compositions.is_empty() {
        return Err(format!("rule '{}' declares compositions without a signature", name));
    }

    let mut compositions = Vec::with_capacity(raw.compositions.len());
    for raw_step in raw.compositions {
        compositions.push(validate_composition(&name, raw_step, signature.as_ref())?);
    }

    let handler = match raw.handler.as_deref() {
        Some(handler) => Some(
            Handler::from_name(handler)
                .ok_or_else(|| format!("rule '{}': unknown handler '{}'", name, handler))?,
        ),
        None => None,
    };
    if handler.is_some() && signature.is_none() {
        return Err(format!("rule '{}' declares a handler without a signature", name));
    }

    Ok(Rule {
        name,
        translation: raw.translation,
        returns: raw.returns,
        signature,
        compositions,
        handler,
        examples: raw.examples,
    })
}

fn validate_signature(name: &str, raw: Vec<RawParam>) -> Result<Signature, String> {
    let mut slots = Vec::with_capacity(raw.len());
    for param in raw {
        let data_type = slot_type(param.data_type.as_deref());
        let spec = match (param.input_argument_nb, param.optional) {
            (RawSlot::Index(i), false) => ParamSpec::Positional(i),
            (RawSlot::Index(i), true) => ParamSpec::OptionalPositional(i),
            (RawSlot::Text(text), false) if text == "unlimited" => ParamSpec::Unlimited,
            (RawSlot::Text(text), false) => ParamSpec::StaticValue(text),
            (RawSlot::Text(text), true) => {
                return Err(format!(
                    "rule '{}': only positional slots can be optional, found '{}'",
                    name, text
                ));
            }
        };
        // Static values are emitted verbatim, never coerced.
        let data_type = data_type.filter(|_| !matches!(spec, ParamSpec::StaticValue(_)));
        slots.push((spec, data_type));
    }
    let params: Vec<&ParamSpec> = slots.iter().map(|(spec, _)| spec).collect();

    if params.iter().filter(|p| ***p == ParamSpec::Unlimited).count() > 1 {
        return Err(format!("rule '{}': at most one 'unlimited' slot is allowed", name));
    }

    let required: BTreeSet<usize> = params
        .iter()
        .filter_map(|p| match p {
            ParamSpec::Positional(i) => Some(*i),
            _ => None,
        })
        .collect();
    let optional: BTreeSet<usize> = params
        .iter()
        .filter_map(|p| match p {
            ParamSpec::OptionalPositional(i) => Some(*i),
            _ => None,
        })
        .collect();

    // Required indices must be 0..r and optional ones r..r+o, so every accepted
    // arity satisfies every declared index.
    if !required.iter().copied().eq(0..required.len()) {
        return Err(format!(
            "rule '{}': required source indices {:?} must be contiguous from 0",
            name, required
        ));
    }
    let r = required.len();
    if !optional.iter().copied().eq(r..r + optional.len()) {
        return Err(format!(
            "rule '{}': optional source indices {:?} must follow the required ones from {}",
            name, optional, r
        ));
    }

    Ok(Signature::typed(slots))
}

fn validate_composition(
    name: &str,
    raw: RawComposition,
    signature: Option<&Signature>,
) -> Result<CompositionStep, String> {
    let mode = match (raw.as_group, raw.merged) {
        (false, false) => CompositionMode::Each,
        (true, false) => CompositionMode::Group,
        (false, true) => CompositionMode::Merged,
        (true, true) => {
            return Err(format!(
                "rule '{}': a composition cannot be both 'as_group' and 'merged'",
                name
            ));
        }
    };

    let selection = parse_selection(&raw.args)
        .map_err(|message| format!("rule '{}': {}", name, message))?;
    let formula = parse_formula(&raw.formula)
        .map_err(|message| format!("rule '{}': {}", name, message))?;

    // Open-ended target lists cannot be bounded at load time.
    if let Some(signature) = signature.filter(|s| !s.has_unlimited()) {
        let width = signature.params.len();
        if let Some(index) = selection.max_explicit_index().filter(|i| *i >= width) {
            return Err(format!(
                "rule '{}': composition targets index {} but the signature has {} slot(s)",
                name, index, width
            ));
        }
        if let Some(index) = formula.max_reference().filter(|i| *i >= width) {
            return Err(format!(
                "rule '{}': formula references args[{}] but the signature has {} slot(s)",
                name, index, width
            ));
        }
    }

    Ok(CompositionStep {
        formula,
        selection,
        mode,
    })
}

fn parse_selection(raw: &RawTargets) -> Result<Selection, String> {
    match raw {
        RawTargets::Keyword(keyword) if keyword == "all" => Ok(Selection::All),
        RawTargets::Keyword(keyword) => Err(format!("unknown composition target '{}'", keyword)),
        RawTargets::List(items) => match items.as_slice() {
            [] => Err("composition targets cannot be empty".to_string()),
            [RawSlot::Text(end)] if end == "end" => Ok(Selection::Append),
            [RawSlot::Index(start), RawSlot::Text(end)] if end == "end" => Ok(Selection::Range {
                start: *start,
                end: None,
            }),
            _ => {
                let mut indices = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        RawSlot::Index(i) => indices.push(*i),
                        RawSlot::Text(text) => {
                            return Err(format!("unexpected composition target '{}'", text));
                        }
                    }
                }
                let start = indices[0];
                if !indices.iter().copied().eq(start..start + indices.len()) {
                    return Err(format!(
                        "composition targets {:?} must be continuous and ascending",
                        indices
                    ));
                }
                Ok(Selection::Range {
                    start,
                    end: Some(start + indices.len() - 1),
                })
            }
        },
    }
}
