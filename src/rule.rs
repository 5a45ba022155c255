//! Validated translation rules.
//!
//! Rule documents are deserialized into raw shapes by the registry and then
//! checked once into the types below. Nothing here is re-validated while
//! translating.

use serde::Deserialize;

use crate::formula::Formula;
use crate::special::Handler;

/// A declarative mapping from a source function to its target rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Lower-case source function name.
    pub name: String,
    /// Target function name, or the full replacement text when there is no signature.
    pub translation: String,
    /// Informational return type tag.
    pub returns: String,
    /// `None` when the document omits the signature or declares it empty.
    pub signature: Option<Signature>,
    pub compositions: Vec<CompositionStep>,
    /// Rendering used instead of `translation(args)`, if any.
    pub handler: Option<Handler>,
    pub examples: Vec<RuleExample>,
}

impl Rule {
    /// Accepted argument count range, `(min, max)` with `None` meaning unbounded.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match &self.signature {
            Some(signature) => (signature.min_arity, signature.max_arity),
            None => (0, Some(0)),
        }
    }
}

/// One target slot of a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSpec {
    /// Filled by the source argument at this index.
    Positional(usize),
    /// Filled by the source argument at this index, dropped when it is absent.
    OptionalPositional(usize),
    /// A literal emitted as-is.
    StaticValue(String),
    /// Expands to every source argument not claimed by a positional slot.
    Unlimited,
}

/// Target-ordered slots plus the arity they accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<ParamSpec>,
    /// Type required by each slot of `params`; `None` accepts anything.
    pub data_types: Vec<Option<String>>,
    pub min_arity: usize,
    pub max_arity: Option<usize>,
}

impl Signature {
    /// Build an untyped signature from target-ordered slots.
    pub fn new(params: Vec<ParamSpec>) -> Self {
        Self::typed(params.into_iter().map(|param| (param, None)).collect())
    }

    /// Build a signature from target-ordered slots and their required types,
    /// computing its arity range.
    ///
    /// The slots are assumed to be validated: dense source indices and at most
    /// one `Unlimited`.
    pub fn typed(slots: Vec<(ParamSpec, Option<String>)>) -> Self {
        let (params, data_types): (Vec<_>, Vec<_>) = slots.into_iter().unzip();
        let mut required = Vec::new();
        let mut optional = Vec::new();
        let mut unlimited = false;
        for param in &params {
            match param {
                ParamSpec::Positional(i) => required.push(*i),
                ParamSpec::OptionalPositional(i) => optional.push(*i),
                ParamSpec::Unlimited => unlimited = true,
                ParamSpec::StaticValue(_) => {}
            }
        }
        required.sort_unstable();
        required.dedup();
        optional.sort_unstable();
        optional.dedup();

        let min_arity = required.len();
        let max_arity = (!unlimited).then_some(required.len() + optional.len());
        Self {
            params,
            data_types,
            min_arity,
            max_arity,
        }
    }

    pub fn has_unlimited(&self) -> bool {
        self.params.contains(&ParamSpec::Unlimited)
    }

    /// Source indices claimed by positional slots.
    pub fn claimed_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.params.iter().filter_map(|param| match param {
            ParamSpec::Positional(i) | ParamSpec::OptionalPositional(i) => Some(*i),
            _ => None,
        })
    }

    /// Human-readable form of the accepted arity, used in error messages.
    pub fn describe_arity(&self) -> String {
        match self.max_arity {
            None => format!("at least {} argument(s)", self.min_arity),
            Some(max) if max == self.min_arity => format!("{} argument(s)", max),
            Some(max) => format!("{} to {} argument(s)", self.min_arity, max),
        }
    }
}

/// Which slots of the working argument list a composition step touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every current slot.
    All,
    /// A continuous run of slots; `end: None` runs through the current last slot.
    Range { start: usize, end: Option<usize> },
    /// A virtual slot appended after the current list.
    Append,
}

impl Selection {
    /// Resolve against the current list length, returning `start..end` positions.
    ///
    /// `Append` resolves to the empty range at `len`.
    pub fn resolve(&self, len: usize) -> std::ops::Range<usize> {
        match *self {
            Selection::All => 0..len,
            Selection::Range { start, end } => {
                let start = start.min(len);
                let end = end.map_or(len, |e| (e + 1).min(len));
                start..end.max(start)
            }
            Selection::Append => len..len,
        }
    }

    /// Highest explicit index this selection names, if any.
    pub fn max_explicit_index(&self) -> Option<usize> {
        match *self {
            Selection::Range { start, end } => Some(end.unwrap_or(start)),
            _ => None,
        }
    }
}

/// How a step combines the slots it selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionMode {
    /// Apply the formula to each selected slot in place.
    Each,
    /// Join with `", "`, apply once, replace the selection with the result.
    Group,
    /// Join with a single space, apply once, replace the selection with the result.
    Merged,
}

impl CompositionMode {
    pub fn separator(&self) -> Option<&'static str> {
        match self {
            CompositionMode::Each => None,
            CompositionMode::Group => Some(", "),
            CompositionMode::Merged => Some(" "),
        }
    }
}

/// One ordered post-processing step over the target-ordered arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositionStep {
    pub formula: Formula,
    pub selection: Selection,
    pub mode: CompositionMode,
}

/// A documented source/target pair carried by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleExample {
    pub hive: String,
    pub presto: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_arity() {
        let sig = Signature::new(vec![
            ParamSpec::StaticValue("'day'".to_string()),
            ParamSpec::Positional(1),
            ParamSpec::Positional(0),
        ]);
        assert_eq!((sig.min_arity, sig.max_arity), (2, Some(2)));

        let sig = Signature::new(vec![
            ParamSpec::Positional(0),
            ParamSpec::OptionalPositional(1),
            ParamSpec::OptionalPositional(2),
        ]);
        assert_eq!((sig.min_arity, sig.max_arity), (1, Some(3)));
        assert_eq!(sig.describe_arity(), "1 to 3 argument(s)");

        let sig = Signature::new(vec![ParamSpec::Positional(0), ParamSpec::Unlimited]);
        assert_eq!((sig.min_arity, sig.max_arity), (1, None));
        assert!(sig.has_unlimited());
    }

    #[test]
    fn test_typed_signature() {
        let sig = Signature::typed(vec![
            (ParamSpec::Positional(0), Some("timestamp".to_string())),
            (ParamSpec::OptionalPositional(1), None),
        ]);
        assert_eq!(sig.data_types, vec![Some("timestamp".to_string()), None]);
        assert_eq!((sig.min_arity, sig.max_arity), (1, Some(2)));
        assert_eq!(Signature::new(vec![ParamSpec::Unlimited]).data_types, vec![None]);
    }

    #[test]
    fn test_selection_resolve() {
        assert_eq!(Selection::All.resolve(3), 0..3);
        assert_eq!(Selection::Range { start: 1, end: None }.resolve(3), 1..3);
        assert_eq!(Selection::Range { start: 1, end: None }.resolve(1), 1..1);
        assert_eq!(Selection::Range { start: 0, end: Some(1) }.resolve(3), 0..2);
        // Indices past the current list are clamped away.
        assert_eq!(Selection::Range { start: 2, end: Some(2) }.resolve(2), 2..2);
        assert_eq!(Selection::Append.resolve(2), 2..2);
    }
}
