//! Signature matching.
//!
//! Maps a call's source-ordered arguments onto a rule's target-ordered slots.

use std::collections::BTreeSet;

use crate::coercion::Argument;
use crate::error::{TranslateError, TranslateResult};
use crate::rule::{ParamSpec, Signature};

/// A filled target slot and the type it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotValue<'s> {
    pub argument: Argument,
    /// `None` accepts any argument.
    pub data_type: Option<&'s str>,
}

/// Check the argument count and produce the target-ordered slot values.
///
/// Static slots contribute their literal, optional slots are skipped when
/// their source argument is absent, and the unlimited slot expands in place
/// to every unclaimed source argument in source order, each taking the
/// unlimited slot's type.
pub fn match_arguments<'s>(
    function: &str,
    signature: &'s Signature,
    args: &[Argument],
) -> TranslateResult<Vec<SlotValue<'s>>> {
    let found = args.len();
    let too_few = found < signature.min_arity;
    let too_many = signature.max_arity.is_some_and(|max| found > max);
    if too_few || too_many {
        return Err(TranslateError::arity(
            function,
            signature.describe_arity(),
            found,
        ));
    }

    let claimed: BTreeSet<usize> = signature.claimed_indices().collect();
    let mut target = Vec::with_capacity(signature.params.len().max(found));
    for (param, data_type) in signature.params.iter().zip(&signature.data_types) {
        let data_type = data_type.as_deref();
        let slot = |argument: &Argument| SlotValue {
            argument: argument.clone(),
            data_type,
        };
        match param {
            ParamSpec::Positional(i) => {
                let arg = args.get(*i).ok_or_else(|| {
                    TranslateError::arity(function, signature.describe_arity(), found)
                })?;
                target.push(slot(arg));
            }
            ParamSpec::OptionalPositional(i) => {
                if let Some(arg) = args.get(*i) {
                    target.push(slot(arg));
                }
            }
            ParamSpec::StaticValue(value) => target.push(SlotValue {
                argument: Argument::new(value.as_str()),
                data_type: None,
            }),
            ParamSpec::Unlimited => target.extend(
                args.iter()
                    .enumerate()
                    .filter(|(i, _)| !claimed.contains(i))
                    .map(|(_, arg)| slot(arg)),
            ),
        }
    }
    Ok(target)
}
