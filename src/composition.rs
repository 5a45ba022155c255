//! Composition evaluation.
//!
//! Runs a rule's ordered steps over the working argument list. Each step
//! resolves its selection against the list as it stands when the step starts;
//! `{args[i]}` always reads the list produced by signature matching.

use crate::error::{TranslateError, TranslateResult};
use crate::rule::{CompositionStep, Selection};

/// Apply every step in order to the matched arguments.
pub fn apply_compositions(
    function: &str,
    steps: &[CompositionStep],
    matched: &[String],
) -> TranslateResult<Vec<String>> {
    let mut working = matched.to_vec();
    for step in steps {
        working = apply_step(function, step, working, matched)?;
    }
    Ok(working)
}

fn apply_step(
    function: &str,
    step: &CompositionStep,
    mut working: Vec<String>,
    matched: &[String],
) -> TranslateResult<Vec<String>> {
    let render = |arg: &str| {
        step.formula.render(arg, matched).map_err(|index| {
            TranslateError::arity(
                function,
                format!("an argument for target slot {}", index),
                matched.len(),
            )
        })
    };

    match (step.selection, step.mode.separator()) {
        (Selection::Append, _) => working.push(render("")?),
        (selection, None) => {
            let range = selection.resolve(working.len());
            for slot in &mut working[range] {
                *slot = render(slot.as_str())?;
            }
        }
        (selection, Some(separator)) => {
            let range = selection.resolve(working.len());
            if !range.is_empty() {
                let combined = render(&working[range.clone()].join(separator))?;
                working.drain(range.clone());
                working.insert(range.start, combined);
            }
        }
    }

    working.retain(|slot| !slot.is_empty());
    Ok(working)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::parse_formula;
    use crate::rule::CompositionMode;
    use pretty_assertions::assert_eq;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn step(formula: &str, selection: Selection, mode: CompositionMode) -> CompositionStep {
        CompositionStep {
            formula: parse_formula(formula).unwrap(),
            selection,
            mode,
        }
    }

    #[test]
    fn test_each_step_wraps_range() {
        let steps = [step(
            "cast(cast({arg} AS timestamp) AS date)",
            Selection::Range { start: 1, end: None },
            CompositionMode::Each,
        )];
        let out = apply_compositions("datediff", &steps, &args(&["'day'", "b", "a"])).unwrap();
        assert_eq!(
            out,
            args(&[
                "'day'",
                "cast(cast(b AS timestamp) AS date)",
                "cast(cast(a AS timestamp) AS date)"
            ])
        );
    }

    #[test]
    fn test_group_step_collapses_selection() {
        let steps = [step(
            "array[{arg}]",
            Selection::Range { start: 1, end: None },
            CompositionMode::Group,
        )];
        let out = apply_compositions("concat_ws", &steps, &args(&["'-'", "a", "b"])).unwrap();
        assert_eq!(out, args(&["'-'", "array[a, b]"]));
    }

    #[test]
    fn test_merged_count_distinct() {
        let steps = [
            step(
                "|| ' ' || {arg}",
                Selection::Range { start: 1, end: None },
                CompositionMode::Each,
            ),
            step("{arg}", Selection::All, CompositionMode::Merged),
        ];
        let out = apply_compositions("count", &steps, &args(&["st", "st2"])).unwrap();
        assert_eq!(out, args(&["st || ' ' || st2"]));

        let out = apply_compositions("count", &steps, &args(&["'Hello world!'"])).unwrap();
        assert_eq!(out, args(&["'Hello world!'"]));
    }

    #[test]
    fn test_empty_formula_drops_slot() {
        let steps = [step(
            "",
            Selection::Range { start: 0, end: Some(0) },
            CompositionMode::Each,
        )];
        let out = apply_compositions("f", &steps, &args(&["a", "b"])).unwrap();
        assert_eq!(out, args(&["b"]));
    }

    #[test]
    fn test_reference_reads_matched_list() {
        let steps = [
            step(
                "{arg}x",
                Selection::Range { start: 0, end: Some(0) },
                CompositionMode::Each,
            ),
            step(
                "mod({args[0]}, {args[1]}) + {args[1]}",
                Selection::Range { start: 0, end: Some(0) },
                CompositionMode::Each,
            ),
        ];
        let out = apply_compositions("pmod", &steps, &args(&["a", "b"])).unwrap();
        assert_eq!(out, args(&["mod(a, b) + b", "b"]));
    }

    #[test]
    fn test_append_slot() {
        let steps = [step("'UTC'", Selection::Append, CompositionMode::Each)];
        let out = apply_compositions("f", &steps, &args(&["a"])).unwrap();
        assert_eq!(out, args(&["a", "'UTC'"]));
    }

    #[test]
    fn test_missing_reference_is_arity_error() {
        let steps = [step("{args[3]}", Selection::All, CompositionMode::Each)];
        assert!(matches!(
            apply_compositions("f", &steps, &args(&["a"])),
            Err(TranslateError::Arity { .. })
        ));
    }
}
