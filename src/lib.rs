//! # sqlshift: rule-driven Hive to Presto SQL translation
//!
//! sqlshift rewrites function calls in Hive SQL into their Presto
//! equivalents. Every rewrite comes from declarative JSON rule data; a
//! function without a rule passes through untouched.
//!
//! ## Quick Example
//!
//! ```
//! let sql = sqlshift::translate(
//!     "select datediff('2020-03-30', '2020-03-25')",
//!     false,
//! ).unwrap();
//! assert_eq!(
//!     sql,
//!     "select date_diff('day', cast(cast('2020-03-25' AS timestamp) AS date), \
//!      cast(cast('2020-03-30' AS timestamp) AS date))"
//! );
//! ```
//!
//! ## Rule Fields
//!
//! | Field          | Meaning                                            |
//! |----------------|----------------------------------------------------|
//! | `translation`  | Target function name, or fixed replacement text    |
//! | `signature`    | Target-ordered slots fed by source arguments       |
//! | `compositions` | Formula steps applied to the target arguments      |
//! | `returns`      | Type of the translated call's result               |
//! | `handler`      | Named rendering for calls a formula cannot express |
//! | `examples`     | Documented source/target pairs                     |
//!
//! A slot's `data_type` coerces the argument that fills it, so
//! `concat(a, 4)` becomes `concat(cast(a AS varchar), '4')`. See
//! [`coercion`] for the rules.

use std::sync::OnceLock;

pub mod coercion;
pub mod composition;
pub mod config;
pub mod error;
pub mod formula;
pub mod registry;
pub mod rewriter;
pub mod rule;
pub mod scanner;
pub mod signature;
pub mod special;
pub mod statement;
pub mod translator;

pub use config::TranslatorConfig;
pub use error::{TranslateError, TranslateResult};
pub use registry::RuleRegistry;
pub use translator::{TranslationContext, Translator};

pub mod prelude {
    pub use crate::coercion::{ArgKind, Argument};
    pub use crate::config::TranslatorConfig;
    pub use crate::error::*;
    pub use crate::registry::{RuleDocument, RuleRegistry};
    pub use crate::rewriter::ToSql;
    pub use crate::rule::*;
    pub use crate::scanner::{ParsedCall, Scanner};
    pub use crate::special::Handler;
    pub use crate::statement::{
        find_insert_clause, find_insert_clause_with, InsertClause, InsertOperation,
    };
    pub use crate::translator::{TranslationContext, Translator};
}

static BUNDLED: OnceLock<Translator> = OnceLock::new();

/// Translate a statement with the bundled Hive to Presto dictionary.
///
/// The dictionary is loaded on first use and shared afterwards.
pub fn translate(sql: &str, has_insert_statement: bool) -> TranslateResult<String> {
    let translator = match BUNDLED.get() {
        Some(translator) => translator,
        None => {
            let translator = Translator::hive_to_presto()?;
            BUNDLED.get_or_init(|| translator)
        }
    };
    translator.translate(sql, has_insert_statement)
}
