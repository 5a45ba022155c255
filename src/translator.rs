//! Public translation entry point.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::TranslatorConfig;
use crate::error::{TranslateError, TranslateResult};
use crate::registry::{self, RuleRegistry};
use crate::scanner::Scanner;
use crate::statement::{find_insert_clause_with, InsertClause, StatementOrchestrator};

/// Per-invocation flags. Never shared between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslationContext {
    /// The statement is expected to carry an INSERT clause.
    pub has_insert_statement: bool,
}

impl TranslationContext {
    pub fn new(has_insert_statement: bool) -> Self {
        Self {
            has_insert_statement,
        }
    }
}

/// Translates statements with an immutable rule registry.
///
/// ```
/// use sqlshift::Translator;
///
/// let translator = Translator::hive_to_presto().unwrap();
/// let sql = translator.translate("select nvl(a, 0) from t", false).unwrap();
/// assert_eq!(sql, "select coalesce(a, 0) from t");
/// ```
#[derive(Debug, Clone)]
pub struct Translator {
    registry: RuleRegistry,
    scanner: Scanner,
    output_extension: String,
}

impl Translator {
    /// Wrap a registry with the default configuration.
    pub fn new(registry: RuleRegistry) -> Self {
        Self::with_config(registry, &TranslatorConfig::default())
    }

    /// Wrap a registry, taking depth and output settings from `config`.
    pub fn with_config(registry: RuleRegistry, config: &TranslatorConfig) -> Self {
        Self {
            registry,
            scanner: Scanner::new(config.max_depth),
            output_extension: config.output_extension.clone(),
        }
    }

    /// Build the registry `config` describes: the bundled dictionary, if
    /// enabled, merged with every configured dictionary path.
    pub fn from_config(config: &TranslatorConfig) -> TranslateResult<Self> {
        let mut documents = if config.include_builtin {
            registry::builtin_documents()?
        } else {
            Vec::new()
        };
        for path in &config.dictionaries {
            documents.extend(registry::read_documents(path)?);
        }
        let registry = RuleRegistry::from_documents(documents)?;
        Ok(Self::with_config(registry, config))
    }

    /// Translator over the bundled Hive to Presto dictionary.
    pub fn hive_to_presto() -> TranslateResult<Self> {
        Ok(Self::new(RuleRegistry::hive_to_presto()?))
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Translate one statement.
    pub fn translate(&self, sql: &str, has_insert_statement: bool) -> TranslateResult<String> {
        self.translate_with(sql, &TranslationContext::new(has_insert_statement))
    }

    pub fn translate_with(
        &self,
        sql: &str,
        context: &TranslationContext,
    ) -> TranslateResult<String> {
        StatementOrchestrator::new(&self.registry, self.scanner).run(sql, context)
    }

    /// The INSERT clause of `sql`, if it has one.
    pub fn insert_clause(&self, sql: &str) -> TranslateResult<Option<InsertClause>> {
        find_insert_clause_with(&self.scanner, sql)
    }

    /// Translate a statement file and write the result next to it with the
    /// configured extension. Returns the output path.
    pub fn translate_file(
        &self,
        path: impl AsRef<Path>,
        context: &TranslationContext,
    ) -> TranslateResult<PathBuf> {
        let path = path.as_ref();
        let output = path.with_extension(&self.output_extension);
        if output == path {
            return Err(TranslateError::Config(format!(
                "{} already has the output extension '{}'",
                path.display(),
                self.output_extension
            )));
        }

        let sql = fs::read_to_string(path)?;
        let translated = self.translate_with(&sql, context)?;
        fs::write(&output, translated)?;
        tracing::info!("Translated {} -> {}", path.display(), output.display());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RULES: &str = r#"{
        "lcase": {"translation": "lower", "returns": "varchar",
                  "signature": [{"input_argument_nb": 0}]}
    }"#;

    #[test]
    fn test_translator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Translator>();
    }

    #[test]
    fn test_translate_with_custom_registry() {
        let translator = Translator::new(RuleRegistry::from_json_str("t.json", RULES).unwrap());
        assert_eq!(
            translator.translate("select LCASE(name), nvl(a, b) from t", false).unwrap(),
            "select lower(name), nvl(a, b) from t"
        );
    }

    #[test]
    fn test_config_depth_is_applied() {
        let config = TranslatorConfig {
            max_depth: 2,
            ..TranslatorConfig::default()
        };
        let translator =
            Translator::with_config(RuleRegistry::from_json_str("t.json", RULES).unwrap(), &config);
        assert!(translator.translate("lcase(lcase(a))", false).is_ok());
        assert!(matches!(
            translator.translate("lcase(lcase(lcase(a)))", false),
            Err(TranslateError::RecursionDepth { limit: 2, .. })
        ));
    }

    #[test]
    fn test_deep_nesting_is_capped() {
        let config = TranslatorConfig {
            max_depth: 100_000,
            ..TranslatorConfig::default()
        };
        let translator =
            Translator::with_config(RuleRegistry::from_json_str("t.json", RULES).unwrap(), &config);

        let sql = format!("{}a{}", "lcase(".repeat(256), ")".repeat(256));
        let translated = translator.translate(&sql, false).unwrap();
        assert_eq!(translated.matches("lower(").count(), 256);

        let sql = format!("{}a{}", "lcase(".repeat(5000), ")".repeat(5000));
        assert!(matches!(
            translator.translate(&sql, false),
            Err(TranslateError::RecursionDepth { limit: 256, .. })
        ));
    }

    #[test]
    fn test_insert_clause_uses_configured_depth() {
        let config = TranslatorConfig {
            max_depth: 1,
            ..TranslatorConfig::default()
        };
        let translator = Translator::with_config(RuleRegistry::default(), &config);
        let sql = "insert into t partition (k=f(g(x))) select 1";
        assert!(matches!(
            translator.insert_clause(sql),
            Err(TranslateError::RecursionDepth { limit: 1, .. })
        ));
        assert!(Translator::new(RuleRegistry::default()).insert_clause(sql).unwrap().is_some());
    }

    #[test]
    fn test_from_config_merges_dictionaries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("udfs.json"),
            r#"{"zzz_test_no_args_hive": {"translation": "zzz_test_no_args_presto()", "returns": "any"}}"#,
        )
        .unwrap();
        let config = TranslatorConfig {
            dictionaries: vec![dir.path().to_path_buf()],
            ..TranslatorConfig::default()
        };
        let translator = Translator::from_config(&config).unwrap();
        assert!(translator.registry().lookup("datediff").is_some());
        assert_eq!(
            translator.translate("select zzz_test_no_args_hive()", false).unwrap(),
            "select zzz_test_no_args_presto()"
        );
    }

    #[test]
    fn test_from_config_rejects_builtin_collision() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("nvl.json"), RULES.replace("lcase", "nvl")).unwrap();
        let config = TranslatorConfig {
            dictionaries: vec![dir.path().to_path_buf()],
            ..TranslatorConfig::default()
        };
        assert!(matches!(
            Translator::from_config(&config),
            Err(TranslateError::DuplicateRule { .. })
        ));
    }

    #[test]
    fn test_translate_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("job.hql");
        fs::write(&input, "insert into table db.t\nselect lcase(a) from s").unwrap();

        let translator = Translator::new(RuleRegistry::from_json_str("t.json", RULES).unwrap());
        let output = translator
            .translate_file(&input, &TranslationContext::new(true))
            .unwrap();
        assert_eq!(output, dir.path().join("job.presto"));
        assert_eq!(
            fs::read_to_string(output).unwrap(),
            "insert into table db.t\nselect lower(a) from s"
        );
    }

    #[test]
    fn test_translate_file_refuses_to_overwrite_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("job.presto");
        fs::write(&input, "select 1").unwrap();
        let translator = Translator::new(RuleRegistry::default());
        assert!(matches!(
            translator.translate_file(&input, &TranslationContext::default()),
            Err(TranslateError::Config(_))
        ));
    }
}
