//! Compiled rules and the concurrent rule store
//!
//! A [`CompiledRule`] is immutable once built. Edits go through
//! [`RuleSet::upsert`] or [`RuleSet::set_enabled`], which swap the whole
//! `Arc` for the entry, so readers holding the old value never see a
//! half-updated rule.

use crate::ast::RuleExpression;
use crate::config::Limits;
use crate::diagnostic::ValidationError;
use crate::error::{EngineError, Result};
use crate::parser::parse_rule_with_limits;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Severity assigned to violations of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    /// Informational
    Low,
    /// Default
    #[default]
    Medium,
    /// Needs attention
    High,
    /// Page someone
    Critical,
}

impl fmt::Display for RuleSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleSeverity::Low => "low",
            RuleSeverity::Medium => "medium",
            RuleSeverity::High => "high",
            RuleSeverity::Critical => "critical",
        })
    }
}

fn default_enabled() -> bool {
    true
}

/// A rule as authored, before compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    /// Stable id; generated when absent
    #[serde(default)]
    pub id: Option<String>,
    /// Display name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Violation severity
    #[serde(default)]
    pub severity: RuleSeverity,
    /// DSL text
    pub expression: String,
    /// Whether the rule is evaluated
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RuleDefinition {
    /// Definition with a name and expression and default settings
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            severity: RuleSeverity::default(),
            expression: expression.into(),
            enabled: true,
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the severity
    pub fn with_severity(mut self, severity: RuleSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// YAML rule files hold one definition or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum RuleFile {
    Many(Vec<RuleDefinition>),
    One(RuleDefinition),
}

/// A rule ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledRule {
    /// Rule id
    pub id: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Violation severity
    pub severity: RuleSeverity,
    /// DSL text the rule was compiled from
    pub source: String,
    /// Parsed expression, shared between versions of the rule
    pub ast: Arc<RuleExpression>,
    /// Whether the rule is evaluated
    pub enabled: bool,
    /// Lint warnings produced at compile time
    pub warnings: Vec<ValidationError>,
}

impl CompiledRule {
    /// Compile a definition
    pub fn compile(definition: RuleDefinition, limits: &Limits) -> Result<Self> {
        let id = definition
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let result = parse_rule_with_limits(&definition.expression, limits);

        match result.ast {
            Some(ast) if result.valid => {
                debug!(rule_id = %id, warnings = result.warnings.len(), "compiled rule");
                Ok(Self {
                    id,
                    name: definition.name,
                    description: definition.description,
                    severity: definition.severity,
                    source: definition.expression,
                    ast: Arc::new(ast),
                    enabled: definition.enabled,
                    warnings: result.warnings,
                })
            }
            _ => {
                warn!(rule_id = %id, errors = result.errors.len(), "rule failed to compile");
                Err(EngineError::Compilation {
                    rule_id: id,
                    errors: result.errors,
                })
            }
        }
    }

    /// Copy of this rule with a different enabled flag
    pub fn with_enabled(&self, enabled: bool) -> Self {
        Self {
            enabled,
            ..self.clone()
        }
    }
}

/// Outcome of loading a rule directory
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Rule files read
    pub files: usize,
    /// Rules compiled and stored
    pub loaded: usize,
    /// Rules or files that were skipped, with the reason
    pub failed: Vec<EngineError>,
}

/// Concurrent store of compiled rules keyed by id
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: DashMap<String, Arc<CompiledRule>>,
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a rule, returning the previous version
    pub fn upsert(&self, rule: CompiledRule) -> Option<Arc<CompiledRule>> {
        self.rules.insert(rule.id.clone(), Arc::new(rule))
    }

    /// Remove a rule
    pub fn remove(&self, id: &str) -> Result<Arc<CompiledRule>> {
        self.rules
            .remove(id)
            .map(|(_, rule)| rule)
            .ok_or_else(|| EngineError::RuleNotFound(id.to_string()))
    }

    /// Enable or disable a rule by swapping in a new value
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut entry = self
            .rules
            .get_mut(id)
            .ok_or_else(|| EngineError::RuleNotFound(id.to_string()))?;
        if entry.enabled != enabled {
            let updated = Arc::new(entry.with_enabled(enabled));
            *entry = updated;
        }
        Ok(())
    }

    /// Look a rule up by id
    pub fn get(&self, id: &str) -> Option<Arc<CompiledRule>> {
        self.rules.get(id).map(|r| Arc::clone(&r))
    }

    /// Number of rules, enabled or not
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set holds no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// All rule ids, sorted
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rules.iter().map(|r| r.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Point-in-time copy of the enabled rules
    pub fn enabled_rules(&self) -> Vec<Arc<CompiledRule>> {
        self.rules
            .iter()
            .filter(|r| r.enabled)
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    /// Load every `*.yml` / `*.yaml` file under `dir`
    ///
    /// With `fail_fast` the first unreadable file or uncompilable rule is
    /// returned as an error; otherwise failures are collected in the report.
    pub fn load_dir(&self, dir: impl AsRef<Path>, limits: &Limits, fail_fast: bool) -> Result<LoadReport> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(EngineError::Io {
                path: dir.display().to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "rule directory not found"),
            });
        }

        let mut files: Vec<_> = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
            })
            .collect();
        files.sort();

        let mut report = LoadReport::default();
        for path in files {
            report.files += 1;
            let definitions = match load_definitions(&path) {
                Ok(defs) => defs,
                Err(e) if fail_fast => return Err(e),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping rule file");
                    report.failed.push(e);
                    continue;
                }
            };
            for definition in definitions {
                match CompiledRule::compile(definition, limits) {
                    Ok(rule) => {
                        if let Some(previous) = self.upsert(rule) {
                            warn!(rule_id = %previous.id, path = %path.display(), "duplicate rule id replaced");
                        }
                        report.loaded += 1;
                    }
                    Err(e) if fail_fast => return Err(e),
                    Err(e) => report.failed.push(e),
                }
            }
        }

        info!(
            dir = %dir.display(),
            files = report.files,
            loaded = report.loaded,
            failed = report.failed.len(),
            "loaded rule directory"
        );
        Ok(report)
    }
}

/// Read rule definitions from one YAML file
pub fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<RuleDefinition>> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| EngineError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_definitions(&data).map_err(|message| EngineError::RuleFile {
        path: path.display().to_string(),
        message,
    })
}

/// Parse rule definitions from YAML bytes
pub fn parse_definitions(data: &[u8]) -> std::result::Result<Vec<RuleDefinition>, String> {
    match serde_yaml::from_slice::<RuleFile>(data) {
        Ok(RuleFile::Many(defs)) => Ok(defs),
        Ok(RuleFile::One(def)) => Ok(vec![def]),
        // untagged errors are uninformative; report the single-rule error
        Err(_) => serde_yaml::from_slice::<RuleDefinition>(data)
            .map(|def| vec![def])
            .map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, expression: &str) -> CompiledRule {
        CompiledRule::compile(RuleDefinition::new(id, expression).with_id(id), &Limits::default()).unwrap()
    }

    #[test]
    fn test_generated_id() {
        let compiled = CompiledRule::compile(
            RuleDefinition::new("no id", "trace.has(auth.login)"),
            &Limits::default(),
        )
        .unwrap();
        assert!(uuid::Uuid::parse_str(&compiled.id).is_ok());
        assert_eq!(compiled.severity, RuleSeverity::Medium);
    }

    #[test]
    fn test_compile_error_carries_diagnostics() {
        let err = CompiledRule::compile(
            RuleDefinition::new("bad", "trace.has(").with_id("bad"),
            &Limits::default(),
        )
        .unwrap_err();
        match &err {
            EngineError::Compilation { rule_id, errors } => {
                assert_eq!(rule_id, "bad");
                assert!(!errors.is_empty());
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_set_enabled_swaps_value() {
        let set = RuleSet::new();
        set.upsert(rule("r1", "trace.has(a.b)"));
        let before = set.get("r1").unwrap();
        set.set_enabled("r1", false).unwrap();
        let after = set.get("r1").unwrap();
        assert!(before.enabled);
        assert!(!after.enabled);
        assert!(Arc::ptr_eq(&before.ast, &after.ast));
        assert!(set.enabled_rules().is_empty());
    }

    #[test]
    fn test_remove_unknown() {
        let set = RuleSet::new();
        assert!(matches!(set.remove("nope"), Err(EngineError::RuleNotFound(_))));
        assert!(matches!(set.set_enabled("nope", true), Err(EngineError::RuleNotFound(_))));
    }

    #[test]
    fn test_parse_definitions_single_and_list() {
        let single = b"name: one\nexpression: trace.has(a.b)\nseverity: high\n";
        let defs = parse_definitions(single).unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].severity, RuleSeverity::High);
        assert!(defs[0].enabled);

        let list = b"- name: one\n  expression: trace.has(a.b)\n- name: two\n  expression: trace.has(c.d)\n  enabled: false\n";
        let defs = parse_definitions(list).unwrap();
        assert_eq!(defs.len(), 2);
        assert!(!defs[1].enabled);

        assert!(parse_definitions(b"name: missing expression\n").is_err());
    }
}
