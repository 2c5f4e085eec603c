use spanrules::config::Limits;
use spanrules::{
    CollectingSink, EngineBuilder, EngineConfig, EngineError, RuleDefinition, RuleEngine,
    RuleSeverity, Span, SpanStatus, Trace,
};
use std::fs;
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;

fn engine() -> RuleEngine {
    EngineBuilder::new().worker_threads(2).build().unwrap()
}

fn failed_login_trace() -> Trace {
    Trace::new(
        "t-login",
        vec![
            Span::new("auth.login").with_span_id("s1").with_status(SpanStatus::Error),
            Span::new("auth.login").with_span_id("s2").with_status(SpanStatus::Ok),
            Span::new("db.query").with_span_id("s3"),
        ],
    )
}

fn write_rules(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

#[test]
fn test_evaluate_trace_reports_violations_sorted_by_rule() {
    let engine = engine();
    engine
        .add_rule(
            RuleDefinition::new("login retried after error", r#"trace.has(auth.login).where(status == "ERROR") and trace.has(auth.login).where(status == "OK")"#)
                .with_id("b-login")
                .with_severity(RuleSeverity::High),
        )
        .unwrap();
    engine
        .add_rule(RuleDefinition::new("db without cache", "trace.has(db.query) and not trace.has(cache.get)").with_id("a-db"))
        .unwrap();
    engine
        .add_rule(RuleDefinition::new("never fires", "trace.has(payment.charge)").with_id("c-pay"))
        .unwrap();

    let trace = failed_login_trace();
    let violations = engine.evaluate_trace(&trace).unwrap();
    let ids: Vec<_> = violations.iter().map(|v| v.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["a-db", "b-login"]);

    assert_eq!(violations[0].span_ids, vec!["s3"]);
    assert_eq!(violations[1].span_ids, vec!["s1", "s2"]);
    assert_eq!(violations[1].severity, RuleSeverity::High);
    assert_eq!(violations[1].trace_id, "t-login");
}

#[test]
fn test_disabled_rules_are_skipped() {
    let engine = engine();
    engine
        .add_rule(RuleDefinition::new("db", "trace.has(db.query)").with_id("db"))
        .unwrap();
    let trace = failed_login_trace();
    assert_eq!(engine.evaluate_trace(&trace).unwrap().len(), 1);

    engine.set_enabled("db", false).unwrap();
    assert!(engine.evaluate_trace(&trace).unwrap().is_empty());

    engine.set_enabled("db", true).unwrap();
    assert_eq!(engine.evaluate_trace(&trace).unwrap().len(), 1);

    engine.remove_rule("db").unwrap();
    assert!(engine.evaluate_trace(&trace).unwrap().is_empty());
    assert!(matches!(engine.remove_rule("db"), Err(EngineError::RuleNotFound(_))));
}

#[test]
fn test_add_rule_rejects_invalid_dsl() {
    let engine = engine();
    let err = engine
        .add_rule(RuleDefinition::new("broken", "trace.has(a.b").with_id("broken"))
        .unwrap_err();
    assert_eq!(err.diagnostics().len(), 1);
    assert_eq!(err.diagnostics()[0].message, "Expected ')' but found end of input");
    assert!(engine.rules().get("broken").is_none());
}

#[test]
fn test_recompile_replaces_rule() {
    let engine = engine();
    let first = engine
        .add_rule(RuleDefinition::new("r", "trace.has(db.query)").with_id("r"))
        .unwrap();
    let second = engine
        .add_rule(RuleDefinition::new("r", "trace.has(cache.get)").with_id("r"))
        .unwrap();
    assert_eq!(engine.rules().len(), 1);
    // the earlier version is untouched for anyone still holding it
    assert_eq!(first.source, "trace.has(db.query)");
    assert_eq!(second.source, "trace.has(cache.get)");
    assert!(engine.evaluate_trace(&failed_login_trace()).unwrap().is_empty());
}

#[test]
fn test_check_returns_warnings_and_errors() {
    let engine = engine();
    let result = engine.check("trace.has(login)");
    assert!(result.valid);
    assert_eq!(result.warnings.len(), 1);

    let result = engine.check("trace.has(login");
    assert!(!result.valid);
}

#[test]
fn test_compiled_rule_keeps_warnings() {
    let engine = engine();
    let compiled = engine.compile("trace.count(db.query) == 2").unwrap();
    assert_eq!(compiled.warnings.len(), 1);
    assert!(compiled.enabled);
}

#[test]
fn test_resource_limits_reject_trace() {
    let limits = Limits {
        max_spans_per_trace: 2,
        max_attributes_per_span: 1,
        ..Limits::default()
    };
    let engine = EngineBuilder::new().worker_threads(1).limits(limits).build().unwrap();
    engine
        .add_rule(RuleDefinition::new("any", "trace.has(db.query)").with_id("any"))
        .unwrap();

    let too_many_spans = failed_login_trace();
    assert!(matches!(
        engine.evaluate_trace(&too_many_spans),
        Err(EngineError::ResourceLimit(_))
    ));

    let wide_span = Trace::new(
        "t",
        vec![Span::new("db.query").with_attribute("a", 1i64).with_attribute("b", 2i64)],
    );
    assert!(matches!(
        engine.evaluate_trace(&wide_span),
        Err(EngineError::ResourceLimit(_))
    ));

    let fine = Trace::new("t", vec![Span::new("db.query").with_attribute("a", 1i64)]);
    assert_eq!(engine.evaluate_trace(&fine).unwrap().len(), 1);
}

#[test]
fn test_evaluate_and_publish() {
    let engine = engine();
    engine
        .add_rule(RuleDefinition::new("db", "trace.has(db.query)").with_id("db"))
        .unwrap();
    let sink = CollectingSink::new();

    assert_eq!(engine.evaluate_and_publish(&failed_login_trace(), &sink).unwrap(), 1);
    assert_eq!(engine.evaluate_and_publish(&Trace::new("quiet", vec![]), &sink).unwrap(), 0);

    let received = sink.take();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].rule_name, "db");
}

#[test]
fn test_load_rule_directory() {
    let dir = TempDir::new().unwrap();
    write_rules(
        &dir,
        "auth.yml",
        r#"
- id: login-error
  name: Login error followed by success
  severity: critical
  expression: trace.has(auth.login).where(status == "ERROR") and trace.has(auth.login).where(status == "OK")
- id: login-disabled
  name: Disabled
  expression: trace.has(auth.login)
  enabled: false
"#,
    );
    fs::create_dir(dir.path().join("nested")).unwrap();
    fs::write(
        dir.path().join("nested").join("db.yaml"),
        "id: db-any\nname: Any query\nexpression: trace.has(db.query)\n",
    )
    .unwrap();
    write_rules(&dir, "notes.txt", "not a rule file");

    let engine = EngineBuilder::new()
        .add_rule_dir(dir.path().to_string_lossy())
        .worker_threads(2)
        .build()
        .unwrap();

    assert_eq!(engine.rules().ids(), vec!["db-any", "login-disabled", "login-error"]);
    let violations = engine.evaluate_trace(&failed_login_trace()).unwrap();
    let ids: Vec<_> = violations.iter().map(|v| v.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["db-any", "login-error"]);
    assert_eq!(violations[1].severity, RuleSeverity::Critical);
}

#[test]
fn test_invalid_rule_in_directory() {
    let dir = TempDir::new().unwrap();
    write_rules(&dir, "good.yml", "id: good\nname: good\nexpression: trace.has(a.b)\n");
    write_rules(&dir, "bad.yml", "id: bad\nname: bad\nexpression: trace.has(\n");
    write_rules(&dir, "garbage.yml", "- [unbalanced\n");

    let lenient = engine();
    let report = lenient.load_dir(dir.path(), false).unwrap();
    assert_eq!(report.files, 3);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.failed.len(), 2);
    assert!(report
        .failed
        .iter()
        .any(|e| matches!(e, EngineError::Compilation { rule_id, .. } if rule_id == "bad")));
    assert!(report
        .failed
        .iter()
        .any(|e| matches!(e, EngineError::RuleFile { .. })));

    let strict = EngineBuilder::new()
        .add_rule_dir(dir.path().to_string_lossy())
        .fail_on_parse_error(true)
        .worker_threads(1)
        .build();
    assert!(strict.is_err());
}

#[test]
fn test_builder_from_config_file() {
    let dir = TempDir::new().unwrap();
    let rules = dir.path().join("rules");
    fs::create_dir(&rules).unwrap();
    fs::write(rules.join("r.yml"), "id: r\nname: r\nexpression: trace.has(a.b)\n").unwrap();

    let config_path = dir.path().join("spanrules.yml");
    fs::write(
        &config_path,
        format!(
            "rule_dirs:\n  - {}\nworker_threads: 1\nlimits:\n  max_spans_per_trace: 5\n",
            rules.display()
        ),
    )
    .unwrap();

    let config = EngineConfig::from_file(&config_path).unwrap();
    let engine = EngineBuilder::from_config(config).build().unwrap();
    assert_eq!(engine.rules().len(), 1);
    assert_eq!(engine.limits().max_spans_per_trace, 5);
}

#[test]
fn test_concurrent_edits_and_evaluations() {
    let engine = Arc::new(engine());
    for i in 0..20 {
        engine
            .add_rule(RuleDefinition::new(format!("r{}", i), "trace.has(db.query)").with_id(format!("r{:02}", i)))
            .unwrap();
    }

    let trace = Arc::new(failed_login_trace());
    let mut handles = Vec::new();
    for t in 0..4 {
        let engine = Arc::clone(&engine);
        let trace = Arc::clone(&trace);
        handles.push(thread::spawn(move || {
            for round in 0..25 {
                if t == 0 {
                    let id = format!("r{:02}", round % 20);
                    engine.set_enabled(&id, round % 2 == 0).unwrap();
                }
                let violations = engine.evaluate_trace(&trace).unwrap();
                assert!(violations.len() <= 20);
                assert!(violations.windows(2).all(|w| w[0].rule_id < w[1].rule_id));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(engine.rules().len(), 20);
}
