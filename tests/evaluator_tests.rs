use rstest::rstest;
use spanrules::{evaluate, parse_rule, AttributeValue, Evaluator, RuleExpression, Span, SpanStatus, Trace};

fn rule(text: &str) -> RuleExpression {
    let result = parse_rule(text);
    assert!(result.valid, "{} -> {:?}", text, result.errors);
    result.ast.unwrap()
}

fn auth_trace() -> Trace {
    Trace::new(
        "t-auth",
        vec![
            Span::new("auth.login").with_span_id("s1").with_status(SpanStatus::Error),
            Span::new("auth.login").with_span_id("s2").with_status(SpanStatus::Ok),
        ],
    )
}

fn checkout_trace() -> Trace {
    Trace::new(
        "t-checkout",
        vec![
            Span::new("http.request")
                .with_span_id("r1")
                .with_service("gateway")
                .with_attribute("http.method", "POST")
                .with_attribute("url", "https://shop.example/api/v2/checkout")
                .with_attribute("region", "eu")
                .with_duration_ms(820.0),
            Span::new("payment.charge")
                .with_span_id("p1")
                .with_service("payments")
                .with_attribute("amount", 2500i64)
                .with_attribute("currency", "USD")
                .with_attribute("retried", true)
                .with_attribute("tags", vec!["vip", "promo"])
                .with_status(SpanStatus::Ok),
            Span::new("db.query")
                .with_span_id("d1")
                .with_attribute("rows", "12")
                .with_attribute("cached", false),
            Span::new("db.query").with_span_id("d2").with_attribute("rows", 3i64),
        ],
    )
}

#[test]
fn test_round_trip_auth_rule() {
    let trace = auth_trace();
    let expr = rule(
        r#"trace.has(auth.login).where(status == "ERROR") and trace.has(auth.login).where(status == "OK")"#,
    );
    let result = evaluate(&expr, &trace);
    assert!(result.violated);
    assert_eq!(result.span_ids(&trace), vec!["s1", "s2"]);
}

#[test]
fn test_count_to_count() {
    let mut spans = Vec::new();
    for i in 0..3 {
        spans.push(Span::new("http.request").with_span_id(format!("req{}", i)));
    }
    for i in 0..2 {
        spans.push(Span::new("http.response").with_span_id(format!("res{}", i)));
    }
    let trace = Trace::new("t-http", spans);

    let expr = rule("trace.count(http.request) != trace.count(http.response)");
    let result = evaluate(&expr, &trace);
    assert!(result.violated);
    assert_eq!(result.matched_spans, vec![0, 1, 2, 3, 4]);

    assert!(!evaluate(&rule("trace.count(http.request) == trace.count(http.response)"), &trace).violated);
    assert!(evaluate(&rule("trace.count(http.request) > trace.count(http.response)"), &trace).violated);
}

#[rstest]
#[case("trace.has(payment.charge)", true)]
#[case("trace.has(payment.refund)", false)]
#[case("not trace.has(payment.refund)", true)]
#[case("trace.has(payment.charge).where(amount > 1000)", true)]
#[case("trace.has(payment.charge).where(amount > 1000).where(currency == \"EUR\")", false)]
#[case("trace.has(payment.charge).where(amount >= 2500).where(amount <= 2500)", true)]
#[case("trace.has(payment.charge).where(retried)", true)]
#[case("trace.has(payment.charge).where(not retried)", false)]
#[case("trace.has(db.query).where(not cached)", true)]
#[case("trace.has(payment.charge).where(tags contains \"vip\")", true)]
#[case("trace.has(payment.charge).where(tags in \"promo\")", true)]
#[case("trace.has(http.request).where(url contains \"/api/\")", true)]
#[case(r#"trace.has(http.request).where(url matches "/api/v\\d+/")"#, true)]
#[case(r#"trace.has(http.request).where(region in ["us", "eu"])"#, true)]
#[case(r#"trace.has(http.request).where(region in ["us", "ap"])"#, false)]
#[case("trace.has(http.request).where(duration > 500)", true)]
#[case(r#"trace.has(http.request).where(serviceName == "gateway")"#, true)]
#[case(r#"trace.has(payment.charge).where(status == "OK")"#, true)]
#[case("trace.has(db.query).where(rows > 10)", true)]
#[case("trace.has(db.query).where(rows > 100)", false)]
#[case("trace.count(db.query) == 2", true)]
#[case("trace.count(db.query) > 2", false)]
#[case("trace.count(cache.get) == 0", true)]
#[case("trace.has(payment.refund) or trace.count(db.query) >= 2", true)]
#[case("trace.has(payment.refund) and trace.count(db.query) >= 2", false)]
fn test_rule_semantics(#[case] text: &str, #[case] violated: bool) {
    assert_eq!(evaluate(&rule(text), &checkout_trace()).violated, violated, "{}", text);
}

#[rstest]
#[case(r#"trace.has(payment.charge).where(currency > 5)"#)]
#[case(r#"trace.has(payment.charge).where(currency == 5)"#)]
#[case(r#"trace.has(payment.charge).where(currency != 5)"#)]
#[case(r#"trace.has(payment.charge).where(missing == "x")"#)]
#[case(r#"trace.has(payment.charge).where(missing != "x")"#)]
#[case(r#"trace.has(payment.charge).where(retried matches "^t")"#)]
fn test_type_mismatches_do_not_hold(#[case] text: &str) {
    let expr = rule(text);
    let trace = Trace::new(
        "t",
        vec![Span::new("payment.charge")
            .with_attribute("currency", "USD")
            .with_attribute("retried", AttributeValue::Null)],
    );
    assert!(!Evaluator::new(&trace).evaluate(&expr).violated, "{}", text);
}

#[test]
fn test_where_clauses_must_hold_on_the_same_span() {
    let trace = Trace::new(
        "t",
        vec![
            Span::new("a.b").with_attribute("x", 1i64),
            Span::new("a.b").with_attribute("y", 2i64),
        ],
    );
    assert!(!evaluate(&rule("trace.has(a.b).where(x == 1).where(y == 2)"), &trace).violated);
    assert!(evaluate(&rule("trace.has(a.b).where(x == 1) and trace.has(a.b).where(y == 2)"), &trace).violated);
}

#[test]
fn test_contributing_spans_for_mixed_rule() {
    let trace = checkout_trace();
    let expr = rule("trace.has(payment.charge).where(amount > 1000) and not trace.has(fraud.check)");
    let result = evaluate(&expr, &trace);
    assert!(result.violated);
    assert_eq!(result.span_ids(&trace), vec!["p1"]);

    let expr = rule("trace.has(payment.refund) or trace.has(db.query)");
    assert_eq!(evaluate(&expr, &trace).span_ids(&trace), vec!["d1", "d2"]);
}

#[test]
fn test_empty_trace_is_total() {
    let trace = Trace::new("empty", vec![]);
    for text in [
        "trace.has(a.b)",
        "not trace.has(a.b)",
        "trace.count(a.b) < 1",
        "trace.count(a.b) != trace.count(c.d)",
    ] {
        assert!(evaluate(&rule(text), &trace).matched_spans.is_empty());
    }
    assert!(evaluate(&rule("not trace.has(a.b)"), &trace).violated);
    assert!(evaluate(&rule("trace.count(a.b) < 1"), &trace).violated);
}

#[test]
fn test_evaluator_reused_across_rules() {
    let trace = checkout_trace();
    let evaluator = Evaluator::new(&trace);
    let rules = [
        rule("trace.has(db.query)"),
        rule("trace.count(db.query) >= 2"),
        rule("trace.has(payment.refund)"),
    ];
    let violated: Vec<bool> = rules.iter().map(|r| evaluator.evaluate(r).violated).collect();
    assert_eq!(violated, vec![true, true, false]);
    assert_eq!(evaluator.trace().trace_id, "t-checkout");
}

#[test]
fn test_trace_from_json() {
    let json = r#"{
        "traceId": "abc",
        "spans": [
            {"spanId": "1", "operationName": "auth.login", "status": "ERROR", "durationMs": 5},
            {"spanId": "2", "name": "auth.login", "status": "ok", "attributes": {"user.tier": "gold"}}
        ]
    }"#;
    let trace: Trace = serde_json::from_str(json).unwrap();
    let expr = rule(r#"trace.has(auth.login).where(user.tier == "gold").where(status == "OK")"#);
    let result = evaluate(&expr, &trace);
    assert!(result.violated);
    assert_eq!(result.span_ids(&trace), vec!["2"]);
}
