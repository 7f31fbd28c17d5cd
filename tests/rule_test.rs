//! Tests for the rule module through its public API

use limeade::notification::{Category, NotificationRecord};
use limeade::rule::{
    ExpressionRule, MatchRule, PatternRule, RuleConfig, RuleError, DEFAULT_RULE, MAX_DEPTH,
};

fn record(category: Category, text: &str) -> NotificationRecord {
    NotificationRecord::new(category, text)
}

#[test]
fn test_default_rule_decisions() {
    // Given: the default suppression rule
    let rule = ExpressionRule::compile(DEFAULT_RULE).unwrap();

    // Then: only error notifications mentioning the marker match
    assert!(rule.evaluate(&record(Category::Error, "Sync with BacklogWiki failed")));
    assert!(!rule.evaluate(&record(Category::Warning, "Sync with BacklogWiki failed")));
    assert!(!rule.evaluate(&record(Category::Error, "unrelated")));
}

#[test]
fn test_rule_is_total_over_all_categories() {
    let rule = ExpressionRule::compile(
        r#"type in ["error", "warning"] && !text.lowerAscii().startsWith("ok")"#,
    )
    .unwrap();

    for category in Category::ALL {
        for text in ["", "OK done", "disk full", "多字节文本"] {
            let expected = matches!(category, Category::Error | Category::Warning)
                && !text.to_ascii_lowercase().starts_with("ok");
            assert_eq!(rule.evaluate(&record(category, text)), expected);
        }
    }
}

#[test]
fn test_category_alias_and_regex() {
    let rule = ExpressionRule::compile(r"category == 'info' && text.matches('^Saved \\d+ items?$')")
        .unwrap();
    assert!(rule.evaluate(&record(Category::Info, "Saved 3 items")));
    assert!(!rule.evaluate(&record(Category::Info, "Saved three items")));
    assert!(!rule.evaluate(&record(Category::Success, "Saved 3 items")));
}

#[test]
fn test_malformed_rules_fail_at_compile_time() {
    assert_eq!(ExpressionRule::compile("   ").unwrap_err(), RuleError::Empty);
    assert!(matches!(
        ExpressionRule::compile("severity == 'error'"),
        Err(RuleError::UnknownVariable { .. })
    ));
    assert!(matches!(
        ExpressionRule::compile("text"),
        Err(RuleError::TypeMismatch { .. })
    ));
    assert!(matches!(
        ExpressionRule::compile("text.contains('a', 'b')"),
        Err(RuleError::Arity { .. })
    ));
}

#[test]
fn test_pattern_rule_is_the_wildcard_variant() {
    let rule = PatternRule::new(Some(Category::Error), "*BacklogWiki*").unwrap();
    assert!(rule.evaluate(&record(Category::Error, "Sync with BacklogWiki failed")));
    assert!(!rule.evaluate(&record(Category::Warning, "Sync with BacklogWiki failed")));
    assert!(!rule.evaluate(&record(Category::Error, "unrelated")));
}

#[test]
fn test_rule_config_from_json() {
    // Given: both rule kinds as they appear in a config file
    let expression: RuleConfig = serde_json::from_value(serde_json::json!({
        "kind": "expression",
        "source": "type == 'success'"
    }))
    .unwrap();
    let pattern: RuleConfig = serde_json::from_value(serde_json::json!({
        "kind": "pattern",
        "text": "Saved*"
    }))
    .unwrap();

    // When: compiled
    let expression = expression.compile().unwrap();
    let pattern = pattern.compile().unwrap();

    // Then
    assert!(expression.evaluate(&record(Category::Success, "anything")));
    assert!(pattern.evaluate(&record(Category::Default, "Saved draft")));
    assert!(!pattern.evaluate(&record(Category::Default, "Draft saved")));
}

#[test]
fn test_deeply_nested_rules_are_rejected() {
    // Given: rules far beyond the nesting limit
    let parens = format!("{}true{}", "(".repeat(5000), ")".repeat(5000));
    let negations = format!("{}true", "!".repeat(200_000));
    let chain = vec!["text == 'x'"; 5000].join(" || ");
    let calls = format!("text{} == 'x'", ".lowerAscii()".repeat(5000));

    // Then: each one is a compile error, not a crash
    for source in [&parens, &negations, &chain, &calls] {
        assert!(matches!(
            ExpressionRule::compile(source),
            Err(RuleError::TooDeep { max: MAX_DEPTH, .. })
        ));
    }
}

#[test]
fn test_nesting_within_the_limit_compiles() {
    let depth = MAX_DEPTH / 2;
    let parens = format!("{}type == 'error'{}", "(".repeat(depth), ")".repeat(depth));
    let rule = ExpressionRule::compile(&parens).unwrap();
    assert!(rule.evaluate(&record(Category::Error, "")));

    let negations = format!("{}true", "!".repeat(depth));
    assert!(ExpressionRule::compile(&negations).unwrap().evaluate(&record(Category::Info, "")));
}
