//! End-to-end tests for scenario replay

use std::io::Write;

use limeade::cli::{check, CheckArgs, Replay, Scenario};
use limeade::config::FilterConfig;
use tempfile::NamedTempFile;

fn write_json(value: &serde_json::Value) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", value).unwrap();
    file
}

fn hidden_ids(report: &limeade::cli::ReplayReport) -> Vec<String> {
    report.hidden().map(|n| n.id.clone()).collect()
}

#[tokio::test]
async fn test_replay_hides_initial_and_later_matches() {
    // Given: a scenario file with an existing container and later insertions
    let file = write_json(&serde_json::json!({
        "containers": [{
            "id": "main",
            "notifications": [
                { "id": "n1", "category": "error", "text": "BacklogWiki sync failed" },
                { "id": "n2", "category": "success", "text": "Saved" }
            ]
        }],
        "steps": [
            { "action": "flush" },
            { "action": "add_notification", "container": "main", "id": "n3", "category": "error", "text": "BacklogWiki again" },
            { "action": "add_notification", "container": "main", "id": "n4", "category": "warning", "text": "BacklogWiki slow" },
            { "action": "flush" }
        ]
    }));
    let scenario = Scenario::load(file.path()).unwrap();

    // When: replayed with the default config
    let replay = Replay::new(&scenario, &FilterConfig::default()).unwrap();
    let report = replay.run(&scenario.steps).await.unwrap();

    // Then
    assert_eq!(hidden_ids(&report), vec!["n1", "n3"]);
    assert_eq!(report.stats.containers_attached, 1);
    assert_eq!(report.stats.elements_examined, 4);
    assert_eq!(report.stats.elements_suppressed, 2);
    assert!(!report.interrupted);
}

#[tokio::test]
async fn test_replay_with_container_lifecycle() {
    let scenario: Scenario = serde_json::from_value(serde_json::json!({
        "steps": [
            { "action": "add_container", "id": "late", "notifications": [
                { "id": "a", "category": "error", "text": "BacklogWiki" }
            ] },
            { "action": "add_container", "id": "other", "class": "sidebar", "notifications": [
                { "id": "b", "category": "error", "text": "BacklogWiki" }
            ] },
            { "action": "paint" },
            { "action": "remove_container", "id": "late" },
            { "action": "flush" },
            { "action": "add_notification", "container": "late", "id": "c", "category": "error", "text": "BacklogWiki" }
        ]
    }))
    .unwrap();

    let replay = Replay::new(&scenario, &FilterConfig::default()).unwrap();
    let document = replay.document().clone();
    let report = replay.run(&scenario.steps).await.unwrap();

    // only the notification present while the container was attached is hidden
    assert_eq!(hidden_ids(&report), vec!["a"]);
    assert_eq!(report.stats.containers_attached, 1);
    assert_eq!(document.observer_count(), 0);
}

#[tokio::test]
async fn test_replay_with_pattern_rule_from_config_file() {
    // Given: a config file selecting a wildcard rule
    let config_file = write_json(&serde_json::json!({
        "rule": { "kind": "pattern", "category": "info", "text": "Saved*" }
    }));
    let config = FilterConfig::load(config_file.path()).unwrap();
    let scenario: Scenario = serde_json::from_value(serde_json::json!({
        "containers": [{
            "id": "main",
            "notifications": [
                { "id": "n1", "category": "info", "text": "Saved draft" },
                { "id": "n2", "category": "info", "text": "Draft saved" },
                { "id": "n3", "category": "error", "text": "Saved with errors" }
            ]
        }]
    }))
    .unwrap();

    // When
    let report = Replay::new(&scenario, &config)
        .unwrap()
        .run(&scenario.steps)
        .await
        .unwrap();

    // Then
    assert_eq!(hidden_ids(&report), vec!["n1"]);
}

#[tokio::test]
async fn test_cancelled_replay_reports_interruption() {
    // Given: a scenario that would wait for a long time
    let scenario: Scenario = serde_json::from_value(serde_json::json!({
        "containers": [{ "id": "main" }],
        "steps": [
            { "action": "wait", "ms": 60000 },
            { "action": "add_notification", "container": "main", "id": "n1", "category": "error", "text": "BacklogWiki" }
        ]
    }))
    .unwrap();
    let replay = Replay::new(&scenario, &FilterConfig::default()).unwrap();

    // When: the filter's token is cancelled while waiting
    let token = replay.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        token.cancel();
    });
    let report = replay.run(&scenario.steps).await.unwrap();

    // Then: the remaining steps were skipped
    assert!(report.interrupted);
    assert!(report.notifications.is_empty());
}

#[test]
fn test_check_uses_config_rule() {
    let config_file = write_json(&serde_json::json!({
        "rule": { "kind": "expression", "source": "text.endsWith('!')" }
    }));
    let args = CheckArgs {
        category: "default".to_string(),
        text: "Hello!".to_string(),
        rule: None,
        config: Some(config_file.path().to_path_buf()),
        json: false,
    };

    let output = check(&args).unwrap();
    assert!(output.hidden);
    assert_eq!(output.rule, "text.endsWith('!')");
}
