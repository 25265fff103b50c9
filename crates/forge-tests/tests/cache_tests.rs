//! End-to-end cache behaviour across runs.

use forge_core::run::{RunStatus, TriggerEvent};
use forge_core::workflow::{AxisValue, MatrixAxis, MatrixSpec};
use forge_tests::*;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_cold_start_then_exact_hit_on_the_next_run() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedExecutor::passing(), workspace.path());

    let definition = workflow(
        "ci",
        vec![stage(
            "deps",
            &[],
            vec![cached_step(
                "fetch",
                "cargo fetch",
                "deps-v1-abc123",
                &["deps-v1-"],
            )],
        )],
    );

    let first = harness
        .coordinator
        .execute(&definition, TriggerEvent::pull_request("refs/heads/a"))
        .await
        .unwrap();
    let outcome = first.stage("deps").unwrap().jobs[0].steps[0]
        .cache
        .clone()
        .unwrap();
    assert!(!outcome.hit);
    assert_eq!(first.status, RunStatus::Succeeded); // a miss is not a failure

    let second = harness
        .coordinator
        .execute(&definition, TriggerEvent::pull_request("refs/heads/b"))
        .await
        .unwrap();
    let outcome = second.stage("deps").unwrap().jobs[0].steps[0]
        .cache
        .clone()
        .unwrap();
    assert!(outcome.hit);
    assert!(outcome.exact);
    assert_eq!(outcome.matched_key.as_deref(), Some("deps-v1-abc123"));
}

#[tokio::test]
async fn test_changed_manifest_falls_back_to_prefix_match() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedExecutor::passing(), workspace.path());

    let old = workflow(
        "ci",
        vec![stage(
            "deps",
            &[],
            vec![cached_step("fetch", "cargo fetch", "deps-v1-old", &["deps-v1-"])],
        )],
    );
    harness
        .coordinator
        .execute(&old, TriggerEvent::pull_request("refs/heads/a"))
        .await
        .unwrap();

    // The manifest hash changed; the prefix chain still finds the old entry.
    let new = workflow(
        "ci",
        vec![stage(
            "deps",
            &[],
            vec![cached_step("fetch", "cargo fetch", "deps-v1-new", &["deps-v1-"])],
        )],
    );
    let run = harness
        .coordinator
        .execute(&new, TriggerEvent::pull_request("refs/heads/b"))
        .await
        .unwrap();

    let outcome = run.stage("deps").unwrap().jobs[0].steps[0]
        .cache
        .clone()
        .unwrap();
    assert!(outcome.hit);
    assert!(!outcome.exact);
    assert_eq!(outcome.matched_key.as_deref(), Some("deps-v1-old"));
}

#[tokio::test]
async fn test_cache_scopes_follow_the_os_axis() {
    let workspace = tempfile::tempdir().unwrap();
    let harness = Harness::new(ScriptedExecutor::passing(), workspace.path());

    let matrix_for = |values: &[&str]| MatrixSpec {
        axes: vec![MatrixAxis {
            name: "os".to_string(),
            values: values
                .iter()
                .map(|v| AxisValue::Plain(serde_json::json!(v)))
                .collect(),
            enabled: true,
        }],
        include: vec![],
        exclude: vec![],
    };

    // Warm the cache from a linux job only.
    let mut warm = stage(
        "deps",
        &[],
        vec![cached_step("fetch", "cargo fetch", "deps-v1-abc", &["deps-"])],
    );
    warm.matrix = Some(matrix_for(&["linux"]));
    harness
        .coordinator
        .execute(
            &workflow("ci", vec![warm]),
            TriggerEvent::pull_request("refs/heads/a"),
        )
        .await
        .unwrap();

    // A macos job with the same keys sees a cold cache.
    let mut probe = stage(
        "deps",
        &[],
        vec![cached_step("fetch", "cargo fetch", "deps-v1-abc", &["deps-"])],
    );
    probe.matrix = Some(matrix_for(&["macos"]));
    let run = harness
        .coordinator
        .execute(
            &workflow("ci", vec![probe]),
            TriggerEvent::pull_request("refs/heads/b"),
        )
        .await
        .unwrap();

    let outcome = run.stage("deps").unwrap().jobs[0].steps[0]
        .cache
        .clone()
        .unwrap();
    assert!(!outcome.hit);
}
