//! Serialization tests for forge-core definition types.

use forge_core::condition::{Expr, Operand};
use forge_core::workflow::*;

#[test]
fn test_full_workflow_definition_parses() {
    let json = serde_json::json!({
        "name": "release-pipeline",
        "variables": { "RUST_BACKTRACE": "1" },
        "stages": [
            {
                "name": "lint",
                "steps": [ { "name": "clippy", "run": "cargo clippy" } ]
            },
            {
                "name": "tests",
                "matrix": {
                    "axes": [
                        { "name": "os", "values": ["linux", "macos",
                            { "value": "windows", "enabled": false }] },
                        { "name": "suite", "values": ["unit", "integration"] }
                    ],
                    "exclude": [ { "os": "macos", "suite": "integration" } ],
                    "include": [ { "os": "linux", "suite": "doctest" } ]
                },
                "steps": [
                    {
                        "name": "restore deps",
                        "cache": {
                            "key": "deps-v1-abc123",
                            "restore_keys": ["deps-v1-", "deps-"],
                            "paths": ["target"]
                        },
                        "run": "cargo fetch"
                    },
                    { "name": "run suite", "run": "cargo test" }
                ]
            },
            {
                "name": "build",
                "needs": ["lint", "tests"],
                "steps": [
                    { "name": "compile", "run": "cargo build --release" },
                    {
                        "name": "publish binary",
                        "condition": { "starts_with": [
                            { "var": "event.ref" }, { "value": "refs/tags/" } ] },
                        "upload": { "name": "binary-linux", "paths": ["target/release/app"] }
                    }
                ]
            }
        ],
        "release": {
            "needs": ["build"],
            "draft": true,
            "platforms": [
                { "label": "linux", "artifact": "binary-linux", "executable": true },
                { "label": "windows", "artifact": "binary-windows", "archive": "zip" }
            ]
        }
    });

    let definition: WorkflowDefinition = serde_json::from_value(json).unwrap();

    assert_eq!(definition.stages.len(), 3);
    let tests = definition.stage("tests").unwrap();
    let matrix = tests.matrix.as_ref().unwrap();
    assert_eq!(matrix.axes[0].enabled_values().len(), 2);
    assert_eq!(matrix.exclude.len(), 1);
    assert_eq!(
        matrix.include[0].get("suite"),
        Some(&serde_json::json!("doctest"))
    );

    let build = definition.stage("build").unwrap();
    let publish = &build.steps[1];
    assert!(matches!(
        publish.condition,
        Some(Expr::StartsWith(Operand::Var(_), Operand::Value(_)))
    ));

    let release = definition.release.unwrap();
    assert!(release.draft);
    assert_eq!(release.platforms[1].archive, ArchiveFormat::Zip);
}

#[test]
fn test_assignment_round_trips_as_a_map() {
    let entry: Assignment = serde_json::from_str(r#"{"os": "linux", "suite": "unit"}"#).unwrap();
    let json = serde_json::to_string(&entry).unwrap();
    let back: Assignment = serde_json::from_str(&json).unwrap();
    assert!(entry.equivalent(&back));
    assert_eq!(json, r#"{"os":"linux","suite":"unit"}"#);
}
