//! Workflow file loading tests against a realistic fixture.

use forge_core::workflow::WorkflowDefinition;
use forge_scheduler::{MatrixExpander, StageDag};

fn fixture() -> WorkflowDefinition {
    serde_yaml::from_str(include_str!("fixtures/release.yaml")).unwrap()
}

#[test]
fn test_fixture_parses_and_builds_a_valid_dag() {
    let definition = fixture();
    assert_eq!(definition.name, "release-pipeline");

    let dag = StageDag::build(&definition).unwrap();
    let order: Vec<&str> = dag
        .topological_order()
        .unwrap()
        .iter()
        .map(|node| node.name.as_str())
        .collect();
    assert_eq!(order.last(), Some(&"build"));
}

#[test]
fn test_fixture_matrix_honours_disabled_value_and_exclude() {
    let definition = fixture();
    let tests = definition.stage("tests").unwrap();

    let jobs = MatrixExpander::new().jobs_for(tests);
    // windows is disabled; (macos, integration) is excluded.
    let names: Vec<&str> = jobs.iter().map(|j| j.display_name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "tests (os=linux, suite=unit)",
            "tests (os=linux, suite=integration)",
            "tests (os=macos, suite=unit)",
        ]
    );
}

#[test]
fn test_fixture_release_spec() {
    let definition = fixture();
    let release = definition.release.unwrap();
    assert_eq!(release.needs, vec!["build".to_string()]);
    assert_eq!(release.platforms.len(), 2);
    assert!(release.platforms[0].executable);
}
