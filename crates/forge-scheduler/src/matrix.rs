//! Matrix expansion for parallel job fan-out.

use forge_core::ids::JobId;
use forge_core::workflow::{Assignment, MatrixSpec, StageDefinition};

/// One concrete job produced by expanding a stage.
#[derive(Debug, Clone)]
pub struct ExpandedJob {
    pub id: JobId,
    pub stage_name: String,
    pub index: usize,
    pub assignment: Assignment,
    pub display_name: String,
}

/// Expander for matrix specifications.
///
/// Expansion is deterministic: the cartesian product is enumerated in
/// declared axis order (first axis outermost) with each axis's values in
/// declared order, so job naming and log association are reproducible.
pub struct MatrixExpander;

impl MatrixExpander {
    pub fn new() -> Self {
        Self
    }

    /// Expand a matrix spec into an ordered assignment sequence.
    pub fn expand(&self, spec: &MatrixSpec) -> Vec<Assignment> {
        let axes: Vec<(&str, Vec<&serde_json::Value>)> = spec
            .axes
            .iter()
            .map(|axis| (axis.name.as_str(), axis.enabled_values()))
            .filter(|(_, values)| !values.is_empty())
            .collect();

        let mut assignments: Vec<Assignment> = if axes.is_empty() {
            Vec::new()
        } else {
            let mut combos = vec![Assignment::new()];
            for (name, values) in &axes {
                let mut next = Vec::with_capacity(combos.len() * values.len());
                for combo in &combos {
                    for value in values {
                        let mut entry = combo.clone();
                        entry.set(name.to_string(), (*value).clone());
                        next.push(entry);
                    }
                }
                combos = next;
            }
            combos
        };

        // Excludes first: an entry removes every assignment it matches on
        // all of its declared keys (absent keys are wildcards).
        assignments.retain(|assignment| {
            !spec
                .exclude
                .iter()
                .any(|exclude| exclude.matches_subset_of(assignment))
        });

        // Includes append assignments not already present post-exclusion.
        for include in &spec.include {
            if !assignments.iter().any(|a| a.equivalent(include)) {
                assignments.push(include.clone());
            }
        }

        assignments
    }

    /// Expand a stage into jobs. A stage without a matrix yields a single
    /// job with an empty assignment; an empty expansion yields zero jobs.
    pub fn jobs_for(&self, stage: &StageDefinition) -> Vec<ExpandedJob> {
        let assignments = match &stage.matrix {
            Some(spec) => self.expand(spec),
            None => vec![Assignment::new()],
        };

        assignments
            .into_iter()
            .enumerate()
            .map(|(index, assignment)| {
                let display_name = self.display_name(&stage.name, &assignment);
                ExpandedJob {
                    id: JobId::new(),
                    stage_name: stage.name.clone(),
                    index,
                    assignment,
                    display_name,
                }
            })
            .collect()
    }

    fn display_name(&self, stage_name: &str, assignment: &Assignment) -> String {
        if assignment.is_empty() {
            return stage_name.to_string();
        }
        let parts: Vec<String> = assignment
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{}={}", k, value)
            })
            .collect();
        format!("{} ({})", stage_name, parts.join(", "))
    }
}

impl Default for MatrixExpander {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::workflow::{AxisValue, MatrixAxis};
    use pretty_assertions::assert_eq;

    fn axis(name: &str, values: &[&str]) -> MatrixAxis {
        MatrixAxis {
            name: name.to_string(),
            values: values
                .iter()
                .map(|v| AxisValue::Plain(serde_json::json!(v)))
                .collect(),
            enabled: true,
        }
    }

    fn assignment(pairs: &[(&str, &str)]) -> Assignment {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect()
    }

    fn spec(axes: Vec<MatrixAxis>) -> MatrixSpec {
        MatrixSpec {
            axes,
            include: vec![],
            exclude: vec![],
        }
    }

    #[test]
    fn test_cartesian_product_order() {
        let spec = spec(vec![
            axis("os", &["linux", "macos"]),
            axis("suite", &["unit", "integration"]),
        ]);
        let expanded = MatrixExpander::new().expand(&spec);

        let names: Vec<String> = expanded
            .iter()
            .map(|a| {
                format!(
                    "{}/{}",
                    a.get("os").unwrap().as_str().unwrap(),
                    a.get("suite").unwrap().as_str().unwrap()
                )
            })
            .collect();
        assert_eq!(
            names,
            vec![
                "linux/unit",
                "linux/integration",
                "macos/unit",
                "macos/integration"
            ]
        );
    }

    #[test]
    fn test_expansion_is_deterministic() {
        let spec = spec(vec![
            axis("os", &["linux", "macos", "windows"]),
            axis("suite", &["unit", "integration"]),
        ]);
        let expander = MatrixExpander::new();
        let first = expander.expand(&spec);
        let second = expander.expand(&spec);
        assert_eq!(first, second);
    }

    #[test]
    fn test_partial_exclude_is_a_wildcard() {
        let mut matrix = spec(vec![
            axis("os", &["linux", "macos"]),
            axis("suite", &["unit", "integration"]),
        ]);
        matrix.exclude = vec![assignment(&[("os", "macos")])];

        let expanded = MatrixExpander::new().expand(&matrix);
        assert_eq!(expanded.len(), 2);
        assert!(
            expanded
                .iter()
                .all(|a| a.get("os") == Some(&serde_json::json!("linux")))
        );
    }

    #[test]
    fn test_exact_exclude_removes_one_entry() {
        let mut matrix = spec(vec![
            axis("os", &["linux", "macos"]),
            axis("suite", &["unit", "integration"]),
        ]);
        matrix.exclude = vec![assignment(&[("os", "macos"), ("suite", "integration")])];

        let expanded = MatrixExpander::new().expand(&matrix);
        assert_eq!(expanded.len(), 3);
        assert!(
            !expanded
                .iter()
                .any(|a| matrix.exclude[0].matches_subset_of(a))
        );
    }

    #[test]
    fn test_include_appends_new_assignment_once() {
        let mut matrix = spec(vec![axis("os", &["linux"])]);
        matrix.include = vec![
            assignment(&[("os", "freebsd")]),
            assignment(&[("os", "freebsd")]), // duplicate include entry
            assignment(&[("os", "linux")]),   // already in the base set
        ];

        let expanded = MatrixExpander::new().expand(&matrix);
        assert_eq!(expanded.len(), 2);
        assert_eq!(
            expanded[1].get("os"),
            Some(&serde_json::json!("freebsd"))
        );
    }

    #[test]
    fn test_include_survives_exclusion_of_base() {
        let mut matrix = spec(vec![axis("os", &["linux", "macos"])]);
        matrix.exclude = vec![assignment(&[("os", "linux")])];
        matrix.include = vec![assignment(&[("os", "linux"), ("suite", "smoke")])];

        let expanded = MatrixExpander::new().expand(&matrix);
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().any(|a| a.get("suite").is_some()));
    }

    #[test]
    fn test_disabled_value_is_excluded_from_product() {
        let mut os = axis("os", &["linux"]);
        os.values.push(AxisValue::Flagged {
            value: serde_json::json!("windows"),
            enabled: false,
        });
        let expanded = MatrixExpander::new().expand(&spec(vec![os]));
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].get("os"), Some(&serde_json::json!("linux")));
    }

    #[test]
    fn test_disabled_axis_drops_out_of_product() {
        let mut arch = axis("arch", &["amd64", "arm64"]);
        arch.enabled = false;
        let expanded =
            MatrixExpander::new().expand(&spec(vec![axis("os", &["linux", "macos"]), arch]));
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().all(|a| a.get("arch").is_none()));
    }

    #[test]
    fn test_everything_excluded_yields_zero_jobs() {
        let mut matrix = spec(vec![axis("os", &["linux"])]);
        matrix.exclude = vec![assignment(&[("os", "linux")])];
        assert!(MatrixExpander::new().expand(&matrix).is_empty());
    }

    #[test]
    fn test_jobs_for_stage_without_matrix() {
        let stage = StageDefinition {
            name: "lint".to_string(),
            needs: vec![],
            condition: None,
            matrix: None,
            steps: vec![],
        };
        let jobs = MatrixExpander::new().jobs_for(&stage);
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].assignment.is_empty());
        assert_eq!(jobs[0].display_name, "lint");
    }

    #[test]
    fn test_display_name_includes_assignment() {
        let stage = StageDefinition {
            name: "tests".to_string(),
            needs: vec![],
            condition: None,
            matrix: Some(spec(vec![axis("os", &["linux"]), axis("suite", &["unit"])])),
            steps: vec![],
        };
        let jobs = MatrixExpander::new().jobs_for(&stage);
        assert_eq!(jobs[0].display_name, "tests (os=linux, suite=unit)");
    }
}
