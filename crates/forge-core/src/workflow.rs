//! Workflow definition types.
//!
//! These types represent the user-authored declarative workflow configuration.

use crate::condition::Expr;
use schemars::JsonSchema;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub stages: Vec<StageDefinition>,
    #[serde(default)]
    pub release: Option<ReleaseSpec>,
}

impl WorkflowDefinition {
    /// Look up a stage definition by name.
    pub fn stage(&self, name: &str) -> Option<&StageDefinition> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageDefinition {
    pub name: String,
    #[serde(default)]
    pub needs: Vec<String>,
    #[serde(default)]
    pub condition: Option<Expr>,
    #[serde(default)]
    pub matrix: Option<MatrixSpec>,
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    pub name: String,
    #[serde(default)]
    pub condition: Option<Expr>,
    #[serde(default)]
    pub cache: Option<CacheUse>,
    #[serde(default)]
    pub run: Option<String>,
    #[serde(default)]
    pub upload: Option<ArtifactUpload>,
    #[serde(default)]
    pub download: Option<ArtifactDownload>,
}

/// Cache declaration on a step: restore before the command, save after it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheUse {
    pub key: String,
    #[serde(default)]
    pub restore_keys: Vec<String>,
    #[serde(default)]
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactUpload {
    pub name: String,
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactDownload {
    pub name: String,
    #[serde(default)]
    pub dest: Option<PathBuf>,
}

/// Matrix fan-out specification for a stage.
///
/// Axis order is significant: expansion enumerates the cartesian product in
/// declared axis order with the first axis outermost, so two expansions of
/// the same spec produce identically ordered assignments.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixSpec {
    pub axes: Vec<MatrixAxis>,
    #[serde(default)]
    pub include: Vec<Assignment>,
    #[serde(default)]
    pub exclude: Vec<Assignment>,
}

/// One matrix axis. A disabled axis is kept in the definition but excluded
/// from the product entirely.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatrixAxis {
    pub name: String,
    pub values: Vec<AxisValue>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl MatrixAxis {
    /// Currently-enabled values, in declared order.
    pub fn enabled_values(&self) -> Vec<&serde_json::Value> {
        if !self.enabled {
            return Vec::new();
        }
        self.values
            .iter()
            .filter(|v| v.is_enabled())
            .map(|v| v.value())
            .collect()
    }
}

/// An axis value, either a bare scalar or a scalar with an explicit enabled
/// flag (a deactivated value stays in the definition rather than being
/// silently dropped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum AxisValue {
    Flagged {
        value: serde_json::Value,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Plain(serde_json::Value),
}

impl AxisValue {
    pub fn value(&self) -> &serde_json::Value {
        match self {
            AxisValue::Plain(v) => v,
            AxisValue::Flagged { value, .. } => value,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            AxisValue::Plain(_) => true,
            AxisValue::Flagged { enabled, .. } => *enabled,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A concrete axis-to-value mapping, ordered by declaration.
///
/// Used both for include/exclude entries in a [`MatrixSpec`] and for the
/// expanded assignment of a job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assignment(Vec<(String, serde_json::Value)>);

impl Assignment {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn set(&mut self, axis: impl Into<String>, value: serde_json::Value) {
        let axis = axis.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == axis) {
            entry.1 = value;
        } else {
            self.0.push((axis, value));
        }
    }

    pub fn get(&self, axis: &str) -> Option<&serde_json::Value> {
        self.0.iter().find(|(k, _)| k == axis).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if every key this entry declares matches `other` exactly.
    /// Keys absent from `self` are wildcards.
    pub fn matches_subset_of(&self, other: &Assignment) -> bool {
        self.0.iter().all(|(k, v)| other.get(k) == Some(v))
    }

    /// True if both assignments bind exactly the same axes to the same
    /// values, regardless of entry order.
    pub fn equivalent(&self, other: &Assignment) -> bool {
        self.0.len() == other.0.len() && self.matches_subset_of(other)
    }
}

impl FromIterator<(String, serde_json::Value)> for Assignment {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for Assignment {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Assignment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct AssignmentVisitor;

        impl<'de> Visitor<'de> for AssignmentVisitor {
            type Value = Assignment;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a map of axis names to values")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut map: A,
            ) -> std::result::Result<Assignment, A::Error> {
                let mut entries = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    entries.push((key, value));
                }
                Ok(Assignment(entries))
            }
        }

        deserializer.deserialize_map(AssignmentVisitor)
    }
}

impl JsonSchema for Assignment {
    fn schema_name() -> String {
        "Assignment".to_string()
    }

    fn json_schema(_: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        use schemars::schema::{InstanceType, ObjectValidation, Schema, SchemaObject};
        SchemaObject {
            instance_type: Some(InstanceType::Object.into()),
            object: Some(Box::new(ObjectValidation {
                additional_properties: Some(Box::new(Schema::Bool(true))),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

/// The terminal release phase: packaging rules and publish gating.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseSpec {
    /// Build-class stages that must succeed before publishing.
    #[serde(default)]
    pub needs: Vec<String>,
    pub platforms: Vec<PlatformTarget>,
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlatformTarget {
    pub label: String,
    /// Name of the artifact holding this platform's build output.
    pub artifact: String,
    #[serde(default)]
    pub archive: ArchiveFormat,
    /// Restore executable permissions on packaged files.
    #[serde(default)]
    pub executable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    #[default]
    TarGz,
    Zip,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Zip => "zip",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_assignment_preserves_declaration_order() {
        let assignment: Assignment =
            serde_json::from_str(r#"{"os": "linux", "arch": "arm64"}"#).unwrap();
        let keys: Vec<&str> = assignment.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["os", "arch"]);
    }

    #[test]
    fn test_assignment_subset_match() {
        let mut base = Assignment::new();
        base.set("os", serde_json::json!("macos"));
        base.set("arch", serde_json::json!("amd64"));

        let mut partial = Assignment::new();
        partial.set("os", serde_json::json!("macos"));

        assert!(partial.matches_subset_of(&base));
        assert!(!base.matches_subset_of(&partial));
        assert!(!partial.equivalent(&base));
    }

    #[test]
    fn test_assignment_equivalent_ignores_order() {
        let mut a = Assignment::new();
        a.set("os", serde_json::json!("linux"));
        a.set("arch", serde_json::json!("arm64"));

        let mut b = Assignment::new();
        b.set("arch", serde_json::json!("arm64"));
        b.set("os", serde_json::json!("linux"));

        assert!(a.equivalent(&b));
    }

    #[test]
    fn test_axis_value_enabled_flag() {
        let plain: AxisValue = serde_json::from_str("\"linux\"").unwrap();
        assert!(plain.is_enabled());

        let flagged: AxisValue =
            serde_json::from_str(r#"{"value": "windows", "enabled": false}"#).unwrap();
        assert!(!flagged.is_enabled());
        assert_eq!(flagged.value(), &serde_json::json!("windows"));
    }

    #[test]
    fn test_archive_format_extension() {
        assert_eq!(ArchiveFormat::TarGz.extension(), "tar.gz");
        assert_eq!(ArchiveFormat::Zip.extension(), "zip");
    }
}
