//! Stage dependency graph.

use forge_core::workflow::{StageDefinition, WorkflowDefinition};
use forge_core::{Error, Result};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// A node in the stage graph.
#[derive(Debug, Clone)]
pub struct StageNode {
    pub name: String,
    pub definition: StageDefinition,
}

/// Directed acyclic graph over `needs` edges.
///
/// Built once per run, before any job starts: unknown dependencies and
/// cycles are rejected here rather than deadlocking the scheduler later.
#[derive(Debug)]
pub struct StageDag {
    graph: DiGraph<StageNode, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl StageDag {
    /// Build and validate the graph from a workflow definition.
    pub fn build(definition: &WorkflowDefinition) -> Result<Self> {
        if definition.stages.is_empty() {
            return Err(Error::InvalidWorkflow("workflow has no stages".to_string()));
        }

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for stage in &definition.stages {
            if name_to_index.contains_key(&stage.name) {
                return Err(Error::InvalidWorkflow(format!(
                    "duplicate stage name: {}",
                    stage.name
                )));
            }
            let idx = graph.add_node(StageNode {
                name: stage.name.clone(),
                definition: stage.clone(),
            });
            name_to_index.insert(stage.name.clone(), idx);
        }

        for stage in &definition.stages {
            let stage_idx = name_to_index[&stage.name];
            for dep in &stage.needs {
                let dep_idx = name_to_index
                    .get(dep)
                    .ok_or_else(|| Error::UnknownDependency(dep.clone()))?;
                graph.add_edge(*dep_idx, stage_idx, ());
            }
        }

        let dag = StageDag {
            graph,
            name_to_index,
        };

        // Fail fast on cycles.
        dag.topological_order()?;

        Ok(dag)
    }

    /// All stages, in definition order.
    pub fn stages(&self) -> Vec<&StageNode> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Stages with no dependencies.
    pub fn roots(&self) -> Vec<&StageNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .count()
                    == 0
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Names of the stages a given stage depends on.
    pub fn predecessors(&self, stage_name: &str) -> Vec<&str> {
        self.name_to_index
            .get(stage_name)
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .filter_map(|n| self.graph.node_weight(n))
                    .map(|node| node.name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every stage reachable downstream of a given stage.
    pub fn dependents_transitive(&self, stage_name: &str) -> Vec<String> {
        let Some(&start) = self.name_to_index.get(stage_name) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        let mut result = Vec::new();

        while let Some(idx) = queue.pop_front() {
            for next in self.graph.neighbors_directed(idx, petgraph::Direction::Outgoing) {
                if seen.insert(next)
                    && let Some(node) = self.graph.node_weight(next)
                {
                    result.push(node.name.clone());
                    queue.push_back(next);
                }
            }
        }

        result
    }

    /// A stage is ready when every dependency is in the satisfied set.
    pub fn is_ready(&self, stage_name: &str, satisfied: &HashSet<String>) -> bool {
        self.predecessors(stage_name)
            .iter()
            .all(|pred| satisfied.contains(*pred))
    }

    /// Topologically sorted stages; fails with [`Error::DependencyCycle`].
    pub fn topological_order(&self) -> Result<Vec<&StageNode>> {
        toposort(&self.graph, None)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&idx| self.graph.node_weight(idx))
                    .collect()
            })
            .map_err(|_| Error::DependencyCycle)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}
