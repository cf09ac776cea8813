//! Execution DAG for the concurrent scheduler.
//!
//! Built from a resolved order, the DAG answers dependency queries by node
//! index and groups targets into waves: each wave contains targets whose
//! dependencies all sit in earlier waves.

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::resolver::{ResolvedOrder, lookup};
use super::types::ResolveError;
use crate::target::TargetRegistry;

/// A DAG over the targets of one resolved order.
///
/// Node indices match positions in the resolved order, so `NodeIndex::new(i)`
/// is the `i`th target to run sequentially.
pub struct ExecutionDag {
  graph: DiGraph<String, ()>,
}

impl ExecutionDag {
  /// Build the DAG, adding an edge from each dependency to its dependent.
  pub fn from_order(registry: &TargetRegistry, resolved: &ResolvedOrder) -> Result<Self, ResolveError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for name in &resolved.order {
      let idx = graph.add_node(name.clone());
      nodes.insert(name.clone(), idx);
    }

    for name in &resolved.order {
      let target = lookup(registry, name)?;
      let dependent_idx = nodes[name];
      for dep in target.dependencies() {
        let dep_idx = *nodes.get(dep).ok_or_else(|| ResolveError::UnknownTarget {
          name: dep.clone(),
          required_by: Some(name.clone()),
        })?;
        graph.update_edge(dep_idx, dependent_idx, ());
      }
    }

    let dag = Self { graph };
    dag.verify_acyclic()?;
    Ok(dag)
  }

  fn verify_acyclic(&self) -> Result<(), ResolveError> {
    toposort(&self.graph, None).map_err(|cycle| {
      let name = self.graph[cycle.node_id()].clone();
      ResolveError::Cycle {
        path: vec![name.clone(), name],
      }
    })?;
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.graph.node_count()
  }

  pub fn is_empty(&self) -> bool {
    self.graph.node_count() == 0
  }

  pub fn name(&self, idx: NodeIndex) -> &str {
    &self.graph[idx]
  }

  /// Direct dependencies of a node.
  pub fn dependencies(&self, idx: NodeIndex) -> Vec<NodeIndex> {
    self.graph.neighbors_directed(idx, Direction::Incoming).collect()
  }

  /// Group targets into parallel waves.
  ///
  /// Within a wave, targets keep their resolved-order position.
  pub fn waves(&self) -> Result<Vec<Vec<String>>, ResolveError> {
    // Kahn's algorithm, one level at a time
    let mut in_degree: Vec<usize> = self
      .graph
      .node_indices()
      .map(|idx| self.graph.neighbors_directed(idx, Direction::Incoming).count())
      .collect();
    let mut remaining: Vec<NodeIndex> = self.graph.node_indices().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
      let (ready, blocked): (Vec<NodeIndex>, Vec<NodeIndex>) =
        remaining.into_iter().partition(|idx| in_degree[idx.index()] == 0);

      if ready.is_empty() {
        let name = self.graph[blocked[0]].clone();
        return Err(ResolveError::Cycle {
          path: vec![name.clone(), name],
        });
      }

      for &idx in &ready {
        for dependent in self.graph.neighbors_directed(idx, Direction::Outgoing) {
          in_degree[dependent.index()] = in_degree[dependent.index()].saturating_sub(1);
        }
      }

      waves.push(ready.iter().map(|&idx| self.graph[idx].clone()).collect());
      remaining = blocked;
    }

    Ok(waves)
  }
}
