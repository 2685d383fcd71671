use dagcore::{NodeId, WorkflowDefinition, WorkflowError};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Node id -> upstream node ids, derived from a definition's links
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<NodeId, ()>,
    node_to_index: HashMap<NodeId, NodeIndex>,
    order: Vec<NodeId>,
}

impl DependencyGraph {
    /// Build the graph and reject cycles and links to unknown nodes
    pub fn build(workflow: &WorkflowDefinition) -> Result<Self, WorkflowError> {
        let mut graph = DiGraph::new();
        let mut node_to_index = HashMap::new();

        for node in &workflow.nodes {
            let idx = graph.add_node(node.id.clone());
            node_to_index.insert(node.id.clone(), idx);
        }

        for link in &workflow.links {
            let from_idx = node_to_index
                .get(&link.source_id)
                .ok_or_else(|| WorkflowError::NodeNotFound(link.source_id.clone()))?;
            let to_idx = node_to_index
                .get(&link.target_id)
                .ok_or_else(|| WorkflowError::NodeNotFound(link.target_id.clone()))?;

            // Several links between the same pair are one dependency.
            graph.update_edge(*from_idx, *to_idx, ());
        }

        let order = toposort(&graph, None)
            .map_err(|cycle| WorkflowError::CyclicDependency(graph[cycle.node_id()].clone()))?
            .into_iter()
            .map(|idx| graph[idx].clone())
            .collect();

        Ok(Self {
            graph,
            node_to_index,
            order,
        })
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.node_to_index.contains_key(node_id)
    }

    /// Node ids in dependency order
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Ids of the nodes whose output `node_id` consumes
    pub fn dependencies(&self, node_id: &str) -> BTreeSet<NodeId> {
        self.neighbors(node_id, Direction::Incoming)
    }

    fn neighbors(&self, node_id: &str, direction: Direction) -> BTreeSet<NodeId> {
        match self.node_to_index.get(node_id) {
            Some(idx) => self
                .graph
                .neighbors_directed(*idx, direction)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => BTreeSet::new(),
        }
    }

    /// `requested` plus every ancestor, without walking past nodes in
    /// `stop_at` (their output is already known, so their own ancestors
    /// need not run).
    pub fn closure<'a>(
        &self,
        requested: impl IntoIterator<Item = &'a str>,
        stop_at: &HashSet<&str>,
    ) -> Result<BTreeSet<NodeId>, WorkflowError> {
        let mut active = BTreeSet::new();
        let mut stack = Vec::new();
        for id in requested {
            if !self.contains(id) {
                return Err(WorkflowError::NodeNotFound(id.to_string()));
            }
            stack.push(id.to_string());
        }

        while let Some(id) = stack.pop() {
            if !active.insert(id.clone()) {
                continue;
            }
            if stop_at.contains(id.as_str()) {
                continue;
            }
            stack.extend(self.dependencies(&id));
        }

        Ok(active)
    }

    /// Every node reachable from `sources` along links, excluding the
    /// sources themselves.
    pub fn downstream<'a>(&self, sources: impl IntoIterator<Item = &'a str>) -> BTreeSet<NodeId> {
        let mut starts = BTreeSet::new();
        let mut reached = BTreeSet::new();
        for source in sources {
            let Some(&start) = self.node_to_index.get(source) else {
                continue;
            };
            starts.insert(source.to_string());
            let mut bfs = Bfs::new(&self.graph, start);
            while let Some(idx) = bfs.next(&self.graph) {
                reached.insert(self.graph[idx].clone());
            }
        }
        reached.retain(|id| !starts.contains(id));
        reached
    }
}
