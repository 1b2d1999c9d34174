// NETWORK TOPOLOGY
// Node registry (mutable status) and neighbor graph (immutable after init)
//
// SAFETY INVARIANTS:
// 1. The graph never changes after construction
// 2. A node never lists itself as a neighbor
// 3. Every neighbor id is a registered node
// 4. Generation is fully determined by the seed

use std::collections::BTreeMap;

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::block::HealthStatus;
use crate::config::NetworkConfig;

pub type NodeId = String;

/// A traffic-carrying participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,

    /// Maximum load and base stake weight
    pub capacity: f64,

    /// Successful validations
    pub history: u64,

    pub active: bool,

    pub current_load: f64,

    pub allocated_bandwidth: f64,

    /// Last observed health
    pub health: HealthStatus,

    /// Last observed latency
    pub latency: f64,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, capacity: f64, initial_bandwidth: f64) -> Self {
        Node {
            id: id.into(),
            capacity,
            history: 0,
            active: true,
            current_load: 0.0,
            allocated_bandwidth: initial_bandwidth,
            health: HealthStatus::Normal,
            latency: 0.0,
        }
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.current_load = 0.0;
        self.health = HealthStatus::Down;
    }

    /// Back to Active with nominal health.
    pub fn reactivate(&mut self, latency: f64) {
        self.active = true;
        self.health = HealthStatus::Normal;
        self.latency = latency;
    }

    pub fn record_validation(&mut self) {
        self.history += 1;
    }

    pub fn observe(&mut self, health: HealthStatus, latency: f64) {
        self.health = health;
        self.latency = latency;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub neighbor: NodeId,
    pub weight: f64,
}

/// Weighted adjacency list. Read-only after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    adjacency: BTreeMap<NodeId, Vec<Link>>,
}

impl Graph {
    /// Build from explicit directed edges `(from, to, weight)`. Self-loops are dropped.
    pub fn from_edges<I, S>(edges: I) -> Self
    where
        I: IntoIterator<Item = (S, S, f64)>,
        S: Into<NodeId>,
    {
        let mut adjacency: BTreeMap<NodeId, Vec<Link>> = BTreeMap::new();
        for (from, to, weight) in edges {
            let (from, to) = (from.into(), to.into());
            if from == to {
                continue;
            }
            let links = adjacency.entry(from).or_default();
            if !links.iter().any(|l| l.neighbor == to) {
                links.push(Link { neighbor: to, weight });
            }
        }
        Graph { adjacency }
    }

    pub fn neighbors(&self, node_id: &str) -> &[Link] {
        self.adjacency.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn neighbor_ids(&self, node_id: &str) -> Vec<&str> {
        self.neighbors(node_id).iter().map(|l| l.neighbor.as_str()).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Vec<Link>)> {
        self.adjacency.iter()
    }
}

/// Mutable per-node status, keyed and iterated in id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeRegistry {
    nodes: BTreeMap<NodeId, Node>,
}

impl NodeRegistry {
    pub fn from_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        NodeRegistry {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn get_mut(&mut self, node_id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }
}

/// Graph plus registry, generated together from one seed.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    pub graph: Graph,
    pub registry: NodeRegistry,
}

impl Topology {
    pub fn from_parts(graph: Graph, registry: NodeRegistry) -> Self {
        Topology { graph, registry }
    }

    /// Seeded generation: capacities uniform over `capacity_range`,
    /// 1..=3 distinct neighbors per node (never itself), weights in [1, 5).
    pub fn generate(config: &NetworkConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let ids = config.node_ids();

        let nodes = ids.iter().map(|id| {
            let capacity = if config.capacity_range.min < config.capacity_range.max {
                rng.gen_range(config.capacity_range.min..=config.capacity_range.max)
            } else {
                config.capacity_range.min
            };
            Node::new(id.clone(), capacity.round(), config.initial_bandwidth)
        });
        let registry = NodeRegistry::from_nodes(nodes.collect::<Vec<_>>());

        let mut edges = Vec::new();
        for id in &ids {
            let others: Vec<&String> = ids.iter().filter(|other| *other != id).collect();
            if others.is_empty() {
                continue;
            }
            let degree = rng.gen_range(1..=3usize).min(others.len());
            for neighbor in others.choose_multiple(&mut rng, degree) {
                edges.push((id.clone(), (*neighbor).clone(), rng.gen_range(1.0..5.0)));
            }
        }
        let graph = Graph::from_edges(edges);

        info!(
            "Generated topology: {} nodes, {} links (seed {})",
            registry.len(),
            graph.edge_count(),
            config.seed
        );
        Topology { graph, registry }
    }
}
