// NETWORK CONTEXT
// Single writer for node status, load, bandwidth and live thresholds
//
// SAFETY INVARIANTS:
// 1. All mutation of node status and thresholds goes through this type
// 2. The graph is read-only for the lifetime of the context
// 3. When shared, exactly one parking_lot::Mutex guards the whole context
// 4. Inactive nodes carry zero load

use std::sync::Arc;

use log::{info, warn};
use parking_lot::Mutex;
use thiserror::Error;
use trafficnet_core::{
    EventKind, Graph, HealthStatus, NetworkConfig, Node, NodeRegistry, Thresholds, Topology,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown node {0}")]
    UnknownNode(String),
}

pub type StateResult<T> = Result<T, StateError>;

pub type SharedContext = Arc<Mutex<NetworkContext>>;

#[derive(Debug, Clone)]
pub struct NetworkContext {
    graph: Graph,
    registry: NodeRegistry,
    thresholds: Thresholds,
}

impl NetworkContext {
    pub fn new(topology: Topology, thresholds: Thresholds) -> Self {
        NetworkContext {
            graph: topology.graph,
            registry: topology.registry,
            thresholds,
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(Topology::generate(config), config.thresholds)
    }

    pub fn into_shared(self) -> SharedContext {
        Arc::new(Mutex::new(self))
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn node(&self, node_id: &str) -> StateResult<&Node> {
        self.registry
            .get(node_id)
            .ok_or_else(|| StateError::UnknownNode(node_id.to_string()))
    }

    pub fn node_mut(&mut self, node_id: &str) -> StateResult<&mut Node> {
        self.registry
            .get_mut(node_id)
            .ok_or_else(|| StateError::UnknownNode(node_id.to_string()))
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: Thresholds) {
        if thresholds != self.thresholds {
            info!(
                "Live thresholds changed: {}/{} -> {}/{}",
                self.thresholds.medium, self.thresholds.high, thresholds.medium, thresholds.high
            );
        }
        self.thresholds = thresholds;
    }

    /// Record an observation: active nodes take the reported load, inactive ones carry none.
    pub fn observe(&mut self, node_id: &str, volume: f64, health: HealthStatus, latency: f64) -> StateResult<()> {
        let node = self.node_mut(node_id)?;
        node.current_load = if node.active { volume } else { 0.0 };
        node.observe(health, latency);
        Ok(())
    }

    /// Apply an input event. Outages move the node to Inactive.
    pub fn apply_event(&mut self, node_id: &str, event: EventKind) -> StateResult<()> {
        if event == EventKind::Outage {
            let node = self.node_mut(node_id)?;
            if node.active {
                warn!("Outage on {}, node deactivated", node_id);
            }
            node.deactivate();
        }
        Ok(())
    }

    /// Operator-initiated reactivation.
    pub fn reactivate(&mut self, node_id: &str, latency: f64) -> StateResult<()> {
        let node = self.node_mut(node_id)?;
        node.reactivate(latency);
        info!("{} reactivated by operator", node_id);
        Ok(())
    }

    /// Reset load, activity and bandwidth before a stage run.
    pub fn reset_status(&mut self, initial_bandwidth: f64) {
        for node in self.registry.iter_mut() {
            node.current_load = 0.0;
            node.active = true;
            node.allocated_bandwidth = initial_bandwidth;
            node.health = HealthStatus::Normal;
        }
    }

    /// Neighbors that are active and below their own capacity.
    pub fn available_neighbors(&self, node_id: &str) -> Vec<String> {
        self.graph
            .neighbors(node_id)
            .iter()
            .filter(|link| {
                self.registry
                    .get(&link.neighbor)
                    .map(|n| n.active && n.current_load < n.capacity)
                    .unwrap_or(false)
            })
            .map(|link| link.neighbor.clone())
            .collect()
    }

    /// Total load across the registry.
    pub fn total_load(&self) -> f64 {
        self.registry.iter().map(|n| n.current_load).sum()
    }

    /// Total allocated bandwidth across the registry.
    pub fn total_bandwidth(&self) -> f64 {
        self.registry.iter().map(|n| n.allocated_bandwidth).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> NetworkContext {
        let registry = NodeRegistry::from_nodes(vec![
            Node::new("A", 100.0, 50.0),
            Node::new("B", 100.0, 50.0),
            Node::new("C", 100.0, 50.0),
        ]);
        let graph = Graph::from_edges(vec![("A", "B", 1.0), ("A", "C", 2.0)]);
        NetworkContext::new(Topology::from_parts(graph, registry), Thresholds::default())
    }

    #[test]
    fn test_outage_and_operator_reactivation() {
        let mut ctx = context();
        ctx.observe("B", 80.0, HealthStatus::Normal, 1.0).unwrap();
        ctx.apply_event("B", EventKind::Outage).unwrap();
        assert!(!ctx.node("B").unwrap().active);
        assert_eq!(ctx.node("B").unwrap().current_load, 0.0);

        ctx.observe("B", 40.0, HealthStatus::Down, 0.0).unwrap();
        assert_eq!(ctx.node("B").unwrap().current_load, 0.0);

        ctx.reactivate("B", 1.5).unwrap();
        assert!(ctx.node("B").unwrap().active);
        assert_eq!(ctx.reactivate("Z", 1.0), Err(StateError::UnknownNode("Z".into())));
    }

    #[test]
    fn test_available_neighbors_excludes_full_and_inactive() {
        let mut ctx = context();
        ctx.observe("B", 100.0, HealthStatus::Normal, 1.0).unwrap();
        assert_eq!(ctx.available_neighbors("A"), vec!["C".to_string()]);
        ctx.apply_event("C", EventKind::Outage).unwrap();
        assert!(ctx.available_neighbors("A").is_empty());
    }

    #[test]
    fn test_shared_context_single_lock() {
        let shared = context().into_shared();
        shared.lock().set_thresholds(Thresholds { medium: 30.0, high: 60.0 });
        assert_eq!(shared.lock().thresholds().high, 60.0);
    }
}
