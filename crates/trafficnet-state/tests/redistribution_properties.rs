// Load conservation across redistribution

use proptest::prelude::*;
use trafficnet_core::{CongestionLevel, EventKind, Graph, Node, NodeRegistry, Thresholds, Topology};
use trafficnet_state::{manage_load, NetworkContext};

fn star(neighbor_loads: &[f64], neighbor_active: &[bool]) -> NetworkContext {
    let mut nodes = vec![Node::new("Hub", 100.0, 50.0)];
    let mut edges = Vec::new();
    for (i, (load, active)) in neighbor_loads.iter().zip(neighbor_active).enumerate() {
        let id = format!("Leaf_{}", i);
        let mut node = Node::new(id.clone(), 100.0, 50.0);
        node.current_load = *load;
        node.active = *active;
        nodes.push(node);
        edges.push(("Hub".to_string(), id, 1.0));
    }
    NetworkContext::new(
        Topology::from_parts(Graph::from_edges(edges), NodeRegistry::from_nodes(nodes)),
        Thresholds::default(),
    )
}

proptest! {
    #[test]
    fn excess_is_conserved_or_capped(
        volume in 100.5f64..600.0,
        leaves in prop::collection::vec((0.0f64..100.0, any::<bool>()), 0..5),
        ddos in any::<bool>(),
    ) {
        let loads: Vec<f64> = leaves.iter().map(|(l, _)| *l).collect();
        let active: Vec<bool> = leaves.iter().map(|(_, a)| *a).collect();
        let mut ctx = star(&loads, &active);
        let neighbors_before: f64 = ctx.total_load() - ctx.node("Hub").unwrap().current_load;
        let event = if ddos { EventKind::Ddos } else { EventKind::Normal };

        let outcome = manage_load(&mut ctx, "Hub", volume, CongestionLevel::High, event)
            .unwrap()
            .unwrap();

        let hub = ctx.node("Hub").unwrap().current_load;
        let neighbors_after = ctx.total_load() - hub;
        prop_assert_eq!(hub, 100.0);
        prop_assert!((outcome.excess - (volume - 100.0)).abs() < 1e-9);

        if outcome.shares.is_empty() {
            prop_assert!((neighbors_after - neighbors_before).abs() < 1e-9);
        } else {
            prop_assert!((neighbors_after - neighbors_before - outcome.excess).abs() < 1e-6);
            prop_assert!((outcome.delivered() - outcome.excess).abs() < 1e-6);
            for (id, _) in &outcome.shares {
                let node = ctx.node(id).unwrap();
                prop_assert!(node.active);
            }
        }
    }
}
