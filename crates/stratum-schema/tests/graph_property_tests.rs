//! Property tests for the dependency graph: every acyclic edge set yields a
//! valid, repeatable linearization.

use std::collections::HashMap;

use proptest::prelude::*;
use stratum_schema::DependencyGraph;

const NODES: usize = 12;

fn table(i: usize) -> String {
    format!("table_{i:02}")
}

proptest! {
    #[test]
    fn topological_order_linearizes_acyclic_graphs(
        edges in prop::collection::vec((0..NODES, 0..NODES), 0..48)
    ) {
        let mut graph = DependencyGraph::new();
        for i in 0..NODES {
            graph.add_node(&table(i));
        }

        // Orient every pair from the higher index to the lower one, so the
        // generated edge set can never contain a cycle.
        let mut oriented = Vec::new();
        for (a, b) in edges {
            if a == b {
                continue;
            }
            let (from, to) = if a > b { (a, b) } else { (b, a) };
            graph.add_edge(&table(from), &table(to), false);
            oriented.push((from, to));
        }

        let order = graph.topological_order().unwrap();
        prop_assert_eq!(order.len(), NODES);

        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        for (from, to) in oriented {
            prop_assert!(position[table(to).as_str()] < position[table(from).as_str()]);
        }

        // Unchanged graph, unchanged order.
        prop_assert_eq!(order, graph.topological_order().unwrap());
    }

    #[test]
    fn reversing_an_edge_in_a_chain_creates_a_cycle(len in 2usize..8) {
        let mut graph = DependencyGraph::new();
        for i in 1..len {
            graph.add_edge(&table(i), &table(i - 1), true);
        }
        prop_assert!(graph.topological_order().is_ok());

        graph.add_edge(&table(0), &table(len - 1), false);
        prop_assert!(graph.topological_order().is_err());
    }
}
