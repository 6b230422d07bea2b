use std::collections::{BTreeSet, HashMap};

use nodeflow_core::error::{NodeflowError, Result};
use nodeflow_core::graph::Graph;

/// Compute a deterministic execution order for `graph`.
///
/// Kahn's algorithm; when several nodes are ready at once the one declared
/// first runs first. Duplicate node ids and edges that reference undeclared
/// nodes are rejected as [`NodeflowError::InvalidGraph`], cycles as
/// [`NodeflowError::CycleDetected`].
pub fn schedule(graph: &Graph) -> Result<Vec<String>> {
    topological_order(graph, false)
}

/// Shared by [`schedule`] and the validator, which reports dangling edges
/// itself and therefore asks for them to be skipped here.
pub(crate) fn topological_order(graph: &Graph, skip_dangling: bool) -> Result<Vec<String>> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(graph.nodes.len());
    for (i, node) in graph.nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), i).is_some() {
            return Err(NodeflowError::InvalidGraph(format!(
                "Duplicate node id: {}",
                node.id
            )));
        }
    }

    let mut in_degree = vec![0usize; graph.nodes.len()];
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];

    for edge in &graph.edges {
        let (source, target) = match (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
            (Some(&s), Some(&t)) => (s, t),
            _ if skip_dangling => continue,
            (None, _) => {
                return Err(NodeflowError::InvalidGraph(format!(
                    "Edge {} references unknown source node {}",
                    edge.id, edge.source
                )))
            }
            (_, None) => {
                return Err(NodeflowError::InvalidGraph(format!(
                    "Edge {} references unknown target node {}",
                    edge.id, edge.target
                )))
            }
        };
        adjacency[source].push(target);
        in_degree[target] += 1;
    }

    // Ready set ordered by declaration index
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let mut order = Vec::with_capacity(graph.nodes.len());
    while let Some(current) = ready.pop_first() {
        order.push(current);
        for &next in &adjacency[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.insert(next);
            }
        }
    }

    if order.len() < graph.nodes.len() {
        let remaining = graph
            .nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, n)| n.id.clone())
            .collect();
        return Err(NodeflowError::CycleDetected { remaining });
    }

    Ok(order
        .into_iter()
        .map(|i| graph.nodes[i].id.clone())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_core::graph::{FlowEdge, FlowNode};

    fn edge(id: &str, from: &str, to: &str) -> FlowEdge {
        FlowEdge::new(id, from, "out", to, "in")
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> Graph {
        let mut g = Graph::new("test");
        for id in nodes {
            g = g.with_node(FlowNode::new(*id, "testHello"));
        }
        for (i, (from, to)) in edges.iter().enumerate() {
            g = g.with_edge(edge(&format!("e{i}"), from, to));
        }
        g
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn test_respects_every_edge() {
        let edges = [("a", "c"), ("b", "c"), ("c", "d"), ("a", "d"), ("e", "b")];
        let g = graph(&["a", "b", "c", "d", "e"], &edges);
        let order = schedule(&g).unwrap();

        assert_eq!(order.len(), 5);
        for (from, to) in edges {
            assert!(position(&order, from) < position(&order, to), "{from} -> {to}");
        }
    }

    #[test]
    fn test_ties_break_by_declaration_order() {
        let g = graph(&["prompt", "model", "chain"], &[("prompt", "chain"), ("model", "chain")]);
        assert_eq!(schedule(&g).unwrap(), vec!["prompt", "model", "chain"]);

        let g = graph(&["z", "y", "x"], &[]);
        assert_eq!(schedule(&g).unwrap(), vec!["z", "y", "x"]);
    }

    #[test]
    fn test_ready_node_declared_earlier_wins_after_unblocking() {
        // c unblocks after a and, declared before b, runs next
        let g = graph(&["a", "c", "b"], &[("a", "c")]);
        assert_eq!(schedule(&g).unwrap(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_is_idempotent() {
        let g = graph(&["a", "b", "c"], &[("b", "a"), ("c", "a")]);
        assert_eq!(schedule(&g).unwrap(), schedule(&g).unwrap());
    }

    #[test]
    fn test_self_loop_is_cycle() {
        let g = graph(&["a"], &[("a", "a")]);
        match schedule(&g).unwrap_err() {
            NodeflowError::CycleDetected { remaining } => assert_eq!(remaining, vec!["a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_lists_only_unscheduled_nodes() {
        let g = graph(
            &["root", "a", "b", "tail"],
            &[("root", "a"), ("a", "b"), ("b", "a"), ("b", "tail")],
        );
        match schedule(&g).unwrap_err() {
            NodeflowError::CycleDetected { remaining } => {
                assert_eq!(remaining, vec!["a", "b", "tail"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let g = graph(&["a", "a"], &[]);
        assert!(matches!(schedule(&g), Err(NodeflowError::InvalidGraph(_))));
    }

    #[test]
    fn test_dangling_edge() {
        let g = graph(&["a"], &[("a", "ghost")]);
        assert!(matches!(schedule(&g), Err(NodeflowError::InvalidGraph(_))));
        assert_eq!(topological_order(&g, true).unwrap(), vec!["a"]);
    }

    #[test]
    fn test_empty_graph() {
        assert!(schedule(&Graph::new("empty")).unwrap().is_empty());
    }
}
