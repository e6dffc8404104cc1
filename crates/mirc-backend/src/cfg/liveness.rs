use std::collections::BTreeSet;

use log::trace;

use super::{CfgGraph, NodeId};

/// Solve live-in and live-out for every node of `graph`.
///
/// ```text
/// out(n) = union(in(s) for s in succ(n))
/// in(n)  = union(use(n), out(n) - def(n))
/// ```
///
/// Each pass walks backwards from the exit along predecessor edges, then
/// from every node the exit cannot be reached from. Passes repeat until no
/// set grows.
pub fn solve_liveness(graph: &mut CfgGraph) {
    let exit = graph.exit;
    let mut passes = 0;

    loop {
        passes += 1;

        let mut visited = vec![false; graph.nodes.len()];
        let mut changed = walk(graph, exit, &mut visited);

        for root in (0..graph.nodes.len()).rev().map(NodeId) {
            if !visited[root.0] {
                changed |= walk(graph, root, &mut visited);
            }
        }

        if !changed {
            break;
        }
    }

    trace!(
        "liveness of '{}' settled after {passes} passes",
        graph.name
    );
}

fn walk(graph: &mut CfgGraph, root: NodeId, visited: &mut [bool]) -> bool {
    let mut changed = false;
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        if visited[id.0] {
            continue;
        }

        visited[id.0] = true;
        changed |= update(graph, id);

        stack.extend(
            graph
                .node(id)
                .preds
                .iter()
                .copied()
                .filter(|pred| !visited[pred.0]),
        );
    }

    changed
}

fn update(graph: &mut CfgGraph, id: NodeId) -> bool {
    let mut out = BTreeSet::new();
    for succ in graph.node(id).succs.iter() {
        out.extend(graph.node(*succ).live_in.iter().copied());
    }

    let node = graph.node_mut(id);
    let mut live_in: BTreeSet<_> = node.uses.iter().copied().collect();
    live_in.extend(out.iter().copied().filter(|reg| Some(*reg) != node.def));

    let grew = out.len() > node.live_out.len() || live_in.len() > node.live_in.len();
    node.live_out.extend(out);
    node.live_in.extend(live_in);

    grew
}
