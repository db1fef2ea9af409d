use hashbrown::HashMap;

use crate::graph::multigraph::OpGraph;
use crate::history::OpId;

struct Frame {
    v: OpId,
    neighbors: Vec<OpId>,
    cursor: usize,
}

impl Frame {
    fn new(g: &OpGraph, v: OpId) -> Self {
        Self {
            v,
            neighbors: g.out_edges_sorted(v).into_iter().map(|(w, _)| w).collect(),
            cursor: 0,
        }
    }
}

/// Strongly connected components of `g`, trivial components dropped.
///
/// Iterative Tarjan over vertices in ascending op order, so output is
/// deterministic. A component is kept if it has at least two vertices or
/// a self-loop; everything else cannot contain a cycle. Components are
/// returned ascending by their smallest member, each sorted ascending.
#[must_use]
pub fn strongly_connected_components(g: &OpGraph) -> Vec<Vec<OpId>> {
    let mut order: HashMap<OpId, usize> = HashMap::new();
    let mut lowlink: HashMap<OpId, usize> = HashMap::new();
    let mut on_stack: HashMap<OpId, bool> = HashMap::new();
    let mut stack: Vec<OpId> = Vec::new();
    let mut next_order = 0usize;
    let mut components: Vec<Vec<OpId>> = Vec::new();

    for root in g.sorted_vertices() {
        if order.contains_key(&root) {
            continue;
        }

        let mut frames = vec![Frame::new(g, root)];
        order.insert(root, next_order);
        lowlink.insert(root, next_order);
        next_order += 1;
        stack.push(root);
        on_stack.insert(root, true);

        enum Action {
            Visit(OpId, OpId),
            Finish(OpId),
        }

        loop {
            let action = {
                let Some(frame) = frames.last_mut() else { break };
                if frame.cursor < frame.neighbors.len() {
                    let w = frame.neighbors[frame.cursor];
                    frame.cursor += 1;
                    Action::Visit(frame.v, w)
                } else {
                    Action::Finish(frame.v)
                }
            };

            match action {
                Action::Visit(v, w) => {
                    if let Some(&w_order) = order.get(&w) {
                        if on_stack.get(&w).copied().unwrap_or(false) {
                            let low = lowlink[&v].min(w_order);
                            lowlink.insert(v, low);
                        }
                    } else {
                        order.insert(w, next_order);
                        lowlink.insert(w, next_order);
                        next_order += 1;
                        stack.push(w);
                        on_stack.insert(w, true);
                        frames.push(Frame::new(g, w));
                    }
                }
                Action::Finish(v) => {
                    frames.pop();
                    if let Some(parent) = frames.last() {
                        let low = lowlink[&parent.v].min(lowlink[&v]);
                        lowlink.insert(parent.v, low);
                    }
                    if lowlink[&v] == order[&v] {
                        let mut component = Vec::new();
                        while let Some(w) = stack.pop() {
                            on_stack.insert(w, false);
                            component.push(w);
                            if w == v {
                                break;
                            }
                        }
                        if component.len() > 1 || g.has_edge(v, v) {
                            component.sort_unstable();
                            components.push(component);
                        }
                    }
                }
            }
        }
    }

    components.sort_unstable_by_key(|c| c[0]);
    components
}
