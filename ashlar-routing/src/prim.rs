//! Separable rectilinear minimum spanning tree construction with Prim's
//! algorithm.
//!
//! The edge comparator is a three-tuple: Manhattan distance first, then
//! `−|Δy|`, then `−max(x)`. The tie-breaks bias the tree toward shapes
//! that convert well into rectilinear Steiner topologies later.

use ashlar_common::geometry::Coord64;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub type NodeId = u32;

/// Lexicographic three-tuple edge cost.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CostTuple {
    pub dist: i64,
    pub neg_abs_dy: i64,
    pub neg_max_x: i64,
}

impl CostTuple {
    pub fn between(a: &Coord64, b: &Coord64) -> Self {
        Self {
            dist: a.manhattan_distance(b),
            neg_abs_dy: -(a.y - b.y).abs(),
            neg_max_x: -a.x.max(b.x),
        }
    }
}

impl Ord for CostTuple {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .cmp(&other.dist)
            .then(self.neg_abs_dy.cmp(&other.neg_abs_dy))
            .then(self.neg_max_x.cmp(&other.neg_max_x))
    }
}

impl PartialOrd for CostTuple {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct CandidateEdge {
    cost: CostTuple,
    from: NodeId,
    to: NodeId,
}

impl Ord for CandidateEdge {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the binary heap pops the cheapest edge first; the
        // node ids keep extraction deterministic among equal costs.
        other
            .cost
            .cmp(&self.cost)
            .then(other.from.cmp(&self.from))
            .then(other.to.cmp(&self.to))
    }
}

impl PartialOrd for CandidateEdge {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MstEdge {
    pub node: NodeId,
    pub pos: Coord64,
}

/// Arena node: parent link plus outgoing child edges. The root (terminal
/// 0) carries `parent == None`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MstNode {
    pub parent: Option<NodeId>,
    pub pos: Coord64,
    pub edges: Vec<MstEdge>,
}

pub type MsTree = Vec<MstNode>;

/// Total Manhattan length of every edge in the tree.
pub fn tree_length(tree: &MsTree) -> i64 {
    tree.iter()
        .map(|node| {
            node.edges
                .iter()
                .map(|e| node.pos.manhattan_distance(&e.pos))
                .sum::<i64>()
        })
        .sum()
}

/// Build the rectilinear MST over `terminals`, rooted at terminal 0.
/// Returns an empty tree for an empty input.
pub fn prim(terminals: &[Coord64]) -> MsTree {
    let mut tree: MsTree = terminals
        .iter()
        .map(|&pos| MstNode {
            parent: None,
            pos,
            edges: Vec::new(),
        })
        .collect();
    if terminals.len() <= 1 {
        return tree;
    }

    let mut in_tree = vec![false; terminals.len()];
    in_tree[0] = true;

    let mut queue = BinaryHeap::with_capacity(terminals.len());
    for to in 1..terminals.len() as NodeId {
        queue.push(CandidateEdge {
            cost: CostTuple::between(&terminals[0], &terminals[to as usize]),
            from: 0,
            to,
        });
    }

    let mut remaining = terminals.len() - 1;
    while remaining > 0 {
        let edge = queue.pop().expect("candidate queue drained early");
        if in_tree[edge.to as usize] {
            continue;
        }

        in_tree[edge.to as usize] = true;
        remaining -= 1;

        let child_pos = terminals[edge.to as usize];
        tree[edge.from as usize].edges.push(MstEdge {
            node: edge.to,
            pos: child_pos,
        });
        tree[edge.to as usize].parent = Some(edge.from);

        for to in 0..terminals.len() as NodeId {
            if !in_tree[to as usize] {
                queue.push(CandidateEdge {
                    cost: CostTuple::between(&child_pos, &terminals[to as usize]),
                    from: edge.to,
                    to,
                });
            }
        }
    }

    tree
}
