use std::collections::BTreeSet;

use log::{debug, trace};

use super::interfere::InterferenceGraph;
use crate::AllocError;

/// Allocation state of one interference graph vertex. Rebuilt every round.
#[derive(Clone, Debug)]
pub struct ColorNode {
    /// Zero while uncolored, otherwise the physical register plus one.
    pub color: u32,
    pub adjacent: BTreeSet<usize>,
    pub removed: BTreeSet<usize>,
    pub on_stack: bool,
    pub spill: bool,
    pub cost: f64,
}

pub fn color_nodes(ig: &InterferenceGraph, costs: &[f64]) -> Vec<ColorNode> {
    (0..ig.len())
        .map(|index| ColorNode {
            color: 0,
            adjacent: ig.neighbours(index).clone(),
            removed: BTreeSet::new(),
            on_stack: false,
            spill: false,
            cost: costs[index],
        })
        .collect()
}

/// Push every vertex onto the coloring stack. Vertices of degree below
/// `registers` go first; when none is left, the one cheapest to spill
/// relative to its degree is pushed optimistically.
pub fn simplify(
    nodes: &mut [ColorNode],
    registers: u32,
    round: usize,
) -> Result<Vec<usize>, AllocError> {
    let registers = registers as usize;
    let mut stack = Vec::with_capacity(nodes.len());
    let mut left = nodes.len();

    while left > 0 {
        let mut progress = true;
        while progress {
            progress = false;

            for index in 0..nodes.len() {
                if !nodes[index].on_stack && nodes[index].adjacent.len() < registers {
                    push(nodes, &mut stack, index);
                    left -= 1;
                    progress = true;
                }
            }
        }

        if left == 0 {
            break;
        }

        let candidate = (0..nodes.len())
            .filter(|index| !nodes[*index].on_stack && nodes[*index].cost.is_finite())
            .map(|index| {
                let node = &nodes[index];
                (index, node.cost / node.adjacent.len() as f64)
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b));

        let Some((candidate, ratio)) = candidate else {
            return Err(AllocError::NoSpillCandidate {
                round,
                remaining: left,
            });
        };

        debug!("selected vertex {candidate} as spill candidate (cost/degree {ratio})");
        push(nodes, &mut stack, candidate);
        left -= 1;
    }

    Ok(stack)
}

/// Pop the stack and give each vertex the lowest color not used by its
/// neighbours. Returns the vertices that could not be colored.
pub fn assign(nodes: &mut [ColorNode], mut stack: Vec<usize>, registers: u32) -> Vec<usize> {
    let mut spilled = Vec::new();

    while let Some(index) = stack.pop() {
        nodes[index].on_stack = false;
        restore(nodes, index);

        let used: BTreeSet<u32> = nodes[index]
            .adjacent
            .iter()
            .map(|other| nodes[*other].color)
            .collect();

        match (1..=registers).find(|color| !used.contains(color)) {
            Some(color) => {
                trace!("vertex {index} gets color {color}");
                nodes[index].color = color;
            }

            None => {
                trace!("vertex {index} is marked for spilling");
                nodes[index].spill = true;
                spilled.push(index);
            }
        }
    }

    spilled
}

fn push(nodes: &mut [ColorNode], stack: &mut Vec<usize>, index: usize) {
    let adjacent = std::mem::take(&mut nodes[index].adjacent);

    for other in adjacent.iter() {
        nodes[*other].adjacent.remove(&index);
        nodes[*other].removed.insert(index);
    }

    nodes[index].removed.extend(adjacent);
    nodes[index].on_stack = true;
    stack.push(index);
}

fn restore(nodes: &mut [ColorNode], index: usize) {
    let back: Vec<usize> = nodes[index]
        .removed
        .iter()
        .copied()
        .filter(|other| !nodes[*other].on_stack)
        .collect();

    for other in back {
        nodes[index].removed.remove(&other);
        nodes[index].adjacent.insert(other);
        nodes[other].removed.remove(&index);
        nodes[other].adjacent.insert(index);
    }
}
