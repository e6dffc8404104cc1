use std::collections::{BTreeSet, HashMap};

use log::{debug, info};

use crate::cfg::{CfgGraph, SymReg};

/// Undirected interference between the symbolic registers of every
/// function. Vertices are numbered in the order they are first seen.
#[derive(Debug, Default)]
pub struct InterferenceGraph {
    vertices: Vec<SymReg>,
    index: HashMap<SymReg, usize>,
    adjacent: Vec<BTreeSet<usize>>,
}

impl InterferenceGraph {
    pub fn build(graphs: &[CfgGraph]) -> Self {
        info!("building interference graph");
        let mut ig = Self::default();

        for graph in graphs {
            for node in graph.nodes.iter() {
                for reg in node.def.iter().chain(node.uses.iter()) {
                    ig.add_vertex(*reg);
                }
            }
        }

        for graph in graphs {
            for node in graph.nodes.iter() {
                if let Some(def) = node.def {
                    for live in node.live_out.iter() {
                        ig.add_link(def, *live);
                    }
                }

                ig.add_clique(node.live_out.iter());
                ig.add_clique(node.live_in.iter());
            }
        }

        debug!(
            "interference graph has {} vertices and {} edges",
            ig.len(),
            ig.edge_count()
        );

        ig
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn vertices(&self) -> &[SymReg] {
        &self.vertices
    }

    pub fn vertex(&self, index: usize) -> SymReg {
        self.vertices[index]
    }

    pub fn index_of(&self, reg: &SymReg) -> Option<usize> {
        self.index.get(reg).copied()
    }

    pub fn neighbours(&self, index: usize) -> &BTreeSet<usize> {
        &self.adjacent[index]
    }

    pub fn edge_count(&self) -> usize {
        self.adjacent.iter().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Whether two registers interfere. Unknown registers interfere with
    /// nothing.
    pub fn linked(&self, a: &SymReg, b: &SymReg) -> bool {
        match (self.index_of(a), self.index_of(b)) {
            (Some(a), Some(b)) => self.adjacent[a].contains(&b),
            _ => false,
        }
    }

    fn add_vertex(&mut self, reg: SymReg) -> usize {
        if let Some(index) = self.index_of(&reg) {
            return index;
        }

        let index = self.vertices.len();
        self.vertices.push(reg);
        self.index.insert(reg, index);
        self.adjacent.push(BTreeSet::new());
        index
    }

    fn add_link(&mut self, a: SymReg, b: SymReg) {
        if a == b {
            return;
        }

        let a = self.add_vertex(a);
        let b = self.add_vertex(b);
        self.adjacent[a].insert(b);
        self.adjacent[b].insert(a);
    }

    fn add_clique<'a>(&mut self, regs: impl Iterator<Item = &'a SymReg> + Clone) {
        for (n, a) in regs.clone().enumerate() {
            for b in regs.clone().skip(n + 1) {
                self.add_link(*a, *b);
            }
        }
    }
}
