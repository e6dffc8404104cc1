//! Per-function control flow graphs with one node per MIR instruction.

mod defuse;
mod liveness;

#[cfg(test)]
mod tests;

pub use defuse::{accesses, build_defuse, Access, SymReg};
pub use liveness::solve_liveness;

use std::collections::{BTreeSet, HashMap};

use log::{info, trace};
use mirc_common::mir::{CfgRef, Instr, InstrId, MirList, Opcode, Origin};
use mirc_common::symbols::{FuncId, SymbolTable, VarId};

use crate::AllocError;

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct NodeId(pub usize);

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum NodeKind {
    FunctionEntry,
    FunctionExit,
    Statement,
    Jump,
    Conditional,
}

impl NodeKind {
    fn of(opcode: Opcode) -> Self {
        match opcode {
            Opcode::End => Self::FunctionExit,
            Opcode::Jump => Self::Jump,
            Opcode::If | Opcode::IfNot => Self::Conditional,
            _ => Self::Statement,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CfgNode {
    pub kind: NodeKind,
    pub instr: InstrId,

    pub preds: Vec<NodeId>,
    pub succs: Vec<NodeId>,

    pub def: Option<SymReg>,
    pub uses: Vec<SymReg>,
    pub live_in: BTreeSet<SymReg>,
    pub live_out: BTreeSet<SymReg>,
}

impl CfgNode {
    fn new(kind: NodeKind, instr: InstrId) -> Self {
        Self {
            kind,
            instr,
            preds: Vec::new(),
            succs: Vec::new(),
            def: None,
            uses: Vec::new(),
            live_in: BTreeSet::new(),
            live_out: BTreeSet::new(),
        }
    }

    fn clear(&mut self) {
        self.def = None;
        self.uses.clear();
        self.live_in.clear();
        self.live_out.clear();
    }
}

#[derive(Debug)]
pub struct CfgGraph {
    pub index: usize,
    pub name: String,
    pub func: FuncId,
    pub symbol: VarId,

    pub nodes: Vec<CfgNode>,
    pub entry: NodeId,
    pub exit: NodeId,

    /// Distinct globals referenced in register positions, in first-seen order.
    pub globals: Vec<VarId>,
}

impl CfgGraph {
    pub fn node(&self, id: NodeId) -> &CfgNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut CfgNode {
        &mut self.nodes[id.0]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Insert `instr` directly before `at`, which must belong to this graph.
    /// Every edge and MIR jump into `at` is redirected to the new node.
    pub fn insert_before(
        &mut self,
        mir: &mut MirList,
        at: InstrId,
        instr: Instr,
        origin: Origin,
    ) -> Result<InstrId, AllocError> {
        let target = self.node_of(mir, at)?;
        let id = mir.insert_before(at, instr, origin);
        mir.redirect_jumps(at, id);

        let new = self.add_node(mir, id);
        let preds = std::mem::take(&mut self.node_mut(target).preds);

        for pred in preds.iter().copied() {
            let succs = &mut self.node_mut(pred).succs;
            if !succs.contains(&target) {
                return Err(self.missing_edge(mir, at));
            }

            for succ in succs.iter_mut().filter(|succ| **succ == target) {
                *succ = new;
            }
        }

        self.node_mut(new).preds = preds;
        self.link(new, target);

        trace!("inserted node {} before {}", new.0, target.0);
        Ok(id)
    }

    /// Insert `instr` directly after `at`, which must belong to this graph.
    /// Only the fall-through edge out of `at` is redirected.
    pub fn insert_after(
        &mut self,
        mir: &mut MirList,
        at: InstrId,
        instr: Instr,
        origin: Origin,
    ) -> Result<InstrId, AllocError> {
        let source = self.node_of(mir, at)?;
        let fallthrough = match self.node(source).kind {
            NodeKind::FunctionEntry | NodeKind::Statement | NodeKind::Conditional => {
                self.node(source).succs.first().copied()
            }
            NodeKind::Jump | NodeKind::FunctionExit => None,
        };

        let Some(next) = fallthrough else {
            return Err(self.missing_edge(mir, at));
        };

        let id = mir.insert_after(at, instr, origin);
        let new = self.add_node(mir, id);

        self.node_mut(source).succs[0] = new;
        self.node_mut(new).preds.push(source);
        self.node_mut(new).succs.push(next);

        let index = self.node(next).preds.iter().position(|pred| *pred == source);
        match index {
            Some(index) => self.node_mut(next).preds[index] = new,
            None => return Err(self.missing_edge(mir, at)),
        }

        trace!("inserted node {} after {}", new.0, source.0);
        Ok(id)
    }

    fn node_of(&self, mir: &MirList, at: InstrId) -> Result<NodeId, AllocError> {
        match mir.get(at).cfg_node {
            Some(CfgRef { graph, node }) if graph == self.index => Ok(NodeId(node)),
            _ => Err(self.missing_edge(mir, at)),
        }
    }

    fn add_node(&mut self, mir: &mut MirList, instr: InstrId) -> NodeId {
        let kind = NodeKind::of(mir.instr(instr).opcode);
        let id = NodeId(self.nodes.len());
        self.nodes.push(CfgNode::new(kind, instr));

        mir.get_mut(instr).cfg_node = Some(CfgRef {
            graph: self.index,
            node: id.0,
        });

        id
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        self.node_mut(from).succs.push(to);
        self.node_mut(to).preds.push(from);
    }

    fn missing_edge(&self, mir: &MirList, at: InstrId) -> AllocError {
        AllocError::MissingEdge {
            function: self.name.clone(),
            line: mir.get(at).line,
        }
    }
}

/// Partition the instruction stream into one graph per function. Every
/// instruction gets its `cfg_node` stamped.
pub fn build_program(mir: &mut MirList, symbols: &SymbolTable) -> Result<Vec<CfgGraph>, AllocError> {
    info!("building control flow graphs");

    let mut graphs = Vec::new();
    let mut cursor = mir.head();

    while let Some(start) = cursor {
        let (graph, next) = build_function(mir, symbols, graphs.len(), start)?;
        trace!(
            "function '{}' has {} nodes",
            graph.name,
            graph.nodes.len()
        );

        graphs.push(graph);
        cursor = next;
    }

    trace!("done building control flow graphs");
    Ok(graphs)
}

/// Build the graph of the function starting at `start`, returning it along
/// with the first instruction after its `end`.
fn build_function(
    mir: &mut MirList,
    symbols: &SymbolTable,
    index: usize,
    start: InstrId,
) -> Result<(CfgGraph, Option<InstrId>), AllocError> {
    let head = mir.get(start);
    if head.instr.opcode != Opcode::Label {
        return Err(AllocError::MissingFunctionLabel { line: head.line });
    }

    let name = head.instr.label.clone().unwrap_or_default();
    let func = symbols
        .function_by_name(&name)
        .filter(|func| symbols.function(*func).defined)
        .ok_or_else(|| AllocError::UnknownFunction {
            name: name.clone(),
            line: head.line,
        })?;

    let mut graph = CfgGraph {
        index,
        name,
        func,
        symbol: symbols.function(func).symbol,
        nodes: Vec::new(),
        entry: NodeId(0),
        exit: NodeId(0),
        globals: Vec::new(),
    };

    let mut ids = HashMap::new();
    let mut cursor = Some(start);

    loop {
        let Some(id) = cursor else {
            return Err(AllocError::UnterminatedFunction { name: graph.name });
        };

        let node = graph.add_node(mir, id);
        ids.insert(id, node);

        if id == start {
            graph.node_mut(node).kind = NodeKind::FunctionEntry;
        }
        cursor = mir.next(id);

        if mir.instr(id).opcode == Opcode::End {
            graph.exit = node;
            break;
        }
    }

    for from in graph.node_ids().collect::<Vec<_>>() {
        let instr = graph.node(from).instr;
        let fallthrough = NodeId(from.0 + 1);

        match graph.node(from).kind {
            NodeKind::FunctionExit => {}
            NodeKind::FunctionEntry | NodeKind::Statement => graph.link(from, fallthrough),
            NodeKind::Jump => {
                let target = jump_target(&graph, mir, &ids, instr)?;
                graph.link(from, target);
            }
            NodeKind::Conditional => {
                let target = jump_target(&graph, mir, &ids, instr)?;
                graph.link(from, fallthrough);
                graph.link(from, target);
            }
        }
    }

    Ok((graph, cursor))
}

fn jump_target(
    graph: &CfgGraph,
    mir: &MirList,
    ids: &HashMap<InstrId, NodeId>,
    instr: InstrId,
) -> Result<NodeId, AllocError> {
    let node = mir.get(instr);
    let target = node.jump.ok_or_else(|| AllocError::MissingJumpTarget {
        function: graph.name.clone(),
        line: node.line,
    })?;

    ids.get(&target)
        .copied()
        .ok_or_else(|| AllocError::ForeignJumpTarget {
            function: graph.name.clone(),
            line: node.line,
        })
}
