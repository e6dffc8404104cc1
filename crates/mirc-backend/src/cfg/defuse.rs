use std::fmt::{self, Display};

use log::trace;
use mirc_common::mir::{Instr, MirList, Operand, OperandKind, Slot};
use mirc_common::symbols::{SymbolTable, VarId};

use super::CfgGraph;

/// A value competing for a physical register.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum SymReg {
    Var(VarId),
    Temp(u32),

    /// Introduced by spill code. Live ranges are a single instruction long,
    /// so these are never spilled again.
    SpillTemp(u32),
}

impl SymReg {
    /// The symbolic register named by `op`, if it names one at all.
    pub fn from_operand(op: &Operand, symbols: &SymbolTable) -> Option<Self> {
        match op.kind {
            OperandKind::Variable(var) if symbols.var(var).is_function() => None,
            OperandKind::Variable(var) => Some(Self::Var(var)),
            OperandKind::Temp(num) => Some(Self::Temp(num)),
            OperandKind::SpillTemp(num) => Some(Self::SpillTemp(num)),
            OperandKind::Constant(_) | OperandKind::Register(_) => None,
        }
    }

    pub fn is_spill_temp(&self) -> bool {
        matches!(self, Self::SpillTemp(_))
    }

    pub fn describe<'a>(&self, symbols: &'a SymbolTable) -> Describe<'a> {
        Describe {
            reg: *self,
            symbols,
        }
    }
}

pub struct Describe<'a> {
    reg: SymReg,
    symbols: &'a SymbolTable,
}

impl Display for Describe<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reg {
            SymReg::Var(var) => write!(f, "{}", self.symbols.var(var).name),
            SymReg::Temp(num) => write!(f, "%t{num}"),
            SymReg::SpillTemp(num) => write!(f, "%s{num}"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Access {
    Def,
    Use,
}

/// Every register-position operand of `instr` that names a symbolic
/// register, along with whether it is written or read.
pub fn accesses(instr: &Instr, symbols: &SymbolTable) -> Vec<(Slot, SymReg, Access)> {
    let opcode = instr.opcode;
    let mut res = Vec::new();

    for (slot, op) in instr.slots() {
        let access = match slot {
            Slot::Operand(index) if opcode.is_memory_slot(index) => continue,
            Slot::Operand(2) if !op.indirect && !opcode.stores_through_pointer() => Access::Def,
            _ => Access::Use,
        };

        if let Some(reg) = SymReg::from_operand(op, symbols) {
            res.push((slot, reg, access));
        }
    }

    res
}

/// Recompute the def and use sets of every node, discarding liveness from
/// any previous round, and collect the globals the function refers to.
pub fn build_defuse(graph: &mut CfgGraph, mir: &MirList, symbols: &SymbolTable) {
    graph.globals.clear();

    for node in graph.nodes.iter_mut() {
        node.clear();

        for (_, reg, access) in accesses(mir.instr(node.instr), symbols) {
            match access {
                Access::Def => node.def = Some(reg),
                Access::Use if !node.uses.contains(&reg) => node.uses.push(reg),
                Access::Use => {}
            }

            if let SymReg::Var(var) = reg {
                if symbols.var(var).is_global() && !graph.globals.contains(&var) {
                    graph.globals.push(var);
                }
            }
        }
    }

    trace!(
        "function '{}' refers to {} globals",
        graph.name,
        graph.globals.len()
    );
}
