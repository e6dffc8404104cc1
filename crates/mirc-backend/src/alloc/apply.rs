use log::{info, trace};
use mirc_common::mir::{InstrId, MirList, OperandKind};
use mirc_common::symbols::SymbolTable;

use super::color::ColorNode;
use super::interfere::InterferenceGraph;
use crate::cfg::{accesses, SymReg};

/// Replaces symbolic registers with the physical registers they were
/// colored with.
pub struct Applier<'a> {
    ig: &'a InterferenceGraph,
    nodes: &'a [ColorNode],
}

impl<'a> Applier<'a> {
    pub fn new(ig: &'a InterferenceGraph, nodes: &'a [ColorNode]) -> Self {
        Self { ig, nodes }
    }

    pub fn apply(&self, mir: &mut MirList, symbols: &mut SymbolTable) {
        info!("rewriting symbolic registers");

        let instrs: Vec<InstrId> = mir.iter().collect();
        for id in instrs {
            for (slot, reg, _) in accesses(mir.instr(id), symbols) {
                let Some(register) = self.register(&reg) else {
                    continue;
                };

                if let Some(op) = mir.instr_mut(id).get_mut(slot) {
                    op.kind = OperandKind::Register(register);
                }
            }
        }

        for reg in self.ig.vertices() {
            if let (SymReg::Var(var), Some(register)) = (reg, self.register(reg)) {
                trace!("{} lives in ${register}", symbols.var(*var).name);
                symbols.var_mut(*var).register = Some(register);
            }
        }

        trace!("done rewriting symbolic registers");
    }

    /// The physical register of `reg`, numbered from zero.
    pub fn register(&self, reg: &SymReg) -> Option<u32> {
        let index = self.ig.index_of(reg)?;
        self.nodes[index].color.checked_sub(1)
    }
}
