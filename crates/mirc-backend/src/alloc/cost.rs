use log::trace;
use mirc_common::mir::{MirList, Opcode, Slot};
use mirc_common::symbols::SymbolTable;

use super::interfere::InterferenceGraph;
use crate::cfg::{accesses, Access, CfgGraph};

/// Weight of a register which is moved to or from memory directly.
const MEMORY_WEIGHT: f64 = 10.0;
const DEFAULT_WEIGHT: f64 = 1.0;

/// Estimate the cost of spilling each vertex of `ig`, indexed like its
/// vertices. Spill temporaries are never worth spilling.
pub fn spill_costs(
    graphs: &[CfgGraph],
    mir: &MirList,
    symbols: &SymbolTable,
    ig: &InterferenceGraph,
) -> Vec<f64> {
    let mut costs = vec![0.0; ig.len()];

    for graph in graphs {
        for node in graph.nodes.iter() {
            let instr = mir.instr(node.instr);

            for (slot, reg, access) in accesses(instr, symbols) {
                if let Some(index) = ig.index_of(&reg) {
                    costs[index] += weight(instr.opcode, slot, access);
                }
            }
        }
    }

    for (index, reg) in ig.vertices().iter().enumerate() {
        if reg.is_spill_temp() {
            costs[index] = f64::INFINITY;
        }

        trace!("spill cost of vertex {index} is {}", costs[index]);
    }

    costs
}

fn weight(opcode: Opcode, slot: Slot, access: Access) -> f64 {
    match (opcode, slot, access) {
        (Opcode::StackLoad | Opcode::HeapLoad | Opcode::RegLoad, _, Access::Def) => MEMORY_WEIGHT,
        (Opcode::StackStore | Opcode::HeapStore | Opcode::RegStore, Slot::Operand(0), _) => {
            MEMORY_WEIGHT
        }
        (Opcode::Addr | Opcode::StackAddr | Opcode::HeapAddr, _, Access::Def) => MEMORY_WEIGHT,
        _ => DEFAULT_WEIGHT,
    }
}
