use log::{debug, trace};
use mirc_common::mir::{Instr, InstrId, MirList, Opcode, Operand, OperandKind, Origin};
use mirc_common::symbols::VarId;

use crate::cfg::CfgGraph;
use crate::AllocError;

/// Load every global a function uses once its prologue is done. Around each
/// call, write it back to memory before and reload it after, so the callee
/// sees the current value and the caller sees whatever the callee left.
/// Brackets inserted by an earlier round are recognised and left alone.
/// Returns the number of inserted instructions.
pub fn insert_global_accesses(
    graphs: &mut [CfgGraph],
    mir: &mut MirList,
) -> Result<usize, AllocError> {
    let mut inserted = 0;

    for graph in graphs.iter_mut() {
        if graph.globals.is_empty() {
            continue;
        }

        let globals = graph.globals.clone();
        let prologue = prologue_end(mir, graph.node(graph.entry).instr);

        for global in globals.iter().copied() {
            if !bracketed_after(mir, prologue, Origin::GlobalLoad, global) {
                graph.insert_after(mir, prologue, load(global), Origin::GlobalLoad)?;
                inserted += 1;
            }
        }

        let calls: Vec<InstrId> = graph
            .nodes
            .iter()
            .map(|node| node.instr)
            .filter(|id| {
                mir.instr(*id).opcode == Opcode::Call && !mir.get(*id).origin.is_inserted()
            })
            .collect();

        for call in calls {
            for global in globals.iter().copied() {
                if !bracketed_before(mir, call, Origin::GlobalStore, global) {
                    graph.insert_before(mir, call, store(global), Origin::GlobalStore)?;
                    inserted += 1;
                }

                if !bracketed_after(mir, call, Origin::GlobalLoad, global) {
                    graph.insert_after(mir, call, load(global), Origin::GlobalLoad)?;
                    inserted += 1;
                }
            }
        }

        trace!("bracketed globals of '{}'", graph.name);
    }

    if inserted > 0 {
        debug!("inserted {inserted} global loads and stores");
    }

    Ok(inserted)
}

fn load(global: VarId) -> Instr {
    Instr::new(
        Opcode::HeapLoad,
        Some(Operand::var(global)),
        None,
        Some(Operand::var(global)),
    )
}

fn store(global: VarId) -> Instr {
    Instr::new(
        Opcode::HeapStore,
        Some(Operand::var(global)),
        None,
        Some(Operand::var(global)),
    )
}

/// The last instruction of the prologue beginning at the function label.
fn prologue_end(mir: &MirList, label: InstrId) -> InstrId {
    let mut end = label;

    while let Some(next) = mir.next(end) {
        let node = mir.get(next);
        let prologue = matches!(
            node.instr.opcode,
            Opcode::Begin | Opcode::Receive | Opcode::PushArg
        );

        if !prologue || node.origin.is_inserted() {
            break;
        }

        end = next;
    }

    end
}

/// Whether the memory operand of an inserted instruction names `global`.
fn touches(instr: &Instr, origin: Origin, global: VarId) -> bool {
    let memory = match origin {
        Origin::GlobalLoad => instr.operands[0],
        Origin::GlobalStore => instr.operands[2],
        _ => None,
    };

    matches!(memory, Some(Operand { kind: OperandKind::Variable(var), .. }) if var == global)
}

fn bracketed_after(mir: &MirList, at: InstrId, origin: Origin, global: VarId) -> bool {
    let mut cursor = mir.next(at);

    while let Some(id) = cursor {
        let node = mir.get(id);
        if !node.origin.is_inserted() {
            break;
        }

        if node.origin == origin && touches(&node.instr, origin, global) {
            return true;
        }

        cursor = mir.next(id);
    }

    false
}

fn bracketed_before(mir: &MirList, at: InstrId, origin: Origin, global: VarId) -> bool {
    let mut cursor = mir.prev(at);

    while let Some(id) = cursor {
        let node = mir.get(id);
        if !node.origin.is_inserted() {
            break;
        }

        if node.origin == origin && touches(&node.instr, origin, global) {
            return true;
        }

        cursor = mir.prev(id);
    }

    false
}
