use std::collections::{BTreeMap, HashMap};

use log::{debug, trace};
use mirc_common::mir::{Instr, InstrId, MirList, Opcode, Operand, OperandKind, Origin, Slot};
use mirc_common::symbols::{FuncId, Storage, SymbolTable, VarId};

use crate::cfg::{accesses, Access, CfgGraph, SymReg};
use crate::AllocError;

/// Stack slots of the spilled temporaries of one function. Slots are laid
/// out after the function's own frame, one word each, and a temporary keeps
/// its slot once assigned.
#[derive(Clone, Debug)]
pub struct SlotTable {
    base: i64,
    word_size: i64,
    slots: BTreeMap<u32, i64>,
}

impl SlotTable {
    pub fn new(base: u32, word_size: u32) -> Self {
        Self {
            base: base.into(),
            word_size: word_size.into(),
            slots: BTreeMap::new(),
        }
    }

    pub fn slot(&mut self, temp: u32) -> i64 {
        let next = self.base + self.word_size * self.slots.len() as i64;
        *self.slots.entry(temp).or_insert(next)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Bytes the function frame grows by.
    pub fn size(&self) -> u32 {
        (self.word_size * self.slots.len() as i64) as u32
    }
}

/// Where a spilled register lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Home {
    Heap(VarId),
    Stack(i64),
}

impl Home {
    fn load(self, temp: u32) -> Instr {
        match self {
            Self::Heap(var) => Instr::new(
                Opcode::HeapLoad,
                Some(Operand::var(var)),
                None,
                Some(Operand::spill_temp(temp)),
            ),
            Self::Stack(offset) => Instr::new(
                Opcode::StackLoad,
                Some(Operand::constant(offset)),
                None,
                Some(Operand::spill_temp(temp)),
            ),
        }
    }

    fn store(self, temp: u32) -> Instr {
        match self {
            Self::Heap(var) => Instr::new(
                Opcode::HeapStore,
                Some(Operand::spill_temp(temp)),
                None,
                Some(Operand::var(var)),
            ),
            Self::Stack(offset) => Instr::new(
                Opcode::StackStore,
                Some(Operand::spill_temp(temp)),
                None,
                Some(Operand::constant(offset)),
            ),
        }
    }
}

pub struct Spiller<'a> {
    mir: &'a mut MirList,
    symbols: &'a SymbolTable,
    slots: &'a mut HashMap<FuncId, SlotTable>,
    word_size: u32,
}

impl<'a> Spiller<'a> {
    pub fn new(
        mir: &'a mut MirList,
        symbols: &'a SymbolTable,
        slots: &'a mut HashMap<FuncId, SlotTable>,
        word_size: u32,
    ) -> Self {
        Self {
            mir,
            symbols,
            slots,
            word_size,
        }
    }

    /// Rewrite every reference to a register in `spilled` to go through
    /// memory. Returns the number of inserted instructions.
    pub fn spill(
        &mut self,
        graphs: &mut [CfgGraph],
        spilled: &[SymReg],
    ) -> Result<usize, AllocError> {
        let mut inserted = 0;

        for graph in graphs.iter_mut() {
            let instrs: Vec<InstrId> = graph.nodes.iter().map(|node| node.instr).collect();

            for id in instrs {
                inserted += self.spill_instr(graph, id, spilled)?;
            }
        }

        debug!(
            "spilled {} registers with {inserted} new instructions",
            spilled.len()
        );

        Ok(inserted)
    }

    fn spill_instr(
        &mut self,
        graph: &mut CfgGraph,
        id: InstrId,
        spilled: &[SymReg],
    ) -> Result<usize, AllocError> {
        let mut loaded: HashMap<SymReg, u32> = HashMap::new();
        let mut defs = Vec::new();
        let mut inserted = 0;

        for (slot, reg, access) in accesses(self.mir.instr(id), self.symbols) {
            if !spilled.contains(&reg) {
                continue;
            }

            match access {
                Access::Use => {
                    let temp = match loaded.get(&reg) {
                        Some(temp) => *temp,
                        None => {
                            let temp = self.mir.fresh_temp();
                            let load = self.home(graph.func, reg)?.load(temp);
                            graph.insert_before(self.mir, id, load, Origin::SpillLoad)?;
                            loaded.insert(reg, temp);
                            inserted += 1;
                            temp
                        }
                    };

                    self.substitute(id, slot, temp);
                }

                Access::Def => defs.push((slot, reg)),
            }
        }

        for (slot, reg) in defs {
            let temp = self.mir.fresh_temp();
            let store = self.home(graph.func, reg)?.store(temp);
            self.substitute(id, slot, temp);
            graph.insert_after(self.mir, id, store, Origin::SpillStore)?;
            inserted += 1;
        }

        Ok(inserted)
    }

    fn substitute(&mut self, id: InstrId, slot: Slot, temp: u32) {
        if let Some(op) = self.mir.instr_mut(id).get_mut(slot) {
            trace!("substituting %s{temp} in instruction {}", id.0);
            op.kind = OperandKind::SpillTemp(temp);
        }
    }

    fn home(&mut self, func: FuncId, reg: SymReg) -> Result<Home, AllocError> {
        match reg {
            SymReg::Var(var) => match self.symbols.var(var).storage {
                Storage::Global => Ok(Home::Heap(var)),
                Storage::Local { offset } => Ok(Home::Stack(offset)),
                Storage::Function(_) => Err(self.unspillable(reg)),
            },

            SymReg::Temp(temp) => {
                let base = self.symbols.function(func).frame_size;
                let word_size = self.word_size;
                let table = self
                    .slots
                    .entry(func)
                    .or_insert_with(|| SlotTable::new(base, word_size));

                Ok(Home::Stack(table.slot(temp)))
            }

            SymReg::SpillTemp(_) => Err(self.unspillable(reg)),
        }
    }

    fn unspillable(&self, reg: SymReg) -> AllocError {
        AllocError::Unspillable {
            vertex: reg.describe(self.symbols).to_string(),
        }
    }
}
