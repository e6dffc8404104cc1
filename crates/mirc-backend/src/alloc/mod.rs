//! Iterated graph coloring register allocation.
//!
//! Each round rebuilds def/use sets, global brackets, liveness and the
//! interference graph of the whole program, then tries to color it with the
//! available registers. Vertices which cannot be colored are spilled to
//! memory and the next round starts over on the rewritten program.

mod apply;
mod color;
mod constraint;
mod cost;
mod globals;
mod interfere;
mod spill;

#[cfg(test)]
mod tests;

pub use constraint::Constraints;
pub use interfere::InterferenceGraph;
pub use spill::SlotTable;

use std::collections::{BTreeSet, HashMap};

use log::{debug, info, trace};
use mirc_common::mir::MirList;
use mirc_common::symbols::{FuncId, SymbolTable};

use crate::cfg::{accesses, build_defuse, build_program, solve_liveness, CfgGraph, SymReg};
use crate::AllocError;
use apply::Applier;
use color::ColorNode;
use spill::Spiller;

/// Allocate registers for every function in `mir`, rewriting it in place.
pub fn allocate(
    mir: &mut MirList,
    symbols: &mut SymbolTable,
    constraints: &Constraints,
) -> Result<Allocation, AllocError> {
    AllocatorSession::new(mir, symbols, *constraints)?.run()
}

/// What the allocator did to the program.
#[derive(Debug)]
pub struct Allocation {
    pub rounds: usize,

    /// Every register sent to memory, in the order it happened.
    pub spilled: Vec<SymReg>,

    /// How many bytes each function frame grew by to hold spill slots.
    pub frame_deltas: Vec<(FuncId, u32)>,

    /// The physical register of every surviving symbolic register.
    pub colors: Vec<(SymReg, u32)>,

    /// Graphs of the final round, describing the program before rewriting.
    pub graphs: Vec<CfgGraph>,
    pub interference: InterferenceGraph,
}

impl Allocation {
    pub fn register(&self, reg: &SymReg) -> Option<u32> {
        self.colors
            .iter()
            .find(|(other, _)| other == reg)
            .map(|(_, register)| *register)
    }

    pub fn frame_delta(&self, func: FuncId) -> u32 {
        self.frame_deltas
            .iter()
            .find(|(other, _)| *other == func)
            .map(|(_, delta)| *delta)
            .unwrap_or(0)
    }
}

struct Round {
    ig: InterferenceGraph,
    nodes: Vec<ColorNode>,
}

enum Phase {
    Build,
    Simplify(Round),
    Assign(Round, Vec<usize>),
    Spill(Vec<SymReg>),
    Done(Round),
}

/// All state of one allocation. Lives for a single call to [`allocate`].
pub struct AllocatorSession<'a> {
    mir: &'a mut MirList,
    symbols: &'a mut SymbolTable,
    constraints: Constraints,

    graphs: Vec<CfgGraph>,
    slots: HashMap<FuncId, SlotTable>,
    spilled: Vec<SymReg>,
    round: usize,
}

impl<'a> AllocatorSession<'a> {
    pub fn new(
        mir: &'a mut MirList,
        symbols: &'a mut SymbolTable,
        constraints: Constraints,
    ) -> Result<Self, AllocError> {
        constraints.check()?;
        let graphs = build_program(mir, symbols)?;

        Ok(Self {
            mir,
            symbols,
            constraints,
            graphs,
            slots: HashMap::new(),
            spilled: Vec::new(),
            round: 0,
        })
    }

    pub fn run(mut self) -> Result<Allocation, AllocError> {
        info!(
            "allocating registers for {} functions with {} registers",
            self.graphs.len(),
            self.constraints.registers
        );

        self.spill_pinned()?;

        let mut phase = Phase::Build;
        loop {
            phase = match phase {
                Phase::Build => {
                    self.round += 1;
                    if self.round > self.constraints.max_rounds {
                        return Err(AllocError::RoundLimit {
                            rounds: self.constraints.max_rounds,
                        });
                    }

                    Phase::Simplify(self.build()?)
                }

                Phase::Simplify(mut round) => {
                    let stack = color::simplify(
                        &mut round.nodes,
                        self.constraints.registers,
                        self.round,
                    )?;
                    Phase::Assign(round, stack)
                }

                Phase::Assign(mut round, stack) => {
                    let spilled = color::assign(&mut round.nodes, stack, self.constraints.registers);

                    if spilled.is_empty() {
                        Phase::Done(round)
                    } else {
                        Phase::Spill(self.spill_candidates(&round.ig, &spilled)?)
                    }
                }

                Phase::Spill(regs) => {
                    self.spill(&regs)?;
                    Phase::Build
                }

                Phase::Done(round) => return Ok(self.finish(round)),
            };
        }
    }

    /// Send every variable which must stay in memory there before the first
    /// round.
    fn spill_pinned(&mut self) -> Result<(), AllocError> {
        let mut pinned = BTreeSet::new();

        for id in self.mir.iter() {
            for (_, reg, _) in accesses(self.mir.instr(id), self.symbols) {
                if let SymReg::Var(var) = reg {
                    if self.symbols.var(var).no_regalloc {
                        pinned.insert(reg);
                    }
                }
            }
        }

        if pinned.is_empty() {
            return Ok(());
        }

        debug!("{} variables are pinned to memory", pinned.len());
        let pinned: Vec<_> = pinned.into_iter().collect();
        self.spill(&pinned)
    }

    fn build(&mut self) -> Result<Round, AllocError> {
        debug!("register allocation round {}", self.round);

        for graph in self.graphs.iter_mut() {
            build_defuse(graph, self.mir, self.symbols);
        }

        if globals::insert_global_accesses(&mut self.graphs, self.mir)? > 0 {
            for graph in self.graphs.iter_mut() {
                build_defuse(graph, self.mir, self.symbols);
            }
        }

        for graph in self.graphs.iter_mut() {
            solve_liveness(graph);
        }

        let ig = InterferenceGraph::build(&self.graphs);
        let costs = cost::spill_costs(&self.graphs, self.mir, self.symbols, &ig);
        let nodes = color::color_nodes(&ig, &costs);

        Ok(Round { ig, nodes })
    }

    fn spill_candidates(
        &self,
        ig: &InterferenceGraph,
        spilled: &[usize],
    ) -> Result<Vec<SymReg>, AllocError> {
        spilled
            .iter()
            .map(|index| {
                let reg = ig.vertex(*index);
                if reg.is_spill_temp() {
                    Err(AllocError::Unspillable {
                        vertex: reg.describe(self.symbols).to_string(),
                    })
                } else {
                    Ok(reg)
                }
            })
            .collect()
    }

    fn spill(&mut self, regs: &[SymReg]) -> Result<(), AllocError> {
        for reg in regs {
            debug!("spilling {}", reg.describe(self.symbols));
        }

        Spiller::new(
            self.mir,
            self.symbols,
            &mut self.slots,
            self.constraints.word_size,
        )
        .spill(&mut self.graphs, regs)?;

        self.spilled.extend_from_slice(regs);
        Ok(())
    }

    fn finish(self, round: Round) -> Allocation {
        let applier = Applier::new(&round.ig, &round.nodes);
        applier.apply(self.mir, self.symbols);

        let colors = round
            .ig
            .vertices()
            .iter()
            .filter_map(|reg| applier.register(reg).map(|register| (*reg, register)))
            .collect();

        let mut frame_deltas: Vec<_> = self
            .slots
            .iter()
            .map(|(func, table)| (*func, table.size()))
            .collect();
        frame_deltas.sort();

        for (func, delta) in frame_deltas.iter() {
            let function = self.symbols.function_mut(*func);
            function.frame_size += delta;
            trace!("frame of '{}' grows by {delta} bytes", function.name);
        }

        info!(
            "allocated registers in {} rounds with {} spills",
            self.round,
            self.spilled.len()
        );

        Allocation {
            rounds: self.round,
            spilled: self.spilled,
            frame_deltas,
            colors,
            graphs: self.graphs,
            interference: round.ig,
        }
    }
}
