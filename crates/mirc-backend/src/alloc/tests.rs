use mirc_common::mir::parse::{parse, Program};
use mirc_common::mir::pretty::Prettier;
use mirc_common::mir::{Instr, InstrId, Opcode, Operand, OperandKind, Origin};
use mirc_common::symbols::VarId;

use super::{allocate, Allocation, Constraints};
use crate::cfg::SymReg;
use crate::AllocError;

fn run(src: &str, registers: u32) -> (Program, Allocation) {
    let mut program = parse(src).unwrap();
    let allocation = allocate(
        &mut program.mir,
        &mut program.symbols,
        &Constraints::new(registers),
    )
    .unwrap();

    (program, allocation)
}

fn instrs(program: &Program) -> Vec<(InstrId, &Instr)> {
    program
        .mir
        .iter()
        .map(|id| (id, program.mir.instr(id)))
        .collect()
}

/// Check that no symbolic register survived and every register is in range.
fn check_rewritten(program: &Program, registers: u32) {
    for (_, instr) in instrs(program) {
        for (_, op) in instr.slots() {
            match op.kind {
                OperandKind::Temp(_) | OperandKind::SpillTemp(_) => {
                    panic!("symbolic register left in {instr:?}")
                }
                OperandKind::Register(reg) => assert!(reg < registers),
                _ => {}
            }
        }
    }
}

/// Check that interfering registers got different colors.
fn check_coloring(allocation: &Allocation, registers: u32) {
    let ig = &allocation.interference;

    for (index, reg) in ig.vertices().iter().enumerate() {
        let color = allocation.register(reg).unwrap();
        assert!(color < registers);

        for other in ig.neighbours(index) {
            assert_ne!(Some(color), allocation.register(&ig.vertex(*other)));
        }
    }
}

fn memory_operand(instr: &Instr, index: usize) -> Option<VarId> {
    match instr.operands[index].map(|op| op.kind) {
        Some(OperandKind::Variable(var)) => Some(var),
        _ => None,
    }
}

const THREE_CLIQUE: &str = "\
fn f {
    move 1 -> %t0
    move 2 -> %t1
    move 3 -> %t2
    add %t0, %t1 -> %t3
    add %t3, %t2 -> %t4
    return %t4
}
";

const FOUR_CLIQUE: &str = "\
fn f frame 8 {
    move 1 -> %t0
    move 2 -> %t1
    move 3 -> %t2
    move 4 -> %t3
    add %t1, %t2 -> %t4
    add %t4, %t3 -> %t5
    add %t5, %t0 -> %t6
    return %t6
}
";

#[test]
fn zero_registers_is_rejected() {
    let mut program = parse(THREE_CLIQUE).unwrap();
    let error = allocate(
        &mut program.mir,
        &mut program.symbols,
        &Constraints::new(0),
    )
    .unwrap_err();

    assert_eq!(AllocError::InvalidRegisterBudget, error);
}

#[test]
fn interference_is_symmetric_and_irreflexive() {
    let (_, allocation) = run(FOUR_CLIQUE, 8);
    let ig = &allocation.interference;
    assert!(ig.len() >= 3);

    for a in ig.vertices() {
        assert!(!ig.linked(a, a));

        for b in ig.vertices() {
            assert_eq!(ig.linked(a, b), ig.linked(b, a));
        }
    }

    let t0 = SymReg::Temp(0);
    let t1 = SymReg::Temp(1);
    assert!(ig.linked(&t0, &t1));
    assert!(!ig.linked(&t0, &SymReg::Temp(100)));
    assert!(!ig.linked(&SymReg::SpillTemp(100), &t1));
}

#[test]
fn three_clique_fits_three_registers() {
    let (program, allocation) = run(THREE_CLIQUE, 3);
    let ig = &allocation.interference;

    assert!(ig.linked(&SymReg::Temp(0), &SymReg::Temp(1)));
    assert!(ig.linked(&SymReg::Temp(0), &SymReg::Temp(2)));
    assert!(ig.linked(&SymReg::Temp(1), &SymReg::Temp(2)));

    assert_eq!(1, allocation.rounds);
    assert!(allocation.spilled.is_empty());
    assert!(allocation.frame_deltas.is_empty());

    check_coloring(&allocation, 3);
    check_rewritten(&program, 3);
}

#[test]
fn four_clique_spills_once_with_three_registers() {
    let (program, allocation) = run(FOUR_CLIQUE, 3);

    assert_eq!(2, allocation.rounds);
    assert_eq!(vec![SymReg::Temp(0)], allocation.spilled);

    let f = program.symbols.function_by_name("f").unwrap();
    assert_eq!(4, allocation.frame_delta(f));
    assert_eq!(12, program.symbols.function(f).frame_size);

    let stores: Vec<_> = instrs(&program)
        .into_iter()
        .filter(|(id, _)| program.mir.get(*id).origin == Origin::SpillStore)
        .map(|(_, instr)| instr.clone())
        .collect();
    assert_eq!(1, stores.len());
    assert_eq!(Opcode::StackStore, stores[0].opcode);
    assert_eq!(
        Some(OperandKind::Constant(8)),
        stores[0].dest().map(|op| op.kind)
    );

    let loads = instrs(&program)
        .into_iter()
        .filter(|(id, instr)| {
            program.mir.get(*id).origin == Origin::SpillLoad && instr.opcode == Opcode::StackLoad
        })
        .count();
    assert_eq!(1, loads);

    check_coloring(&allocation, 3);
    check_rewritten(&program, 3);
}

#[test]
fn round_limit_is_enforced() {
    let mut program = parse(FOUR_CLIQUE).unwrap();
    let error = allocate(
        &mut program.mir,
        &mut program.symbols,
        &Constraints::new(3).with_max_rounds(1),
    )
    .unwrap_err();

    assert_eq!(AllocError::RoundLimit { rounds: 1 }, error);
}

#[test]
fn reallocation_adds_no_spills() {
    let (mut program, _) = run(FOUR_CLIQUE, 3);
    let before = program.mir.len();

    let again = allocate(
        &mut program.mir,
        &mut program.symbols,
        &Constraints::new(3),
    )
    .unwrap();

    assert_eq!(1, again.rounds);
    assert!(again.spilled.is_empty());
    assert_eq!(before, program.mir.len());
}

#[test]
fn allocated_output_reads_back() {
    let (program, _) = run(FOUR_CLIQUE, 3);
    let printed = Prettier::new(&program.symbols).pretty_program(&program.mir);

    let mut reread = parse(&printed).unwrap();
    let again = allocate(
        &mut reread.mir,
        &mut reread.symbols,
        &Constraints::new(3),
    )
    .unwrap();

    assert!(again.spilled.is_empty());
    assert_eq!(program.mir.len(), reread.mir.len());
}

#[test]
fn globals_are_bracketed_around_calls() {
    let src = "\
global g
extern print args 1
fn main {
    begin
    add g, 1 -> %t0
    call print(%t0)
    add g, 2 -> %t1
    return %t1
}
";
    let (program, allocation) = run(src, 4);
    let g = program.symbols.lookup(None, "g").unwrap();
    let stream = instrs(&program);

    let call = stream
        .iter()
        .position(|(_, instr)| instr.opcode == Opcode::Call)
        .unwrap();

    let before = stream[call - 1].1;
    assert_eq!(Opcode::HeapStore, before.opcode);
    assert_eq!(Some(g), memory_operand(before, 2));

    let after = stream[call + 1].1;
    assert_eq!(Opcode::HeapLoad, after.opcode);
    assert_eq!(Some(g), memory_operand(after, 0));

    let begin = stream
        .iter()
        .position(|(_, instr)| instr.opcode == Opcode::Begin)
        .unwrap();
    let entry = stream[begin + 1].1;
    assert_eq!(Opcode::HeapLoad, entry.opcode);
    assert_eq!(Some(g), memory_operand(entry, 0));

    let loads = stream
        .iter()
        .filter(|(_, instr)| instr.opcode == Opcode::HeapLoad)
        .count();
    assert_eq!(2, loads);

    assert!(allocation.spilled.is_empty());
    assert!(program.symbols.var(g).register.is_some());
    check_rewritten(&program, 4);
}

#[test]
fn global_written_before_call_reaches_memory() {
    let src = "\
global g
extern tick
fn main {
    begin
    move 5 -> g
    call tick()
    return g
}
";
    let (program, _) = run(src, 4);
    let g = program.symbols.lookup(None, "g").unwrap();
    let stream = instrs(&program);
    let kind = |op: Option<&Operand>| op.map(|op| op.kind);

    let write = stream
        .iter()
        .position(|(_, instr)| instr.opcode == Opcode::Move)
        .unwrap();
    let call = stream
        .iter()
        .position(|(_, instr)| instr.opcode == Opcode::Call)
        .unwrap();

    assert!(stream[write + 1..call]
        .iter()
        .all(|(_, instr)| instr.opcode != Opcode::HeapLoad));

    let store = stream[call - 1].1;
    assert_eq!(Opcode::HeapStore, store.opcode);
    assert_eq!(Some(g), memory_operand(store, 2));
    assert_eq!(kind(stream[write].1.dest()), kind(store.operands[0].as_ref()));

    let reload = stream[call + 1].1;
    assert_eq!(Opcode::HeapLoad, reload.opcode);
    assert_eq!(Some(g), memory_operand(reload, 0));

    let ret = stream[call + 2].1;
    assert_eq!(Opcode::Return, ret.opcode);
    assert_eq!(kind(reload.dest()), kind(ret.operands[0].as_ref()));

    check_rewritten(&program, 4);
}

#[test]
fn global_brackets_are_not_duplicated() {
    let src = "\
global g
extern tick
fn main {
    begin
    call tick()
    add g, 1 -> %t0
    return %t0
}
";
    let (mut program, _) = run(src, 4);
    let count = |program: &Program, op: Opcode| {
        program
            .mir
            .iter()
            .filter(|id| program.mir.instr(*id).opcode == op)
            .count()
    };

    let loads = count(&program, Opcode::HeapLoad);
    let stores = count(&program, Opcode::HeapStore);
    assert_eq!(1, stores);

    allocate(
        &mut program.mir,
        &mut program.symbols,
        &Constraints::new(4),
    )
    .unwrap();

    assert_eq!(loads, count(&program, Opcode::HeapLoad));
    assert_eq!(stores, count(&program, Opcode::HeapStore));
}

#[test]
fn ten_temporaries_with_four_registers() {
    let src = "\
fn f frame 8 {
    move 1 -> %t0
    move 2 -> %t1
    move 3 -> %t2
    move 4 -> %t3
    move 5 -> %t4
    add %t1, %t2 -> %t5
    add %t3, %t4 -> %t6
    add %t5, %t6 -> %t7
    move 9 -> %t8
    add %t7, %t8 -> %t9
    add %t9, %t0 -> %t9
    return %t9
}
";
    let (program, allocation) = run(src, 4);
    let f = program.symbols.function_by_name("f").unwrap();

    assert!(allocation.rounds >= 2);
    assert!(!allocation.spilled.is_empty());

    let slots = allocation.frame_delta(f) / Constraints::DEFAULT_WORD_SIZE;
    assert!((1..=6).contains(&slots));

    check_coloring(&allocation, 4);
    check_rewritten(&program, 4);
}

#[test]
fn pinned_variables_stay_in_memory() {
    let src = "\
global h noalloc
fn main frame 4 {
    local x 0 noalloc
    move 1 -> x
    add x, h -> %t0
    return %t0
}
";
    let (program, allocation) = run(src, 4);
    let main = program.symbols.function_by_name("main").unwrap();
    let x = program.symbols.lookup(Some(main), "x").unwrap();
    let h = program.symbols.lookup(None, "h").unwrap();

    assert!(allocation.spilled.contains(&SymReg::Var(x)));
    assert!(allocation.spilled.contains(&SymReg::Var(h)));
    assert_eq!(None, program.symbols.var(x).register);
    assert_eq!(0, allocation.frame_delta(main));

    for (id, instr) in instrs(&program) {
        if memory_operand(instr, 0) == Some(h) {
            assert_eq!(Opcode::HeapLoad, instr.opcode);
            assert_eq!(Origin::SpillLoad, program.mir.get(id).origin);
        }

        for (_, op) in instr.slots() {
            assert_ne!(OperandKind::Variable(x), op.kind);
        }
    }

    let stack_stores = instrs(&program)
        .into_iter()
        .filter(|(_, instr)| instr.opcode == Opcode::StackStore)
        .count();
    assert_eq!(1, stack_stores);

    check_rewritten(&program, 4);
}
