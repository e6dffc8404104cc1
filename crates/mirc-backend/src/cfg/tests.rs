use mirc_common::mir::parse::{parse, Program};
use mirc_common::mir::{Instr, MirList, Opcode, Operand, Origin};
use mirc_common::symbols::SymbolTable;

use super::{build_defuse, build_program, solve_liveness, CfgGraph, NodeId, NodeKind, SymReg};
use crate::AllocError;

fn build(src: &str) -> (Program, Vec<CfgGraph>) {
    let mut program = parse(src).unwrap();
    let graphs = build_program(&mut program.mir, &program.symbols).unwrap();
    (program, graphs)
}

fn analyze(src: &str) -> (Program, Vec<CfgGraph>) {
    let (program, mut graphs) = build(src);
    for graph in graphs.iter_mut() {
        build_defuse(graph, &program.mir, &program.symbols);
        solve_liveness(graph);
    }

    (program, graphs)
}

/// Check that every node but the entry has a predecessor, and that every
/// conditional has two successors.
fn check_well_formed(graph: &CfgGraph) {
    for id in graph.node_ids() {
        let node = graph.node(id);

        if id != graph.entry && node.kind != NodeKind::FunctionExit {
            assert!(!node.preds.is_empty(), "node {} has no predecessors", id.0);
        }

        if node.kind == NodeKind::Conditional {
            assert_eq!(2, node.succs.len());
        }

        for succ in node.succs.iter() {
            assert!(graph.node(*succ).preds.contains(&id));
        }
    }
}

fn succs(graph: &CfgGraph, node: usize) -> Vec<usize> {
    graph.node(NodeId(node)).succs.iter().map(|id| id.0).collect()
}

const LOOP: &str = "\
fn main {
    begin
    move 0 -> %t0
loop:
    if %t0, 10 goto done
    add %t0, 1 -> %t0
    jump goto loop
done:
    return %t0
}
";

#[test]
fn cfg_wires_every_node_kind() {
    let (_, graphs) = build(LOOP);
    let graph = &graphs[0];

    assert_eq!(10, graph.nodes.len());
    assert_eq!(NodeKind::FunctionEntry, graph.node(graph.entry).kind);
    assert_eq!(NodeKind::FunctionExit, graph.node(graph.exit).kind);
    assert_eq!(NodeKind::Conditional, graph.node(NodeId(4)).kind);
    assert_eq!(NodeKind::Jump, graph.node(NodeId(6)).kind);
    assert_eq!(NodeKind::Statement, graph.node(NodeId(3)).kind);
    assert_eq!(NodeKind::Statement, graph.node(NodeId(7)).kind);

    let entries: Vec<_> = graph
        .node_ids()
        .filter(|id| graph.node(*id).kind == NodeKind::FunctionEntry)
        .collect();
    assert_eq!(vec![graph.entry], entries);

    assert_eq!(vec![1], succs(graph, 0));
    assert_eq!(vec![5, 7], succs(graph, 4));
    assert_eq!(vec![3], succs(graph, 6));
    assert!(succs(graph, 9).is_empty());

    let loop_preds: Vec<_> = graph.node(NodeId(3)).preds.iter().map(|id| id.0).collect();
    assert_eq!(vec![2, 6], loop_preds);

    check_well_formed(graph);
}

#[test]
fn cfg_stamps_instructions() {
    let (program, graphs) = build(LOOP);

    for id in program.mir.iter() {
        let stamp = program.mir.get(id).cfg_node.unwrap();
        assert_eq!(0, stamp.graph);
        assert_eq!(id, graphs[0].node(NodeId(stamp.node)).instr);
    }
}

#[test]
fn cfg_empty_and_single_statement_functions() {
    let (_, graphs) = build("fn empty {\n}\nfn single {\n    return 0\n}\n");

    assert_eq!(2, graphs.len());
    assert_eq!(2, graphs[0].nodes.len());
    assert_eq!(3, graphs[1].nodes.len());
    assert_eq!("single", graphs[1].name);

    for graph in graphs.iter() {
        check_well_formed(graph);
    }
}

#[test]
fn cfg_requires_function_label() {
    let mut symbols = SymbolTable::new();
    symbols.add_function("main", 0, 0, true);

    let mut mir = MirList::new();
    mir.push(Instr::bare(Opcode::Begin), 3);
    mir.push(Instr::bare(Opcode::End), 4);

    let error = build_program(&mut mir, &symbols).unwrap_err();
    assert_eq!(AllocError::MissingFunctionLabel { line: 3 }, error);
}

#[test]
fn cfg_rejects_unknown_function() {
    let symbols = SymbolTable::new();
    let mut mir = MirList::new();
    mir.push(Instr::label("ghost"), 1);
    mir.push(Instr::bare(Opcode::End), 2);

    let error = build_program(&mut mir, &symbols).unwrap_err();
    assert_eq!(
        AllocError::UnknownFunction {
            name: "ghost".into(),
            line: 1
        },
        error
    );
}

#[test]
fn cfg_rejects_unterminated_function() {
    let mut symbols = SymbolTable::new();
    symbols.add_function("main", 0, 0, true);

    let mut mir = MirList::new();
    mir.push(Instr::label("main"), 1);
    mir.push(Instr::bare(Opcode::Begin), 2);

    let error = build_program(&mut mir, &symbols).unwrap_err();
    assert_eq!(
        AllocError::UnterminatedFunction {
            name: "main".into()
        },
        error
    );
}

#[test]
fn cfg_rejects_bad_jump_targets() {
    let mut symbols = SymbolTable::new();
    symbols.add_function("f", 0, 0, true);
    symbols.add_function("g", 0, 0, true);

    let mut mir = MirList::new();
    mir.push(Instr::label("f"), 1);
    mir.push(Instr::bare(Opcode::Jump), 2);
    mir.push(Instr::bare(Opcode::End), 3);

    let error = build_program(&mut mir, &symbols).unwrap_err();
    assert_eq!(
        AllocError::MissingJumpTarget {
            function: "f".into(),
            line: 2
        },
        error
    );

    let mut mir = MirList::new();
    mir.push(Instr::label("f"), 1);
    let jump = mir.push(Instr::bare(Opcode::Jump), 2);
    mir.push(Instr::bare(Opcode::End), 3);
    let target = mir.push(Instr::label("g"), 4);
    mir.push(Instr::bare(Opcode::End), 5);
    mir.set_jump(jump, target);

    let error = build_program(&mut mir, &symbols).unwrap_err();
    assert_eq!(
        AllocError::ForeignJumpTarget {
            function: "f".into(),
            line: 2
        },
        error
    );
}

#[test]
fn defuse_classifies_operands() {
    let src = "\
global g
extern print args 1
fn main {
    local p 0
    add p, g -> %t0
    store 1 -> p
    move 2 -> *p
    call print(%t0, 3) -> %t1
    heap_load g -> %t2
}
";
    let (program, mut graphs) = build(src);
    let graph = &mut graphs[0];
    build_defuse(graph, &program.mir, &program.symbols);

    let main = program.symbols.function_by_name("main").unwrap();
    let p = SymReg::Var(program.symbols.lookup(Some(main), "p").unwrap());
    let g = program.symbols.lookup(None, "g").unwrap();

    let add = graph.node(NodeId(1));
    assert_eq!(Some(SymReg::Temp(0)), add.def);
    assert_eq!(vec![p, SymReg::Var(g)], add.uses);

    let store = graph.node(NodeId(2));
    assert_eq!(None, store.def);
    assert_eq!(vec![p], store.uses);

    let indirect = graph.node(NodeId(3));
    assert_eq!(None, indirect.def);
    assert_eq!(vec![p], indirect.uses);

    let call = graph.node(NodeId(4));
    assert_eq!(Some(SymReg::Temp(1)), call.def);
    assert_eq!(vec![SymReg::Temp(0)], call.uses);

    let load = graph.node(NodeId(5));
    assert_eq!(Some(SymReg::Temp(2)), load.def);
    assert!(load.uses.is_empty());

    assert_eq!(vec![g], graph.globals);
}

#[test]
fn defuse_clears_previous_results() {
    let (program, mut graphs) = analyze(LOOP);
    let graph = &mut graphs[0];

    build_defuse(graph, &program.mir, &program.symbols);
    build_defuse(graph, &program.mir, &program.symbols);

    let add = graph.node(NodeId(5));
    assert_eq!(vec![SymReg::Temp(0)], add.uses);
    assert!(add.live_in.is_empty());
    assert!(add.live_out.is_empty());
}

#[test]
fn liveness_with_back_edge() {
    let src = "\
fn f {
    move 1 -> %t0
loop:
    add %t0, 1 -> %t0
    if %t0, 10 goto loop
    return %t0
}
";
    let (_, graphs) = analyze(src);
    let graph = &graphs[0];
    let t0 = SymReg::Temp(0);

    for id in graph.node_ids() {
        let node = graph.node(id);

        for used in node.uses.iter() {
            assert!(node.live_in.contains(used));
        }

        let mut out = std::collections::BTreeSet::new();
        for succ in node.succs.iter() {
            out.extend(graph.node(*succ).live_in.iter().copied());
        }
        assert_eq!(out, node.live_out);
    }

    assert!(!graph.node(NodeId(0)).live_out.contains(&t0));
    assert!(graph.node(NodeId(1)).live_out.contains(&t0));
    assert!(!graph.node(NodeId(1)).live_in.contains(&t0));
    assert!(graph.node(NodeId(4)).live_out.contains(&t0));
    assert!(graph.node(NodeId(6)).live_in.is_empty());
}

#[test]
fn liveness_reaches_loops_without_exit() {
    let src = "\
fn f {
    move 1 -> %t0
spin:
    add %t0, 1 -> %t0
    jump goto spin
}
";
    let (_, graphs) = analyze(src);
    let graph = &graphs[0];
    let t0 = SymReg::Temp(0);

    assert!(graph.node(graph.exit).preds.is_empty());
    assert!(graph.node(NodeId(1)).live_out.contains(&t0));
    assert!(graph.node(NodeId(2)).live_in.contains(&t0));
    assert!(graph.node(NodeId(4)).live_out.contains(&t0));
}

#[test]
fn insert_before_redirects_jumps_and_edges() {
    let (mut program, mut graphs) = build(LOOP);
    let graph = &mut graphs[0];
    let label = graph.node(NodeId(3)).instr;
    let jump = graph.node(NodeId(6)).instr;

    let nop = graph
        .insert_before(&mut program.mir, label, Instr::bare(Opcode::Nop), Origin::SpillLoad)
        .unwrap();

    assert_eq!(Some(nop), program.mir.get(jump).jump);
    assert_eq!(Some(nop), program.mir.prev(label));

    let new = NodeId(program.mir.get(nop).cfg_node.unwrap().node);
    assert_eq!(vec![NodeId(2), NodeId(6)], graph.node(new).preds);
    assert_eq!(vec![NodeId(3)], graph.node(new).succs);
    assert_eq!(vec![new], graph.node(NodeId(3)).preds);
    assert_eq!(vec![new], graph.node(NodeId(6)).succs);

    check_well_formed(graph);
}

#[test]
fn insert_after_redirects_fallthrough_only() {
    let (mut program, mut graphs) = build(LOOP);
    let graph = &mut graphs[0];
    let cond = graph.node(NodeId(4)).instr;

    let nop = graph
        .insert_after(&mut program.mir, cond, Instr::bare(Opcode::Nop), Origin::SpillStore)
        .unwrap();

    let new = NodeId(program.mir.get(nop).cfg_node.unwrap().node);
    assert_eq!(vec![new, NodeId(7)], graph.node(NodeId(4)).succs);
    assert_eq!(vec![NodeId(5)], graph.node(new).succs);
    assert_eq!(vec![new], graph.node(NodeId(5)).preds);
    assert_eq!(Origin::SpillStore, program.mir.get(nop).origin);

    check_well_formed(graph);
}

#[test]
fn insert_after_jump_is_rejected() {
    let (mut program, mut graphs) = build(LOOP);
    let graph = &mut graphs[0];
    let jump = graph.node(NodeId(6)).instr;

    let store = Instr::new(Opcode::Nop, None, None, Some(Operand::temp(9)));
    let error = graph
        .insert_after(&mut program.mir, jump, store, Origin::SpillStore)
        .unwrap_err();

    assert_eq!(
        AllocError::MissingEdge {
            function: "main".into(),
            line: 7
        },
        error
    );
}
