//! The medium-level intermediate representation: a linear three-address code
//! where `operands[2]` is conventionally the destination.

pub mod parse;
pub mod pretty;

mod list;

pub use list::{CfgRef, InstrId, MirList, MirNode};

use crate::symbols::{Storage, SymbolTable, VarId};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Opcode {
    Nop,
    Label,
    Begin,
    End,
    Receive,
    Call,
    Return,
    If,
    IfNot,
    Jump,
    Member,
    MemberDeref,
    Move,
    SMove,

    Addr,
    StackAddr,
    HeapAddr,

    Load,
    Store,
    StackLoad,
    HeapLoad,
    RegLoad,
    StackStore,
    HeapStore,
    RegStore,
    PushArg,
    LoadString,

    Add,
    Sub,
    Mul,
    Div,

    Eql,
    Neq,
    Lss,
    Leq,
    Gtr,
    Geq,
}

impl Opcode {
    pub const ALL: [Opcode; 37] = [
        Self::Nop,
        Self::Label,
        Self::Begin,
        Self::End,
        Self::Receive,
        Self::Call,
        Self::Return,
        Self::If,
        Self::IfNot,
        Self::Jump,
        Self::Member,
        Self::MemberDeref,
        Self::Move,
        Self::SMove,
        Self::Addr,
        Self::StackAddr,
        Self::HeapAddr,
        Self::Load,
        Self::Store,
        Self::StackLoad,
        Self::HeapLoad,
        Self::RegLoad,
        Self::StackStore,
        Self::HeapStore,
        Self::RegStore,
        Self::PushArg,
        Self::LoadString,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Eql,
        Self::Neq,
        Self::Lss,
        Self::Leq,
        Self::Gtr,
        Self::Geq,
    ];

    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Nop => "nop",
            Self::Label => "label",
            Self::Begin => "begin",
            Self::End => "end",
            Self::Receive => "receive",
            Self::Call => "call",
            Self::Return => "return",
            Self::If => "if",
            Self::IfNot => "if_not",
            Self::Jump => "jump",
            Self::Member => "member",
            Self::MemberDeref => "member_deref",
            Self::Move => "move",
            Self::SMove => "smove",
            Self::Addr => "addr",
            Self::StackAddr => "stack_addr",
            Self::HeapAddr => "heap_addr",
            Self::Load => "load",
            Self::Store => "store",
            Self::StackLoad => "stack_load",
            Self::HeapLoad => "heap_load",
            Self::RegLoad => "reg_load",
            Self::StackStore => "stack_store",
            Self::HeapStore => "heap_store",
            Self::RegStore => "reg_store",
            Self::PushArg => "push_arg",
            Self::LoadString => "load_string",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Eql => "eql",
            Self::Neq => "neq",
            Self::Lss => "lss",
            Self::Leq => "leq",
            Self::Gtr => "gtr",
            Self::Geq => "geq",
        }
    }

    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.mnemonic() == name)
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, Self::If | Self::IfNot)
    }

    /// Stores through a pointer: the destination operand names the address,
    /// so it is read rather than written.
    pub fn stores_through_pointer(&self) -> bool {
        matches!(self, Self::Store | Self::RegStore)
    }

    /// Whether operand `index` names a memory location (a global being
    /// loaded, an object whose address is taken, a callee) rather than a
    /// register.
    pub fn is_memory_slot(&self, index: usize) -> bool {
        match (self, index) {
            (Self::Call | Self::Addr | Self::StackAddr | Self::HeapAddr | Self::HeapLoad, 0) => {
                true
            }
            (Self::HeapStore, 2) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OperandKind {
    Variable(VarId),
    Constant(i64),
    Temp(u32),
    SpillTemp(u32),
    Register(u32),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Operand {
    pub kind: OperandKind,
    pub indirect: bool,
}

impl Operand {
    pub fn var(var: VarId) -> Self {
        Self::direct(OperandKind::Variable(var))
    }

    pub fn constant(value: i64) -> Self {
        Self::direct(OperandKind::Constant(value))
    }

    pub fn temp(num: u32) -> Self {
        Self::direct(OperandKind::Temp(num))
    }

    pub fn spill_temp(num: u32) -> Self {
        Self::direct(OperandKind::SpillTemp(num))
    }

    pub fn register(num: u32) -> Self {
        Self::direct(OperandKind::Register(num))
    }

    pub fn deref(self) -> Self {
        Self {
            indirect: true,
            ..self
        }
    }

    pub fn is_constant(&self) -> bool {
        matches!(self.kind, OperandKind::Constant(_))
    }

    /// The global variable this operand refers to, if any.
    pub fn global(&self, symbols: &SymbolTable) -> Option<VarId> {
        match self.kind {
            OperandKind::Variable(var) if symbols.var(var).is_global() => Some(var),
            _ => None,
        }
    }

    /// The frame offset of the local variable this operand refers to, if any.
    pub fn local_offset(&self, symbols: &SymbolTable) -> Option<i64> {
        match self.kind {
            OperandKind::Variable(var) => match symbols.var(var).storage {
                Storage::Local { offset } => Some(offset),
                _ => None,
            },
            _ => None,
        }
    }

    fn direct(kind: OperandKind) -> Self {
        Self {
            kind,
            indirect: false,
        }
    }
}

/// Identifies an operand slot of an instruction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Slot {
    Operand(usize),
    Arg(usize),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Instr {
    pub opcode: Opcode,
    pub operands: [Option<Operand>; 3],
    pub args: Vec<Operand>,
    pub label: Option<String>,
}

impl Instr {
    pub fn new(
        opcode: Opcode,
        op0: Option<Operand>,
        op1: Option<Operand>,
        op2: Option<Operand>,
    ) -> Self {
        Self {
            opcode,
            operands: [op0, op1, op2],
            args: Vec::new(),
            label: None,
        }
    }

    pub fn bare(opcode: Opcode) -> Self {
        Self::new(opcode, None, None, None)
    }

    pub fn label(name: impl Into<String>) -> Self {
        Self {
            label: Some(name.into()),
            ..Self::bare(Opcode::Label)
        }
    }

    pub fn call(callee: VarId, args: Vec<Operand>, dest: Option<Operand>) -> Self {
        Self {
            args,
            ..Self::new(Opcode::Call, Some(Operand::var(callee)), None, dest)
        }
    }

    pub fn dest(&self) -> Option<&Operand> {
        self.operands[2].as_ref()
    }

    pub fn get(&self, slot: Slot) -> Option<&Operand> {
        match slot {
            Slot::Operand(index) => self.operands[index].as_ref(),
            Slot::Arg(index) => self.args.get(index),
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Operand> {
        match slot {
            Slot::Operand(index) => self.operands[index].as_mut(),
            Slot::Arg(index) => self.args.get_mut(index),
        }
    }

    /// Every slot holding an operand, argument slots last.
    pub fn slots(&self) -> impl Iterator<Item = (Slot, &Operand)> + '_ {
        self.operands
            .iter()
            .enumerate()
            .filter_map(|(index, op)| op.as_ref().map(|op| (Slot::Operand(index), op)))
            .chain(
                self.args
                    .iter()
                    .enumerate()
                    .map(|(index, op)| (Slot::Arg(index), op)),
            )
    }
}

/// Why an instruction exists. Anything but [`Origin::Program`] was inserted by
/// the register allocator.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Origin {
    Program,
    GlobalLoad,
    GlobalStore,
    SpillLoad,
    SpillStore,
}

impl Origin {
    pub fn is_inserted(&self) -> bool {
        !matches!(self, Self::Program)
    }
}
