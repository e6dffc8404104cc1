use super::{Instr, OperandKind, Origin};

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstrId(pub usize);

/// A non-owning reference to the CFG node wrapping an instruction.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CfgRef {
    pub graph: usize,
    pub node: usize,
}

#[derive(Clone, Debug)]
pub struct MirNode {
    pub instr: Instr,
    pub line: u32,
    pub origin: Origin,

    pub jump: Option<InstrId>,
    pub cfg_node: Option<CfgRef>,

    prev: Option<InstrId>,
    next: Option<InstrId>,
}

impl MirNode {
    fn new(instr: Instr, line: u32, origin: Origin) -> Self {
        Self {
            instr,
            line,
            origin,
            jump: None,
            cfg_node: None,
            prev: None,
            next: None,
        }
    }

    pub fn prev(&self) -> Option<InstrId> {
        self.prev
    }

    pub fn next(&self) -> Option<InstrId> {
        self.next
    }
}

/// The instruction stream: a doubly linked list of nodes stored in an arena.
/// Instruction ids stay valid for the lifetime of the list, nodes are never
/// removed.
#[derive(Debug, Default)]
pub struct MirList {
    nodes: Vec<MirNode>,
    head: Option<InstrId>,
    tail: Option<InstrId>,

    temps: u32,
}

impl MirList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn head(&self) -> Option<InstrId> {
        self.head
    }

    pub fn tail(&self) -> Option<InstrId> {
        self.tail
    }

    pub fn next(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0].next
    }

    pub fn prev(&self, id: InstrId) -> Option<InstrId> {
        self.nodes[id.0].prev
    }

    pub fn get(&self, id: InstrId) -> &MirNode {
        &self.nodes[id.0]
    }

    pub fn get_mut(&mut self, id: InstrId) -> &mut MirNode {
        &mut self.nodes[id.0]
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.nodes[id.0].instr
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.nodes[id.0].instr
    }

    /// Iterate over the instructions in stream order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            list: self,
            current: self.head,
        }
    }

    /// Allocate a temporary number which is not used anywhere in the stream.
    pub fn fresh_temp(&mut self) -> u32 {
        let temp = self.temps;
        self.temps += 1;
        temp
    }

    /// Append an instruction at the end of the stream.
    pub fn push(&mut self, instr: Instr, line: u32) -> InstrId {
        let id = self.alloc(MirNode::new(instr, line, Origin::Program));

        match self.tail {
            Some(tail) => {
                self.nodes[tail.0].next = Some(id);
                self.nodes[id.0].prev = Some(tail);
            }

            None => self.head = Some(id),
        }

        self.tail = Some(id);
        id
    }

    /// Insert an instruction directly after `at`, inheriting its source line.
    pub fn insert_after(&mut self, at: InstrId, instr: Instr, origin: Origin) -> InstrId {
        let line = self.nodes[at.0].line;
        let id = self.alloc(MirNode::new(instr, line, origin));
        let next = self.nodes[at.0].next;

        self.nodes[id.0].prev = Some(at);
        self.nodes[id.0].next = next;
        self.nodes[at.0].next = Some(id);

        match next {
            Some(next) => self.nodes[next.0].prev = Some(id),
            None => self.tail = Some(id),
        }

        id
    }

    /// Insert an instruction directly before `at`, inheriting its source line.
    pub fn insert_before(&mut self, at: InstrId, instr: Instr, origin: Origin) -> InstrId {
        let line = self.nodes[at.0].line;
        let id = self.alloc(MirNode::new(instr, line, origin));
        let prev = self.nodes[at.0].prev;

        self.nodes[id.0].prev = prev;
        self.nodes[id.0].next = Some(at);
        self.nodes[at.0].prev = Some(id);

        match prev {
            Some(prev) => self.nodes[prev.0].next = Some(id),
            None => self.head = Some(id),
        }

        id
    }

    pub fn set_jump(&mut self, from: InstrId, to: InstrId) {
        self.nodes[from.0].jump = Some(to);
    }

    /// Make every control transfer targeting `from` target `to` instead.
    pub fn redirect_jumps(&mut self, from: InstrId, to: InstrId) {
        for node in self.nodes.iter_mut() {
            if node.jump == Some(from) {
                node.jump = Some(to);
            }
        }
    }

    fn alloc(&mut self, node: MirNode) -> InstrId {
        for (_, op) in node.instr.slots() {
            if let OperandKind::Temp(num) | OperandKind::SpillTemp(num) = op.kind {
                self.temps = self.temps.max(num + 1);
            }
        }

        let id = InstrId(self.nodes.len());
        self.nodes.push(node);
        id
    }
}

pub struct Iter<'a> {
    list: &'a MirList,
    current: Option<InstrId>,
}

impl Iterator for Iter<'_> {
    type Item = InstrId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.list.next(current);
        Some(current)
    }
}
