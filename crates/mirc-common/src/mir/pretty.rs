use std::collections::HashSet;

use pretty::{Arena, DocAllocator, DocBuilder};

use super::{Instr, InstrId, MirList, Opcode, Operand, OperandKind};
use crate::symbols::{Storage, SymbolTable, VarId};

/// Prints a MIR stream in the format accepted by [`super::parse::parse`].
pub struct Prettier<'a> {
    symbols: &'a SymbolTable,
    allocator: Arena<'a>,
    width: usize,
}

impl<'a> Prettier<'a> {
    pub fn new(symbols: &'a SymbolTable) -> Self {
        Self {
            symbols,
            allocator: Arena::new(),
            width: 80,
        }
    }

    pub fn with_width(self, width: usize) -> Self {
        Self { width, ..self }
    }

    #[must_use]
    pub fn pretty_program(&'a self, mir: &MirList) -> String {
        let doc = self.doc_program(mir);
        self.render(doc)
    }

    #[must_use]
    pub fn pretty_instr(&'a self, instr: &Instr) -> String {
        let doc = self.doc_instr(instr, None);
        self.render(doc)
    }

    #[must_use]
    pub fn pretty_operand(&'a self, op: &Operand) -> String {
        let doc = self.doc_operand(op);
        self.render(doc)
    }

    fn render(&'a self, doc: DocBuilder<'a, Arena<'a>>) -> String {
        let mut res = Vec::new();
        doc.render(self.width, &mut res).unwrap();
        String::from_utf8(res).unwrap()
    }

    fn doc_program(&'a self, mir: &MirList) -> DocBuilder<Arena<'a>> {
        let globals = self
            .symbols
            .vars()
            .filter(|(_, var)| var.is_global())
            .map(|(id, var)| {
                self.allocator
                    .text(format!("global {}", var.name))
                    .append(self.doc_no_regalloc(var.no_regalloc))
                    .append(self.doc_register(id))
            });

        let externs = self
            .symbols
            .functions()
            .filter(|(_, func)| !func.defined)
            .map(|(_, func)| {
                self.allocator
                    .text(format!("extern {} args {}", func.name, func.args))
            });

        let header = self
            .allocator
            .intersperse(globals.chain(externs), self.allocator.hardline());

        header
            .append(self.allocator.hardline())
            .append(self.doc_body(mir))
    }

    fn doc_body(&'a self, mir: &MirList) -> DocBuilder<Arena<'a>> {
        let targets: HashSet<InstrId> = mir
            .iter()
            .filter_map(|id| mir.get(id).jump)
            .filter(|target| mir.instr(*target).opcode != Opcode::Label)
            .collect();

        let mut doc = self.allocator.nil();
        let mut inside = false;

        for id in mir.iter() {
            let node = mir.get(id);
            let instr = &node.instr;

            if !inside && instr.opcode == Opcode::Label {
                inside = true;
                doc = doc
                    .append(self.allocator.hardline())
                    .append(self.doc_function_header(instr));
                continue;
            }

            if instr.opcode == Opcode::End && inside {
                inside = false;
                doc = doc
                    .append(self.allocator.hardline())
                    .append(self.allocator.text("}"))
                    .append(self.allocator.hardline());
                continue;
            }

            if targets.contains(&id) {
                doc = doc
                    .append(self.allocator.hardline())
                    .append(self.allocator.text(format!("{}:", synthetic_label(id))));
            }

            if instr.opcode == Opcode::Label {
                let name = instr.label.as_deref().unwrap_or("");
                doc = doc
                    .append(self.allocator.hardline())
                    .append(self.allocator.text(format!("{name}:")));
                continue;
            }

            let target = node.jump.map(|target| {
                mir.instr(target)
                    .label
                    .clone()
                    .filter(|_| mir.instr(target).opcode == Opcode::Label)
                    .unwrap_or_else(|| synthetic_label(target))
            });

            doc = doc.append(
                self.allocator
                    .hardline()
                    .append(self.doc_instr(instr, target))
                    .nest(4),
            );
        }

        doc
    }

    fn doc_function_header(&'a self, label: &Instr) -> DocBuilder<Arena<'a>> {
        let name = label.label.as_deref().unwrap_or("");
        let Some(func) = self.symbols.function_by_name(name) else {
            return self.allocator.text(format!("fn {name} {{"));
        };

        let function = self.symbols.function(func);
        let locals = self.symbols.locals_of(func).map(|(id, var)| {
            let offset = match var.storage {
                Storage::Local { offset } => offset,
                _ => 0,
            };

            self.allocator
                .hardline()
                .append(self.allocator.text(format!("local {} {offset}", var.name)))
                .append(self.doc_no_regalloc(var.no_regalloc))
                .append(self.doc_register(id))
                .nest(4)
        });

        self.allocator
            .text(format!(
                "fn {} frame {} args {} {{",
                function.name, function.frame_size, function.args
            ))
            .append(self.allocator.concat(locals))
    }

    fn doc_no_regalloc(&'a self, no_regalloc: bool) -> DocBuilder<Arena<'a>> {
        if no_regalloc {
            self.allocator.text(" noalloc")
        } else {
            self.allocator.nil()
        }
    }

    fn doc_register(&'a self, var: VarId) -> DocBuilder<Arena<'a>> {
        match self.symbols.var(var).register {
            Some(reg) => self.allocator.text(format!(" ; in ${reg}")),
            None => self.allocator.nil(),
        }
    }

    fn doc_instr(&'a self, instr: &Instr, target: Option<String>) -> DocBuilder<Arena<'a>> {
        let mut doc = self.allocator.text(instr.opcode.mnemonic());

        let sources: Vec<_> = instr.operands[..2].iter().flatten().collect();
        for (index, op) in sources.iter().enumerate() {
            let sep = if index == 0 { " " } else { ", " };
            doc = doc
                .append(self.allocator.text(sep))
                .append(self.doc_operand(op));

            if index == 0 && instr.opcode == Opcode::Call {
                doc = doc.append(
                    self.allocator
                        .intersperse(
                            instr.args.iter().map(|arg| self.doc_operand(arg)),
                            self.allocator.text(", "),
                        )
                        .parens(),
                );
            }
        }

        if let Some(dest) = instr.dest() {
            doc = doc
                .append(self.allocator.text(" -> "))
                .append(self.doc_operand(dest));
        }

        if let Some(target) = target {
            doc = doc.append(self.allocator.text(format!(" goto {target}")));
        }

        doc
    }

    fn doc_operand(&'a self, op: &Operand) -> DocBuilder<Arena<'a>> {
        let star = if op.indirect { "*" } else { "" };
        let text = match op.kind {
            OperandKind::Variable(var) => format!("{star}{}", self.symbols.var(var).name),
            OperandKind::Constant(value) => format!("{star}{value}"),
            OperandKind::Temp(num) => format!("{star}%t{num}"),
            OperandKind::SpillTemp(num) => format!("{star}%s{num}"),
            OperandKind::Register(num) => format!("{star}${num}"),
        };

        self.allocator.text(text)
    }
}

fn synthetic_label(id: InstrId) -> String {
    format!(".L{}", id.0)
}
