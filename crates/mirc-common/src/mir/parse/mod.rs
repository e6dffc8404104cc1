//! Reader for the textual MIR format.
//!
//! ```text
//! global g
//! extern print args 1
//! fn main frame 8 args 0 {
//!     local x 0
//!     begin
//!     add x, g -> %t0
//!     if %t0, 0 goto done
//!     call print(%t0)
//! done:
//!     return x
//! }
//! ```
//!
//! `fn` opens the function with its label and `}` closes it with `end`.

mod token;


use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};
use std::ops::Range;

use log::{info, trace};
use logos::Logos;

use self::token::Token;
use super::{Instr, InstrId, MirList, Opcode, Operand, OperandKind};
use crate::symbols::{FuncId, SymbolTable};

pub type Span = Range<usize>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ParseError {
    pub span: Span,
    pub message: String,
}

impl ParseError {
    fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
        }
    }
}

impl std::error::Error for ParseError {}
impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at {}..{})", self.message, self.span.start, self.span.end)
    }
}

/// A program as handed over by the front end.
#[derive(Debug, Default)]
pub struct Program {
    pub mir: MirList,
    pub symbols: SymbolTable,
}

pub fn parse(src: &str) -> Result<Program, ParseError> {
    info!("parsing mir");
    let tokens = Token::lexer(src)
        .spanned()
        .map(|(token, span)| match token {
            Token::Error => Err(ParseError::new(span, "invalid token")),
            token => Ok((token, span)),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let items = Parser::new(tokens, src.len()).parse_items()?;
    let program = Resolver::new().resolve(items)?;
    trace!("done parsing mir ({} instructions)", program.mir.len());
    Ok(program)
}

#[derive(Debug)]
enum Item<'src> {
    Global {
        name: &'src str,
        no_regalloc: bool,
        span: Span,
    },

    Extern {
        name: &'src str,
        args: usize,
        span: Span,
    },

    Function(FunctionDecl<'src>),
}

#[derive(Debug)]
struct FunctionDecl<'src> {
    name: &'src str,
    span: Span,
    frame: u32,
    args: usize,
    line: u32,
    end_line: u32,

    locals: Vec<LocalDecl<'src>>,
    body: Vec<Line<'src>>,
}

#[derive(Debug)]
struct LocalDecl<'src> {
    name: &'src str,
    offset: i64,
    no_regalloc: bool,
    span: Span,
}

#[derive(Debug)]
enum Line<'src> {
    Label {
        name: &'src str,
        span: Span,
        line: u32,
    },

    Instr(RawInstr<'src>),
}

#[derive(Debug)]
struct RawInstr<'src> {
    opcode: Opcode,
    sources: Vec<RawOperand<'src>>,
    args: Vec<RawOperand<'src>>,
    dest: Option<RawOperand<'src>>,
    target: Option<(&'src str, Span)>,
    line: u32,
}

#[derive(Debug)]
struct RawOperand<'src> {
    kind: RawKind<'src>,
    indirect: bool,
    span: Span,
}

#[derive(Debug)]
enum RawKind<'src> {
    Number(i64),
    Name(&'src str),
    Temp(u32),
    SpillTemp(u32),
    Register(u32),
}

struct Parser<'src> {
    tokens: Vec<(Token<'src>, Span)>,
    pos: usize,
    line: u32,
    eof: usize,
}

impl<'src> Parser<'src> {
    fn new(tokens: Vec<(Token<'src>, Span)>, eof: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            line: 1,
            eof,
        }
    }

    fn parse_items(&mut self) -> Result<Vec<Item<'src>>, ParseError> {
        let mut items = Vec::new();

        loop {
            self.skip_newlines();

            let Some((token, span)) = self.peek() else {
                break;
            };

            let item = match token {
                Token::Global => {
                    self.advance();
                    let (name, name_span) = self.name()?;
                    let no_regalloc = self.consume(Token::NoAlloc);
                    self.end_of_line()?;
                    Item::Global {
                        name,
                        no_regalloc,
                        span: span.start..name_span.end,
                    }
                }

                Token::Extern => {
                    self.advance();
                    let (name, name_span) = self.name()?;
                    let args = if self.consume(Token::Args) {
                        self.count()?
                    } else {
                        0
                    };
                    self.end_of_line()?;
                    Item::Extern {
                        name,
                        args,
                        span: span.start..name_span.end,
                    }
                }

                Token::Fn => Item::Function(self.function()?),

                other => {
                    return Err(ParseError::new(
                        span,
                        format!("expected `global`, `extern` or `fn`, found {}", other.describe()),
                    ))
                }
            };

            items.push(item);
        }

        Ok(items)
    }

    fn function(&mut self) -> Result<FunctionDecl<'src>, ParseError> {
        let line = self.line;
        self.expect(Token::Fn)?;
        let (name, fn_span) = self.name()?;

        let mut frame = 0;
        let mut args = 0;

        loop {
            if self.consume(Token::Frame) {
                frame = u32::try_from(self.count()?)
                    .map_err(|_| ParseError::new(self.last_span(), "frame size too large"))?;
            } else if self.consume(Token::Args) {
                args = self.count()?;
            } else {
                break;
            }
        }

        self.expect(Token::LBrace)?;
        self.end_of_line()?;

        let mut locals = Vec::new();
        let mut body = Vec::new();

        loop {
            self.skip_newlines();

            let (token, span) = match self.peek() {
                Some(next) => next,
                None => {
                    return Err(ParseError::new(
                        self.eof..self.eof,
                        format!("function `{name}` is missing its closing `}}`"),
                    ))
                }
            };

            match token {
                Token::RBrace => {
                    let end_line = self.line;
                    self.advance();
                    return Ok(FunctionDecl {
                        name,
                        span: fn_span,
                        frame,
                        args,
                        line,
                        end_line,
                        locals,
                        body,
                    });
                }

                Token::Local => {
                    self.advance();
                    let (name, name_span) = self.name()?;
                    let offset = self.number()?;
                    let no_regalloc = self.consume(Token::NoAlloc);
                    self.end_of_line()?;
                    locals.push(LocalDecl {
                        name,
                        offset,
                        no_regalloc,
                        span: name_span,
                    });
                }

                Token::Name(name) if self.peek_at(1) == Some(Token::Colon) => {
                    let line = self.line;
                    self.advance();
                    self.advance();
                    self.end_of_line()?;
                    body.push(Line::Label { name, span, line });
                }

                Token::Name(_) => body.push(Line::Instr(self.instruction()?)),

                other => {
                    return Err(ParseError::new(
                        span,
                        format!("expected an instruction, found {}", other.describe()),
                    ))
                }
            }
        }
    }

    fn instruction(&mut self) -> Result<RawInstr<'src>, ParseError> {
        let line = self.line;
        let (mnemonic, span) = self.name()?;
        let opcode = Opcode::from_mnemonic(mnemonic)
            .ok_or_else(|| ParseError::new(span.clone(), format!("unknown opcode `{mnemonic}`")))?;

        let mut sources = Vec::new();
        let mut args = Vec::new();

        if self.at_operand() {
            sources.push(self.operand()?);

            if opcode == Opcode::Call {
                self.expect(Token::LParen)?;
                if !self.consume(Token::RParen) {
                    loop {
                        args.push(self.operand()?);
                        if self.consume(Token::RParen) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
            }

            while self.consume(Token::Comma) {
                let operand = self.operand()?;
                if sources.len() == 2 {
                    return Err(ParseError::new(
                        operand.span,
                        "an instruction takes at most two source operands",
                    ));
                }
                sources.push(operand);
            }
        }

        let dest = if self.consume(Token::Arrow) {
            Some(self.operand()?)
        } else {
            None
        };

        let target = if self.consume(Token::Goto) {
            Some(self.name()?)
        } else {
            None
        };

        self.end_of_line()?;

        Ok(RawInstr {
            opcode,
            sources,
            args,
            dest,
            target,
            line,
        })
    }

    fn at_operand(&self) -> bool {
        matches!(
            self.peek(),
            Some((
                Token::Star
                    | Token::Number(_)
                    | Token::Name(_)
                    | Token::Temp(_)
                    | Token::SpillTemp(_)
                    | Token::Register(_),
                _
            ))
        )
    }

    fn operand(&mut self) -> Result<RawOperand<'src>, ParseError> {
        let start = self.peek().map(|(_, span)| span.start).unwrap_or(self.eof);
        let indirect = self.consume(Token::Star);

        let (token, span) = self.next_token("an operand")?;
        let kind = match token {
            Token::Number(num) => RawKind::Number(num),
            Token::Name(name) => RawKind::Name(name),
            Token::Temp(num) => RawKind::Temp(num),
            Token::SpillTemp(num) => RawKind::SpillTemp(num),
            Token::Register(num) => RawKind::Register(num),
            other => {
                return Err(ParseError::new(
                    span,
                    format!("expected an operand, found {}", other.describe()),
                ))
            }
        };

        Ok(RawOperand {
            kind,
            indirect,
            span: start..span.end,
        })
    }

    fn name(&mut self) -> Result<(&'src str, Span), ParseError> {
        match self.next_token("a name")? {
            (Token::Name(name), span) => Ok((name, span)),
            (other, span) => Err(ParseError::new(
                span,
                format!("expected a name, found {}", other.describe()),
            )),
        }
    }

    fn number(&mut self) -> Result<i64, ParseError> {
        match self.next_token("a number")? {
            (Token::Number(num), _) => Ok(num),
            (other, span) => Err(ParseError::new(
                span,
                format!("expected a number, found {}", other.describe()),
            )),
        }
    }

    fn count(&mut self) -> Result<usize, ParseError> {
        let num = self.number()?;
        usize::try_from(num).map_err(|_| ParseError::new(self.last_span(), "expected a count"))
    }

    fn end_of_line(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            None => Ok(()),
            Some((Token::Newline, _)) => {
                self.advance();
                Ok(())
            }
            Some((other, span)) => Err(ParseError::new(
                span,
                format!("expected end of line, found {}", other.describe()),
            )),
        }
    }

    fn expect(&mut self, expected: Token<'src>) -> Result<(), ParseError> {
        match self.next_token(&expected.describe())? {
            (token, _) if token == expected => Ok(()),
            (other, span) => Err(ParseError::new(
                span,
                format!("expected {}, found {}", expected.describe(), other.describe()),
            )),
        }
    }

    fn next_token(&mut self, what: &str) -> Result<(Token<'src>, Span), ParseError> {
        let next = self
            .peek()
            .ok_or_else(|| ParseError::new(self.eof..self.eof, format!("expected {what}")))?;
        self.advance();
        Ok(next)
    }

    fn consume(&mut self, token: Token<'src>) -> bool {
        if self.peek().map(|(next, _)| next) == Some(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.consume(Token::Newline) {}
    }

    fn peek(&self) -> Option<(Token<'src>, Span)> {
        self.tokens.get(self.pos).cloned()
    }

    fn peek_at(&self, offset: usize) -> Option<Token<'src>> {
        self.tokens.get(self.pos + offset).map(|(token, _)| *token)
    }

    fn last_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|pos| self.tokens.get(pos))
            .map(|(_, span)| span.clone())
            .unwrap_or(self.eof..self.eof)
    }

    fn advance(&mut self) {
        if let Some((Token::Newline, _)) = self.tokens.get(self.pos) {
            self.line += 1;
        }
        self.pos += 1;
    }
}

struct Resolver {
    program: Program,
}

impl Resolver {
    fn new() -> Self {
        Self {
            program: Program::default(),
        }
    }

    fn resolve(mut self, items: Vec<Item>) -> Result<Program, ParseError> {
        let mut functions = Vec::new();

        for item in items {
            match item {
                Item::Global {
                    name,
                    no_regalloc,
                    span,
                } => {
                    self.declare_unique(name, &span)?;
                    self.program.symbols.add_global(name, no_regalloc);
                }

                Item::Extern { name, args, span } => {
                    self.declare_unique(name, &span)?;
                    self.program.symbols.add_function(name, args, 0, false);
                }

                Item::Function(decl) => {
                    self.declare_unique(decl.name, &decl.span)?;
                    let id = self
                        .program
                        .symbols
                        .add_function(decl.name, decl.args, decl.frame, true);
                    functions.push((id, decl));
                }
            }
        }

        for (id, decl) in functions {
            self.resolve_function(id, decl)?;
        }

        Ok(self.program)
    }

    fn declare_unique(&self, name: &str, span: &Span) -> Result<(), ParseError> {
        if self.program.symbols.lookup(None, name).is_some() {
            Err(ParseError::new(
                span.clone(),
                format!("`{name}` is declared more than once"),
            ))
        } else {
            Ok(())
        }
    }

    fn resolve_function(&mut self, func: FuncId, decl: FunctionDecl) -> Result<(), ParseError> {
        trace!("resolving function `{}`", decl.name);

        let mut declared = HashSet::new();
        for local in decl.locals {
            if !declared.insert(local.name) {
                return Err(ParseError::new(
                    local.span,
                    format!("local `{}` is declared more than once", local.name),
                ));
            }

            self.program
                .symbols
                .add_local(func, local.name, local.offset, local.no_regalloc);
        }

        self.program.mir.push(Instr::label(decl.name), decl.line);

        let mut labels: HashMap<&str, InstrId> = HashMap::new();
        let mut pending = Vec::new();

        for line in decl.body {
            match line {
                Line::Label { name, span, line } => {
                    let id = self.program.mir.push(Instr::label(name), line);
                    if labels.insert(name, id).is_some() {
                        return Err(ParseError::new(
                            span,
                            format!("label `{name}` is defined more than once"),
                        ));
                    }
                }

                Line::Instr(raw) => {
                    let line = raw.line;
                    let target = raw.target.clone();
                    let instr = self.resolve_instr(func, raw)?;
                    let id = self.program.mir.push(instr, line);

                    if let Some(target) = target {
                        pending.push((id, target));
                    }
                }
            }
        }

        self.program.mir.push(Instr::bare(Opcode::End), decl.end_line);

        for (from, (name, span)) in pending {
            let to = labels
                .get(name)
                .copied()
                .ok_or_else(|| ParseError::new(span, format!("unknown label `{name}`")))?;
            self.program.mir.set_jump(from, to);
        }

        Ok(())
    }

    fn resolve_instr(&self, func: FuncId, raw: RawInstr) -> Result<Instr, ParseError> {
        let mut sources = raw.sources.into_iter();
        let op0 = sources
            .next()
            .map(|op| self.resolve_operand(func, op))
            .transpose()?;
        let op1 = sources
            .next()
            .map(|op| self.resolve_operand(func, op))
            .transpose()?;
        let op2 = raw
            .dest
            .map(|op| self.resolve_operand(func, op))
            .transpose()?;

        let mut instr = Instr::new(raw.opcode, op0, op1, op2);
        instr.args = raw
            .args
            .into_iter()
            .map(|op| self.resolve_operand(func, op))
            .collect::<Result<_, _>>()?;

        Ok(instr)
    }

    fn resolve_operand(&self, func: FuncId, raw: RawOperand) -> Result<Operand, ParseError> {
        let kind = match raw.kind {
            RawKind::Number(num) => OperandKind::Constant(num),
            RawKind::Temp(num) => OperandKind::Temp(num),
            RawKind::SpillTemp(num) => OperandKind::SpillTemp(num),
            RawKind::Register(num) => OperandKind::Register(num),
            RawKind::Name(name) => match self.program.symbols.lookup(Some(func), name) {
                Some(var) => OperandKind::Variable(var),
                None => {
                    return Err(ParseError::new(
                        raw.span,
                        format!("unknown name `{name}`"),
                    ))
                }
            },
        };

        Ok(Operand {
            kind,
            indirect: raw.indirect,
        })
    }
}
