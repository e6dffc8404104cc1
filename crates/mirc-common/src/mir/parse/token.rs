use logos::Logos;

#[derive(Logos, Clone, Copy, Debug, PartialEq)]
pub enum Token<'src> {
    #[token("global")]
    Global,

    #[token("extern")]
    Extern,

    #[token("fn")]
    Fn,

    #[token("frame")]
    Frame,

    #[token("args")]
    Args,

    #[token("local")]
    Local,

    #[token("noalloc")]
    NoAlloc,

    #[token("goto")]
    Goto,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    #[token("*")]
    Star,

    #[token("->")]
    Arrow,

    #[regex(r"%t[0-9]+", |lex| lex.slice()[2..].parse().ok())]
    Temp(u32),

    #[regex(r"%s[0-9]+", |lex| lex.slice()[2..].parse().ok())]
    SpillTemp(u32),

    #[regex(r"\$[0-9]+", |lex| lex.slice()[1..].parse().ok())]
    Register(u32),

    #[regex(r"-?[0-9]+", |lex| lex.slice().parse().ok())]
    Number(i64),

    #[regex(r"[a-zA-Z_.][a-zA-Z0-9_.]*")]
    Name(&'src str),

    #[regex(r"\r?\n")]
    Newline,

    #[error]
    #[regex(r"[ \t\f]+", logos::skip)]
    #[regex(r";[^\n\r]*", logos::skip)]
    Error,
}

impl Token<'_> {
    pub fn describe(&self) -> String {
        match self {
            Self::Global => "`global`".into(),
            Self::Extern => "`extern`".into(),
            Self::Fn => "`fn`".into(),
            Self::Frame => "`frame`".into(),
            Self::Args => "`args`".into(),
            Self::Local => "`local`".into(),
            Self::NoAlloc => "`noalloc`".into(),
            Self::Goto => "`goto`".into(),
            Self::LBrace => "`{`".into(),
            Self::RBrace => "`}`".into(),
            Self::LParen => "`(`".into(),
            Self::RParen => "`)`".into(),
            Self::Comma => "`,`".into(),
            Self::Colon => "`:`".into(),
            Self::Star => "`*`".into(),
            Self::Arrow => "`->`".into(),
            Self::Temp(num) => format!("temporary `%t{num}`"),
            Self::SpillTemp(num) => format!("spill temporary `%s{num}`"),
            Self::Register(num) => format!("register `${num}`"),
            Self::Number(num) => format!("number `{num}`"),
            Self::Name(name) => format!("name `{name}`"),
            Self::Newline => "end of line".into(),
            Self::Error => "invalid token".into(),
        }
    }
}
