use std::error::Error;
use std::fmt::{self, Display};

/// Fatal failures of the register allocator. These indicate malformed input
/// or a register budget the program cannot be allocated within.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AllocError {
    /// A function body does not start with its label.
    MissingFunctionLabel { line: u32 },

    /// A function label names no defined function.
    UnknownFunction { name: String, line: u32 },

    /// The stream ran out before the function's `end`.
    UnterminatedFunction { name: String },

    /// A jump or conditional without a target.
    MissingJumpTarget { function: String, line: u32 },

    /// A jump or conditional whose target lies outside its function.
    ForeignJumpTarget { function: String, line: u32 },

    /// An instruction could not be spliced in because the edge it replaces
    /// does not exist.
    MissingEdge { function: String, line: u32 },

    InvalidRegisterBudget,

    /// A spill temporary could not be colored.
    Unspillable { vertex: String },

    /// Simplification got stuck with only unspillable vertices left.
    NoSpillCandidate { round: usize, remaining: usize },

    RoundLimit { rounds: usize },
}

impl Error for AllocError {}
impl Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingFunctionLabel { line } => {
                write!(f, "expected a function label at line {line}")
            }
            Self::UnknownFunction { name, line } => {
                write!(f, "label '{name}' at line {line} names no defined function")
            }
            Self::UnterminatedFunction { name } => {
                write!(f, "function '{name}' is not terminated by 'end'")
            }
            Self::MissingJumpTarget { function, line } => {
                write!(f, "jump at line {line} in '{function}' has no target")
            }
            Self::ForeignJumpTarget { function, line } => write!(
                f,
                "jump at line {line} in '{function}' targets an instruction outside the function"
            ),
            Self::MissingEdge { function, line } => write!(
                f,
                "cannot splice code at line {line} in '{function}': the control flow edge is missing"
            ),
            Self::InvalidRegisterBudget => write!(f, "at least one register is required"),
            Self::Unspillable { vertex } => {
                write!(f, "spill temporary '{vertex}' could not be assigned a register")
            }
            Self::NoSpillCandidate { round, remaining } => write!(
                f,
                "no spill candidate among the {remaining} remaining vertices in round {round}"
            ),
            Self::RoundLimit { rounds } => {
                write!(f, "register allocation did not converge within {rounds} rounds")
            }
        }
    }
}
