use std::path::PathBuf;

use clap::{ArgAction, Parser};
use log::LevelFilter;
use mirc_backend::Constraints;

/// Graph coloring register allocation for medium-level intermediate code.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Arguments {
    /// The number of physical registers to allocate.
    #[arg(short, long, default_value_t = 8)]
    pub registers: u32,

    /// Give up after this many rounds of spilling.
    #[arg(long, default_value_t = Constraints::DEFAULT_MAX_ROUNDS)]
    pub max_rounds: usize,

    /// The size in bytes of a spill slot.
    #[arg(long, default_value_t = Constraints::DEFAULT_WORD_SIZE)]
    pub word_size: u32,

    /// Write the final control flow and interference graphs as Graphviz
    /// files into this directory.
    #[arg(long)]
    pub dump_graphs: Option<PathBuf>,

    /// Log more. May be repeated.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(required = true)]
    pub path: PathBuf,
}

impl Arguments {
    pub fn constraints(&self) -> Constraints {
        Constraints::new(self.registers)
            .with_max_rounds(self.max_rounds)
            .with_word_size(self.word_size)
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}
