mod args;
mod console_driver;
mod dot;

use std::fs;

use anyhow::{bail, Context};
use clap::Parser;
use codespan_reporting::files::SimpleFiles;
use log::info;
use mirc_backend::allocate;
use mirc_common::mir::parse::parse;
use mirc_common::mir::pretty::Prettier;

use args::Arguments;
use console_driver::ConsoleDriver;

fn main() -> anyhow::Result<()> {
    let args = Arguments::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    let src = fs::read_to_string(&args.path)
        .with_context(|| format!("could not read '{}'", args.path.display()))?;

    let mut files = SimpleFiles::new();
    let file = files.add(args.path.display().to_string(), src.clone());
    let mut driver = ConsoleDriver::new(files);

    let mut program = match parse(&src) {
        Ok(program) => program,
        Err(error) => {
            driver.report_parse_error(file, &error)?;
            bail!("could not parse '{}'", args.path.display());
        }
    };

    let constraints = args.constraints();
    let allocation = match allocate(&mut program.mir, &mut program.symbols, &constraints) {
        Ok(allocation) => allocation,
        Err(error) => {
            driver.report_alloc_error(&error)?;
            bail!("could not allocate registers for '{}'", args.path.display());
        }
    };

    if let Some(dir) = args.dump_graphs.as_deref() {
        dot::dump(dir, &program.mir, &program.symbols, &allocation)?;
    }

    let prettier = Prettier::new(&program.symbols);
    print!("{}", prettier.pretty_program(&program.mir));

    eprintln!(
        "{} rounds, {} spilled",
        allocation.rounds,
        allocation.spilled.len()
    );

    for (func, delta) in allocation.frame_deltas.iter() {
        let function = program.symbols.function(*func);
        eprintln!(
            "  {}: frame {} (+{delta})",
            function.name, function.frame_size
        );
    }

    info!("done");
    Ok(())
}
