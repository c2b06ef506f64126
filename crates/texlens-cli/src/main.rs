mod cli;
mod paths;
mod run;

use anyhow::Result;

use crate::cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Pixel(args)) => run::pixel(&cli.engine, args),
        Some(Command::Defaults) => run::defaults(),
        None => run::inspect(&cli.engine, cli.inspect),
    }
}
