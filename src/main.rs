//! contentgate CLI entry point.

use clap::Parser;
use contentgate::cli::{self, Cli};
use contentgate::observability;

fn main() {
    let cli = Cli::parse();
    observability::init_tracing(cli.verbose);

    let exit_code = match cli::run(cli) {
        Ok(code) => code,
        Err(e) => cli::report_error(&e),
    };

    std::process::exit(exit_code);
}
