//! `fets-run-case` entry point.
//!
//! Exit codes: 0 success, 1 timeout, 2 configuration error, 3 unsafe input,
//! 4 submission failure, 5 platform error.

use clap::Parser;

use fets_runner_cli::logging::init_logging;
use fets_runner_cli::{Cli, normalize_legacy_args, run};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_from(normalize_legacy_args(std::env::args_os()));
    init_logging(cli.log_level, cli.verbose);

    let code = run(cli).await;
    std::process::exit(code);
}
