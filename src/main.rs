use clap::Parser;
use kabuwalk::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    kabuwalk::logging::init(cli.verbose);
    run(cli)
}
