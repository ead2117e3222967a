use clap::Parser;
use tickfeed::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
