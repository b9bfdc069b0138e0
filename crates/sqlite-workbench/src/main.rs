use clap::Parser;

use sqlite_workbench::{adapters, cli::Args, error::AppResult, logging};

fn main() -> AppResult<()> {
    let args = Args::parse();
    logging::init(&args.log_level);
    adapters::bridge::run(args)
}
