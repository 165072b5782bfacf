use clap::Parser;

use virustree::args::Args;
use virustree::runner::Runner;

fn main() {
    let args = Args::parse();
    if let Err(error) = Runner::new(args).and_then(|runner| runner.start()) {
        log::error!("{error}");
        eprintln!("{error}");
        std::process::exit(1);
    }
}
