use anyhow::Result;
use clap::Parser;
use ip2dat::cli::{run, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}
