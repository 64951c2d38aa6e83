//! Command-line surface: `ip2dat location|asn|version`.

use crate::builder::{build_asn, build_location};
use crate::searcher::Searcher;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ip2dat", version, about = "Build and query IPv4 range -> attribute lookup files")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Build or query a location dataset.
    #[command(visible_aliases = ["l", "loc"])]
    Location(BuildArgs),

    /// Build or query an ASN dataset.
    Asn(BuildArgs),

    /// Print version information.
    #[command(visible_aliases = ["v", "ver"])]
    Version(VersionArgs),
}

#[derive(Parser)]
pub struct BuildArgs {
    /// Input text table (TXT or CSV).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output `.dat` file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// After building, look up a test IP against the freshly built file.
    #[arg(short, long)]
    pub test: bool,

    /// IP to use with `--test`.
    #[arg(long, default_value = "1.1.1.1")]
    pub test_ip: String,
}

#[derive(Parser)]
pub struct VersionArgs {
    /// Also print the rustc version the binary was built with.
    #[arg(short, long)]
    pub all: bool,
}

pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Location(args) => run_build(args, build_location),
        Command::Asn(args) => run_build(args, build_asn),
        Command::Version(args) => run_version(args),
    }
}

fn run_build(args: BuildArgs, build: fn(&std::path::Path, &std::path::Path) -> Result<crate::builder::BuildReport>) -> Result<()> {
    let report = build(&args.input, &args.output)?;

    println!(
        "wrote {} ({} ranges, {} pool entries, {} warnings)",
        args.output.display(),
        report.ranges_written,
        report.pool_entries,
        report.warnings.len()
    );
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }

    if args.test {
        let searcher = Searcher::open(&args.output)?;
        let result = searcher.lookup(&args.test_ip);
        println!("lookup {} -> {:?}", args.test_ip, result);
    }

    Ok(())
}

fn run_version(args: VersionArgs) -> Result<()> {
    println!("ip2dat {}", env!("CARGO_PKG_VERSION"));
    if args.all {
        println!("rustc {}", env!("IP2DAT_RUSTC_VERSION"));
    }
    Ok(())
}
