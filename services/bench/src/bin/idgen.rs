//! Generate a participant identity list for sharded runs
//!
//! Usage:
//!   idgen --count 64 --file identities.txt

use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use types::IdentityPool;

#[derive(Parser, Debug)]
#[command(name = "idgen")]
#[command(about = "Generate unique participant identities, one per line")]
struct Args {
    /// Number of identities
    #[arg(short = 'n', long)]
    count: usize,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let pool = IdentityPool::new();
    pool.init_generated(args.count)
        .context("Failed to generate identities")?;

    write_lines(args.file.as_deref(), pool.identities())
}

fn write_lines(file: Option<&std::path::Path>, lines: &[String]) -> Result<()> {
    let mut out: Box<dyn Write> = match file {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}
