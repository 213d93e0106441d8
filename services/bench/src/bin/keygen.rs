//! Generate a class-constrained key list
//!
//! Usage:
//!   keygen --count 1000 --class a-private --file keys.txt

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use types::{AddressClass, KeyPool};

#[derive(Parser, Debug)]
#[command(name = "keygen")]
#[command(about = "Generate keys of one address class, one per line")]
struct Args {
    /// Number of keys
    #[arg(short = 'n', long)]
    count: usize,

    /// Address class (any, a, a-private, loopback)
    #[arg(short, long, default_value = "any")]
    class: String,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let class: AddressClass = args.class.parse()?;
    let pool = KeyPool::new();
    pool.init_generated(args.count, class)
        .with_context(|| format!("Failed to generate {} keys of class {}", args.count, class))?;

    let mut out: Box<dyn Write> = match &args.file {
        Some(path) => Box::new(BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    for key in pool.keys() {
        writeln!(out, "{}", key)?;
    }
    out.flush()?;
    Ok(())
}
