//! `asice combine` - Merge signed containers into one.

use anyhow::{Context, Result};
use asice::AsicError;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

use super::create::remove_partial;
use super::load_settings;
use crate::cli::args::CombineArgs;
use crate::exit_codes;

pub fn run(args: CombineArgs) -> Result<i32> {
    let config = load_settings(&args.settings)?;
    let sources = args
        .sources
        .iter()
        .map(|path| {
            File::open(path)
                .map(BufReader::new)
                .with_context(|| format!("failed to open container: {}", path.display()))
        })
        .collect::<Result<Vec<_>>>()?;

    let result = (|| -> Result<()> {
        let sink = BufWriter::new(
            File::create(&args.out)
                .map_err(AsicError::Io)
                .with_context(|| format!("failed to create {}", args.out.display()))?,
        );
        asice::combine_with_config(sink, sources, &config)?
            .flush()
            .map_err(AsicError::Io)
            .context("failed to flush container")?;
        Ok(())
    })();

    if let Err(err) = result {
        remove_partial(&args.out);
        return Err(err);
    }

    println!(
        "Combined {} containers into {}",
        args.sources.len(),
        args.out.display()
    );
    Ok(exit_codes::SUCCESS)
}
