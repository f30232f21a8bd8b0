//! `asice create` - Build and sign a container from files on disk.

use anyhow::{Context, Result};
use asice::{ArchiveWriter, AsicError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::load_settings;
use crate::cli::args::CreateArgs;
use crate::exit_codes;
use crate::keys::load_signer;

pub fn run(args: CreateArgs) -> Result<i32> {
    let mut config = load_settings(&args.settings)?;
    if let Some(dialect) = args.dialect {
        config = config.with_dialect(dialect);
    }
    let signer = load_signer(&args.key, &args.subject)?;
    let sources = args
        .files
        .iter()
        .map(|arg| parse_source(arg))
        .collect::<Result<Vec<_>>>()?;

    let result = (|| -> Result<()> {
        let mut writer = ArchiveWriter::create_file(&args.out, &config)?;
        for (name, path) in &sources {
            writer
                .add_file(path, name.as_deref())
                .with_context(|| format!("failed to add {}", path.display()))?;
        }
        if let Some(root) = &args.root {
            writer.set_root_entry(root)?;
        }
        writer
            .sign(&signer)?
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
        "Created {} ({} entries, {} dialect, {})",
        args.out.display(),
        sources.len(),
        config.dialect,
        config.digest_algorithm
    );
    println!("  signer: {} (key_id {})", args.subject, signer.key_id());
    Ok(exit_codes::SUCCESS)
}

/// `PATH` or `NAME=PATH`.
fn parse_source(arg: &str) -> Result<(Option<String>, PathBuf)> {
    let (name, path) = match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            (Some(name.to_string()), PathBuf::from(path))
        }
        _ => (None, PathBuf::from(arg)),
    };
    if !path.is_file() {
        anyhow::bail!("input file not found: {}", path.display());
    }
    Ok((name, path))
}

pub(super) fn remove_partial(path: &Path) {
    if path.exists() {
        if let Err(err) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %err, "failed to remove partial output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_forms() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("report.pdf");
        fs::write(&file, b"%PDF").unwrap();
        let plain = file.to_str().unwrap().to_string();

        let (name, path) = parse_source(&plain).unwrap();
        assert_eq!(name, None);
        assert_eq!(path, file);

        let (name, path) = parse_source(&format!("docs/report.pdf={plain}")).unwrap();
        assert_eq!(name.as_deref(), Some("docs/report.pdf"));
        assert_eq!(path, file);

        assert!(parse_source("missing.txt").is_err());
    }
}
