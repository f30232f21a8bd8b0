//! `asice extract` - Verify a container while writing its content to disk.
//!
//! Entries are staged next to their targets as they stream past and only
//! renamed into place once the whole container has verified. A failed run
//! removes its staged files and leaves existing files untouched.

use anyhow::{Context, Result};
use asice::{ArchiveReader, AsicError};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use super::{load_settings, load_verifier};
use crate::cli::args::ExtractArgs;
use crate::exit_codes;

/// An entry written to a temporary sibling of its destination.
struct Staged {
    tmp: PathBuf,
    target: PathBuf,
}

pub fn run(args: ExtractArgs) -> Result<i32> {
    let config = load_settings(&args.settings)?;
    let verifier = load_verifier(&args.trust)?;
    let file = File::open(&args.container)
        .with_context(|| format!("failed to open container: {}", args.container.display()))?;
    let mut reader = ArchiveReader::open_with_config(BufReader::new(file), verifier, &config)
        .with_context(|| format!("not a readable container: {}", args.container.display()))?;

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create directory: {}", args.out.display()))?;

    let mut staged = Vec::new();
    if let Err(err) = stage_all(&mut reader, &args.out, args.force, &mut staged) {
        discard(&staged);
        return Err(err.context(format!(
            "extraction of {} aborted; nothing was written to {}",
            args.container.display(),
            args.out.display()
        )));
    }

    for (done, entry) in staged.iter().enumerate() {
        if let Err(err) = fs::rename(&entry.tmp, &entry.target) {
            discard(&staged[done..]);
            return Err(err).with_context(|| {
                format!(
                    "failed to move {} into place; {done} of {} entries were extracted",
                    entry.target.display(),
                    staged.len()
                )
            });
        }
    }

    println!(
        "Extracted {} verified entries to {}",
        staged.len(),
        args.out.display()
    );
    Ok(exit_codes::SUCCESS)
}

fn stage_all<R: Read + Seek>(
    reader: &mut ArchiveReader<R>,
    out: &Path,
    force: bool,
    staged: &mut Vec<Staged>,
) -> Result<()> {
    while let Some(name) = reader.next_file()? {
        let target = out.join(safe_relative_path(&name)?);
        if target.exists() && !force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                target.display()
            );
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory: {}", parent.display()))?;
        }

        let tmp = staging_path(&target, staged.len())?;
        let mut sink = BufWriter::new(
            File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?,
        );
        staged.push(Staged {
            tmp: tmp.clone(),
            target,
        });
        let bytes = reader.write_file(&mut sink)?;
        sink.flush()
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tracing::debug!(entry = %name, bytes, "staged");
    }
    Ok(())
}

fn staging_path(target: &Path, index: usize) -> Result<PathBuf> {
    let base = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("path has no filename: {}", target.display()))?;
    Ok(target.with_file_name(format!(
        ".{base}.asice-tmp-{}-{index}",
        std::process::id()
    )))
}

fn discard(staged: &[Staged]) {
    for entry in staged.iter().rev() {
        if let Err(e) = fs::remove_file(&entry.tmp) {
            tracing::warn!(path = %entry.tmp.display(), error = %e, "failed to remove staged file");
        }
    }
}

/// Entry names are untrusted; only plain relative components may reach disk.
fn safe_relative_path(name: &str) -> Result<PathBuf, AsicError> {
    let path = Path::new(name);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(AsicError::Format(format!(
                    "entry '{name}' would be written outside the destination"
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(AsicError::Format(format!("entry '{name}' has no file name")));
    }
    Ok(clean)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(
            safe_relative_path("docs/a.txt").unwrap(),
            PathBuf::from("docs").join("a.txt")
        );
        assert_eq!(safe_relative_path("./a.txt").unwrap(), PathBuf::from("a.txt"));
        assert!(safe_relative_path("../escape.txt").is_err());
        assert!(safe_relative_path("docs/../../escape.txt").is_err());
        assert!(safe_relative_path("/etc/passwd").is_err());
        assert!(safe_relative_path(".").is_err());
    }
}
