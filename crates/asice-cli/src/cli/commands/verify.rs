//! `asice verify` - Stream a container through the verifier and report.

use anyhow::{Context, Result};
use asice::signing::compute_key_id;
use asice::{ArchiveReader, AsicError};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use super::{load_settings, load_verifier};
use crate::cli::args::VerifyArgs;
use crate::exit_codes;

#[derive(Debug, Serialize)]
struct VerifyReport {
    container: String,
    verified: bool,
    digest_algorithm: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_file: Option<String>,
    entries: Vec<EntryReport>,
    signers: Vec<SignerReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorReport>,
}

#[derive(Debug, Serialize)]
struct EntryReport {
    name: String,
    digest: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<String>,
    signatures: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SignerReport {
    subject: String,
    key_id: String,
    source_entry: String,
}

#[derive(Debug, Serialize)]
struct ErrorReport {
    class: String,
    message: String,
}

pub fn run(args: VerifyArgs) -> Result<i32> {
    let config = load_settings(&args.settings)?;
    let verifier = load_verifier(&args.trust)?;
    let file = File::open(&args.container)
        .with_context(|| format!("failed to open container: {}", args.container.display()))?;
    let mut reader = ArchiveReader::open_with_config(BufReader::new(file), verifier, &config)
        .with_context(|| format!("not a readable container: {}", args.container.display()))?;

    let outcome = drain(&mut reader);
    let report = build_report(&args.container, &reader, outcome.err());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }

    Ok(if report.verified {
        exit_codes::SUCCESS
    } else {
        exit_codes::FAILED
    })
}

/// Walk every content entry; reading is what verifies.
fn drain<R: Read + Seek>(reader: &mut ArchiveReader<R>) -> Result<(), AsicError> {
    while let Some(name) = reader.next_file()? {
        tracing::debug!(entry = %name, "verifying entry");
    }
    Ok(())
}

fn build_report<R: Read + Seek>(
    path: &Path,
    reader: &ArchiveReader<R>,
    error: Option<AsicError>,
) -> VerifyReport {
    let ledger = reader.manifest();
    VerifyReport {
        container: path.display().to_string(),
        verified: error.is_none(),
        digest_algorithm: reader.digest_algorithm().to_string(),
        root_file: ledger.root_file().map(str::to_string),
        entries: ledger
            .records()
            .map(|record| EntryReport {
                name: record.name.clone(),
                digest: hex::encode(&record.digest),
                mime_type: record.mime_type.clone(),
                signatures: record.signature_refs.iter().cloned().collect(),
            })
            .collect(),
        signers: reader
            .certificates()
            .iter()
            .map(|cert| SignerReport {
                subject: cert.subject.clone(),
                key_id: compute_key_id(&cert.certificate),
                source_entry: cert.source_entry.clone(),
            })
            .collect(),
        error: error.map(|err| ErrorReport {
            class: err.class().to_string().to_lowercase(),
            message: error_chain(&err),
        }),
    }
}

fn error_chain(err: &AsicError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn print_text(report: &VerifyReport) {
    match &report.error {
        None => println!("OK {}", report.container),
        Some(err) => println!("FAILED {} ({}): {}", report.container, err.class, err.message),
    }
    println!(
        "  entries: {} ({})",
        report.entries.len(),
        report.digest_algorithm
    );
    if let Some(root) = &report.root_file {
        println!("  root: {root}");
    }
    for signer in &report.signers {
        println!(
            "  signer: {} key_id={} via {}",
            signer.subject, signer.key_id, signer.source_entry
        );
    }
}
