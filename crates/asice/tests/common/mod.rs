//! Shared fixtures for container integration tests.
#![allow(dead_code)]

use asice::{
    ArchiveReader, ArchiveWriter, AsicConfig, AsicError, ContainerReader, ContainerWriter,
    DialectKind, Ed25519Signer, Ed25519Verifier, ASICE_MIME_TYPE,
};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const SIGNER_SEED: [u8; 32] = [0x11; 32];
pub const OTHER_SEED: [u8; 32] = [0x22; 32];

pub fn signer() -> Ed25519Signer {
    Ed25519Signer::from_seed(&SIGNER_SEED, "CN=Integration Signer").unwrap()
}

pub fn other_signer() -> Ed25519Signer {
    Ed25519Signer::from_seed(&OTHER_SEED, "CN=Other Signer").unwrap()
}

pub type Entry<'a> = (&'a str, &'a str, &'a [u8]);

/// Build and sign a container in memory.
pub fn build_with(config: &AsicConfig, entries: &[Entry<'_>], root: Option<&str>) -> Vec<u8> {
    build_signed_by(config, entries, root, &signer())
}

pub fn build_signed_by(
    config: &AsicConfig,
    entries: &[Entry<'_>],
    root: Option<&str>,
    signer: &Ed25519Signer,
) -> Vec<u8> {
    let mut writer = ArchiveWriter::with_config(Cursor::new(Vec::new()), config).unwrap();
    for (name, mime, content) in entries {
        writer.add_bytes(name, mime, content).unwrap();
    }
    if let Some(root) = root {
        writer.set_root_entry(root).unwrap();
    }
    writer.sign(signer).unwrap().into_inner()
}

pub fn build(dialect: DialectKind, entries: &[Entry<'_>], root: Option<&str>) -> Vec<u8> {
    build_with(&AsicConfig::default().with_dialect(dialect), entries, root)
}

pub fn open(bytes: Vec<u8>) -> ArchiveReader<Cursor<Vec<u8>>> {
    ArchiveReader::open(Cursor::new(bytes), Ed25519Verifier::new()).unwrap()
}

/// Read every content entry, stopping at the first error.
pub fn read_all(
    reader: &mut ArchiveReader<Cursor<Vec<u8>>>,
) -> Result<Vec<(String, Vec<u8>)>, AsicError> {
    let mut seen = Vec::new();
    while let Some(name) = reader.next_file()? {
        let mut content = Vec::new();
        reader.as_stream()?.read_to_end(&mut content)?;
        seen.push((name, content));
    }
    Ok(seen)
}

/// Names of all zip entries, marker included, in archive order.
pub fn entry_names(bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    archive.file_names().map(str::to_string).collect::<Vec<_>>()
}

pub fn entry_payload(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut file = archive.by_name(name).unwrap();
    let mut payload = Vec::new();
    file.read_to_end(&mut payload).unwrap();
    payload
}

/// Re-encode an archive at the zip level.
///
/// `edit` sees every entry (marker included) in order and returns the payload
/// to keep, or `None` to drop the entry. `extra` entries are appended.
pub fn rebuild(
    bytes: &[u8],
    edit: impl Fn(&str, Vec<u8>) -> Option<Vec<u8>>,
    extra: &[(&str, &[u8])],
) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    out.set_comment(format!("mimetype={ASICE_MIME_TYPE}"));

    for index in 0..archive.len() {
        let mut file = archive.by_index(index).unwrap();
        let name = file.name().to_string();
        if file.is_dir() {
            out.add_directory(name, SimpleFileOptions::default()).unwrap();
            continue;
        }
        let mut payload = Vec::new();
        file.read_to_end(&mut payload).unwrap();
        let Some(payload) = edit(&name, payload) else {
            continue;
        };
        let method = if index == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        out.start_file(name, SimpleFileOptions::default().compression_method(method))
            .unwrap();
        out.write_all(&payload).unwrap();
    }

    for (name, payload) in extra {
        out.start_file(*name, SimpleFileOptions::default()).unwrap();
        out.write_all(payload).unwrap();
    }
    out.finish().unwrap().into_inner()
}

/// Replace the payload of `target`, keeping its position.
pub fn rewrite_entry(bytes: &[u8], target: &str, replacement: &[u8]) -> Vec<u8> {
    rebuild(
        bytes,
        |name, payload| Some(if name == target { replacement.to_vec() } else { payload }),
        &[],
    )
}

pub fn remove_entry(bytes: &[u8], target: &str) -> Vec<u8> {
    rebuild(bytes, |name, payload| (name != target).then_some(payload), &[])
}

pub fn append_entry(bytes: &[u8], name: &str, payload: &[u8]) -> Vec<u8> {
    rebuild(bytes, |_, payload| Some(payload), &[(name, payload)])
}

pub fn append_directory(bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut out = ZipWriter::new(Cursor::new(Vec::new()));
    out.set_comment(format!("mimetype={ASICE_MIME_TYPE}"));
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index).unwrap();
        out.raw_copy_file(file).unwrap();
    }
    out.add_directory(name, SimpleFileOptions::default()).unwrap();
    out.finish().unwrap().into_inner()
}

/// Copy every entry after the marker raw, placing `moved` directly ahead of
/// `anchor`.
pub fn move_before(bytes: &[u8], moved: &str, anchor: &str) -> Vec<u8> {
    let mut source = ContainerReader::open(Cursor::new(bytes), ASICE_MIME_TYPE).unwrap();
    let names: Vec<String> = (0..source.len())
        .map(|i| source.describe(i).unwrap().0)
        .collect();
    let position = |name: &str| names.iter().position(|n| n == name).unwrap();
    let (moved_at, anchor_at) = (position(moved), position(anchor));

    let mut order: Vec<usize> = (1..names.len()).filter(|&i| i != moved_at).collect();
    let insert_at = order.iter().position(|&i| i == anchor_at).unwrap();
    order.insert(insert_at, moved_at);

    let mut target = ContainerWriter::create(Cursor::new(Vec::new()), ASICE_MIME_TYPE).unwrap();
    for index in order {
        target.copy_raw(&mut source, index, None).unwrap();
    }
    target.finish().unwrap().into_inner()
}

/// Name of the detached signature entry of a single-signature container.
pub fn signature_entry(bytes: &[u8]) -> String {
    entry_names(bytes)
        .into_iter()
        .find(|n| n.starts_with("META-INF/signature-") && n.ends_with(".p7s"))
        .unwrap()
}
