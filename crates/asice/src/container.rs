//! Zip framing: the `mimetype` marker entry and raw entry access.
//!
//! Every container starts with a STORED `mimetype` entry holding the literal
//! container MIME type. [`ContainerReader`] validates and hides it;
//! [`ContainerWriter`] always emits it first.

use crate::error::AsicError;
use std::io::{self, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const ASICE_MIME_TYPE: &str = "application/vnd.etsi.asic-e+zip";
pub const MIMETYPE_ENTRY: &str = "mimetype";
pub const META_INF: &str = "META-INF/";

/// Upper bound for the marker payload; anything longer is not a MIME type.
const MIMETYPE_LIMIT: u64 = 256;

/// Read side of the framing layer. Content entries start at index 1.
pub struct ContainerReader<R: Read + Seek> {
    archive: ZipArchive<R>,
}

impl<R: Read + Seek> std::fmt::Debug for ContainerReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerReader")
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl<R: Read + Seek> ContainerReader<R> {
    /// Open `source` and check its marker entry against `expected_mime_type`.
    pub fn open(source: R, expected_mime_type: &str) -> Result<Self, AsicError> {
        let mut archive = ZipArchive::new(source)?;
        if archive.is_empty() {
            return Err(AsicError::Format("archive has no entries".into()));
        }

        let mut marker = archive.by_index(0)?;
        if marker.name() != MIMETYPE_ENTRY {
            return Err(AsicError::Format(format!(
                "first entry must be '{MIMETYPE_ENTRY}', found '{}'",
                marker.name()
            )));
        }
        if marker.compression() != CompressionMethod::Stored {
            tracing::warn!(
                compression = ?marker.compression(),
                "mimetype entry is compressed; accepting anyway"
            );
        }

        let mut value = Vec::new();
        (&mut marker)
            .take(MIMETYPE_LIMIT + 1)
            .read_to_end(&mut value)?;
        if value != expected_mime_type.as_bytes() {
            return Err(AsicError::Format(format!(
                "mimetype entry is '{}', expected '{expected_mime_type}'",
                String::from_utf8_lossy(&value)
            )));
        }
        drop(marker);

        Ok(Self { archive })
    }

    /// Number of zip entries, marker included.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() <= 1
    }

    /// Name and directory flag of entry `index`.
    pub fn describe(&mut self, index: usize) -> Result<(String, bool), AsicError> {
        let file = self.archive.by_index(index)?;
        Ok((file.name().to_string(), file.is_dir()))
    }

    /// Decompressing reader over entry `index`.
    pub fn open_entry(&mut self, index: usize) -> Result<impl Read + '_, AsicError> {
        Ok(self.archive.by_index(index)?)
    }

    /// Whole payload of entry `index`, refusing anything above `limit` bytes.
    pub fn read_entry(&mut self, index: usize, limit: u64) -> Result<Vec<u8>, AsicError> {
        let file = self.archive.by_index(index)?;
        let name = file.name().to_string();
        let mut payload = Vec::new();
        file.take(limit + 1).read_to_end(&mut payload)?;
        if payload.len() as u64 > limit {
            return Err(AsicError::Limit { entry: name, limit });
        }
        Ok(payload)
    }

    pub fn comment(&self) -> &[u8] {
        self.archive.comment()
    }

    pub(crate) fn archive_mut(&mut self) -> &mut ZipArchive<R> {
        &mut self.archive
    }
}

/// Write side of the framing layer.
pub struct ContainerWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    entry_open: bool,
}

impl<W: Write + Seek> std::fmt::Debug for ContainerWriter<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerWriter")
            .field("entry_open", &self.entry_open)
            .finish()
    }
}

/// Entries of unknown length get zip64 headers so they may exceed 4 GiB.
fn deflated(large: bool) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(large)
}

impl<W: Write + Seek> ContainerWriter<W> {
    /// Start a container on `sink` and write the STORED marker entry.
    pub fn create(sink: W, mime_type: &str) -> Result<Self, AsicError> {
        let mut zip = ZipWriter::new(sink);
        zip.set_comment(format!("mimetype={mime_type}"));
        zip.start_file(
            MIMETYPE_ENTRY,
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored),
        )?;
        zip.write_all(mime_type.as_bytes())?;
        Ok(Self {
            zip,
            entry_open: false,
        })
    }

    pub fn write_entry(&mut self, name: &str, payload: &[u8]) -> Result<(), AsicError> {
        self.start(name, deflated(payload.len() as u64 >= u64::from(u32::MAX)))?;
        self.write_all(payload)?;
        self.close_entry();
        Ok(())
    }

    /// Begin a streamed entry; payload goes through the [`Write`] impl.
    pub fn put_entry(&mut self, name: &str) -> Result<(), AsicError> {
        self.start(name, deflated(true))
    }

    fn start(&mut self, name: &str, options: SimpleFileOptions) -> Result<(), AsicError> {
        self.zip.start_file(name, options)?;
        self.entry_open = true;
        Ok(())
    }

    pub fn close_entry(&mut self) {
        self.entry_open = false;
    }

    /// Copy entry `index` of `source` without recompressing it.
    pub fn copy_raw<R: Read + Seek>(
        &mut self,
        source: &mut ContainerReader<R>,
        index: usize,
        rename: Option<&str>,
    ) -> Result<(), AsicError> {
        self.close_entry();
        let file = source.archive_mut().by_index_raw(index)?;
        match rename {
            Some(name) => self.zip.raw_copy_file_rename(file, name)?,
            None => self.zip.raw_copy_file(file)?,
        }
        Ok(())
    }

    /// Write the central directory and hand back the sink.
    pub fn finish(mut self) -> Result<W, AsicError> {
        self.close_entry();
        Ok(self.zip.finish()?)
    }
}

impl<W: Write + Seek> Write for ContainerWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.entry_open {
            return Err(io::Error::other("no entry open for writing"));
        }
        self.zip.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.zip.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ContainerWriter::create(Cursor::new(Vec::new()), ASICE_MIME_TYPE).unwrap();
        for (name, payload) in entries {
            writer.write_entry(name, payload).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_marker_written_first_and_stored() {
        let bytes = build(&[("a.txt", b"hello".as_slice())]);
        let mut archive = ZipArchive::new(Cursor::new(&bytes)).unwrap();
        assert_eq!(
            archive.comment(),
            format!("mimetype={ASICE_MIME_TYPE}").as_bytes()
        );
        let marker = archive.by_index(0).unwrap();
        assert_eq!(marker.name(), MIMETYPE_ENTRY);
        assert_eq!(marker.compression(), CompressionMethod::Stored);
        drop(marker);
        assert_eq!(archive.by_index(1).unwrap().compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn test_reader_exposes_entries_after_marker() {
        let bytes = build(&[("a.txt", b"hello".as_slice()), ("dir/b.bin", &[0u8; 64][..])]);
        let mut reader = ContainerReader::open(Cursor::new(bytes), ASICE_MIME_TYPE).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.describe(1).unwrap(), ("a.txt".to_string(), false));

        let mut content = String::new();
        reader
            .open_entry(1)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello");
        assert_eq!(reader.read_entry(2, 64).unwrap().len(), 64);
    }

    #[test]
    fn test_read_entry_limit() {
        let bytes = build(&[("big.bin", &[1u8; 100][..])]);
        let mut reader = ContainerReader::open(Cursor::new(bytes), ASICE_MIME_TYPE).unwrap();
        let err = reader.read_entry(1, 99).unwrap_err();
        assert!(matches!(err, AsicError::Limit { limit: 99, .. }));
    }

    #[test]
    fn test_wrong_marker_value_rejected() {
        let bytes = build(&[]);
        let err = ContainerReader::open(Cursor::new(bytes), "application/zip").unwrap_err();
        assert!(matches!(err, AsicError::Format(_)));
    }

    #[test]
    fn test_missing_marker_rejected() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("a.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"x").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let err = ContainerReader::open(Cursor::new(bytes), ASICE_MIME_TYPE).unwrap_err();
        assert!(matches!(err, AsicError::Format(msg) if msg.contains("first entry")));
    }

    /// Compressed size stored in the local header of `name`.
    fn local_header_size(bytes: &[u8], name: &str) -> u32 {
        let field = |at: usize, len: usize| &bytes[at..at + len];
        (0..bytes.len() - 30)
            .filter(|&at| field(at, 4) == b"PK\x03\x04")
            .find_map(|at| {
                let name_len = u16::from_le_bytes([bytes[at + 26], bytes[at + 27]]) as usize;
                (field(at + 30, name_len) == name.as_bytes())
                    .then(|| u32::from_le_bytes(field(at + 18, 4).try_into().unwrap()))
            })
            .unwrap()
    }

    #[test]
    fn test_streamed_entries_use_zip64_headers() {
        let mut writer = ContainerWriter::create(Cursor::new(Vec::new()), ASICE_MIME_TYPE).unwrap();
        writer.put_entry("streamed.bin").unwrap();
        writer.write_all(&[7u8; 512]).unwrap();
        writer.close_entry();
        writer.write_entry("known.txt", b"hello").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(local_header_size(&bytes, "streamed.bin"), u32::MAX);
        assert_ne!(local_header_size(&bytes, "known.txt"), u32::MAX);

        let mut reader = ContainerReader::open(Cursor::new(bytes), ASICE_MIME_TYPE).unwrap();
        assert_eq!(reader.read_entry(1, 512).unwrap(), vec![7u8; 512]);
        assert_eq!(reader.read_entry(2, 16).unwrap(), b"hello");
    }

    #[test]
    fn test_write_outside_entry_fails() {
        let mut writer = ContainerWriter::create(Cursor::new(Vec::new()), ASICE_MIME_TYPE).unwrap();
        assert!(writer.write_all(b"stray").is_err());
    }

    #[test]
    fn test_copy_raw_with_rename() {
        let source = build(&[("a.txt", b"hello".as_slice())]);
        let mut reader = ContainerReader::open(Cursor::new(source), ASICE_MIME_TYPE).unwrap();

        let mut writer = ContainerWriter::create(Cursor::new(Vec::new()), ASICE_MIME_TYPE).unwrap();
        writer.copy_raw(&mut reader, 1, Some("renamed.txt")).unwrap();
        let copied = writer.finish().unwrap().into_inner();

        let mut reader = ContainerReader::open(Cursor::new(copied), ASICE_MIME_TYPE).unwrap();
        assert_eq!(reader.describe(1).unwrap().0, "renamed.txt");
        assert_eq!(reader.read_entry(1, 16).unwrap(), b"hello");
    }
}
