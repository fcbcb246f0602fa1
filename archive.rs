//! Uniform entry-level access to the two container formats.
//!
//! Writers implement [`ArchiveWriter`] (`begin_entry` then `Write` for the
//! entry content); readers implement [`ArchiveReader`], whose
//! [`next_entry`](ArchiveReader::next_entry) hands out one borrowed
//! [`EntryReader`] at a time.
//!
//! - **tar** is the sequential container: headers and content are appended
//!   in stream order and read back in a single forward pass. It always
//!   sits inside a compression layer.
//! - **zip** is the random-access container: the central directory lives at
//!   the end, so reading needs a seekable, sized source, and writing goes
//!   through a spool that stays in memory up to [`SPOOL_LIMIT`] bytes and
//!   moves to a temporary file beyond that.
//!
//! Entry names are package-relative and always use `/` separators.
//! Directories are never stored; they are implied by the files in them.

use crate::error::{PackError, Result, Stage};
use chrono::{Datelike, NaiveDate, Timelike, Utc};
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path};
use std::time::UNIX_EPOCH;
use tar::{EntryType, Header};
use tempfile::SpooledTempFile;
use tracing::debug;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Bytes of a zip container kept in memory before it spills to disk.
pub const SPOOL_LIMIT: usize = 16 * 1024 * 1024;

const BLOCK_SIZE: u64 = 512;
const PERMISSION_BITS: u32 = 0o7777;
const DEFAULT_FILE_MODE: u32 = 0o644;

/// Metadata of one file inside a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Package-relative path, `/`-separated.
    pub name: String,
    /// Permission bits (`0o7777` mask).
    pub mode: u32,
    pub size: u64,
    /// Seconds since the Unix epoch, when the container records it.
    pub mtime: Option<u64>,
}

impl ArchiveEntry {
    pub fn new(name: &str, mode: u32, size: u64) -> Result<Self> {
        Ok(Self {
            name: normalize_name(name)?,
            mode: mode & PERMISSION_BITS,
            size,
            mtime: None,
        })
    }

    /// Build an entry for the regular file at `relative` (relative to the
    /// package root) from its file system metadata.
    pub fn from_metadata(relative: &Path, meta: &fs::Metadata) -> Result<Self> {
        if !meta.is_file() {
            return Err(PackError::unsupported_in(
                Stage::Archive,
                format!("not a regular file: {}", relative.display()),
            ));
        }
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => {
                    return Err(PackError::unsupported_in(
                        Stage::Archive,
                        format!("path escapes the package root: {}", relative.display()),
                    ))
                }
            }
        }
        let mut entry = Self::new(&parts.join("/"), file_mode(meta), meta.len())?;
        entry.mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs());
        Ok(entry)
    }
}

#[cfg(unix)]
fn file_mode(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & PERMISSION_BITS
}

#[cfg(not(unix))]
fn file_mode(meta: &fs::Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        DEFAULT_FILE_MODE
    }
}

/// Normalize an entry name to `a/b/c` form, rejecting absolute names and
/// any `..` component.
pub fn normalize_name(raw: &str) -> Result<String> {
    if raw.starts_with('/') {
        return Err(PackError::unsupported_in(
            Stage::Archive,
            format!("absolute entry name: {}", raw),
        ));
    }
    let mut parts = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(PackError::unsupported_in(
                    Stage::Archive,
                    format!("entry name escapes the package root: {}", raw),
                ))
            }
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(PackError::unsupported_in(Stage::Archive, "empty entry name"));
    }
    Ok(parts.join("/"))
}

/// Zip timestamps are wall-clock fields with two-second resolution and no
/// zone. They are written and read as UTC.
fn zip_time(secs: u64) -> Option<zip::DateTime> {
    let time = chrono::DateTime::<Utc>::from_timestamp(i64::try_from(secs).ok()?, 0)?;
    zip::DateTime::from_date_and_time(
        u16::try_from(time.year()).ok()?,
        time.month() as u8,
        time.day() as u8,
        time.hour() as u8,
        time.minute() as u8,
        time.second() as u8,
    )
    .ok()
}

fn unix_time(stamp: zip::DateTime) -> Option<u64> {
    if !stamp.is_valid() {
        return None;
    }
    let time = NaiveDate::from_ymd_opt(stamp.year().into(), stamp.month().into(), stamp.day().into())?
        .and_hms_opt(stamp.hour().into(), stamp.minute().into(), stamp.second().into())?;
    u64::try_from(time.and_utc().timestamp()).ok()
}

fn zip_error(err: ZipError) -> PackError {
    match err {
        ZipError::Io(e) => PackError::io(Stage::Archive, e),
        other => PackError::unsupported_in(Stage::Archive, format!("zip: {}", other)),
    }
}

/// Write side shared by both containers.
///
/// `begin_entry` ends the previous entry, so an entry's whole content must
/// be written before the next one begins.
pub trait ArchiveWriter: Write {
    fn begin_entry(&mut self, entry: &ArchiveEntry) -> Result<()>;
}

struct OpenEntry {
    name: String,
    declared: u64,
    written: u64,
}

/// Sequential container writer producing GNU tar framing. Names that do
/// not fit the 100-byte header field are carried in a long-name record.
pub struct TarArchiveWriter<W: Write> {
    builder: tar::Builder<W>,
    current: Option<OpenEntry>,
}

impl<W: Write> TarArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            builder: tar::Builder::new(sink),
            current: None,
        }
    }

    fn end_entry(&mut self) -> Result<()> {
        let Some(open) = self.current.take() else {
            return Ok(());
        };
        if open.written != open.declared {
            return Err(PackError::unsupported_in(
                Stage::Archive,
                format!(
                    "entry size mismatch for {}: declared {} bytes, wrote {}",
                    open.name, open.declared, open.written
                ),
            ));
        }
        let tail = open.declared % BLOCK_SIZE;
        if tail != 0 {
            let padding = [0u8; BLOCK_SIZE as usize];
            self.builder
                .get_mut()
                .write_all(&padding[..(BLOCK_SIZE - tail) as usize])
                .map_err(|e| PackError::io(Stage::Archive, e))?;
        }
        Ok(())
    }

    /// Write the end-of-archive marker and return the wrapped sink.
    pub fn finish(mut self) -> Result<W> {
        self.end_entry()?;
        let sink = self
            .builder
            .into_inner()
            .map_err(|e| PackError::io(Stage::Archive, e))?;
        debug!("tar container closed");
        Ok(sink)
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.builder.get_mut()
    }
}

impl<W: Write> ArchiveWriter for TarArchiveWriter<W> {
    fn begin_entry(&mut self, entry: &ArchiveEntry) -> Result<()> {
        self.end_entry()?;

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(entry.size);
        header.set_mode(entry.mode);
        header.set_mtime(entry.mtime.unwrap_or(0));

        // Header only; content streams through `write`.
        self.builder
            .append_data(&mut header, &entry.name, io::empty())
            .map_err(|e| PackError::io(Stage::Archive, e))?;
        self.current = Some(OpenEntry {
            name: entry.name.clone(),
            declared: entry.size,
            written: 0,
        });
        Ok(())
    }
}

impl<W: Write> Write for TarArchiveWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let open = self
            .current
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no active tar entry"))?;
        if open.written + buf.len() as u64 > open.declared {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("content of {} exceeds its declared size of {} bytes", open.name, open.declared),
            ));
        }
        let n = self.builder.get_mut().write(buf)?;
        open.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.builder.get_mut().flush()
    }
}

/// Random-access container writer.
///
/// The zip writer needs to seek back over local headers, so the container
/// is assembled in a spool and copied to the sink on
/// [`finish`](Self::finish).
pub struct ZipArchiveWriter<W: Write> {
    zip: ZipWriter<SpooledTempFile>,
    sink: W,
    active: bool,
}

impl<W: Write> ZipArchiveWriter<W> {
    pub fn new(sink: W) -> Self {
        Self::with_spool_limit(sink, SPOOL_LIMIT)
    }

    /// Like [`new`](Self::new), spilling to disk after `limit` bytes.
    pub fn with_spool_limit(sink: W, limit: usize) -> Self {
        Self {
            zip: ZipWriter::new(SpooledTempFile::new(limit)),
            sink,
            active: false,
        }
    }

    /// Write the central directory and copy the container to the sink.
    pub fn finish(self) -> Result<W> {
        let Self { zip, mut sink, .. } = self;
        let mut spool = zip.finish().map_err(zip_error)?;
        let on_disk = spool.is_rolled();
        let bytes = spool
            .seek(SeekFrom::Start(0))
            .and_then(|_| io::copy(&mut spool, &mut sink))
            .and_then(|n| sink.flush().map(|_| n))
            .map_err(|e| PackError::io(Stage::Archive, e))?;
        debug!(bytes, on_disk, "zip container closed");
        Ok(sink)
    }
}

impl<W: Write> ArchiveWriter for ZipArchiveWriter<W> {
    fn begin_entry(&mut self, entry: &ArchiveEntry) -> Result<()> {
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(entry.mode)
            .large_file(entry.size >= u64::from(u32::MAX));
        if let Some(stamp) = entry.mtime.and_then(zip_time) {
            options = options.last_modified_time(stamp);
        }
        self.zip
            .start_file(entry.name.as_str(), options)
            .map_err(zip_error)?;
        self.active = true;
        Ok(())
    }
}

impl<W: Write> Write for ZipArchiveWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.active {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no active zip entry"));
        }
        self.zip.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.zip.flush()
    }
}

/// Content stream of the current entry. Dropping it releases any
/// per-entry handle, whether or not the content was read to the end.
pub struct EntryReader<'a> {
    entry: ArchiveEntry,
    body: Box<dyn Read + 'a>,
}

impl EntryReader<'_> {
    pub fn entry(&self) -> &ArchiveEntry {
        &self.entry
    }
}

impl Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// Read side shared by both containers.
pub trait ArchiveReader {
    /// Advance to the next file entry. `Ok(None)` marks the end of the
    /// sequence. Directory entries are skipped.
    fn next_entry(&mut self) -> Result<Option<EntryReader<'_>>>;
}

/// Sequential container reader over a borrowed [`tar::Archive`].
pub struct TarArchiveReader<'a, R: Read + 'a> {
    entries: tar::Entries<'a, R>,
}

impl<'a, R: Read + 'a> TarArchiveReader<'a, R> {
    pub fn new(archive: &'a mut tar::Archive<R>) -> Result<Self> {
        let entries = archive
            .entries()
            .map_err(|e| PackError::io(Stage::Archive, e))?;
        Ok(Self { entries })
    }
}

impl<'a, R: Read + 'a> ArchiveReader for TarArchiveReader<'a, R> {
    fn next_entry(&mut self) -> Result<Option<EntryReader<'_>>> {
        loop {
            let entry = match self.entries.next() {
                None => return Ok(None),
                Some(entry) => entry.map_err(|e| PackError::io(Stage::Archive, e))?,
            };

            let header = entry.header();
            match header.entry_type() {
                EntryType::Directory => continue,
                EntryType::Regular | EntryType::Continuous => {}
                other => {
                    return Err(PackError::unsupported_in(
                        Stage::Archive,
                        format!(
                            "unsupported tar entry type {:?} for {}",
                            other,
                            String::from_utf8_lossy(&entry.path_bytes())
                        ),
                    ))
                }
            }

            let name = normalize_name(&String::from_utf8_lossy(&entry.path_bytes()))?;
            let mode = header.mode().map_err(|e| PackError::io(Stage::Archive, e))?;
            let meta = ArchiveEntry {
                name,
                mode: mode & PERMISSION_BITS,
                size: entry.size(),
                mtime: header.mtime().ok(),
            };
            return Ok(Some(EntryReader {
                entry: meta,
                body: Box::new(entry),
            }));
        }
    }
}

/// Random-access container reader; needs a seekable source.
pub struct ZipArchiveReader<R: Read + Seek> {
    archive: ZipArchive<R>,
    index: usize,
}

impl<R: Read + Seek> ZipArchiveReader<R> {
    pub fn new(source: R) -> Result<Self> {
        let archive = ZipArchive::new(source).map_err(zip_error)?;
        debug!(entries = archive.len(), "zip central directory read");
        Ok(Self { archive, index: 0 })
    }
}

impl<R: Read + Seek> ArchiveReader for ZipArchiveReader<R> {
    fn next_entry(&mut self) -> Result<Option<EntryReader<'_>>> {
        while let Some(name) = self.archive.name_for_index(self.index) {
            if !name.ends_with('/') {
                break;
            }
            self.index += 1;
        }
        if self.index >= self.archive.len() {
            return Ok(None);
        }

        let file = self.archive.by_index(self.index).map_err(zip_error)?;
        self.index += 1;

        let raw_mode = file.unix_mode().unwrap_or(0o100000 | DEFAULT_FILE_MODE);
        if raw_mode & 0o170000 == 0o120000 {
            return Err(PackError::unsupported_in(
                Stage::Archive,
                format!("unsupported zip symlink entry {}", file.name()),
            ));
        }
        let meta = ArchiveEntry {
            name: normalize_name(file.name())?,
            mode: raw_mode & PERMISSION_BITS,
            size: file.size(),
            mtime: file.last_modified().and_then(unix_time),
        };
        Ok(Some(EntryReader {
            entry: meta,
            body: Box::new(file),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn write_all_entries<A: ArchiveWriter>(writer: &mut A, files: &[(&str, u32, &[u8])]) {
        for (name, mode, body) in files {
            let entry = ArchiveEntry::new(name, *mode, body.len() as u64).unwrap();
            writer.begin_entry(&entry).unwrap();
            writer.write_all(body).unwrap();
        }
    }

    fn collect(reader: &mut dyn ArchiveReader) -> Vec<(ArchiveEntry, Vec<u8>)> {
        let mut out = Vec::new();
        while let Some(mut entry) = reader.next_entry().unwrap() {
            let mut body = Vec::new();
            entry.read_to_end(&mut body).unwrap();
            out.push((entry.entry().clone(), body));
        }
        out
    }

    const FILES: &[(&str, u32, &[u8])] = &[
        ("a.txt", 0o640, b"alpha"),
        ("nested/b.bin", 0o755, &[0u8; 1500]),
        ("nested/deeper/empty", 0o600, b""),
    ];

    #[test]
    fn tar_entries_round_trip() {
        let mut writer = TarArchiveWriter::new(Vec::new());
        write_all_entries(&mut writer, FILES);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len() % 512, 0);

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut reader = TarArchiveReader::new(&mut archive).unwrap();
        let entries = collect(&mut reader);
        assert_eq!(entries.len(), 3);
        for ((entry, body), (name, mode, expected)) in entries.iter().zip(FILES) {
            assert_eq!(entry.name, *name);
            assert_eq!(entry.mode, *mode);
            assert_eq!(body.as_slice(), *expected);
        }
    }

    #[test]
    fn zip_entries_round_trip() {
        let mut writer = ZipArchiveWriter::new(Vec::new());
        write_all_entries(&mut writer, FILES);
        let bytes = writer.finish().unwrap();
        assert_eq!(&bytes[..2], b"PK");

        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let entries = collect(&mut reader);
        assert_eq!(entries.len(), 3);
        for ((entry, body), (name, mode, expected)) in entries.iter().zip(FILES) {
            assert_eq!(entry.name, *name);
            assert_eq!(entry.mode, *mode);
            assert_eq!(body.as_slice(), *expected);
        }
    }

    #[test]
    fn abandoned_entries_do_not_block_the_next() {
        let mut writer = TarArchiveWriter::new(Vec::new());
        write_all_entries(&mut writer, FILES);
        let bytes = writer.finish().unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut reader = TarArchiveReader::new(&mut archive).unwrap();
        let mut names = Vec::new();
        while let Some(mut entry) = reader.next_entry().unwrap() {
            let mut first = [0u8; 1];
            let _ = entry.read(&mut first).unwrap();
            names.push(entry.entry().name.clone());
        }
        assert_eq!(names, vec!["a.txt", "nested/b.bin", "nested/deeper/empty"]);
    }

    #[test]
    fn abandoned_zip_entries_do_not_block_the_next() {
        let mut writer = ZipArchiveWriter::new(Vec::new());
        write_all_entries(&mut writer, FILES);
        let bytes = writer.finish().unwrap();

        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let mut names = Vec::new();
        while let Some(mut entry) = reader.next_entry().unwrap() {
            let mut first = [0u8; 1];
            let _ = entry.read(&mut first).unwrap();
            names.push(entry.entry().name.clone());
        }
        assert_eq!(names, vec!["a.txt", "nested/b.bin", "nested/deeper/empty"]);
    }

    #[test]
    fn tar_stores_long_names() {
        let deep = (0..30).map(|i| format!("dir{i:05}")).collect::<Vec<_>>().join("/");
        let long_component = "x".repeat(150);
        let names = [format!("{deep}/leaf.txt"), format!("short/{long_component}")];
        assert!(names[0].len() > 255);

        let mut writer = TarArchiveWriter::new(Vec::new());
        for name in &names {
            writer.begin_entry(&ArchiveEntry::new(name, 0o644, 4).unwrap()).unwrap();
            writer.write_all(b"body").unwrap();
        }
        let bytes = writer.finish().unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut reader = TarArchiveReader::new(&mut archive).unwrap();
        let entries = collect(&mut reader);
        let read: Vec<_> = entries.iter().map(|(entry, _)| entry.name.clone()).collect();
        assert_eq!(read, names);
        assert!(entries.iter().all(|(_, body)| body == b"body"));
    }

    #[test]
    fn modification_times_survive_both_containers() {
        // even, as zip keeps two-second resolution
        let mtime = 1_700_000_000;
        let mut entry = ArchiveEntry::new("dated.txt", 0o644, 3).unwrap();
        entry.mtime = Some(mtime);

        let mut tar_writer = TarArchiveWriter::new(Vec::new());
        tar_writer.begin_entry(&entry).unwrap();
        tar_writer.write_all(b"abc").unwrap();
        let tar_bytes = tar_writer.finish().unwrap();
        let mut archive = tar::Archive::new(tar_bytes.as_slice());
        let mut reader = TarArchiveReader::new(&mut archive).unwrap();
        assert_eq!(collect(&mut reader)[0].0.mtime, Some(mtime));

        let mut zip_writer = ZipArchiveWriter::new(Vec::new());
        zip_writer.begin_entry(&entry).unwrap();
        zip_writer.write_all(b"abc").unwrap();
        let zip_bytes = zip_writer.finish().unwrap();
        let mut reader = ZipArchiveReader::new(Cursor::new(zip_bytes)).unwrap();
        assert_eq!(collect(&mut reader)[0].0.mtime, Some(mtime));
    }

    #[test]
    fn zip_time_conversion() {
        assert_eq!(zip_time(0), None, "zip cannot represent 1970");
        let stamp = zip_time(1_700_000_001).unwrap();
        assert_eq!((stamp.year(), stamp.month(), stamp.day()), (2023, 11, 14));
        assert_eq!(unix_time(stamp), Some(1_700_000_000));
    }

    #[test]
    fn zip_spool_spills_to_disk() {
        // poorly compressible, so the container outgrows the limit
        let body: Vec<u8> = (0..64 * 1024u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let mut writer = ZipArchiveWriter::with_spool_limit(Vec::new(), 1024);
        let entry = ArchiveEntry::new("big.bin", 0o644, body.len() as u64).unwrap();
        writer.begin_entry(&entry).unwrap();
        writer.write_all(&body).unwrap();
        let bytes = writer.finish().unwrap();

        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let entries = collect(&mut reader);
        assert_eq!(entries[0].1, body);
    }

    #[test]
    fn tar_rejects_short_and_long_content() {
        let mut writer = TarArchiveWriter::new(Vec::new());
        writer.begin_entry(&ArchiveEntry::new("short", 0o644, 10).unwrap()).unwrap();
        writer.write_all(b"abc").unwrap();
        let err = writer.finish().unwrap_err();
        assert!(err.to_string().contains("entry size mismatch"), "{err}");

        let mut writer = TarArchiveWriter::new(Vec::new());
        writer.begin_entry(&ArchiveEntry::new("long", 0o644, 2).unwrap()).unwrap();
        assert!(writer.write_all(b"abc").is_err());
    }

    #[test]
    fn write_without_entry_fails() {
        let mut tar = TarArchiveWriter::new(Vec::new());
        assert!(tar.write_all(b"x").is_err());
        let mut zip = ZipArchiveWriter::new(Vec::new());
        assert!(zip.write_all(b"x").is_err());
    }

    #[test]
    fn tar_directories_are_skipped_and_symlinks_rejected() {
        let mut builder = tar::Builder::new(Vec::new());
        let mut dir = Header::new_ustar();
        dir.set_path("docs/").unwrap();
        dir.set_entry_type(EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        dir.set_cksum();
        builder.append(&dir, io::empty()).unwrap();

        let mut file = Header::new_ustar();
        file.set_path("docs/readme").unwrap();
        file.set_size(2);
        file.set_mode(0o644);
        file.set_cksum();
        builder.append(&file, &b"hi"[..]).unwrap();

        let mut link = Header::new_ustar();
        link.set_path("docs/link").unwrap();
        link.set_entry_type(EntryType::Symlink);
        link.set_link_name("readme").unwrap();
        link.set_size(0);
        link.set_cksum();
        builder.append(&link, io::empty()).unwrap();
        let bytes = builder.into_inner().unwrap();

        let mut archive = tar::Archive::new(bytes.as_slice());
        let mut reader = TarArchiveReader::new(&mut archive).unwrap();
        let first = reader.next_entry().unwrap().unwrap();
        assert_eq!(first.entry().name, "docs/readme");
        drop(first);
        let err = reader.next_entry().err().unwrap();
        assert!(matches!(err, PackError::UnsupportedFormat { stage: Stage::Archive, .. }));
    }

    #[test]
    fn names_are_normalized_and_guarded() {
        assert_eq!(normalize_name("./a//b/./c").unwrap(), "a/b/c");
        assert!(normalize_name("/etc/passwd").is_err());
        assert!(normalize_name("a/../../b").is_err());
        assert!(normalize_name("./").is_err());
    }

    #[test]
    fn zip_with_traversal_name_is_rejected() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("../evil", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"x").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.next_entry().is_err());
    }
}
