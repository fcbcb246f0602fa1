//! Pack and unpack pipelines.
//!
//! This module provides [`Packer`] and [`unpack`], the primary interface for
//! turning a directory into a package and back.
//!
//! ## Layer order
//!
//! ```text
//! pack:   sink <- [encryption] <- gzip <- tar         (sequential)
//!         sink <- zip                                 (random access, never encrypted)
//! unpack: source -> [decryption] -> gunzip/bunzip2 -> tar
//!         source -> spool -> zip                      (`.zip.gpg` is read as plain zip)
//! ```
//!
//! Each layer owns the one beneath it, so closing happens strictly from the
//! archive outwards: container footer, then compression trailer, then the
//! OpenPGP message, then the caller's sink is flushed. The caller keeps
//! ownership of the root sink or source.

use crate::archive::{
    ArchiveEntry, ArchiveReader, ArchiveWriter, EntryReader, TarArchiveReader, TarArchiveWriter,
    ZipArchiveReader, ZipArchiveWriter, SPOOL_LIMIT,
};
use crate::compression::{CompressionWriter, Decompressor};
use crate::encryption::{self, EncryptingWriter, PlainReader};
use crate::error::{PackError, Result, Stage};
use crate::format::{CompressionKind, PackageFormat};
use crate::key_manager::{PrivateKeyMaterial, PublicKeyMaterial};
use crate::walk;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use tempfile::SpooledTempFile;
use std::path::Path;
use tracing::{debug, info, warn};

/// The caller's sink, optionally behind the encryption layer.
pub enum CipherSink<W: Write> {
    Plain(W),
    Encrypted(EncryptingWriter<W>),
}

impl<W: Write> CipherSink<W> {
    pub fn finish(self) -> Result<W> {
        match self {
            CipherSink::Plain(sink) => Ok(sink),
            CipherSink::Encrypted(writer) => writer.finish(),
        }
    }
}

impl<W: Write> Write for CipherSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CipherSink::Plain(sink) => sink.write(buf),
            CipherSink::Encrypted(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CipherSink::Plain(sink) => sink.flush(),
            CipherSink::Encrypted(writer) => writer.flush(),
        }
    }
}

/// Container chosen once at construction, with every layer beneath it.
enum ArchiveChain<W: Write> {
    Sequential(TarArchiveWriter<CompressionWriter<CipherSink<W>>>),
    RandomAccess(ZipArchiveWriter<CipherSink<W>>),
}

/// Counters reported after packing or unpacking.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub entries: u64,
    pub bytes: u64,
}

/// Write-side pipeline. Build it with [`Packer::new`], add entries, then
/// call [`Packer::finish`]; dropping it unfinished leaves a truncated
/// artifact.
pub struct Packer<W: Write> {
    chain: ArchiveChain<W>,
    format: PackageFormat,
    summary: Summary,
}

impl<W: Write> Packer<W> {
    /// Assemble the write chain over `sink` for `format`.
    ///
    /// bzip2 is rejected here, before anything is written. Zip packages
    /// are never encrypted: asking for it produces an unencrypted package
    /// and a warning.
    pub fn new(sink: W, format: PackageFormat, key: Option<&PublicKeyMaterial>) -> Result<Self> {
        if !format.compression.can_pack() {
            return Err(PackError::unsupported(format!(
                "packing into {} is not supported",
                format.compression
            )));
        }

        let mut effective = format;
        let cipher = match (format.encrypted, key) {
            (true, _) if format.compression.is_random_access() => {
                warn!("encryption not supported with zip compression, writing unencrypted package");
                effective.encrypted = false;
                CipherSink::Plain(sink)
            }
            (true, Some(key)) => CipherSink::Encrypted(encryption::encrypt(sink, key)?),
            (true, None) => return Err(PackError::key_policy("no key given for encrypted package")),
            (false, Some(_)) => {
                return Err(PackError::key_policy("key given but package not marked encrypted"))
            }
            (false, None) => CipherSink::Plain(sink),
        };

        let chain = match format.compression {
            CompressionKind::Zip => ArchiveChain::RandomAccess(ZipArchiveWriter::new(cipher)),
            kind => ArchiveChain::Sequential(TarArchiveWriter::new(CompressionWriter::new(cipher, kind)?)),
        };
        debug!(compression = %effective.compression, encrypted = effective.encrypted, "pack pipeline assembled");

        Ok(Self {
            chain,
            format: effective,
            summary: Summary::default(),
        })
    }

    /// Format actually being written, after any zip downgrade.
    pub fn format(&self) -> PackageFormat {
        self.format
    }

    pub fn summary(&self) -> Summary {
        self.summary
    }

    fn archive(&mut self) -> &mut dyn ArchiveWriter {
        match &mut self.chain {
            ArchiveChain::Sequential(tar) => tar,
            ArchiveChain::RandomAccess(zip) => zip,
        }
    }

    /// Open a new entry; its whole content must be written before the next.
    pub fn begin_entry(&mut self, entry: &ArchiveEntry) -> Result<()> {
        self.archive().begin_entry(entry)?;
        self.summary.entries += 1;
        Ok(())
    }

    /// Begin `entry` and copy its entire content from `content`.
    pub fn add_entry(&mut self, entry: &ArchiveEntry, mut content: impl Read) -> Result<u64> {
        self.begin_entry(entry)?;
        let copied = io::copy(&mut content, &mut *self).map_err(|e| PackError::io(Stage::Archive, e))?;
        debug!(entry = %entry.name, bytes = copied, "entry written");
        Ok(copied)
    }

    /// Pack every regular file under `root`, in sorted depth-first order.
    pub fn pack_dir(&mut self, root: &Path) -> Result<()> {
        self.pack_dir_with(root, |_| {})
    }

    /// Like [`pack_dir`](Self::pack_dir), calling `on_entry` after each file.
    pub fn pack_dir_with(&mut self, root: &Path, mut on_entry: impl FnMut(&ArchiveEntry)) -> Result<()> {
        for file in walk::regular_files(root) {
            let file = file?;
            let entry = ArchiveEntry::from_metadata(&file.relative, &file.metadata)?;
            let source = fs::File::open(&file.path).map_err(|e| PackError::io(Stage::Io, e))?;
            info!(entry = %entry.name, size = entry.size, "packing file");
            self.add_entry(&entry, source)?;
            on_entry(&entry);
        }
        Ok(())
    }

    /// Close every layer from the archive outwards and return the caller's
    /// sink, flushed but not closed.
    pub fn finish(self) -> Result<(W, Summary)> {
        let cipher = match self.chain {
            ArchiveChain::Sequential(tar) => tar.finish()?.finish()?,
            ArchiveChain::RandomAccess(zip) => zip.finish()?,
        };
        let mut sink = cipher.finish()?;
        sink.flush().map_err(|e| PackError::io(Stage::Io, e))?;
        info!(entries = self.summary.entries, bytes = self.summary.bytes, "package complete");
        Ok((sink, self.summary))
    }
}

impl<W: Write> Write for Packer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.archive().write(buf)?;
        self.summary.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.chain {
            ArchiveChain::Sequential(tar) => tar.flush(),
            ArchiveChain::RandomAccess(zip) => zip.flush(),
        }
    }
}

/// Receives each unpacked entry in archive order.
pub trait EntrySink {
    fn entry(&mut self, entry: &mut EntryReader<'_>) -> Result<()>;
}

impl<F> EntrySink for F
where
    F: FnMut(&mut EntryReader<'_>) -> Result<()>,
{
    fn entry(&mut self, entry: &mut EntryReader<'_>) -> Result<()> {
        self(entry)
    }
}

/// The package source, optionally behind the decryption layer.
enum PlainSource<R: Read> {
    Plain(R),
    Decrypted(PlainReader),
}

impl<R: Read> Read for PlainSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            PlainSource::Plain(source) => source.read(buf),
            PlainSource::Decrypted(reader) => reader.read(buf),
        }
    }
}

/// Apply the key policy for reading. Returns the key when the source goes
/// through the decryption layer.
///
/// Zip packages are written unencrypted even when the name asks for `gpg`,
/// so they are read the same way.
fn decryption_key<'k>(
    format: PackageFormat,
    key: Option<&'k PrivateKeyMaterial>,
) -> Result<Option<&'k PrivateKeyMaterial>> {
    match (format.encrypted, key) {
        (true, _) if format.compression.is_random_access() => {
            warn!("encryption not supported with zip compression, reading package unencrypted");
            Ok(None)
        }
        (true, Some(key)) => Ok(Some(key)),
        (true, None) => Err(PackError::key_policy("no key given for encrypted package")),
        (false, Some(_)) => Err(PackError::key_policy("key given but package not marked encrypted")),
        (false, None) => Ok(None),
    }
}

fn open_plain<R: Read>(
    source: R,
    format: PackageFormat,
    key: Option<&PrivateKeyMaterial>,
) -> Result<PlainSource<R>> {
    match decryption_key(format, key)? {
        Some(key) => Ok(PlainSource::Decrypted(encryption::decrypt(source, key)?)),
        None => Ok(PlainSource::Plain(source)),
    }
}

fn drive(reader: &mut dyn ArchiveReader, sink: &mut dyn EntrySink) -> Result<Summary> {
    let mut summary = Summary::default();
    while let Some(mut entry) = reader.next_entry()? {
        info!(entry = %entry.entry().name, size = entry.entry().size, "unpacking entry");
        summary.entries += 1;
        summary.bytes += entry.entry().size;
        sink.entry(&mut entry)?;
    }
    info!(entries = summary.entries, bytes = summary.bytes, "package read");
    Ok(summary)
}

fn drive_sequential<R: Read>(plain: R, kind: CompressionKind, sink: &mut dyn EntrySink) -> Result<Summary> {
    let mut archive = tar::Archive::new(Decompressor::new(plain, kind)?);
    let mut reader = TarArchiveReader::new(&mut archive)?;
    drive(&mut reader, sink)
}

fn drive_random_access<R: Read + Seek>(source: R, sink: &mut dyn EntrySink) -> Result<Summary> {
    let mut reader = ZipArchiveReader::new(source)?;
    drive(&mut reader, sink)
}

/// Spool a forward-only stream so the zip index at its end can be reached.
fn buffer_for_random_access(mut source: impl Read) -> Result<SpooledTempFile> {
    let mut spool = SpooledTempFile::new(SPOOL_LIMIT);
    let bytes = io::copy(&mut source, &mut spool)
        .and_then(|n| spool.seek(SeekFrom::Start(0)).map(|_| n))
        .map_err(|e| PackError::io(Stage::Archive, e))?;
    debug!(bytes, on_disk = spool.is_rolled(), "buffered package for random access");
    Ok(spool)
}

/// Unpack a package from a forward-only `source`, handing every entry to
/// `sink`. Zip packages are spooled first, in memory up to
/// [`SPOOL_LIMIT`] bytes and in a temporary file beyond.
pub fn unpack<R: Read>(
    source: R,
    format: PackageFormat,
    key: Option<&PrivateKeyMaterial>,
    sink: &mut dyn EntrySink,
) -> Result<Summary> {
    debug!(compression = %format.compression, encrypted = format.encrypted, "unpack pipeline assembled");
    let plain = open_plain(source, format, key)?;
    match format.compression {
        CompressionKind::Zip => drive_random_access(buffer_for_random_access(plain)?, sink),
        kind => drive_sequential(plain, kind, sink),
    }
}

/// Unpack a package from a seekable source such as a file. Unencrypted zip
/// packages are read in place instead of being buffered.
pub fn unpack_seekable<R: Read + Seek>(
    source: R,
    format: PackageFormat,
    key: Option<&PrivateKeyMaterial>,
    sink: &mut dyn EntrySink,
) -> Result<Summary> {
    if format.compression.is_random_access() {
        decryption_key(format, key)?;
        debug!("unpack pipeline assembled over seekable zip");
        return drive_random_access(source, sink);
    }
    unpack(source, format, key, sink)
}
