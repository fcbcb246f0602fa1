//! Streaming compression around the tar container.
//!
//! Only gzip can be written. bzip2 is read-only: packing into it is refused
//! when the layer is constructed, before any byte reaches the sink. Zip
//! compresses per entry inside its own container and never goes through
//! this layer.

use crate::error::{PackError, Result, Stage};
use crate::format::CompressionKind;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use tracing::debug;

/// Write side of the compression layer (gzip).
pub struct CompressionWriter<W: Write> {
    encoder: GzEncoder<W>,
}

impl<W: Write> CompressionWriter<W> {
    pub fn new(sink: W, kind: CompressionKind) -> Result<Self> {
        match kind {
            CompressionKind::TarGz => {
                debug!(%kind, "compression layer opened");
                Ok(Self {
                    encoder: GzEncoder::new(sink, Compression::default()),
                })
            }
            CompressionKind::TarBz2 => Err(PackError::unsupported_in(
                Stage::Compression,
                "bzip2 compression is read-only; pack with .tar.gz or .zip",
            )),
            CompressionKind::Zip => Err(PackError::unsupported_in(
                Stage::Compression,
                "zip packages carry their own compression",
            )),
        }
    }

    /// Write the gzip trailer and return the wrapped sink.
    pub fn finish(self) -> Result<W> {
        let sink = self
            .encoder
            .finish()
            .map_err(|e| PackError::io(Stage::Compression, e))?;
        debug!("compression layer closed");
        Ok(sink)
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.encoder.get_mut()
    }
}

impl<W: Write> Write for CompressionWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

/// Read side of the compression layer.
pub enum Decompressor<R: Read> {
    Gzip(GzDecoder<R>),
    Bzip2(BzDecoder<R>),
}

impl<R: Read> Decompressor<R> {
    pub fn new(source: R, kind: CompressionKind) -> Result<Self> {
        debug!(%kind, "decompression layer opened");
        match kind {
            CompressionKind::TarGz => Ok(Decompressor::Gzip(GzDecoder::new(source))),
            CompressionKind::TarBz2 => Ok(Decompressor::Bzip2(BzDecoder::new(source))),
            CompressionKind::Zip => Err(PackError::unsupported_in(
                Stage::Compression,
                "zip packages are decompressed per entry by the archive reader",
            )),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Decompressor::Gzip(_) => "gzip",
            Decompressor::Bzip2(_) => "bzip2",
        }
    }
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = match self {
            Decompressor::Gzip(decoder) => decoder.read(buf),
            Decompressor::Bzip2(decoder) => decoder.read(buf),
        };
        result.map_err(|e| io::Error::new(e.kind(), format!("{} stream: {}", self.name(), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_round_trip() {
        let mut writer = CompressionWriter::new(Vec::new(), CompressionKind::TarGz).unwrap();
        writer.write_all(b"hello hello hello hello").unwrap();
        let compressed = writer.finish().unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b], "gzip magic");

        let mut out = String::new();
        Decompressor::new(compressed.as_slice(), CompressionKind::TarGz)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "hello hello hello hello");
    }

    #[test]
    fn bzip2_cannot_be_written() {
        let err = CompressionWriter::new(Vec::new(), CompressionKind::TarBz2).err().unwrap();
        assert!(matches!(err, PackError::UnsupportedFormat { stage: Stage::Compression, .. }));
    }

    #[test]
    fn truncated_gzip_reports_stream() {
        let mut writer = CompressionWriter::new(Vec::new(), CompressionKind::TarGz).unwrap();
        writer.write_all(&[7u8; 4096]).unwrap();
        let compressed = writer.finish().unwrap();

        let mut out = Vec::new();
        let err = Decompressor::new(&compressed[..compressed.len() / 2], CompressionKind::TarGz)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap_err();
        assert!(err.to_string().starts_with("gzip stream"), "{err}");
    }
}
