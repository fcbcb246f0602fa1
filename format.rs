//! Package format resolution from file name suffixes.
//!
//! A package name such as `data.tar.gz.gpg` carries its own recipe: the
//! trailing run of recognized suffixes decides the compression kind and
//! whether the payload is OpenPGP encrypted.
//!
//! ## Suffix vocabulary
//!
//! | Suffix            | Flag  |
//! |-------------------|-------|
//! | `gpg`             | gpg   |
//! | `tar`             | tar   |
//! | `bz2`, `bzip2`    | bz2   |
//! | `gz`, `gzip`      | gz    |
//! | `zip`             | zip   |
//!
//! Matching is case-sensitive. The scan stops at the first segment that is
//! not in the vocabulary, so dots inside the base name (`run.2024.tar.gz`)
//! are part of the base name and never an error.

use crate::error::{PackError, Result};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Normalized compressor/container pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    TarGz,
    TarBz2,
    Zip,
}

impl CompressionKind {
    /// Canonical suffix spelling, as accepted by `--comp`.
    pub fn canonical(&self) -> &'static str {
        match self {
            CompressionKind::TarGz => ".tar.gz",
            CompressionKind::TarBz2 => ".tar.bz2",
            CompressionKind::Zip => ".zip",
        }
    }

    /// Parse an explicit override. The leading dot is optional.
    pub fn parse_override(spelling: &str) -> Result<Self> {
        let trimmed = spelling.trim();
        let normalized = trimmed.strip_prefix('.').unwrap_or(trimmed);
        match normalized {
            "tar.gz" | "tar.gzip" => Ok(CompressionKind::TarGz),
            "tar.bz2" | "tar.bzip2" => Ok(CompressionKind::TarBz2),
            "zip" => Ok(CompressionKind::Zip),
            _ => Err(PackError::unsupported(format!(
                "unknown compression method '{}' (expected .tar.gz, .tar.gzip, .tar.bz2, .tar.bzip2 or .zip)",
                spelling
            ))),
        }
    }

    /// Whether this kind has a write-side implementation.
    pub fn can_pack(&self) -> bool {
        !matches!(self, CompressionKind::TarBz2)
    }

    /// Random-access containers keep their index at the end of the data.
    pub fn is_random_access(&self) -> bool {
        matches!(self, CompressionKind::Zip)
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical())
    }
}

/// Resolved recipe for one pack or unpack invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageFormat {
    pub compression: CompressionKind,
    pub encrypted: bool,
}

impl PackageFormat {
    /// Conventional file name suffix for this format, e.g. `.tar.gz.gpg`.
    pub fn suffix(&self) -> String {
        if self.encrypted {
            format!("{}.gpg", self.compression.canonical())
        } else {
            self.compression.canonical().to_string()
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct SuffixSet {
    gpg: bool,
    tar: bool,
    bz2: bool,
    gz: bool,
    zip: bool,
}

impl SuffixSet {
    /// Record a segment; returns false when it is outside the vocabulary.
    fn record(&mut self, segment: &str) -> bool {
        match segment {
            "gpg" => self.gpg = true,
            "tar" => self.tar = true,
            "bz2" | "bzip2" => self.bz2 = true,
            "gz" | "gzip" => self.gz = true,
            "zip" => self.zip = true,
            _ => return false,
        }
        true
    }

    fn compression(&self) -> Result<CompressionKind> {
        let compressors = [self.gz, self.bz2, self.zip].iter().filter(|f| **f).count();
        if compressors > 1 {
            return Err(PackError::unsupported("incompatible compression extensions"));
        }
        if (self.gz || self.bz2) && !self.tar {
            return Err(PackError::unsupported("cannot use gz/bz2 without tar"));
        }
        match (self.tar, self.gz, self.bz2, self.zip) {
            (true, true, _, _) => Ok(CompressionKind::TarGz),
            (true, _, true, _) => Ok(CompressionKind::TarBz2),
            (_, _, _, true) => Ok(CompressionKind::Zip),
            _ => Err(PackError::unsupported("no compression extension found")),
        }
    }
}

/// Scan the trailing run of recognized suffixes, right to left.
fn scan_suffixes(name: &str) -> SuffixSet {
    let mut set = SuffixSet::default();
    let mut end = name.len();
    while let Some(dot) = name[..end].rfind('.') {
        if !set.record(&name[dot + 1..end]) {
            break;
        }
        end = dot;
    }
    set
}

/// Resolve the package format of `path` against an optional explicit
/// compression override, enforcing the key policy.
///
/// `key_given` reports whether key material was supplied. A `gpg` suffix
/// without a key, or a key without a `gpg` suffix, is a [`PackError::KeyPolicy`].
pub fn resolve(path: &Path, compression_override: Option<&str>, key_given: bool) -> Result<PackageFormat> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| PackError::unsupported(format!("package path has no file name: {}", path.display())))?;

    let suffixes = scan_suffixes(&name);
    let compression = suffixes.compression()?;

    if let Some(spelling) = compression_override {
        let requested = CompressionKind::parse_override(spelling)?;
        if requested != compression {
            return Err(PackError::conflict(format!(
                "file extensions of '{}' ({}) conflict with requested compression {}",
                name, compression, spelling
            )));
        }
    }

    if suffixes.gpg && !key_given {
        return Err(PackError::key_policy("no key given for encrypted package"));
    }
    if !suffixes.gpg && key_given {
        return Err(PackError::key_policy("key given but package not marked encrypted"));
    }

    let format = PackageFormat {
        compression,
        encrypted: suffixes.gpg,
    };
    debug!(name = %name, compression = %format.compression, encrypted = format.encrypted, "resolved package format");
    Ok(format)
}

/// Resolve the format for a package written to a stream with no file name.
/// The compression comes from the override (default `.tar.gz`) and the
/// package is encrypted exactly when a key is given.
pub fn resolve_unnamed(compression_override: Option<&str>, key_given: bool) -> Result<PackageFormat> {
    let compression = match compression_override {
        Some(spelling) => CompressionKind::parse_override(spelling)?,
        None => CompressionKind::TarGz,
    };
    Ok(PackageFormat {
        compression,
        encrypted: key_given,
    })
}
