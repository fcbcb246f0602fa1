use std::fmt;
use thiserror::Error;

/// Pipeline stage an I/O failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolution,
    Archive,
    Compression,
    Encryption,
    Metadata,
    Io,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolution => "resolution",
            Stage::Archive => "archive",
            Stage::Compression => "compression",
            Stage::Encryption => "encryption",
            Stage::Metadata => "metadata",
            Stage::Io => "io",
        };
        f.write_str(name)
    }
}

/// Error types for packing and unpacking operations
#[derive(Debug, Error)]
pub enum PackError {
    /// An explicit compression override contradicts the file name suffixes
    #[error("resolution: format conflict: {0}")]
    FormatConflict(String),

    /// Unrecognized suffix chain, unsupported write format, or an archive
    /// feature the reader cannot represent
    #[error("{stage}: unsupported format: {message}")]
    UnsupportedFormat { stage: Stage, message: String },

    /// Encryption flag and key material presence disagree, or the key ring
    /// cannot be used as given
    #[error("resolution: key policy: {0}")]
    KeyPolicy(String),

    /// Key ring parsing, passphrase or message decryption failures
    #[error("encryption: {0}")]
    Crypto(String),

    /// Manifest missing or out of date with the data directory
    #[error("metadata: {0}")]
    Metadata(String),

    /// Failure from an underlying byte sink or source
    #[error("{stage}: {source}")]
    Io {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, PackError>;

impl PackError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::FormatConflict(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            stage: Stage::Resolution,
            message: msg.into(),
        }
    }

    pub fn unsupported_in(stage: Stage, msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            stage,
            message: msg.into(),
        }
    }

    pub fn key_policy(msg: impl Into<String>) -> Self {
        Self::KeyPolicy(msg.into())
    }

    pub fn crypto(msg: impl Into<String>) -> Self {
        Self::Crypto(msg.into())
    }

    pub fn metadata(msg: impl Into<String>) -> Self {
        Self::Metadata(msg.into())
    }

    pub fn io(stage: Stage, source: std::io::Error) -> Self {
        Self::Io { stage, source }
    }

    /// Stage the error surfaced in, for user-facing reporting.
    pub fn stage(&self) -> Stage {
        match self {
            Self::FormatConflict(_) | Self::KeyPolicy(_) => Stage::Resolution,
            Self::UnsupportedFormat { stage, .. } | Self::Io { stage, .. } => *stage,
            Self::Crypto(_) => Stage::Encryption,
            Self::Metadata(_) => Stage::Metadata,
        }
    }
}

impl From<std::io::Error> for PackError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            stage: Stage::Io,
            source: err,
        }
    }
}

impl From<walkdir::Error> for PackError {
    fn from(err: walkdir::Error) -> Self {
        Self::Io {
            stage: Stage::Io,
            source: err.into(),
        }
    }
}
