//! # datapack - Directory Packaging Library
//!
//! datapack turns a directory tree into a single package file and back. The
//! package format is chosen from the file name suffix chain:
//!
//! - **`.tar.gz`**: tar container (GNU long names), gzip compressed
//! - **`.tar.bz2`**: tar container, bzip2 compressed (read only)
//! - **`.zip`**: zip container with per-entry deflate and modification times
//! - **`.gpg`**: OpenPGP encryption on top of any sequential format
//!
//! ## Quick Start
//!
//! ```no_run
//! use datapack::{format, key_manager::PublicKeyMaterial, pipeline::Packer};
//! use std::fs::File;
//! use std::path::Path;
//!
//! fn main() -> Result<(), datapack::PackError> {
//!     let out = Path::new("backup.tar.gz.gpg");
//!     let key = PublicKeyMaterial::load(Path::new("recipient.asc"))?;
//!     let format = format::resolve(out, None, true)?;
//!
//!     let mut packer = Packer::new(File::create(out)?, format, Some(&key))?;
//!     packer.pack_dir(Path::new("./data"))?;
//!     let (_file, summary) = packer.finish()?;
//!     println!("{} files", summary.entries);
//!     Ok(())
//! }
//! ```
//!
//! ## Layering
//!
//! Archive over compression over encryption over the caller's sink. Every
//! layer is finished before the one beneath it; see [`pipeline`].

pub mod archive;
pub mod compression;
pub mod config;
pub mod encryption;
pub mod error;
pub mod extract;
pub mod format;
pub mod key_manager;
pub mod metadata;
pub mod pipeline;
pub mod walk;

// Re-export common types for convenience
pub use error::PackError;
pub use format::{CompressionKind, PackageFormat};
