//! Package metadata collaborators.
//!
//! A [`MetadataHook`] runs against the data directory before packing and
//! after unpacking. [`ManifestHook`] keeps a `manifest.json` listing every
//! file and its size; [`NoMetadata`] accepts any directory.

use crate::error::{PackError, Result, Stage};
use crate::walk;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MANIFEST_NAME: &str = "manifest.json";

/// Directory the hook operates on.
#[derive(Debug, Clone)]
pub struct PackageContext {
    pub data_dir: PathBuf,
    /// Check existing metadata without creating any.
    pub verify_only: bool,
}

impl PackageContext {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            verify_only: false,
        }
    }

    pub fn verify_only(mut self, verify_only: bool) -> Self {
        self.verify_only = verify_only;
        self
    }
}

pub trait MetadataHook {
    fn create_or_verify(&self, ctx: &PackageContext) -> Result<()>;
}

/// Accepts every directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMetadata;

impl MetadataHook for NoMetadata {
    fn create_or_verify(&self, _ctx: &PackageContext) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestFile>,
}

impl Manifest {
    /// Describe the regular files under `dir`, excluding the manifest itself.
    pub fn scan(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for file in walk::regular_files(dir) {
            let file = file?;
            let path = file
                .relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if path == MANIFEST_NAME {
                continue;
            }
            files.push(ManifestFile {
                path,
                size: file.metadata.len(),
            });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Self { files })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read(path).map_err(|e| PackError::io(Stage::Metadata, e))?;
        serde_json::from_slice(&raw)
            .map_err(|e| PackError::metadata(format!("parsing {}: {}", path.display(), e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| PackError::metadata(format!("serializing manifest: {}", e)))?;
        fs::write(path, json).map_err(|e| PackError::io(Stage::Metadata, e))
    }

    /// Describe how `actual` departs from this manifest, if it does.
    pub fn diff(&self, actual: &Manifest) -> Option<String> {
        let mut problems = Vec::new();
        for expected in &self.files {
            match actual.files.iter().find(|f| f.path == expected.path) {
                None => problems.push(format!("missing {}", expected.path)),
                Some(found) if found.size != expected.size => problems.push(format!(
                    "{} is {} bytes, expected {}",
                    expected.path, found.size, expected.size
                )),
                Some(_) => {}
            }
        }
        for found in &actual.files {
            if !self.files.iter().any(|f| f.path == found.path) {
                problems.push(format!("unexpected {}", found.path));
            }
        }
        if problems.is_empty() {
            None
        } else {
            Some(problems.join(", "))
        }
    }
}

/// Maintains `manifest.json` in the data directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestHook;

impl MetadataHook for ManifestHook {
    fn create_or_verify(&self, ctx: &PackageContext) -> Result<()> {
        let manifest_path = ctx.data_dir.join(MANIFEST_NAME);
        let actual = Manifest::scan(&ctx.data_dir)?;

        if manifest_path.exists() {
            let expected = Manifest::load(&manifest_path)?;
            if let Some(problems) = expected.diff(&actual) {
                return Err(PackError::metadata(format!(
                    "{} does not match {}: {}",
                    MANIFEST_NAME,
                    ctx.data_dir.display(),
                    problems
                )));
            }
            info!(files = actual.files.len(), "manifest verified");
            return Ok(());
        }

        if ctx.verify_only {
            return Err(PackError::metadata(format!(
                "no {} in {}",
                MANIFEST_NAME,
                ctx.data_dir.display()
            )));
        }
        actual.save(&manifest_path)?;
        debug!(path = %manifest_path.display(), files = actual.files.len(), "manifest written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("one.txt"), "1").unwrap();
        fs::write(dir.path().join("sub/two.txt"), "22").unwrap();
        dir
    }

    #[test]
    fn creates_then_verifies() {
        let dir = data_dir();
        let ctx = PackageContext::new(dir.path());
        ManifestHook.create_or_verify(&ctx).unwrap();

        let manifest = Manifest::load(&dir.path().join(MANIFEST_NAME)).unwrap();
        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["one.txt", "sub/two.txt"]);

        ManifestHook
            .create_or_verify(&ctx.verify_only(true))
            .unwrap();
    }

    #[test]
    fn detects_changes() {
        let dir = data_dir();
        let ctx = PackageContext::new(dir.path());
        ManifestHook.create_or_verify(&ctx).unwrap();

        fs::write(dir.path().join("sub/two.txt"), "longer now").unwrap();
        fs::write(dir.path().join("extra.txt"), "x").unwrap();
        let err = ManifestHook.create_or_verify(&ctx).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("sub/two.txt is 10 bytes"), "{msg}");
        assert!(msg.contains("unexpected extra.txt"), "{msg}");
    }

    #[test]
    fn verify_only_requires_manifest() {
        let dir = data_dir();
        let ctx = PackageContext::new(dir.path()).verify_only(true);
        assert!(matches!(
            ManifestHook.create_or_verify(&ctx),
            Err(PackError::Metadata(_))
        ));
        assert!(!dir.path().join(MANIFEST_NAME).exists());
    }

    #[test]
    fn no_metadata_accepts_anything() {
        let ctx = PackageContext::new("/nonexistent").verify_only(true);
        NoMetadata.create_or_verify(&ctx).unwrap();
    }
}
