use crate::archive::EntryReader;
use crate::error::{PackError, Result, Stage};
use crate::pipeline::EntrySink;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Writes unpacked entries under a root directory, creating parent
/// directories as needed. Existing files are never overwritten.
#[derive(Debug)]
pub struct DirectoryExtractor {
    root: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectoryExtractor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files created so far, in archive order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn target(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(PackError::unsupported_in(
                Stage::Archive,
                format!("refusing to extract {:?} outside {}", name, self.root.display()),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl EntrySink for DirectoryExtractor {
    fn entry(&mut self, entry: &mut EntryReader<'_>) -> Result<()> {
        let target = self.target(&entry.entry().name)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| PackError::io(Stage::Io, e))?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(entry.entry().mode);
        }
        let mut file = options.open(&target).map_err(|e| {
            PackError::io(
                Stage::Io,
                io::Error::new(e.kind(), format!("creating {}: {}", target.display(), e)),
            )
        })?;
        io::copy(entry, &mut file).map_err(|e| PackError::io(Stage::Archive, e))?;

        // umask may have narrowed the mode given at creation
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(entry.entry().mode))
                .map_err(|e| PackError::io(Stage::Io, e))?;
        }

        debug!(path = %target.display(), "extracted");
        self.written.push(target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveEntry, ArchiveReader, ArchiveWriter, TarArchiveReader, TarArchiveWriter};
    use std::io::Write;

    fn tar_with(files: &[(&str, u32, &[u8])]) -> Vec<u8> {
        let mut writer = TarArchiveWriter::new(Vec::new());
        for (name, mode, body) in files {
            writer
                .begin_entry(&ArchiveEntry::new(name, *mode, body.len() as u64).unwrap())
                .unwrap();
            writer.write_all(body).unwrap();
        }
        writer.finish().unwrap()
    }

    fn extract(bytes: &[u8], extractor: &mut DirectoryExtractor) -> Result<()> {
        let mut archive = tar::Archive::new(bytes);
        let mut reader = TarArchiveReader::new(&mut archive)?;
        while let Some(mut entry) = reader.next_entry()? {
            extractor.entry(&mut entry)?;
        }
        Ok(())
    }

    #[test]
    fn extracts_nested_files_with_mode() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = tar_with(&[("a/b/c.sh", 0o750, b"#!/bin/sh\n")]);
        let mut extractor = DirectoryExtractor::new(dir.path());
        extract(&bytes, &mut extractor).unwrap();

        let path = dir.path().join("a/b/c.sh");
        assert_eq!(fs::read(&path).unwrap(), b"#!/bin/sh\n");
        assert_eq!(extractor.written(), &[path.clone()]);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o750);
        }
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("keep.txt"), "original").unwrap();
        let bytes = tar_with(&[("keep.txt", 0o644, b"replacement")]);

        let err = extract(&bytes, &mut DirectoryExtractor::new(dir.path())).unwrap_err();
        assert!(matches!(err, PackError::Io { .. }), "got {err:?}");
        assert_eq!(fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "original");
    }
}
