use crate::error::{PackError, Result, Stage};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// A regular file found under the package root.
#[derive(Debug)]
pub struct WalkedFile {
    pub path: PathBuf,
    /// Path relative to the walk root.
    pub relative: PathBuf,
    pub metadata: fs::Metadata,
}

/// Depth-first walk of `root` in file name order, yielding regular files
/// only. Directories are skipped; symlinks and special files are errors.
pub fn regular_files(root: &Path) -> impl Iterator<Item = Result<WalkedFile>> + '_ {
    WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(PackError::from(e))),
            };
            let file_type = entry.file_type();
            if file_type.is_dir() {
                return None;
            }
            if !file_type.is_file() {
                return Some(Err(PackError::unsupported_in(
                    Stage::Archive,
                    format!("cannot pack non-regular file {}", entry.path().display()),
                )));
            }
            let relative = match entry.path().strip_prefix(root) {
                Ok(rel) => rel.to_path_buf(),
                Err(_) => {
                    return Some(Err(PackError::unsupported_in(
                        Stage::Archive,
                        format!("{} is outside {}", entry.path().display(), root.display()),
                    )))
                }
            };
            Some(
                entry
                    .metadata()
                    .map_err(PackError::from)
                    .map(|metadata| WalkedFile {
                        path: entry.path().to_path_buf(),
                        relative,
                        metadata,
                    }),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/inner")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("z.txt"), "z").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b/inner/c.txt"), "c").unwrap();

        let found: Vec<String> = regular_files(dir.path())
            .map(|f| f.unwrap().relative.to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(found, vec!["a.txt", "b/inner/c.txt", "z.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target"), "t").unwrap();
        std::os::unix::fs::symlink(dir.path().join("target"), dir.path().join("link")).unwrap();

        let results: Vec<_> = regular_files(dir.path()).collect();
        assert!(results.iter().any(|r| r.is_err()));
    }
}
