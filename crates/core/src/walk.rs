//! Local enumeration for bulk transfers
//!
//! Expands the files and directories named by a transfer request into leaf
//! entries. Empty directories count: they become zero-size sentinel entries
//! so directory structure survives a round trip through object storage.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::path::ObjectPath;

/// One enumerated transfer source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedEntry {
    pub source: PathBuf,
    pub size: u64,
    /// Zero-size sentinel standing in for an empty directory
    pub is_empty_dir: bool,
}

/// Walk all named files and directories into leaf entries.
///
/// Files that vanish mid-walk (broken symlinks, concurrent deletes) are
/// skipped with a warning; a nonexistent top-level argument is an error.
pub fn walk_files_and_dirs(paths: &[PathBuf]) -> Result<Vec<WalkedEntry>> {
    let mut entries = Vec::new();
    for path in paths {
        if path.is_file() {
            match fs::metadata(path) {
                Ok(meta) => entries.push(WalkedEntry {
                    source: path.clone(),
                    size: meta.len(),
                    is_empty_dir: false,
                }),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!(path = %path.display(), "skipping vanished file");
                }
                Err(e) => return Err(e.into()),
            }
        } else if path.is_dir() {
            walk_dir(path, &mut entries)?;
        } else {
            return Err(Error::InvalidArgument(format!(
                "file not found: {}",
                path.display()
            )));
        }
    }
    Ok(entries)
}

fn walk_dir(dir: &Path, entries: &mut Vec<WalkedEntry>) -> Result<()> {
    let mut files = Vec::new();
    let mut dirs = Vec::new();

    let mut children: Vec<PathBuf> =
        fs::read_dir(dir)?.map(|e| e.map(|e| e.path())).collect::<std::io::Result<_>>()?;
    children.sort();

    for child in children {
        match fs::metadata(&child) {
            Ok(meta) if meta.is_dir() => dirs.push(child),
            Ok(meta) => files.push((child, meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %child.display(), "skipping vanished file");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let is_empty = files.is_empty() && dirs.is_empty();
    for (source, size) in files {
        entries.push(WalkedEntry {
            source,
            size,
            is_empty_dir: false,
        });
    }
    for sub in &dirs {
        walk_dir(sub, entries)?;
    }
    if is_empty {
        entries.push(WalkedEntry {
            source: dir.to_path_buf(),
            size: 0,
            is_empty_dir: true,
        });
    }
    Ok(())
}

/// Construct an object name from a file path.
///
/// Relative and absolute directory markers at the front are stripped after
/// normalization, and backslashes become forward slashes:
///
/// ```text
/// ../../my_file     -> my_file
/// ./my_dir          -> my_dir
/// .hidden_dir/file  -> .hidden_dir/file
/// /absolute_dir     -> absolute_dir
/// ```
pub fn file_name_to_object_name(path: &Path) -> String {
    let text = path.to_string_lossy().replace('\\', "/");
    let normalized = ObjectPath::from_local(&text).normalize();
    let name: Vec<&str> = normalized
        .as_str()
        .split('/')
        .skip_while(|part| matches!(*part, "" | "." | ".."))
        .collect();
    name.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_object_name_strips_leading_markers() {
        assert_eq!(file_name_to_object_name(Path::new("../../my_file")), "my_file");
        assert_eq!(file_name_to_object_name(Path::new("./my_dir")), "my_dir");
        assert_eq!(
            file_name_to_object_name(Path::new(".hidden_dir/file")),
            ".hidden_dir/file"
        );
        assert_eq!(file_name_to_object_name(Path::new("/absolute_dir")), "absolute_dir");
        assert_eq!(file_name_to_object_name(Path::new("a/../b")), "b");
        assert_eq!(file_name_to_object_name(Path::new("/")), "");
    }

    #[test]
    fn test_walk_files_and_empty_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        let mut f = File::create(root.join("a.txt")).unwrap();
        f.write_all(b"hello").unwrap();
        fs::create_dir(root.join("b")).unwrap();
        File::create(root.join("b").join("c.txt")).unwrap();
        fs::create_dir(root.join("d")).unwrap(); // empty

        let entries = walk_files_and_dirs(&[root.to_path_buf()]).unwrap();
        assert_eq!(entries.len(), 3);

        let a = entries.iter().find(|e| e.source.ends_with("a.txt")).unwrap();
        assert_eq!(a.size, 5);
        assert!(!a.is_empty_dir);

        assert!(entries.iter().any(|e| e.source.ends_with("b/c.txt")));

        let d = entries.iter().find(|e| e.source.ends_with("d")).unwrap();
        assert!(d.is_empty_dir);
        assert_eq!(d.size, 0);
    }

    #[test]
    fn test_walk_nested_empty_dir_is_a_leaf() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();

        // outer has a subdir but no files; only the innermost empty dir is a leaf
        fs::create_dir_all(root.join("outer").join("inner")).unwrap();

        let entries = walk_files_and_dirs(&[root.to_path_buf()]).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].source.ends_with("outer/inner"));
        assert!(entries[0].is_empty_dir);
    }

    #[test]
    fn test_walk_single_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("only.txt");
        File::create(&file).unwrap().write_all(b"xyz").unwrap();

        let entries = walk_files_and_dirs(&[file.clone()]).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, file);
        assert_eq!(entries[0].size, 3);
    }

    #[test]
    fn test_walk_missing_argument_is_invalid() {
        let result = walk_files_and_dirs(&[PathBuf::from("/no/such/path/anywhere")]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
