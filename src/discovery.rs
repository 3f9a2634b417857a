//! Finding image sequences below a root directory.
//!
//! [`find_image_directories`] lets one invocation render several sequences
//! (one output per directory). Hidden directories are not descended into.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::error::RenderError;

/// Every directory at or below `root` that directly contains at least one
/// non-hidden file with one of `extensions` (case-insensitive), sorted.
///
/// # Errors
///
/// Returns [`RenderError::InputDirectory`] if `root` cannot be read.
/// Unreadable subdirectories are skipped with a warning.
pub fn find_image_directories<P, S>(root: P, extensions: &[S]) -> Result<Vec<PathBuf>, RenderError>
where
    P: AsRef<Path>,
    S: AsRef<str>,
{
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(RenderError::InputDirectory {
            path: root.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }

    let wanted: Vec<String> = extensions
        .iter()
        .map(|extension| extension.as_ref().trim_start_matches('.').to_ascii_lowercase())
        .collect();

    let mut directories = BTreeSet::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(error) if error.depth() == 0 => {
                return Err(RenderError::InputDirectory {
                    path: root.to_path_buf(),
                    reason: error.to_string(),
                });
            }
            Err(error) => {
                log::warn!("Skipping unreadable entry: {error}");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let matches = entry
            .path()
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|extension| wanted.contains(&extension.to_ascii_lowercase()));
        if matches {
            if let Some(parent) = entry.path().parent() {
                directories.insert(parent.to_path_buf());
            }
        }
    }

    log::debug!("Found {} image directories under {:?}", directories.len(), root);
    Ok(directories.into_iter().collect())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use std::fs::{self, File};

    use super::*;
    use crate::sequence::DEFAULT_EXTENSIONS;

    #[test]
    fn finds_nested_sequences_and_skips_hidden_ones() {
        let root = tempfile::tempdir().unwrap();
        let day1 = root.path().join("day1");
        let day2 = root.path().join("trip").join("day2");
        let hidden = root.path().join(".cache");
        let empty = root.path().join("notes");
        for dir in [&day1, &day2, &hidden, &empty] {
            fs::create_dir_all(dir).unwrap();
        }
        File::create(day1.join("img_0001.JPG")).unwrap();
        File::create(day2.join("0001.png")).unwrap();
        File::create(hidden.join("0001.png")).unwrap();
        File::create(empty.join("readme.txt")).unwrap();
        File::create(root.path().join(".hidden.jpg")).unwrap();

        let found = find_image_directories(root.path(), &DEFAULT_EXTENSIONS).unwrap();
        assert_eq!(found, vec![day1, day2]);
    }

    #[test]
    fn missing_root_is_an_input_error() {
        let root = tempfile::tempdir().unwrap();
        let error = find_image_directories(root.path().join("missing"), &["jpg"]).unwrap_err();
        assert!(matches!(error, RenderError::InputDirectory { .. }));
    }
}
