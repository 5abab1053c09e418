//! Lists `.jsonl` event fixtures under a directory, for tests that iterate
//! over every recorded session in a fixtures folder.

use std::io;
use std::path::{Path, PathBuf};

/// Returns the sorted paths of every `.jsonl` file directly under `dir`.
/// An absent directory yields an empty list rather than an error, so a repo
/// with no fixtures checked in yet doesn't fail the test run.
pub fn list_fixtures(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("jsonl"))
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_directory_yields_empty_list() {
        let fixtures = list_fixtures("/nonexistent/fixtures/dir").unwrap();
        assert!(fixtures.is_empty());
    }

    #[test]
    fn lists_only_jsonl_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("a.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let fixtures = list_fixtures(dir.path()).unwrap();
        let names: Vec<_> = fixtures
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.jsonl", "b.jsonl"]);
    }
}
