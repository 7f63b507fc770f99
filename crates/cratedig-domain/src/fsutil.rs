// SPDX-License-Identifier: GPL-3.0-or-later
//! Small filesystem helpers shared by the downloads service (C7) and the
//! worker (C10). Narrow on purpose: tagging, image fetching, and playlist
//! rendering are out-of-scope collaborators (spec §1, §6b); this module only
//! covers the bits both core components need directly.

use std::path::{Path, PathBuf};

/// Strips characters that are illegal (or awkward) in filenames on common
/// filesystems, then trims trailing dots and spaces Windows rejects.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    cleaned.trim_end_matches(['.', ' ']).trim().to_string()
}

/// Walks upward from `dir`, removing each directory that is empty, but
/// never ascends above `root` and never removes `root` itself (spec §4.7,
/// §8 `DeleteDownload` invariant).
pub fn delete_folder_if_empty(dir: &Path, root: &Path) -> std::io::Result<()> {
    let root = root
        .canonicalize()
        .unwrap_or_else(|_| root.to_path_buf());
    let mut current: PathBuf = dir
        .canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf());

    loop {
        if current == root || !current.starts_with(&root) {
            return Ok(());
        }
        if current.read_dir().map(|mut i| i.next().is_none()).unwrap_or(false) {
            std::fs::remove_dir(&current)?;
        } else {
            return Ok(());
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_illegal_characters_and_trailing_dots() {
        assert_eq!(sanitize(r#"AC/DC: "Back in Black"?"#), "ACDC Back in Black");
        assert_eq!(sanitize("trailing... "), "trailing");
    }

    #[test]
    fn delete_folder_if_empty_ascends_but_stops_at_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let nested = root.join("artist").join("album");
        std::fs::create_dir_all(&nested).unwrap();

        delete_folder_if_empty(&nested, &root).unwrap();

        assert!(!nested.exists());
        assert!(!root.join("artist").exists());
        assert!(root.exists());
    }

    #[test]
    fn delete_folder_if_empty_stops_when_a_sibling_file_remains() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();
        let artist = root.join("artist");
        let album = artist.join("album");
        std::fs::create_dir_all(&album).unwrap();
        std::fs::write(artist.join("keep.txt"), b"x").unwrap();

        delete_folder_if_empty(&album, &root).unwrap();

        assert!(!album.exists());
        assert!(artist.exists());
    }
}
