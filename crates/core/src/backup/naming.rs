//! File naming conventions used by Stationeers autosaves.
//!
//! Two generations of save layout exist:
//!
//! * the current one writes a single `*.save` archive per backup;
//! * the legacy ("pre-terrain") one writes a triplet sharing an index,
//!   e.g. `world(12).bin`, `world(12).xml` and `world_meta(12).xml`.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

static BACKUP_FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\.save|\.bin|world(?:_meta)?\(\d+\)\.xml)$").expect("invalid backup regex")
});

static INDEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d+)\)").expect("invalid index regex"));

/// Role of a single file within a backup set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    /// Self-contained `.save` archive.
    Save,
    /// Legacy binary world data.
    Binary,
    /// Legacy `world(N).xml`.
    WorldXml,
    /// Legacy `world_meta(N).xml`.
    MetaXml,
}

/// Whether `file_name` looks like something the game writes as a backup.
pub fn is_backup_file(file_name: &str) -> bool {
    BACKUP_FILE_RE.is_match(file_name)
}

/// Same as [`is_backup_file`] for a full path.
pub fn is_backup_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(is_backup_file)
        .unwrap_or(false)
}

/// Classify a file name, returning `None` for files that are not part of a backup.
pub fn classify(file_name: &str) -> Option<FileRole> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".save") {
        return Some(FileRole::Save);
    }
    if lower.ends_with(".bin") {
        return Some(FileRole::Binary);
    }
    if !lower.ends_with(".xml") {
        return None;
    }
    if lower.contains("world_meta(") {
        Some(FileRole::MetaXml)
    } else if lower.contains("world(") {
        Some(FileRole::WorldXml)
    } else {
        None
    }
}

/// Explicit group index embedded in the file name as `(N)`.
///
/// The last parenthesised number wins so that world names containing
/// numbers in brackets do not shadow the real index.
pub fn explicit_index(file_name: &str) -> Option<u64> {
    INDEX_RE
        .captures_iter(file_name)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_backup_names() {
        for name in [
            "autosave.save",
            "Mars(3).save",
            "world(12).bin",
            "world(12).xml",
            "world_meta(12).xml",
        ] {
            assert!(is_backup_file(name), "{name} should be a backup");
        }
        for name in ["world.xml", "notes.txt", "world(12).xml.tmp", "settings.xml", "save"] {
            assert!(!is_backup_file(name), "{name} should be ignored");
        }
    }

    #[test]
    fn classifies_roles() {
        assert_eq!(classify("a.save"), Some(FileRole::Save));
        assert_eq!(classify("world(1).bin"), Some(FileRole::Binary));
        assert_eq!(classify("world(1).xml"), Some(FileRole::WorldXml));
        assert_eq!(classify("world_meta(1).xml"), Some(FileRole::MetaXml));
        assert_eq!(classify("readme.xml"), None);
        assert_eq!(classify("readme.md"), None);
    }

    #[test]
    fn extracts_last_index() {
        assert_eq!(explicit_index("world(7).bin"), Some(7));
        assert_eq!(explicit_index("Base(2)_world_meta(41).xml"), Some(41));
        assert_eq!(explicit_index("autosave.save"), None);
    }
}
