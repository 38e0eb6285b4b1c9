//! Assembling logical backup sets from the safe-backup tree.

use std::{
    collections::BTreeMap,
    fmt, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::error::BackupError;

use super::naming::{classify, explicit_index, FileRole};

/// One logical backup: a `.save` archive or a complete legacy triplet.
///
/// Field names serialise the way the web client expects them
/// (`Index`, `BinFile`, `XMLFile`, `MetaFile`, `ModTime`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BackupGroup {
    /// Ordering key; higher is newer.
    pub index: u64,
    /// `.save` archive or legacy `.bin` file.
    pub bin_file: Option<PathBuf>,
    /// Legacy `world(N).xml`.
    #[serde(rename = "XMLFile")]
    pub xml_file: Option<PathBuf>,
    /// Legacy `world_meta(N).xml`.
    pub meta_file: Option<PathBuf>,
    /// Latest modification time among the member files.
    pub mod_time: DateTime<Utc>,
}

/// Layout generation of a [`BackupGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupKind {
    /// Single `.save` archive.
    Dotsave,
    /// Legacy binary + world XML + meta XML.
    PreterrainTrio,
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupKind::Dotsave => f.write_str("Dotsave"),
            BackupKind::PreterrainTrio => f.write_str("preterrain-trio"),
        }
    }
}

impl BackupGroup {
    /// Layout generation, derived from which slots are populated.
    pub fn kind(&self) -> BackupKind {
        if self.xml_file.is_some() && self.meta_file.is_some() {
            BackupKind::PreterrainTrio
        } else {
            BackupKind::Dotsave
        }
    }

    /// Every file belonging to this backup.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        [&self.bin_file, &self.xml_file, &self.meta_file]
            .into_iter()
            .filter_map(|slot| slot.as_deref())
    }
}

#[derive(Debug)]
struct Candidate {
    path: PathBuf,
    role: FileRole,
    modified: SystemTime,
    index: Option<u64>,
}

#[derive(Debug, Default)]
struct PartialTrio {
    bin_file: Option<PathBuf>,
    xml_file: Option<PathBuf>,
    meta_file: Option<PathBuf>,
    modified: Option<SystemTime>,
}

impl PartialTrio {
    fn insert(&mut self, candidate: Candidate) {
        self.modified = self.modified.max(Some(candidate.modified));
        match candidate.role {
            FileRole::Binary => self.bin_file = Some(candidate.path),
            FileRole::WorldXml => self.xml_file = Some(candidate.path),
            FileRole::MetaXml => self.meta_file = Some(candidate.path),
            FileRole::Save => {}
        }
    }

    fn complete(self, index: u64) -> Option<BackupGroup> {
        match (self.bin_file, self.xml_file, self.meta_file, self.modified) {
            (Some(bin), Some(xml), Some(meta), Some(modified)) => Some(BackupGroup {
                index,
                bin_file: Some(bin),
                xml_file: Some(xml),
                meta_file: Some(meta),
                mod_time: DateTime::<Utc>::from(modified),
            }),
            _ => None,
        }
    }
}

/// Walk `root` and assemble every qualifying backup set.
///
/// `.save` files always form a group of their own. Legacy files are merged by
/// group index and only complete triplets are returned. Files without an
/// explicit `(N)` index receive a synthetic one: their 1-based rank by
/// modification time among the unindexed files, ties broken by walk order.
/// Synthetic indices may collide with explicit ones; this is a heuristic.
pub fn scan_groups(root: &Path) -> Result<Vec<BackupGroup>, BackupError> {
    let mut candidates = collect_candidates(root)?;
    assign_synthetic_indices(&mut candidates);

    let mut groups = Vec::new();
    let mut trios: BTreeMap<u64, PartialTrio> = BTreeMap::new();

    for candidate in candidates {
        let Some(index) = candidate.index else {
            continue;
        };
        if candidate.role == FileRole::Save {
            groups.push(BackupGroup {
                index,
                bin_file: Some(candidate.path),
                xml_file: None,
                meta_file: None,
                mod_time: DateTime::<Utc>::from(candidate.modified),
            });
        } else {
            trios.entry(index).or_default().insert(candidate);
        }
    }

    groups.extend(
        trios
            .into_iter()
            .filter_map(|(index, trio)| trio.complete(index)),
    );
    Ok(groups)
}

fn collect_candidates(root: &Path) -> Result<Vec<Candidate>, BackupError> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|err| classify_walk_error(root, err))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(role) = classify(&name) else {
            continue;
        };

        let modified = match entry
            .metadata()
            .map_err(io::Error::from)
            .and_then(|meta| meta.modified())
        {
            Ok(modified) => modified,
            Err(err) => {
                debug!(
                    path = %entry.path().display(),
                    error = %err,
                    "Skipping unreadable backup file"
                );
                continue;
            }
        };

        candidates.push(Candidate {
            index: explicit_index(&name),
            path: entry.into_path(),
            role,
            modified,
        });
    }
    Ok(candidates)
}

fn assign_synthetic_indices(candidates: &mut [Candidate]) {
    let mut unindexed: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.index.is_none())
        .map(|(position, _)| position)
        .collect();

    // Stable sort keeps walk order for equal timestamps.
    unindexed.sort_by_key(|&position| candidates[position].modified);

    for (rank, position) in unindexed.into_iter().enumerate() {
        candidates[position].index = Some(rank as u64 + 1);
    }
}

fn classify_walk_error(root: &Path, err: walkdir::Error) -> BackupError {
    let missing = err.depth() == 0
        && err
            .io_error()
            .map(|io_err| io_err.kind() == io::ErrorKind::NotFound)
            .unwrap_or(false);
    if missing {
        BackupError::SaveDirNotReady {
            path: root.to_path_buf(),
        }
    } else {
        BackupError::Scan {
            path: root.to_path_buf(),
            source: err,
        }
    }
}
