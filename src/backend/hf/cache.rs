//! Hugging Face managed cache index.
//!
//! Cache structure:
//! ```text
//! {cache_dir}/
//! ├── models--BAAI--bge-small-en-v1.5/
//! │   ├── blobs/
//! │   │   └── {sha}
//! │   ├── refs/
//! │   │   └── main            (contains a commit hash)
//! │   └── snapshots/
//! │       └── {commit_hash}/
//! │           └── config.json -> ../../blobs/{sha}
//! └── .locks/
//! ```

use crate::error::Result;
use crate::model::scanner::{accessed_timestamp, modified_timestamp};
use crate::model::ModelInfo;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const REPO_PREFIX: &str = "models--";
const REPO_ID_SEPARATOR: &str = "--";

#[derive(Debug, Clone)]
pub struct CachedFile {
    pub blob_path: PathBuf,
    pub size_on_disk: u64,
}

#[derive(Debug, Clone)]
pub struct CachedRevision {
    pub commit_hash: String,
    pub snapshot_path: PathBuf,
    pub refs: Vec<String>,
    pub files: Vec<CachedFile>,
}

#[derive(Debug, Clone)]
pub struct CachedRepo {
    pub repo_id: String,
    pub repo_path: PathBuf,
    pub size_on_disk: u64,
    pub nb_files: u64,
    pub last_accessed: f64,
    pub last_modified: f64,
    pub revisions: Vec<CachedRevision>,
}

impl CachedRepo {
    pub fn to_model_info(&self) -> ModelInfo {
        ModelInfo {
            id: self.repo_id.clone(),
            path: self.repo_path.clone(),
            size_on_disk: self.size_on_disk,
            num_files: self.nb_files,
            last_accessed_timestamp: self.last_accessed,
            last_modified_timestamp: self.last_modified,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheInfo {
    pub cache_dir: PathBuf,
    pub repos: Vec<CachedRepo>,
}

/// Paths removed when a set of revisions is deleted.
#[derive(Debug, Default)]
pub struct DeleteStrategy {
    pub blobs: BTreeSet<PathBuf>,
    pub refs: BTreeSet<PathBuf>,
    pub repos: BTreeSet<PathBuf>,
    pub snapshots: BTreeSet<PathBuf>,
    pub expected_freed_size: u64,
}

/// `BAAI/bge-small` -> `models--BAAI--bge-small`
pub fn repo_folder_name(repo_id: &str) -> String {
    format!("{}{}", REPO_PREFIX, repo_id.replace('/', REPO_ID_SEPARATOR))
}

fn repo_id_from_folder(folder: &str) -> Option<String> {
    folder
        .strip_prefix(REPO_PREFIX)
        .filter(|rest| !rest.is_empty())
        .map(|rest| rest.replace(REPO_ID_SEPARATOR, "/"))
}

/// Scans every model repository in a Hugging Face cache.
///
/// Repositories with a broken layout are skipped with a warning; I/O errors
/// while reading a valid one propagate.
pub fn scan_cache_dir(cache_dir: &Path) -> Result<CacheInfo> {
    let mut repos = Vec::new();

    for entry in fs::read_dir(cache_dir)? {
        let repo_path = entry?.path();
        if !repo_path.is_dir() {
            continue;
        }
        let Some(repo_id) = repo_path
            .file_name()
            .and_then(|name| repo_id_from_folder(&name.to_string_lossy()))
        else {
            continue;
        };

        match scan_repo(&repo_path, repo_id)? {
            Some(repo) => repos.push(repo),
            None => tracing::warn!("Skipping corrupted cache entry {:?}", repo_path),
        }
    }

    repos.sort_by(|a, b| a.repo_id.cmp(&b.repo_id));
    Ok(CacheInfo {
        cache_dir: cache_dir.to_path_buf(),
        repos,
    })
}

struct BlobStat {
    size: u64,
    accessed: f64,
    modified: f64,
}

fn scan_repo(repo_path: &Path, repo_id: String) -> Result<Option<CachedRepo>> {
    let snapshots_path = repo_path.join("snapshots");
    if !snapshots_path.is_dir() {
        return Ok(None);
    }

    let refs_by_hash = scan_refs(&repo_path.join("refs"))?;
    let mut blob_stats: BTreeMap<PathBuf, BlobStat> = BTreeMap::new();
    let mut revisions = Vec::new();

    for entry in fs::read_dir(&snapshots_path)? {
        let snapshot_path = entry?.path();
        if !snapshot_path.is_dir() {
            continue;
        }
        let commit_hash = snapshot_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut files = Vec::new();
        for file in WalkDir::new(&snapshot_path).min_depth(1) {
            let file = file?;
            if file.file_type().is_dir() {
                continue;
            }
            let file_path = file.path().to_path_buf();
            let blob_path = match fs::canonicalize(&file_path) {
                Ok(blob_path) => blob_path,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    tracing::warn!("Snapshot file {:?} points to a missing blob", file_path);
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let metadata = fs::metadata(&blob_path)?;
            if !metadata.is_file() {
                continue;
            }

            if !blob_stats.contains_key(&blob_path) {
                blob_stats.insert(
                    blob_path.clone(),
                    BlobStat {
                        size: metadata.len(),
                        accessed: accessed_timestamp(&metadata)?,
                        modified: modified_timestamp(&metadata)?,
                    },
                );
            }
            files.push(CachedFile {
                blob_path,
                size_on_disk: metadata.len(),
            });
        }

        revisions.push(CachedRevision {
            refs: refs_by_hash.get(&commit_hash).cloned().unwrap_or_default(),
            commit_hash,
            snapshot_path,
            files,
        });
    }
    revisions.sort_by(|a, b| a.commit_hash.cmp(&b.commit_hash));

    let (last_accessed, last_modified) = if blob_stats.is_empty() {
        let metadata = fs::metadata(repo_path)?;
        (accessed_timestamp(&metadata)?, modified_timestamp(&metadata)?)
    } else {
        blob_stats.values().fold((0f64, 0f64), |(accessed, modified), stat| {
            (accessed.max(stat.accessed), modified.max(stat.modified))
        })
    };

    Ok(Some(CachedRepo {
        repo_id,
        repo_path: repo_path.to_path_buf(),
        size_on_disk: blob_stats.values().map(|stat| stat.size).sum(),
        nb_files: blob_stats.len() as u64,
        last_accessed,
        last_modified,
        revisions,
    }))
}

/// Maps commit hash to the ref names (`main`, `refs/pr/1`) pointing at it.
fn scan_refs(refs_path: &Path) -> Result<HashMap<String, Vec<String>>> {
    let mut refs_by_hash: HashMap<String, Vec<String>> = HashMap::new();
    if !refs_path.is_dir() {
        return Ok(refs_by_hash);
    }

    for entry in WalkDir::new(refs_path).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let ref_name = entry
            .path()
            .strip_prefix(refs_path)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let commit_hash = fs::read_to_string(entry.path())?.trim().to_string();
        refs_by_hash.entry(commit_hash).or_default().push(ref_name);
    }

    Ok(refs_by_hash)
}

impl CacheInfo {
    pub fn repo(&self, repo_id: &str) -> Option<&CachedRepo> {
        self.repos.iter().find(|repo| repo.repo_id == repo_id)
    }

    /// Plans the deletion of the given revisions.
    ///
    /// A repo losing all its revisions is removed whole. Otherwise only the
    /// snapshots, their refs and the blobs no surviving revision references go.
    pub fn delete_revisions(&self, commit_hashes: &[&str]) -> DeleteStrategy {
        let mut pending: BTreeSet<&str> = commit_hashes.iter().copied().collect();
        let mut strategy = DeleteStrategy::default();

        for repo in &self.repos {
            let (to_delete, to_keep): (Vec<&CachedRevision>, Vec<&CachedRevision>) = repo
                .revisions
                .iter()
                .partition(|revision| pending.contains(revision.commit_hash.as_str()));
            if to_delete.is_empty() {
                continue;
            }
            for revision in &to_delete {
                pending.remove(revision.commit_hash.as_str());
            }

            if to_keep.is_empty() {
                strategy.repos.insert(repo.repo_path.clone());
                strategy.expected_freed_size += repo.size_on_disk;
                continue;
            }

            let kept_blobs: BTreeSet<&Path> = to_keep
                .iter()
                .flat_map(|revision| revision.files.iter())
                .map(|file| file.blob_path.as_path())
                .collect();

            for revision in to_delete {
                strategy.snapshots.insert(revision.snapshot_path.clone());
                for ref_name in &revision.refs {
                    strategy.refs.insert(repo.repo_path.join("refs").join(ref_name));
                }
                for file in &revision.files {
                    if kept_blobs.contains(file.blob_path.as_path()) {
                        continue;
                    }
                    if strategy.blobs.insert(file.blob_path.clone()) {
                        strategy.expected_freed_size += file.size_on_disk;
                    }
                }
            }
        }

        for commit_hash in pending {
            tracing::warn!(
                "Revision {} not found in cache {:?}, nothing to delete",
                commit_hash,
                self.cache_dir
            );
        }

        strategy
    }
}

impl DeleteStrategy {
    pub fn execute(&self) -> Result<()> {
        for blob in &self.blobs {
            try_delete(blob, false)?;
        }
        for ref_path in &self.refs {
            try_delete(ref_path, false)?;
        }
        for repo in &self.repos {
            try_delete(repo, true)?;
        }
        for snapshot in &self.snapshots {
            try_delete(snapshot, true)?;
        }
        tracing::info!("Cache deletion done, freed {} bytes", self.expected_freed_size);
        Ok(())
    }
}

fn try_delete(path: &Path, is_dir: bool) -> Result<()> {
    let result = if is_dir {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!("Couldn't delete {:?}: already gone", path);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
