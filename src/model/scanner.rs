use crate::error::{Error, Result};
use crate::model::ModelInfo;
use std::fs::{self, Metadata};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// Bookkeeping files that never count towards a model.
pub const FILES_TO_IGNORE: &[&str] = &[".DS_Store"];

/// A directory is a model in local-dir mode iff it holds this file.
pub const MODEL_DESCRIPTOR: &str = "config.json";

/// Builds a record for one model directory.
///
/// Sizes and file counts cover every regular file below `model_path`
/// (symlinks followed). Recency is the newest access/modification time of
/// any of those files, or the directory's own when it holds none.
pub fn scan_model_dir(model_path: &Path) -> Result<ModelInfo> {
    let id = model_id_from_path(model_path)?;

    let mut size_on_disk = 0u64;
    let mut num_files = 0u64;
    let mut last_accessed_timestamp = 0f64;
    let mut last_modified_timestamp = 0f64;

    for entry in WalkDir::new(model_path).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(ancestor) = err.loop_ancestor() {
                    tracing::warn!(
                        "Skipping symlink cycle at {:?} (points back to {:?})",
                        err.path().unwrap_or(model_path),
                        ancestor
                    );
                    continue;
                }
                if err.path().is_some_and(is_dangling_symlink) {
                    tracing::debug!("Skipping dangling symlink {:?}", err.path());
                    continue;
                }
                return Err(err.into());
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if FILES_TO_IGNORE
            .iter()
            .any(|ignored| entry.file_name() == *ignored)
        {
            continue;
        }

        let metadata = entry.metadata()?;
        size_on_disk += metadata.len();
        num_files += 1;
        last_accessed_timestamp = last_accessed_timestamp.max(accessed_timestamp(&metadata)?);
        last_modified_timestamp = last_modified_timestamp.max(modified_timestamp(&metadata)?);
    }

    if num_files == 0 {
        let metadata = fs::metadata(model_path)?;
        last_accessed_timestamp = accessed_timestamp(&metadata)?;
        last_modified_timestamp = modified_timestamp(&metadata)?;
    }

    tracing::debug!(
        "Scanned {} at {:?}: {} files, {} bytes",
        id,
        model_path,
        num_files,
        size_on_disk
    );

    Ok(ModelInfo {
        id,
        path: model_path.to_path_buf(),
        size_on_disk,
        num_files,
        last_accessed_timestamp,
        last_modified_timestamp,
    })
}

/// Finds `owner/name` model directories below `local_dir`.
///
/// Owner and model entries whose name matches `exclude` are skipped, as are
/// model directories without a [`MODEL_DESCRIPTOR`]. Output order follows the
/// filesystem; callers sort.
pub fn list_local_models(local_dir: &Path, exclude: fn(&str) -> bool) -> Result<Vec<ModelInfo>> {
    let mut models = Vec::new();

    for owner in fs::read_dir(local_dir)? {
        let owner_path = owner?.path();
        if !owner_path.is_dir() || is_excluded(&owner_path, exclude) {
            continue;
        }

        for model in fs::read_dir(&owner_path)? {
            let model_path = model?.path();
            if !model_path.is_dir() || is_excluded(&model_path, exclude) {
                continue;
            }
            if !model_path.join(MODEL_DESCRIPTOR).exists() {
                continue;
            }
            models.push(scan_model_dir(&model_path)?);
        }
    }

    Ok(models)
}

pub fn model_id_from_path(model_path: &Path) -> Result<String> {
    let name = model_path.file_name();
    let owner = model_path.parent().and_then(Path::file_name);
    match (owner, name) {
        (Some(owner), Some(name)) => Ok(format!(
            "{}/{}",
            owner.to_string_lossy(),
            name.to_string_lossy()
        )),
        _ => Err(Error::InvalidInput(format!(
            "Cannot derive a model id from {:?}",
            model_path
        ))),
    }
}

fn is_excluded(path: &Path, exclude: fn(&str) -> bool) -> bool {
    path.file_name()
        .map(|name| exclude(&name.to_string_lossy()))
        .unwrap_or(false)
}

fn is_dangling_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .map(|metadata| metadata.file_type().is_symlink())
        .unwrap_or(false)
        && !path.exists()
}

pub fn accessed_timestamp(metadata: &Metadata) -> Result<f64> {
    Ok(to_timestamp(metadata.accessed()?))
}

pub fn modified_timestamp(metadata: &Metadata) -> Result<f64> {
    Ok(to_timestamp(metadata.modified()?))
}

fn to_timestamp(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs_f64(),
        Err(err) => -err.duration().as_secs_f64(),
    }
}
