//! Hub backends.
//!
//! Each hub implements [`HubAdapter`]; [`HubBackend`] is the closed set of
//! hubs the CLI can select and builds the matching adapter.

pub mod hf;
pub mod ms;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::ModelInfo;
use glob::{MatchOptions, Pattern};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub use hf::HfAdapter;
pub use ms::MsAdapter;

/// Chained symlinks followed before giving up, matching the usual ELOOP limit.
const MAX_SYMLINK_HOPS: usize = 40;

/// The four verbs every hub supports, plus cache root resolution.
pub trait HubAdapter {
    /// Canonical managed cache root. Fails with [`Error::CacheDirNotFound`]
    /// when it is missing or not a directory.
    fn cache_dir(&self) -> Result<PathBuf>;

    /// Models in `local_dir`, or in the managed cache when `local_dir` is
    /// `None`, filtered by `pattern` and sorted by id.
    fn list_models(&self, pattern: Option<&str>, local_dir: Option<&Path>) -> Result<Vec<ModelInfo>>;

    /// Downloads into the managed cache, or as a plain snapshot into
    /// `model_path` when given.
    fn download_model(&self, model_id: &str, model_path: Option<&Path>) -> Result<()>;

    fn update_model(&self, model: &ModelInfo) -> Result<()>;

    /// Where an update of `model` writes: `None` when it lives in the managed
    /// cache, else its own directory.
    fn update_target<'a>(&self, model: &'a ModelInfo) -> Result<Option<&'a Path>> {
        if model.path.starts_with(self.cache_dir()?) {
            Ok(None)
        } else {
            Ok(Some(model.path.as_path()))
        }
    }

    fn remove_model(&self, model: &ModelInfo) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HubBackend {
    /// Hugging Face Hub
    #[value(name = "hf")]
    HuggingFace,
    /// ModelScope
    #[value(name = "ms")]
    ModelScope,
}

impl HubBackend {
    pub fn adapter(self, config: &Config) -> Box<dyn HubAdapter> {
        match self {
            HubBackend::HuggingFace => Box::new(HfAdapter::new(config)),
            HubBackend::ModelScope => Box::new(MsAdapter::new(config)),
        }
    }
}

/// Canonicalizes a configured cache root, requiring an existing directory.
pub fn resolve_cache_dir(path: &Path) -> Result<PathBuf> {
    match fs::canonicalize(path) {
        Ok(resolved) if resolved.is_dir() => Ok(resolved),
        _ => Err(Error::CacheDirNotFound(path.to_path_buf())),
    }
}

/// Keeps models whose id matches the shell-glob `pattern` and sorts by id.
///
/// Matching is case-sensitive and `*` also spans `/`, as with `fnmatch`.
pub fn filter_and_sort(mut models: Vec<ModelInfo>, pattern: Option<&str>) -> Result<Vec<ModelInfo>> {
    if let Some(pattern) = pattern {
        let pattern = Pattern::new(&fnmatch_pattern(pattern))?;
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        models.retain(|model| pattern.matches_with(&model.id, options));
    }
    models.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(models)
}

/// Rewrites an `fnmatch` pattern into the `glob` syntax with the same meaning.
///
/// `glob` rejects `**` outside a whole path component and unclosed `[`; with
/// `require_literal_separator` off a run of `*` is a single `*`, and `fnmatch`
/// reads an unclosed `[` literally.
fn fnmatch_pattern(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                out.push('*');
                while chars.get(i + 1) == Some(&'*') {
                    i += 1;
                }
            }
            '[' => {
                // a leading `!` negates and a `]` right after it is a member
                let mut j = i + 1;
                if chars.get(j) == Some(&'!') {
                    j += 1;
                }
                if chars.get(j) == Some(&']') {
                    j += 1;
                }
                match chars[j..].iter().position(|c| *c == ']') {
                    Some(offset) => {
                        let end = j + offset;
                        out.extend(&chars[i..=end]);
                        i = end;
                    }
                    None => out.push_str("[[]"),
                }
            }
            c => out.push(c),
        }
        i += 1;
    }
    out
}

/// Splits `owner/name`.
pub fn split_model_id(model_id: &str) -> Result<(&str, &str)> {
    match model_id.split_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((owner, name))
        }
        _ => Err(Error::InvalidInput(format!(
            "Model id must look like 'owner/name', got '{}'",
            model_id
        ))),
    }
}

/// Removes a model directory that is not tracked by a hub index.
///
/// A symlink is resolved (through chained links) and its target tree removed
/// before the link itself. A target that is already gone counts as removed.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if !metadata.file_type().is_symlink() {
        tracing::info!("Removing directory {:?}", path);
        fs::remove_dir_all(path)?;
        return Ok(());
    }

    let target = resolve_link_target(path)?;
    match fs::symlink_metadata(&target) {
        Ok(target_metadata) if target_metadata.is_dir() => {
            tracing::info!("Removing {:?} (target of {:?})", target, path);
            fs::remove_dir_all(&target)?;
        }
        Ok(_) => {
            tracing::info!("Removing {:?} (target of {:?})", target, path);
            fs::remove_file(&target)?;
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            tracing::warn!("Link target {:?} of {:?} is already gone", target, path);
        }
        Err(err) => return Err(err.into()),
    }

    fs::remove_file(path).or_else(|_| fs::remove_dir(path))?;
    Ok(())
}

/// Follows `link` until the path is no longer a symlink.
fn resolve_link_target(link: &Path) -> Result<PathBuf> {
    let mut current = link.to_path_buf();
    for _ in 0..MAX_SYMLINK_HOPS {
        let target = fs::read_link(&current)?;
        let target = match current.parent() {
            Some(parent) if target.is_relative() => parent.join(target),
            _ => target,
        };
        match fs::symlink_metadata(&target) {
            Ok(metadata) if metadata.file_type().is_symlink() => current = target,
            _ => return Ok(target),
        }
    }
    Err(Error::SymlinkLoop(link.to_path_buf()))
}

#[cfg(unix)]
pub(crate) fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
pub(crate) fn symlink_dir(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(original, link)
}
