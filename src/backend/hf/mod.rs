pub mod cache;

use crate::backend::{filter_and_sort, remove_path, resolve_cache_dir, split_model_id, HubAdapter};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{list_local_models, ModelInfo};
use cache::{repo_folder_name, scan_cache_dir, DeleteStrategy};
use hf_hub::api::sync::{Api, ApiBuilder};
use std::fs;
use std::path::{Path, PathBuf};

/// Where explicit-directory downloads stage files through hf-hub's cache.
const STAGING_CACHE: &str = ".cache/huggingface/hub";

/// Commit hash of the last snapshot written into an explicit directory.
const REVISION_FILE: &str = ".cache/huggingface/revision";

pub struct HfAdapter {
    cache_dir: PathBuf,
    endpoint: String,
    token: Option<String>,
    progress: bool,
}

impl HfAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            cache_dir: config.hf_cache_dir.clone(),
            endpoint: config.hf_endpoint.clone(),
            token: config.hf_token.clone(),
            progress: config.progress,
        }
    }

    fn api(&self, cache_dir: PathBuf) -> Result<Api> {
        let api = ApiBuilder::new()
            .with_cache_dir(cache_dir)
            .with_endpoint(self.endpoint.clone())
            .with_token(self.token.clone())
            .with_progress(self.progress)
            .build()?;
        Ok(api)
    }

    /// Fetches every file of the latest revision into the managed cache.
    ///
    /// Files already present in the snapshot of that revision are skipped;
    /// hf-hub handles blob storage and the `refs/main` pointer.
    fn download_to_cache(&self, model_id: &str) -> Result<()> {
        let api = self.api(self.cache_dir.clone())?;
        let repo = api.model(model_id.to_string());
        let info = repo.info()?;
        let snapshot = self
            .cache_dir
            .join(repo_folder_name(model_id))
            .join("snapshots")
            .join(&info.sha);

        tracing::info!(
            "Fetching {} files of {} at {}",
            info.siblings.len(),
            model_id,
            info.sha
        );
        for sibling in &info.siblings {
            if snapshot.join(&sibling.rfilename).exists() {
                tracing::debug!("{} already cached", sibling.rfilename);
                continue;
            }
            repo.download(&sibling.rfilename)?;
        }
        Ok(())
    }

    /// Writes a plain (non-deduplicated) copy of the latest revision to `model_path`.
    fn download_to_dir(&self, model_id: &str, model_path: &Path) -> Result<()> {
        fs::create_dir_all(model_path)?;
        let staging = model_path.join(STAGING_CACHE);
        let api = self.api(staging.clone())?;
        let repo = api.model(model_id.to_string());
        let info = repo.info()?;

        let revision_file = model_path.join(REVISION_FILE);
        let current_revision = fs::read_to_string(&revision_file).ok();
        let up_to_date = current_revision.as_deref().map(str::trim) == Some(info.sha.as_str());

        for sibling in &info.siblings {
            let dest = model_path.join(&sibling.rfilename);
            if up_to_date && dest.exists() {
                tracing::debug!("{} is up to date", sibling.rfilename);
                continue;
            }

            let fetched = repo.download(&sibling.rfilename)?;
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&fetched, &dest)?;
        }

        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::write(&revision_file, &info.sha)?;
        Ok(())
    }
}

impl HubAdapter for HfAdapter {
    fn cache_dir(&self) -> Result<PathBuf> {
        resolve_cache_dir(&self.cache_dir)
    }

    fn list_models(&self, pattern: Option<&str>, local_dir: Option<&Path>) -> Result<Vec<ModelInfo>> {
        let models = match local_dir {
            Some(local_dir) => list_local_models(local_dir, |_| false)?,
            None => scan_cache_dir(&self.cache_dir()?)?
                .repos
                .iter()
                .map(|repo| repo.to_model_info())
                .collect(),
        };
        filter_and_sort(models, pattern)
    }

    fn download_model(&self, model_id: &str, model_path: Option<&Path>) -> Result<()> {
        split_model_id(model_id)?;
        match model_path {
            None => self.download_to_cache(model_id),
            Some(model_path) => self.download_to_dir(model_id, model_path),
        }
    }

    fn update_model(&self, model: &ModelInfo) -> Result<()> {
        self.download_model(&model.id, self.update_target(model)?)
    }

    fn remove_model(&self, model: &ModelInfo) -> Result<()> {
        let cache_dir = self.cache_dir()?;
        if !model.path.starts_with(&cache_dir) {
            return remove_path(&model.path);
        }

        let cache = scan_cache_dir(&cache_dir)?;
        let repo = cache
            .repo(&model.id)
            .ok_or_else(|| Error::ModelNotFound(model.id.clone()))?;
        let revisions: Vec<&str> = repo
            .revisions
            .iter()
            .map(|revision| revision.commit_hash.as_str())
            .collect();

        let strategy = if revisions.is_empty() {
            let mut strategy = DeleteStrategy::default();
            strategy.repos.insert(repo.repo_path.clone());
            strategy
        } else {
            cache.delete_revisions(&revisions)
        };
        tracing::info!(
            "Deleting {} revision(s) of {}, expecting to free {} bytes",
            revisions.len(),
            model.id,
            strategy.expected_freed_size
        );
        strategy.execute()
    }
}
