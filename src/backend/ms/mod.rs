pub mod api;

use crate::backend::{
    filter_and_sort, remove_path, resolve_cache_dir, split_model_id, symlink_dir, HubAdapter,
};
use crate::config::Config;
use crate::error::Result;
use crate::model::{list_local_models, ModelInfo};
use api::{is_up_to_date, MsClient, DEFAULT_REVISION};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Marks ModelScope's staged downloads (`._____temp`) and escaped on-disk names.
pub const STAGING_MARKER: &str = "___";

const STAGING_DIR: &str = "._____temp";

/// Entries ModelScope keeps in its cache that are not models in their own right.
pub fn is_staged_entry(name: &str) -> bool {
    name.contains(STAGING_MARKER)
}

/// On-disk name for a model: ModelScope stores `.` as `___`.
pub fn escaped_model_name(name: &str) -> String {
    name.replace('.', STAGING_MARKER)
}

pub struct MsAdapter {
    cache_dir: PathBuf,
    client: MsClient,
}

impl MsAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            cache_dir: config.ms_cache_dir.clone(),
            client: MsClient::new(&config.ms_endpoint, config.ms_token.clone()),
        }
    }

    /// Managed location of `owner/name`, creating the `name -> escaped` link
    /// when escaping changes the name.
    fn prepare_cache_path(&self, owner: &str, name: &str) -> Result<PathBuf> {
        let owner_dir = self.cache_dir.join(owner);
        let escaped = escaped_model_name(name);
        let model_path = owner_dir.join(&escaped);
        fs::create_dir_all(&model_path)?;

        if escaped != name {
            let link = owner_dir.join(name);
            if link.symlink_metadata().is_err() {
                symlink_dir(Path::new(&escaped), &link)?;
            }
        }
        Ok(model_path)
    }

    /// Fetches the latest revision into `model_path`, staging each file under
    /// `staging_root` first.
    fn snapshot_download(&self, model_id: &str, model_path: &Path, staging_root: &Path) -> Result<()> {
        let files = self.client.list_repo_files(model_id, DEFAULT_REVISION)?;
        let staging_dir = staging_dir_for(staging_root, model_id);
        tracing::info!("Fetching {} files of {} into {:?}", files.len(), model_id, model_path);

        for file in &files {
            if is_up_to_date(&model_path.join(&file.path), file) {
                tracing::debug!("{} is up to date", file.path);
                continue;
            }
            self.client
                .download_file(model_id, DEFAULT_REVISION, file, &staging_dir, model_path)?;
        }

        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir)?;
        }
        // owner level first, then the staging root itself
        for dir in staging_dir.ancestors().skip(1).take(2) {
            remove_if_empty(dir);
        }
        Ok(())
    }
}

/// `{root}/._____temp/{owner}/{name}`. Staging under the destination root keeps
/// the final rename on one filesystem.
fn staging_dir_for(root: &Path, model_id: &str) -> PathBuf {
    root.join(STAGING_DIR).join(model_id)
}

/// Removes `dir` unless other downloads still stage files in it.
fn remove_if_empty(dir: &Path) {
    match fs::remove_dir(dir) {
        Ok(()) => {}
        Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty) => {}
        Err(err) => tracing::warn!("Could not remove staging directory {:?}: {}", dir, err),
    }
}

impl HubAdapter for MsAdapter {
    fn cache_dir(&self) -> Result<PathBuf> {
        resolve_cache_dir(&self.cache_dir)
    }

    fn list_models(&self, pattern: Option<&str>, local_dir: Option<&Path>) -> Result<Vec<ModelInfo>> {
        let models = match local_dir {
            Some(local_dir) => list_local_models(local_dir, is_staged_entry)?,
            None => list_local_models(&self.cache_dir()?, is_staged_entry)?,
        };
        filter_and_sort(models, pattern)
    }

    fn download_model(&self, model_id: &str, model_path: Option<&Path>) -> Result<()> {
        let (owner, name) = split_model_id(model_id)?;
        match model_path {
            None => {
                let model_path = self.prepare_cache_path(owner, name)?;
                self.snapshot_download(model_id, &model_path, &self.cache_dir)
            }
            Some(model_path) => {
                fs::create_dir_all(model_path)?;
                self.snapshot_download(model_id, model_path, model_path)
            }
        }
    }

    fn update_model(&self, model: &ModelInfo) -> Result<()> {
        self.download_model(&model.id, self.update_target(model)?)
    }

    fn remove_model(&self, model: &ModelInfo) -> Result<()> {
        remove_path(&model.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_HF_ENDPOINT, DEFAULT_MS_ENDPOINT};
    use crate::error::Error;

    fn adapter(cache_dir: &Path) -> MsAdapter {
        let config = Config {
            hf_cache_dir: cache_dir.join("unused"),
            hf_endpoint: DEFAULT_HF_ENDPOINT.to_string(),
            hf_token: None,
            ms_cache_dir: cache_dir.to_path_buf(),
            ms_endpoint: DEFAULT_MS_ENDPOINT.to_string(),
            ms_token: None,
            progress: false,
        };
        MsAdapter::new(&config)
    }

    fn make_model(root: &Path, owner: &str, name: &str) -> PathBuf {
        let model_path = root.join(owner).join(name);
        fs::create_dir_all(&model_path).unwrap();
        fs::write(model_path.join("config.json"), "{}").unwrap();
        model_path
    }

    #[test]
    fn test_staged_entry_predicate() {
        assert!(is_staged_entry("._____temp"));
        assert!(is_staged_entry("Qwen2___5-7B"));
        assert!(!is_staged_entry("Qwen2.5-7B"));
        assert!(!is_staged_entry("bert_base__uncased"));
    }

    #[test]
    fn test_escaped_model_name() {
        assert_eq!(escaped_model_name("Qwen2.5-0.5B"), "Qwen2___5-0___5B");
        assert_eq!(escaped_model_name("bert-base"), "bert-base");
    }

    #[test]
    fn test_staging_dir_for() {
        assert_eq!(
            staging_dir_for(Path::new("/cache"), "Qwen/Qwen2.5-7B"),
            PathBuf::from("/cache/._____temp/Qwen/Qwen2.5-7B")
        );
    }

    #[test]
    fn test_remove_if_empty() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join(STAGING_DIR);
        let busy = staging.join("acme");
        fs::create_dir_all(busy.join("widget")).unwrap();

        remove_if_empty(&busy);
        assert!(busy.exists());

        fs::remove_dir(busy.join("widget")).unwrap();
        remove_if_empty(&busy);
        remove_if_empty(&staging);
        assert!(!staging.exists());

        remove_if_empty(&staging);
    }

    #[cfg(unix)]
    #[test]
    fn test_update_target_follows_model_location() {
        let dir = tempfile::tempdir().unwrap();
        let cache = fs::canonicalize(dir.path()).unwrap();
        make_model(&cache, "AI-ModelScope", "bert-base");
        let local = tempfile::tempdir().unwrap();
        let model_path = make_model(local.path(), "acme", "widget");

        let missing = adapter(&cache.join("missing"));
        let adapter = adapter(&cache);
        let cached = adapter.list_models(None, None).unwrap().remove(0);
        assert_eq!(adapter.update_target(&cached).unwrap(), None);

        let local_model = adapter.list_models(None, Some(local.path())).unwrap().remove(0);
        assert_eq!(
            adapter.update_target(&local_model).unwrap(),
            Some(model_path.as_path())
        );

        assert!(matches!(
            missing.update_target(&local_model),
            Err(Error::CacheDirNotFound(_))
        ));
    }

    #[test]
    fn test_missing_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(&dir.path().join("missing"));
        assert!(matches!(adapter.list_models(None, None), Err(Error::CacheDirNotFound(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_list_cache_uses_real_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = fs::canonicalize(dir.path()).unwrap();
        make_model(&cache, "Qwen", "Qwen2___5-7B");
        symlink_dir(Path::new("Qwen2___5-7B"), &cache.join("Qwen").join("Qwen2.5-7B")).unwrap();
        make_model(&cache, "AI-ModelScope", "bert-base");
        make_model(&cache, "._____temp", "partial");

        let adapter = adapter(&cache);
        let models = adapter.list_models(None, None).unwrap();
        let ids: Vec<&str> = models.iter().map(|model| model.id.as_str()).collect();
        assert_eq!(ids, vec!["AI-ModelScope/bert-base", "Qwen/Qwen2.5-7B"]);
        assert_eq!(models[1].num_files, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_linked_cache_model() {
        let dir = tempfile::tempdir().unwrap();
        let cache = fs::canonicalize(dir.path()).unwrap();
        let target = make_model(&cache, "Qwen", "Qwen2___5-7B");
        let link = cache.join("Qwen").join("Qwen2.5-7B");
        symlink_dir(Path::new("Qwen2___5-7B"), &link).unwrap();

        let adapter = adapter(&cache);
        let model = adapter.list_models(Some("Qwen/*"), None).unwrap().remove(0);
        adapter.remove_model(&model).unwrap();

        assert!(!target.exists());
        assert!(link.symlink_metadata().is_err());
        assert!(adapter.list_models(None, None).unwrap().is_empty());
    }

    #[test]
    fn test_remove_local_model() {
        let cache = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let model_path = make_model(local.path(), "acme", "widget");

        let adapter = adapter(cache.path());
        let model = adapter.list_models(None, Some(local.path())).unwrap().remove(0);
        assert_eq!(model.id, "acme/widget");
        adapter.remove_model(&model).unwrap();
        assert!(!model_path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_prepare_cache_path_links_escaped_name() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = adapter(dir.path());

        let model_path = adapter.prepare_cache_path("Qwen", "Qwen2.5-7B").unwrap();
        assert_eq!(model_path, dir.path().join("Qwen").join("Qwen2___5-7B"));
        let link = dir.path().join("Qwen").join("Qwen2.5-7B");
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("Qwen2___5-7B"));

        // idempotent
        adapter.prepare_cache_path("Qwen", "Qwen2.5-7B").unwrap();
    }
}
