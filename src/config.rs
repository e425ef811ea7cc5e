use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_HF_ENDPOINT: &str = "https://huggingface.co";
pub const DEFAULT_MS_ENDPOINT: &str = "https://www.modelscope.cn";

/// Resolved settings for both hubs.
///
/// Built once in `main` and handed to each adapter, so nothing below the
/// command surface reads the process environment.
#[derive(Debug, Clone)]
pub struct Config {
	pub hf_cache_dir: PathBuf,
	pub hf_endpoint: String,
	pub hf_token: Option<String>,
	pub ms_cache_dir: PathBuf,
	pub ms_endpoint: String,
	pub ms_token: Option<String>,
	pub progress: bool,
}

/// On-disk overrides, every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
	pub hf_cache_dir: Option<PathBuf>,
	pub hf_endpoint: Option<String>,
	pub hf_token: Option<String>,
	pub ms_cache_dir: Option<PathBuf>,
	pub ms_endpoint: Option<String>,
	pub ms_token: Option<String>,
	pub progress: Option<bool>,
}

impl ConfigFile {
	pub fn load(path: &Path) -> Result<Self> {
		if !path.exists() {
			return Ok(Self::default());
		}

		let content = std::fs::read_to_string(path)?;
		let file: ConfigFile = toml::from_str(&content)?;
		tracing::debug!("Loaded config file {:?}", path);
		Ok(file)
	}
}

impl Config {
	pub fn from_env() -> Result<Self> {
		let base_dirs = BaseDirs::new()
			.ok_or_else(|| Error::ConfigError("Could not determine home directory".to_string()))?;

		let config_path = match std::env::var_os("BMHUB_CONFIG") {
			Some(path) => PathBuf::from(path),
			None => ProjectDirs::from("", "", "bmhub")
				.map(|dirs| dirs.config_dir().join("config.toml"))
				.ok_or_else(|| Error::ConfigError("Could not determine config directory".to_string()))?,
		};
		let file = ConfigFile::load(&config_path)?;

		Ok(Self::resolve(file, base_dirs.home_dir(), |key| {
			std::env::var(key).ok().filter(|value| !value.is_empty())
		}))
	}

	/// Layers environment variables over file values over hub defaults.
	pub fn resolve<F>(file: ConfigFile, home: &Path, var: F) -> Self
	where
		F: Fn(&str) -> Option<String>,
	{
		let hf_cache_dir = var("HF_HUB_CACHE")
			.map(PathBuf::from)
			.or_else(|| var("HF_HOME").map(|hf_home| PathBuf::from(hf_home).join("hub")))
			.or_else(|| var("XDG_CACHE_HOME").map(|cache| PathBuf::from(cache).join("huggingface").join("hub")))
			.or(file.hf_cache_dir)
			.unwrap_or_else(|| home.join(".cache").join("huggingface").join("hub"));

		let ms_cache_dir = var("MODELSCOPE_CACHE")
			.map(|cache| PathBuf::from(cache).join("models"))
			.or(file.ms_cache_dir)
			.unwrap_or_else(|| home.join(".cache").join("modelscope").join("hub").join("models"));

		let ms_endpoint = var("MODELSCOPE_DOMAIN")
			.map(|domain| {
				if domain.contains("://") {
					domain
				} else {
					format!("https://{}", domain)
				}
			})
			.or(file.ms_endpoint)
			.unwrap_or_else(|| DEFAULT_MS_ENDPOINT.to_string());

		Self {
			hf_cache_dir: expand_home(&hf_cache_dir, home),
			hf_endpoint: var("HF_ENDPOINT")
				.or(file.hf_endpoint)
				.unwrap_or_else(|| DEFAULT_HF_ENDPOINT.to_string()),
			hf_token: var("HF_TOKEN").or(file.hf_token),
			ms_cache_dir: expand_home(&ms_cache_dir, home),
			ms_endpoint: ms_endpoint.trim_end_matches('/').to_string(),
			ms_token: var("MODELSCOPE_API_TOKEN").or(file.ms_token),
			progress: file.progress.unwrap_or(true),
		}
	}
}

/// Replaces a leading `~` component with `home`.
pub fn expand_home(path: &Path, home: &Path) -> PathBuf {
	match path.strip_prefix("~") {
		Ok(rest) => home.join(rest),
		Err(_) => path.to_path_buf(),
	}
}
