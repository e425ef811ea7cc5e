use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Cache directory not found: {}", .0.display())]
	CacheDirNotFound(PathBuf),

	#[error("Model not found in cache: {0}")]
	ModelNotFound(String),

	#[error("Invalid glob pattern: {0}")]
	InvalidPattern(#[from] glob::PatternError),

	#[error("Invalid input: {0}")]
	InvalidInput(String),

	#[error("Download failed: {0}")]
	DownloadFailed(String),

	#[error("Too many levels of symbolic links: {}", .0.display())]
	SymlinkLoop(PathBuf),

	#[error("Configuration error: {0}")]
	ConfigError(String),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Directory walk failed: {0}")]
	WalkError(#[from] walkdir::Error),

	#[error("Serialization error: {0}")]
	SerializationError(String),
}

impl From<serde_json::Error> for Error {
	fn from(err: serde_json::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

impl From<toml::de::Error> for Error {
	fn from(err: toml::de::Error) -> Self {
		Error::SerializationError(err.to_string())
	}
}

impl From<hf_hub::api::sync::ApiError> for Error {
	fn from(err: hf_hub::api::sync::ApiError) -> Self {
		Error::DownloadFailed(err.to_string())
	}
}

impl From<ureq::Error> for Error {
	fn from(err: ureq::Error) -> Self {
		match err {
			ureq::Error::Status(code, response) => Error::DownloadFailed(format!(
				"{} returned HTTP {}",
				response.get_url(),
				code
			)),
			ureq::Error::Transport(transport) => Error::DownloadFailed(transport.to_string()),
		}
	}
}

pub type Result<T> = std::result::Result<T, Error>;
