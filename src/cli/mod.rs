pub mod commands;
pub mod table;

use crate::backend::HubBackend;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bmhub")]
#[command(version, about = "BigModel Hub CLI Toolkit", long_about = None, arg_required_else_help = true)]
pub struct Cli {
	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
	/// List downloaded models
	List {
		/// Model hub backend
		backend: HubBackend,

		/// Glob pattern to match model IDs (e.g. "Qwen/*")
		pattern: Option<String>,

		/// The local model directory
		#[arg(long, value_parser = parse_local_dir)]
		local_dir: Option<PathBuf>,
	},

	/// Download a model from the model hub
	Download {
		/// Model hub backend
		backend: HubBackend,

		/// Model ID (e.g. "BAAI/bge-small-en-v1.5")
		model_id: String,

		/// The local model directory, models are stored under <LOCAL_DIR>/<MODEL_ID>
		#[arg(long, value_parser = parse_local_dir)]
		local_dir: Option<PathBuf>,
	},

	/// Update downloaded models
	Update {
		/// Model hub backend
		backend: HubBackend,

		/// Glob pattern to match model IDs
		pattern: Option<String>,

		/// The local model directory
		#[arg(long, value_parser = parse_local_dir)]
		local_dir: Option<PathBuf>,
	},

	/// Remove downloaded models
	Remove {
		/// Model hub backend
		backend: HubBackend,

		/// Glob pattern to match model IDs
		pattern: Option<String>,

		/// The local model directory
		#[arg(long, value_parser = parse_local_dir)]
		local_dir: Option<PathBuf>,
	},
}

/// `--local-dir` must be an existing directory; it is made absolute.
fn parse_local_dir(value: &str) -> Result<PathBuf, String> {
	let path = std::fs::canonicalize(value)
		.map_err(|e| format!("Directory '{}' does not exist: {}", value, e))?;
	if !path.is_dir() {
		return Err(format!("'{}' is not a directory", value));
	}
	Ok(path)
}
