use crate::format::{format_size, format_timesince};
use std::path::PathBuf;

/// One cached model repository as seen on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    /// `owner/name`
    pub id: String,
    pub path: PathBuf,
    pub size_on_disk: u64,
    pub num_files: u64,
    pub last_accessed_timestamp: f64,
    pub last_modified_timestamp: f64,
}

impl ModelInfo {
    pub fn size_on_disk_str(&self) -> String {
        format_size(self.size_on_disk)
    }

    pub fn last_accessed_str(&self) -> String {
        format_timesince(self.last_accessed_timestamp)
    }

    pub fn last_modified_str(&self) -> String {
        format_timesince(self.last_modified_timestamp)
    }
}
