//! Blocking client for the ModelScope repository file API.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_REVISION: &str = "master";

const CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiResponse<T> {
    code: Option<i64>,
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FilesData {
    #[serde(default)]
    files: Vec<RepoFile>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RepoFile {
    pub path: String,
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(default)]
    pub size: u64,
}

impl RepoFile {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

pub struct MsClient {
    agent: ureq::Agent,
    endpoint: String,
    token: Option<String>,
}

impl MsClient {
    pub fn new(endpoint: &str, token: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build();

        Self {
            agent,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn get(&self, url: &str) -> ureq::Request {
        let request = self.agent.get(url);
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {}", token)),
            None => request,
        }
    }

    pub fn files_url(&self, model_id: &str) -> String {
        format!("{}/api/v1/models/{}/repo/files", self.endpoint, model_id)
    }

    pub fn file_url(&self, model_id: &str) -> String {
        format!("{}/api/v1/models/{}/repo", self.endpoint, model_id)
    }

    /// Lists every blob in the repository at `revision`.
    pub fn list_repo_files(&self, model_id: &str, revision: &str) -> Result<Vec<RepoFile>> {
        let response = self
            .get(&self.files_url(model_id))
            .query("Revision", revision)
            .query("Recursive", "true")
            .call()?;
        let response: ApiResponse<FilesData> = serde_json::from_reader(response.into_reader())?;

        let files = parse_files_response(response, model_id)?;
        Ok(files.into_iter().filter(RepoFile::is_blob).collect())
    }

    /// Streams one file into `staging_dir`, then moves it under `dest_dir`.
    pub fn download_file(
        &self,
        model_id: &str,
        revision: &str,
        file: &RepoFile,
        staging_dir: &Path,
        dest_dir: &Path,
    ) -> Result<()> {
        let staged = staging_dir.join(&file.path);
        if let Some(parent) = staged.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!("Downloading {} ({} bytes)", file.path, file.size);
        let response = self
            .get(&self.file_url(model_id))
            .query("Revision", revision)
            .query("FilePath", &file.path)
            .call()?;
        let mut reader = response.into_reader();
        let mut out = File::create(&staged)?;
        io::copy(&mut reader, &mut out)?;
        out.sync_all()?;

        let dest = dest_dir.join(&file.path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&staged, &dest)?;
        Ok(())
    }
}

fn parse_files_response(response: ApiResponse<FilesData>, model_id: &str) -> Result<Vec<RepoFile>> {
    if let Some(code) = response.code {
        if code != 200 {
            return Err(Error::DownloadFailed(format!(
                "Listing files of {} failed with code {}: {}",
                model_id,
                code,
                response.message.unwrap_or_default()
            )));
        }
    }
    response.data.map(|data| data.files).ok_or_else(|| {
        Error::DownloadFailed(format!("No file listing returned for {}", model_id))
    })
}

/// True when an existing file already matches the listed size.
pub fn is_up_to_date(dest: &Path, file: &RepoFile) -> bool {
    fs::metadata(dest)
        .map(|metadata| metadata.is_file() && metadata.len() == file.size)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILES_RESPONSE: &str = r#"{
        "Code": 200,
        "Data": {
            "Files": [
                {"Name": "config.json", "Path": "config.json", "Type": "blob", "Size": 2, "Sha256": "abc", "IsLFS": false},
                {"Name": "tokenizer", "Path": "tokenizer", "Type": "tree", "Size": 0},
                {"Name": "vocab.txt", "Path": "tokenizer/vocab.txt", "Type": "blob", "Size": 5}
            ]
        },
        "Message": "success",
        "RequestId": "req-1",
        "Success": true
    }"#;

    #[test]
    fn test_parse_files_response() {
        let response: ApiResponse<FilesData> = serde_json::from_str(FILES_RESPONSE).unwrap();
        let files = parse_files_response(response, "acme/widget").unwrap();
        assert_eq!(files.len(), 3);

        let blobs: Vec<&str> = files
            .iter()
            .filter(|file| file.is_blob())
            .map(|file| file.path.as_str())
            .collect();
        assert_eq!(blobs, vec!["config.json", "tokenizer/vocab.txt"]);
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{"Code": 10010205001, "Message": "model not found", "Success": false}"#;
        let response: ApiResponse<FilesData> = serde_json::from_str(body).unwrap();
        match parse_files_response(response, "acme/ghost") {
            Err(Error::DownloadFailed(msg)) => assert!(msg.contains("model not found")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_parse_response_without_data() {
        let body = r#"{"Code": 200, "Message": "success"}"#;
        let response: ApiResponse<FilesData> = serde_json::from_str(body).unwrap();
        assert!(response.data.is_none());
        assert!(matches!(
            parse_files_response(response, "acme/empty"),
            Err(Error::DownloadFailed(_))
        ));
    }

    #[test]
    fn test_malformed_response_is_serialization_error() {
        let err: Error = serde_json::from_str::<ApiResponse<FilesData>>("{\"Data\": 3}")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::SerializationError(_)));
    }

    #[test]
    fn test_urls() {
        let client = MsClient::new("https://www.modelscope.cn/", None);
        assert_eq!(
            client.files_url("Qwen/Qwen2.5-7B"),
            "https://www.modelscope.cn/api/v1/models/Qwen/Qwen2.5-7B/repo/files"
        );
        assert_eq!(
            client.file_url("Qwen/Qwen2.5-7B"),
            "https://www.modelscope.cn/api/v1/models/Qwen/Qwen2.5-7B/repo"
        );
    }

    #[test]
    fn test_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let file = RepoFile {
            path: "config.json".to_string(),
            kind: "blob".to_string(),
            size: 2,
        };
        let dest = dir.path().join("config.json");
        assert!(!is_up_to_date(&dest, &file));
        fs::write(&dest, "{}").unwrap();
        assert!(is_up_to_date(&dest, &file));
        fs::write(&dest, "{ }").unwrap();
        assert!(!is_up_to_date(&dest, &file));
    }
}
