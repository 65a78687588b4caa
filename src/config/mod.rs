//! Settings and list-source loading.
//!
//! Proxies and user agents come from line-delimited text files; settings
//! can also be loaded as a JSON document. An empty identity source is a
//! fatal configuration error surfaced at startup, never retried.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("list source {path} contains no usable entries")]
    EmptyList { path: PathBuf },
}

fn default_max_requests_per_agent() -> u64 {
    500
}

fn default_max_requests_per_proxy() -> u64 {
    4000
}

fn default_max_fetch_attempts() -> u32 {
    3
}

fn default_concurrent_requests() -> usize {
    10
}

/// Deserializable crawl settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ScraperSettings {
    pub proxy_list_path: PathBuf,
    pub user_agent_list_path: PathBuf,
    pub storage_root: PathBuf,
    #[serde(default = "default_max_requests_per_agent")]
    pub max_requests_per_agent: u64,
    #[serde(default = "default_max_requests_per_proxy")]
    pub max_requests_per_proxy: u64,
    #[serde(default = "default_max_fetch_attempts")]
    pub max_fetch_attempts: u32,
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,
}

impl ScraperSettings {
    /// Load settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Read a line-delimited list, trimming entries and skipping blank lines.
///
/// Errors when the file is unreadable or yields no entries: a crawl run
/// without proxies or user agents cannot start.
pub fn load_line_list(path: impl AsRef<Path>) -> Result<Vec<String>, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let entries: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if entries.is_empty() {
        return Err(ConfigError::EmptyList {
            path: path.to_path_buf(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_list_skipping_blank_lines() {
        let file = write_temp("http://p1:8080\n\n  http://p2:8080  \n\t\nhttp://p3:8080\n");
        let entries = load_line_list(file.path()).unwrap();
        assert_eq!(entries, ["http://p1:8080", "http://p2:8080", "http://p3:8080"]);
    }

    #[test]
    fn empty_list_is_a_fatal_error() {
        let file = write_temp("\n   \n\n");
        assert!(matches!(
            load_line_list(file.path()),
            Err(ConfigError::EmptyList { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        assert!(matches!(
            load_line_list("/nonexistent/proxies.txt"),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn settings_parse_with_defaults() {
        let file = write_temp(
            r#"{
                "proxy_list_path": "resources/proxies.txt",
                "user_agent_list_path": "resources/user_agents.txt",
                "storage_root": "scraped_data/images"
            }"#,
        );
        let settings = ScraperSettings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.max_requests_per_agent, 500);
        assert_eq!(settings.max_requests_per_proxy, 4000);
        assert_eq!(settings.max_fetch_attempts, 3);
        assert_eq!(settings.concurrent_requests, 10);
    }

    #[test]
    fn settings_overrides_are_honored() {
        let file = write_temp(
            r#"{
                "proxy_list_path": "p.txt",
                "user_agent_list_path": "ua.txt",
                "storage_root": "images",
                "max_requests_per_agent": 50,
                "max_fetch_attempts": 5
            }"#,
        );
        let settings = ScraperSettings::from_json_file(file.path()).unwrap();
        assert_eq!(settings.max_requests_per_agent, 50);
        assert_eq!(settings.max_fetch_attempts, 5);
    }
}
