// src/fetch.rs

//! Materializing remote package archives as local files

use crate::config::Config;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// URI schemes that are fetched before ingestion
const REMOTE_SCHEMES: [&str; 3] = ["http://", "https://", "ftp://"];

/// Retry delay in milliseconds
const RETRY_DELAY_MS: u64 = 1000;

/// Whether `path` names a remote archive rather than a local file
pub fn is_remote(path: &str) -> bool {
    REMOTE_SCHEMES.iter().any(|scheme| path.starts_with(scheme))
}

/// Downloads a remote archive and returns where it landed
pub trait Fetcher {
    fn fetch(&self, uri: &str) -> Result<PathBuf>;
}

/// HTTP(S) fetcher with retry support
pub struct HttpFetcher {
    client: Client,
    cache_dir: PathBuf,
    max_retries: u32,
}

/// `dest_path` with `.part` appended to its file name
fn part_path(dest_path: &Path) -> PathBuf {
    let mut name = dest_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn write_then_rename(body: &mut impl Read, temp_path: &Path, dest_path: &Path) -> Result<()> {
    let mut file = File::create(temp_path).map_err(|e| {
        Error::IoError(format!("Failed to create file {}: {}", temp_path.display(), e))
    })?;
    io::copy(body, &mut file)
        .map_err(|e| Error::IoError(format!("Failed to write downloaded data: {}", e)))?;
    fs::rename(temp_path, dest_path).map_err(|e| {
        Error::IoError(format!(
            "Failed to move {} to {}: {}",
            temp_path.display(),
            dest_path.display(),
            e
        ))
    })
}

/// Copy `body` into `dest_path` through a `.part` file
///
/// The `.part` file is removed on any failure, so a partial download never
/// survives in the cache.
fn store(body: &mut impl Read, dest_path: &Path) -> Result<()> {
    let temp_path = part_path(dest_path);
    let result = write_then_rename(body, &temp_path, dest_path);
    if result.is_err() && temp_path.exists() {
        if let Err(e) = fs::remove_file(&temp_path) {
            warn!("Failed to remove {}: {}", temp_path.display(), e);
        }
    }
    result
}

impl HttpFetcher {
    /// Create a fetcher downloading into `config.cache_dir`
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| Error::DownloadError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            cache_dir: config.cache_dir.clone(),
            max_retries: config.fetch_retries.max(1),
        })
    }

    /// Local file name for a URI: its last path segment
    fn cache_name(uri: &str) -> Result<&str> {
        let trimmed = uri.split(['?', '#']).next().unwrap_or(uri);
        match trimmed.rsplit('/').next() {
            Some(name) if !name.is_empty() => Ok(name),
            _ => Err(Error::DownloadError(format!("No file name in URI: {}", uri))),
        }
    }

    fn download(&self, uri: &str, dest_path: &Path) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(uri).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            uri
                        )));
                    }

                    store(&mut response, dest_path)?;
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download after {} attempts: {}",
                            attempt, e
                        )));
                    }
                    warn!("Download attempt {} failed: {}, retrying...", attempt, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, uri: &str) -> Result<PathBuf> {
        if !is_remote(uri) {
            return Err(Error::InvalidArgument("uri"));
        }
        if uri.starts_with("ftp://") {
            return Err(Error::DownloadError(format!(
                "FTP is not supported, use an http(s) mirror: {}",
                uri
            )));
        }

        fs::create_dir_all(&self.cache_dir).map_err(|e| {
            Error::IoError(format!(
                "Failed to create directory {}: {}",
                self.cache_dir.display(),
                e
            ))
        })?;

        let dest_path = self.cache_dir.join(Self::cache_name(uri)?);
        info!("Fetching {} to {}", uri, dest_path.display());
        self.download(uri, &dest_path)?;
        Ok(dest_path)
    }
}
