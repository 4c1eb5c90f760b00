// src/index/client.rs

//! HTTP client for index pages and artifact downloads
//!
//! Wraps reqwest with retries on transport failures. `file://` URLs are
//! served from the local filesystem, directories rendered as a link
//! listing so local find-links behave like a web index.

use crate::error::{Error, Result};
use crate::hash::{Hash, verify_file};
use reqwest::blocking::Client;
use std::fs::{self, File};
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default timeout for HTTP requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum attempts for a failing request
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds, multiplied by the attempt number
const RETRY_DELAY_MS: u64 = 1000;

/// A fetched page, successful or not
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Page {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        self.content_type.to_lowercase().contains("html")
    }
}

/// HTTP client wrapper with retry support
pub struct IndexClient {
    client: Client,
    max_retries: u32,
}

impl IndexClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("eggsmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
        })
    }

    /// Fetch a page
    ///
    /// HTTP error statuses are returned as pages, not errors. Only
    /// transport failures that persist through every retry fail.
    pub fn fetch_page(&self, url: &str) -> Result<Page> {
        if url.starts_with("file:") {
            return open_local(url);
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(response) => {
                    let final_url = response.url().to_string();
                    let status = response.status().as_u16();
                    let content_type = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let body = response
                        .bytes()
                        .map_err(|e| Error::DownloadError(format!("Failed to read {url}: {e}")))?
                        .to_vec();
                    return Ok(Page {
                        url: final_url,
                        status,
                        content_type,
                        body,
                    });
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to fetch {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Fetch attempt {} of {} failed: {}, retrying...", attempt, url, e);
                    std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                }
            }
        }
    }

    /// Download `url` to `dest_path`, verifying `checksum` when given
    ///
    /// Content lands in a temporary file beside `dest_path` and is renamed
    /// into place only once complete and verified.
    pub fn download_file(&self, url: &str, dest_path: &Path, checksum: Option<&Hash>) -> Result<()> {
        info!("Downloading {}", url);

        let parent = dest_path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(parent)?;

        let mut attempt = 0;
        let temp = loop {
            attempt += 1;
            match self.client.get(url).send() {
                Ok(mut response) => {
                    if !response.status().is_success() {
                        return Err(Error::DownloadError(format!(
                            "HTTP {} from {}",
                            response.status(),
                            url
                        )));
                    }
                    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
                    match io::copy(&mut response, temp.as_file_mut()) {
                        Ok(_) => break temp,
                        Err(e) if attempt < self.max_retries => {
                            warn!("Download attempt {} of {} failed: {}, retrying...", attempt, url, e);
                        }
                        Err(e) => {
                            return Err(Error::DownloadError(format!(
                                "Failed to download {url} after {attempt} attempts: {e}"
                            )));
                        }
                    }
                }
                Err(e) => {
                    if attempt >= self.max_retries {
                        return Err(Error::DownloadError(format!(
                            "Failed to download {url} after {attempt} attempts: {e}"
                        )));
                    }
                    warn!("Download attempt {} of {} failed: {}, retrying...", attempt, url, e);
                }
            }
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
        };

        if let Some(expected) = checksum
            && let Err(mismatch) = verify_file(temp.path(), expected)?
        {
            return Err(Error::ChecksumMismatch {
                expected: mismatch.expected,
                actual: mismatch.actual,
            });
        }

        temp.persist(dest_path).map_err(|e| Error::Io(e.error))?;
        debug!("Downloaded {} to {}", url, dest_path.display());
        Ok(())
    }
}

/// Serve a `file://` URL as a page
///
/// A file is returned as is, a directory as its `index.html` or a
/// generated listing, anything else as a 404.
pub fn open_local(url: &str) -> Result<Page> {
    let parsed = Url::parse(url).map_err(|e| Error::ParseError(format!("{url}: {e}")))?;
    let path = parsed
        .to_file_path()
        .map_err(|()| Error::InvalidPath(url.to_string()))?;

    if path.is_file() {
        let is_html = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"));
        return Ok(Page {
            url: url.to_string(),
            status: 200,
            content_type: if is_html { "text/html" } else { "application/octet-stream" }.to_string(),
            body: fs::read(&path)?,
        });
    }

    if parsed.path().ends_with('/') && path.is_dir() {
        let index = path.join("index.html");
        let body = if index.is_file() {
            fs::read(&index)?
        } else {
            let mut names: Vec<String> = fs::read_dir(&path)?
                .filter_map(|e| e.ok())
                .map(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    if e.path().is_dir() { format!("{name}/") } else { name }
                })
                .collect();
            names.sort();
            let files: Vec<String> = names
                .iter()
                .map(|name| format!("<a href=\"{0}\">{0}</a>", urlencoding::encode(name).replace("%2F", "/")))
                .collect();
            format!(
                "<html><head><title>{url}</title></head><body>{}</body></html>",
                files.join("\n")
            )
            .into_bytes()
        };
        return Ok(Page {
            url: url.to_string(),
            status: 200,
            content_type: "text/html".to_string(),
            body,
        });
    }

    Ok(Page {
        url: url.to_string(),
        status: 404,
        content_type: "text/html".to_string(),
        body: b"Not found".to_vec(),
    })
}

/// Copy a local file to `dest_path`, verifying `checksum` when given
pub fn copy_local(src: &Path, dest_path: &Path, checksum: Option<&Hash>) -> Result<()> {
    let parent = dest_path.parent().unwrap_or(Path::new("."));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    io::copy(&mut File::open(src)?, temp.as_file_mut())?;
    if let Some(expected) = checksum
        && let Err(mismatch) = verify_file(temp.path(), expected)?
    {
        return Err(Error::ChecksumMismatch {
            expected: mismatch.expected,
            actual: mismatch.actual,
        });
    }
    temp.persist(dest_path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}
