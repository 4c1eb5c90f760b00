// src/cache/network.rs

//! HTTP client for the signed directory/content cache
//!
//! Two services cooperate:
//!
//! - the content service stores blobs addressed by their SHA-512
//!   (`POST <cache_url>` answers the digest, `GET <cache_url>/<sha512>`
//!   returns the blob)
//! - the directory service maps a key to a list of signed entries
//!   (`GET`/`PUT <dir_url>/<key>`, JSON `[[metadata_json, signature], ...]`)
//!
//! Downloads only trust entries signed by a key from
//! `signature_certificate_list`. Uploads sign with the configured key file.

use super::signing::{CacheSigner, TrustedKeys};
use super::{CacheError, CacheResult, CacheTier, CachedPage, directory_key, index_key};
use crate::config::NetworkCacheConfig;
use crate::hash::{HashAlgorithm, hash_file, md5_hex, sha512_hex};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default timeout for cache requests (30 seconds)
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

struct Endpoints {
    dir_url: String,
    cache_url: String,
}

impl Endpoints {
    fn new(dir_url: Option<&String>, cache_url: Option<&String>) -> Option<Self> {
        Some(Self {
            dir_url: dir_url?.trim_end_matches('/').to_string(),
            cache_url: cache_url?.trim_end_matches('/').to_string(),
        })
    }

    fn directory(&self, key: &str) -> String {
        format!("{}/{}", self.dir_url, key)
    }

    fn content(&self, sha512: &str) -> String {
        format!("{}/{}", self.cache_url, sha512)
    }
}

/// Network cache client
pub struct NetworkCache {
    download: Option<Endpoints>,
    upload: Option<Endpoints>,
    trusted: TrustedKeys,
    signer: Option<CacheSigner>,
    dir_client: Client,
    cache_client: Client,
}

impl NetworkCache {
    /// Build a client from configuration
    ///
    /// Fails when TLS material or the signing key cannot be loaded.
    pub fn from_config(config: &NetworkCacheConfig) -> CacheResult<Self> {
        let signer = config
            .signature_private_key_file
            .as_deref()
            .map(CacheSigner::load)
            .transpose()?;

        Ok(Self {
            download: Endpoints::new(config.download_dir_url.as_ref(), config.download_cache_url.as_ref()),
            upload: Endpoints::new(config.upload_dir_url.as_ref(), config.upload_cache_url.as_ref()),
            trusted: TrustedKeys::from_base64(&config.signature_certificate_list),
            signer,
            dir_client: build_client(
                config.dir_ca_file.as_deref(),
                config.dir_cert_file.as_deref(),
                config.dir_key_file.as_deref(),
            )?,
            cache_client: build_client(
                config.cache_ca_file.as_deref(),
                config.cache_cert_file.as_deref(),
                config.cache_key_file.as_deref(),
            )?,
        })
    }

    /// Last trusted entry under `key` matching `wanted` and carrying `required`
    fn select_entry(
        &self,
        endpoints: &Endpoints,
        key: &str,
        wanted: &[(&str, &str)],
        required: &[&str],
    ) -> CacheResult<Option<Map<String, Value>>> {
        let url = endpoints.directory(key);
        let response = self.dir_client.get(&url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{} does not exist in network cache directory", key);
            return Ok(None);
        }
        let entries: Vec<(String, String)> = check_status(&url, response)?.json()?;

        let mut selected = None;
        for (metadata, signature) in entries {
            if !self.trusted.verify(&metadata, &signature) {
                debug!("Ignoring entry under {} with an untrusted signature", key);
                continue;
            }
            let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(&metadata) else {
                debug!("Ignoring malformed entry under {}", key);
                continue;
            };
            let matches = wanted
                .iter()
                .all(|(k, v)| fields.get(*k).and_then(Value::as_str) == Some(*v))
                && required.iter().all(|k| fields.contains_key(*k));
            if matches {
                selected = Some(fields);
            }
        }
        Ok(selected)
    }

    fn content_response(&self, endpoints: &Endpoints, entry: &Map<String, Value>) -> CacheResult<(String, Response)> {
        let sha512 = entry
            .get("sha512")
            .and_then(Value::as_str)
            .ok_or_else(|| CacheError::Malformed("entry without sha512".to_string()))?
            .to_string();
        let url = endpoints.content(&sha512);
        let response = check_status(&url, self.cache_client.get(&url).send()?)?;
        Ok((sha512, response))
    }

    /// Store a blob and publish a signed directory entry for it
    fn publish(&self, key: &str, content: reqwest::blocking::Body, sha512: &str, mut metadata: BTreeMap<&str, String>) -> CacheResult<()> {
        let endpoints = self.upload.as_ref().ok_or(CacheError::NotConfigured("upload_dir_url"))?;
        let signer = self
            .signer
            .as_ref()
            .ok_or(CacheError::NotConfigured("signature_private_key_file"))?;

        let response = self.cache_client.post(&endpoints.cache_url).body(content).send()?;
        let stored = check_status(&endpoints.cache_url, response)?.text()?;
        if stored.trim() != sha512 {
            return Err(CacheError::ContentMismatch {
                expected: sha512.to_string(),
                actual: stored.trim().to_string(),
            });
        }

        metadata.insert("sha512", sha512.to_string());
        let metadata = serde_json::to_string(&metadata)?;
        let signature = signer.sign(&metadata);

        let url = endpoints.directory(key);
        let response = self
            .dir_client
            .put(&url)
            .json(&(metadata, signature))
            .send()?;
        check_status(&url, response)?;
        debug!("Published {} to network cache directory", key);
        Ok(())
    }
}

impl CacheTier for NetworkCache {
    fn can_download(&self) -> bool {
        self.download.is_some() && !self.trusted.is_empty()
    }

    fn can_upload(&self) -> bool {
        self.upload.is_some() && self.signer.is_some()
    }

    fn download_artifact(&self, url: &str, dest: &Path) -> CacheResult<bool> {
        let endpoints = self.download.as_ref().ok_or(CacheError::NotConfigured("download_dir_url"))?;
        let Some(entry) = self.select_entry(endpoints, &directory_key(url), &[], &["sha512"])? else {
            return Ok(false);
        };
        let (sha512, mut response) = self.content_response(endpoints, &entry)?;

        let parent = dest.parent().unwrap_or(Path::new("."));
        let mut temp = tempfile::NamedTempFile::new_in(parent)?;
        io::copy(&mut response, temp.as_file_mut())?;

        let actual = hash_file(HashAlgorithm::Sha512, temp.path())?;
        if actual.value != sha512 {
            return Err(CacheError::ContentMismatch {
                expected: sha512,
                actual: actual.value,
            });
        }
        temp.persist(dest).map_err(|e| CacheError::Io(e.error))?;
        Ok(true)
    }

    fn upload_artifact(&self, url: &str, path: &Path) -> CacheResult<()> {
        let sha512 = hash_file(HashAlgorithm::Sha512, path)?.value;
        let metadata = BTreeMap::from([
            ("file_name", cache_file_name(url)?),
            ("urlmd5", md5_hex(url)),
        ]);
        let body = reqwest::blocking::Body::from(fs::File::open(path)?);
        self.publish(&directory_key(url), body, &sha512, metadata)
    }

    fn download_index(&self, url: &str, requirement: &str) -> CacheResult<Option<CachedPage>> {
        let endpoints = self.download.as_ref().ok_or(CacheError::NotConfigured("download_dir_url"))?;
        let urlmd5 = md5_hex(url);
        let wanted = [("urlmd5", urlmd5.as_str()), ("requirement", requirement)];
        let Some(entry) = self.select_entry(endpoints, &index_key(url, requirement), &wanted, &["base", "sha512"])? else {
            return Ok(None);
        };
        let base = entry
            .get("base")
            .and_then(Value::as_str)
            .ok_or_else(|| CacheError::Malformed("index entry without base".to_string()))?
            .to_string();

        let (sha512, response) = self.content_response(endpoints, &entry)?;
        let content = response.bytes()?.to_vec();
        let actual = sha512_hex(&content);
        if actual != sha512 {
            return Err(CacheError::ContentMismatch { expected: sha512, actual });
        }
        Ok(Some(CachedPage { base, content }))
    }

    fn upload_index(&self, url: &str, requirement: &str, page: &CachedPage) -> CacheResult<()> {
        let sha512 = sha512_hex(&page.content);
        let metadata = BTreeMap::from([
            ("file", "file".to_string()),
            ("base", page.base.clone()),
            ("urlmd5", md5_hex(url)),
            ("requirement", requirement.to_string()),
        ]);
        let body = reqwest::blocking::Body::from(page.content.clone());
        self.publish(&index_key(url, requirement), body, &sha512, metadata)
    }
}

fn build_client(ca_file: Option<&Path>, cert_file: Option<&Path>, key_file: Option<&Path>) -> CacheResult<Client> {
    let mut builder = Client::builder().timeout(HTTP_TIMEOUT);

    if let Some(ca_file) = ca_file {
        let pem = fs::read(ca_file)?;
        builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
    }
    if let Some(cert_file) = cert_file {
        let mut pem = fs::read(cert_file)?;
        if let Some(key_file) = key_file {
            pem.push(b'\n');
            pem.extend(fs::read(key_file)?);
        }
        builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
    }

    Ok(builder.build()?)
}

fn check_status(url: &str, response: Response) -> CacheResult<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(CacheError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

/// File name recorded for an uploaded artifact
///
/// The last path segment; for URLs whose path ends in `/` the query or the
/// last directory name is used instead.
pub fn cache_file_name(url: &str) -> CacheResult<String> {
    let parsed = url::Url::parse(url).map_err(|e| CacheError::Malformed(format!("{url}: {e}")))?;
    let path = parsed.path();
    let name = match parsed.query() {
        Some(query) if path.ends_with('/') => query.split('?').next().unwrap_or(query),
        None if path.ends_with('/') => path.trim_end_matches('/').rsplit('/').next().unwrap_or(""),
        _ => path.rsplit('/').next().unwrap_or(""),
    };
    if name.is_empty() {
        return Err(CacheError::Malformed(format!("URL {url} produced no filename")));
    }
    Ok(name.to_string())
}

/// Default location for a generated cache signing key
pub fn default_key_path(dir: &Path) -> PathBuf {
    dir.join("network-cache.key")
}
