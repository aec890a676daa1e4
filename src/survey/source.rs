//! Where the inventory comes from and where it is written back.
//!
//! - An `http://` or `https://` argument is fetched; the result is written to
//!   [`URL_OUTPUT_FILE`] in the working directory.
//! - Any other argument must be an existing file, which is overwritten.
//! - Without an argument, the working directory must contain exactly one
//!   `*.json` file.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::survey::error::ConfigError;
use crate::survey::inventory::Inventory;

/// File written when the inventory was fetched from a URL.
pub const URL_OUTPUT_FILE: &str = "info_from_url.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    File(PathBuf),
    Url(String),
    Discovered(PathBuf),
}

impl InputSource {
    /// Where the surveyed document is written.
    pub fn output_path(&self, dir: &Path) -> PathBuf {
        match self {
            InputSource::File(path) | InputSource::Discovered(path) => path.clone(),
            InputSource::Url(_) => dir.join(URL_OUTPUT_FILE),
        }
    }
}

fn is_url(arg: &str) -> bool {
    arg.starts_with("http://") || arg.starts_with("https://")
}

/// Pick the input source from the optional argument, searching `dir` when
/// none is given.
pub fn resolve_source(arg: Option<&str>, dir: &Path) -> Result<InputSource, ConfigError> {
    match arg {
        Some(url) if is_url(url) => Ok(InputSource::Url(url.to_string())),
        Some(path) => {
            let path = PathBuf::from(path);
            if path.is_file() {
                Ok(InputSource::File(path))
            } else {
                Err(ConfigError::MissingFile(path))
            }
        }
        None => discover(dir),
    }
}

fn discover(dir: &Path) -> Result<InputSource, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|source| ConfigError::Read {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    found.sort();

    match found.len() {
        0 => Err(ConfigError::NoJsonFound),
        1 => {
            let path = found.remove(0);
            info!("Found file {:?} in working directory {:?}", path, dir);
            Ok(InputSource::Discovered(path))
        }
        _ => Err(ConfigError::AmbiguousJson(
            found
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect(),
        )),
    }
}

/// Options for fetching an inventory over HTTP.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// Accept invalid TLS certificates
    pub insecure: bool,
}

/// Load and validate the inventory.
pub async fn load(source: &InputSource, fetch: FetchOptions) -> Result<Inventory, ConfigError> {
    let document = match source {
        InputSource::File(path) | InputSource::Discovered(path) => read_file(path).await?,
        InputSource::Url(url) => fetch_url(url, fetch).await?,
    };
    let inventory = Inventory::from_value(document)?;
    info!("Inventory parsed with {} host(s)", inventory.len());
    Ok(inventory)
}

async fn read_file(path: &Path) -> Result<Value, ConfigError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::NotJsonFile {
        path: path.to_path_buf(),
        source,
    })
}

async fn fetch_url(url: &str, options: FetchOptions) -> Result<Value, ConfigError> {
    info!("Receiving data from {}", url);
    let fetch_error = |source| ConfigError::Fetch {
        url: url.to_string(),
        source,
    };

    let client = reqwest::Client::builder()
        .danger_accept_invalid_certs(options.insecure)
        .build()
        .map_err(fetch_error)?;
    let body = client
        .get(url)
        .send()
        .await
        .map_err(fetch_error)?
        .text()
        .await
        .map_err(fetch_error)?;

    serde_json::from_str(&body).map_err(|source| ConfigError::NotJsonUrl {
        url: url.to_string(),
        source,
    })
}

/// Write the document as pretty JSON.
pub async fn write_document(path: &Path, inventory: &Inventory) -> Result<(), ConfigError> {
    let write_error = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut text = serde_json::to_string_pretty(inventory.as_value())
        .map_err(|e| write_error(std::io::Error::other(e)))?;
    text.push('\n');
    tokio::fs::write(path, text).await.map_err(write_error)?;
    info!("Wrote info to {:?}", path);
    Ok(())
}
