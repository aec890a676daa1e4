//! Error taxonomy for a survey run.
//!
//! Errors are split by where they happen, because each class is handled
//! differently by the runner:
//!
//! 1. **Configuration errors** ([`ConfigError`]): bad, missing or ambiguous
//!    input, malformed JSON, missing credentials. Reported before any network
//!    activity and fatal to the whole run when they concern the document.
//!
//! 2. **Connection errors** ([`ConnectError`]): key file, authentication,
//!    timeout, name resolution and socket failures for one host.
//!
//! 3. **Detection errors** ([`DetectError`]): no VCS, permission denied or an
//!    unexpected shell error while inspecting the working directory.
//!
//! # Retry classification
//!
//! [`ConnectError::is_retryable`] decides which connection failures are worth
//! another attempt. Authentication failures are never retried to avoid
//! account lockouts.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Local configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File \"{}\" does not exist or it's not a file!", .0.display())]
    MissingFile(PathBuf),

    #[error(
        "No JSON file found! Use -f /json/file/path (http://host/json_file) \
         or put the file.json in the working directory"
    )]
    NoJsonFound,

    #[error(
        "Found more than 1 .json file: {0:?}, please use argument -f /json/file/path \
         to specify necessary file"
    )]
    AmbiguousJson(Vec<String>),

    #[error("File \"{}\" is not in JSON format!", .path.display())]
    NotJsonFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Data received by url \"{url}\" is not in JSON format!")]
    NotJsonUrl {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Connection to \"{url}\" failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to read \"{}\": {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write \"{}\": {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Input document has no \"hosts\" object")]
    MissingHosts,

    #[error("Host entry \"{name}\" is missing string field \"{field}\"")]
    InvalidHostEntry { name: String, field: &'static str },

    #[error("No credentials for \"{user}@{host}\": provide a password or an SSH key")]
    MissingCredentials { host: String, user: String },

    #[error("Invalid host key policy \"{0}\" (expected accept-any, accept-new or strict)")]
    InvalidHostKeyPolicy(String),

    #[error("Invalid address \"{address}\": {reason}")]
    InvalidAddress { address: String, reason: String },
}

/// Per-host connection errors.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("SSH-KEY file exception for \"{}\": {reason}", .path.display())]
    KeyFile { path: PathBuf, reason: String },

    #[error("Authentication failed! {} for \"{username}\"", auth_failure_label(.mechanism))]
    AuthRejected {
        username: String,
        mechanism: &'static str,
    },

    #[error("{mechanism} authentication error: {reason}")]
    AuthFailed {
        mechanism: &'static str,
        reason: String,
    },

    #[error("Connection to \"{host}\" timed out after {timeout:?}. Host either wrong or down")]
    Timeout { host: String, timeout: Duration },

    #[error("Failed to resolve \"{host}\": {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to connect to \"{host}\": {source}")]
    Socket {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Host key for \"{host}\" was rejected by the host key policy")]
    HostKeyRejected { host: String },

    #[error("SSH protocol error with \"{host}\": {reason}")]
    Protocol { host: String, reason: String },
}

fn auth_failure_label(mechanism: &str) -> &'static str {
    if mechanism == "key" {
        "Key is invalid"
    } else {
        "Password failed"
    }
}

impl ConnectError {
    /// Whether another connection attempt could plausibly succeed.
    ///
    /// Only transient transport failures qualify. Credential, key file,
    /// host key and name resolution failures are permanent for a run.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConnectError::Timeout { .. } | ConnectError::Socket { .. })
    }
}

/// Per-host errors raised while detecting or querying the VCS.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("Permission denied to \"{work_dir}\" for user \"{username}\"")]
    PermissionDenied { work_dir: String, username: String },

    #[error("No VCS found in directory \"{work_dir}\"")]
    NoVcs { work_dir: String },

    #[error("{0}")]
    Shell(String),

    #[error("VCS kind has not been detected for this session")]
    NotDetected,
}

/// Failure to run a command on an open session.
#[derive(Debug, Error)]
#[error("Failed to execute \"{command}\": {reason}")]
pub struct ExecError {
    pub command: String,
    pub reason: String,
}

/// Any failure that ends the inspection of one host.
#[derive(Debug, Error)]
pub enum SurveyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Detect(#[from] DetectError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SurveyError>;
