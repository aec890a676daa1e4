//! Configuration resolution for a survey run.
//!
//! Every tunable follows a three-tier priority:
//!
//! 1. **Parameter** - Explicitly provided command-line value (highest priority)
//! 2. **Environment Variable** - Value from environment variable
//! 3. **Default** - Built-in default value (lowest priority)
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_CONNECT_TIMEOUT` | 30s | Connection and handshake timeout in seconds |
//! | `SSH_COMMAND_TIMEOUT` | 180s | Per-command execution timeout in seconds |
//! | `SSH_MAX_RETRIES` | 0 | Retry attempts for transient connection errors |
//! | `SSH_RETRY_DELAY_MS` | 1000ms | Initial retry delay in milliseconds |
//! | `SSH_COMPRESSION` | true | Enable zlib compression |
//! | `SURVEY_CONCURRENCY` | 1 | Hosts inspected at the same time |
//! | `SURVEY_WORK_DIR` | `~/bw/` | Remote directory inspected on every host |
//! | `SURVEY_HOST_KEY_POLICY` | accept-any | Host key verification policy |

use std::env;
use std::time::Duration;

use crate::survey::error::ConfigError;
use crate::survey::session::HostKeyPolicy;

/// Default SSH connection timeout in seconds
pub(crate) const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default SSH command execution timeout in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 180;

/// Connection failures are reported, not retried, unless asked for
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 0;

/// Default retry delay in milliseconds
pub(crate) const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// One host at a time
pub(crate) const DEFAULT_CONCURRENCY: usize = 1;

/// Remote directory inspected on every host
pub const DEFAULT_WORK_DIR: &str = "~/bw/";

/// Maximum retry delay cap
pub(crate) const MAX_RETRY_DELAY: Duration = Duration::from_secs(10);

pub(crate) const CONNECT_TIMEOUT_ENV_VAR: &str = "SSH_CONNECT_TIMEOUT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_COMMAND_TIMEOUT";
pub(crate) const MAX_RETRIES_ENV_VAR: &str = "SSH_MAX_RETRIES";
pub(crate) const RETRY_DELAY_MS_ENV_VAR: &str = "SSH_RETRY_DELAY_MS";
pub(crate) const COMPRESSION_ENV_VAR: &str = "SSH_COMPRESSION";
pub(crate) const CONCURRENCY_ENV_VAR: &str = "SURVEY_CONCURRENCY";
pub(crate) const WORK_DIR_ENV_VAR: &str = "SURVEY_WORK_DIR";
pub(crate) const HOST_KEY_POLICY_ENV_VAR: &str = "SURVEY_HOST_KEY_POLICY";

/// Read and parse an environment variable, ignoring unset or unparsable values.
fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

/// Resolve the connection timeout with priority: parameter -> env var -> default
pub fn resolve_connect_timeout(timeout_param: Option<u64>) -> Duration {
    let secs = timeout_param
        .or_else(|| env_parsed(CONNECT_TIMEOUT_ENV_VAR))
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Resolve the command timeout with priority: parameter -> env var -> default
pub fn resolve_command_timeout(timeout_param: Option<u64>) -> Duration {
    let secs = timeout_param
        .or_else(|| env_parsed(COMMAND_TIMEOUT_ENV_VAR))
        .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS);
    Duration::from_secs(secs)
}

/// Resolve the max retries value with priority: parameter -> env var -> default
pub fn resolve_max_retries(max_retries_param: Option<u32>) -> u32 {
    max_retries_param
        .or_else(|| env_parsed(MAX_RETRIES_ENV_VAR))
        .unwrap_or(DEFAULT_MAX_RETRIES)
}

/// Resolve the retry delay with priority: parameter -> env var -> default
pub fn resolve_retry_delay(retry_delay_param: Option<u64>) -> Duration {
    let ms = retry_delay_param
        .or_else(|| env_parsed(RETRY_DELAY_MS_ENV_VAR))
        .unwrap_or(DEFAULT_RETRY_DELAY_MS);
    Duration::from_millis(ms)
}

/// Resolve the compression setting with priority: parameter -> env var -> default (true)
pub fn resolve_compression(compress_param: Option<bool>) -> bool {
    if let Some(compress) = compress_param {
        return compress;
    }

    if let Ok(env_compress) = env::var(COMPRESSION_ENV_VAR) {
        return env_compress.eq_ignore_ascii_case("true") || env_compress == "1";
    }

    true
}

/// Resolve the concurrency limit. Zero is raised to one.
pub fn resolve_concurrency(concurrency_param: Option<usize>) -> usize {
    concurrency_param
        .or_else(|| env_parsed(CONCURRENCY_ENV_VAR))
        .unwrap_or(DEFAULT_CONCURRENCY)
        .max(1)
}

/// Resolve the remote working directory.
pub fn resolve_work_dir(work_dir_param: Option<String>) -> String {
    work_dir_param
        .or_else(|| env::var(WORK_DIR_ENV_VAR).ok())
        .filter(|dir| !dir.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_WORK_DIR.to_string())
}

/// Resolve the host key policy.
///
/// Unlike the numeric settings, an unparsable value is an error rather than
/// a fallback to the default.
pub fn resolve_host_key_policy(
    policy_param: Option<&str>,
) -> Result<HostKeyPolicy, ConfigError> {
    match policy_param
        .map(str::to_string)
        .or_else(|| env::var(HOST_KEY_POLICY_ENV_VAR).ok())
    {
        Some(raw) => raw.parse(),
        None => Ok(HostKeyPolicy::default()),
    }
}
