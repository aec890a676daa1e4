//! SSH client connection, authentication and command execution.
//!
//! ## Connection Lifecycle
//!
//! 1. **Address Parsing**: `host` or `host:port`, default port 22.
//! 2. **Name Resolution**: failures are reported as [`ConnectError::Resolve`].
//! 3. **Transport**: TCP connect plus SSH handshake, both bounded by the
//!    connect timeout ([`ConnectError::Timeout`]).
//! 4. **Authentication**: exactly one mechanism from [`Credentials`].
//! 5. **Command Execution**: one channel per command, stdout and stderr
//!    collected separately, bounded by the command timeout.
//!
//! ## Retry Strategy
//!
//! Connection attempts can be retried with exponential backoff and jitter via
//! the `backon` crate. The default is zero retries. Only failures for which
//! [`ConnectError::is_retryable`] holds are retried.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use russh::{ChannelMsg, Disconnect, client};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use crate::survey::auth::{Credentials, KeyAuth};
use crate::survey::config::MAX_RETRY_DELAY;
use crate::survey::error::{ConfigError, ConnectError, ExecError};
use crate::survey::remote::{CommandOutput, Connector, RemoteExec};
use crate::survey::session::{HostKeyPolicy, SshClientHandler};

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Settings shared by every connection in a run.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub compress: bool,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts: PathBuf,
}

/// Build russh client configuration.
///
/// The inactivity timeout is the command timeout so that a silent but
/// still-running command is not mistaken for a dead connection.
pub(crate) fn build_client_config(timeout: Duration, compress: bool) -> Arc<client::Config> {
    let compression = if compress {
        (&[russh::compression::ZLIB, russh::compression::NONE][..]).into()
    } else {
        (&[russh::compression::NONE][..]).into()
    };

    let preferred = russh::Preferred {
        compression,
        ..Default::default()
    };

    Arc::new(client::Config {
        inactivity_timeout: Some(timeout),
        keepalive_interval: Some(Duration::from_secs(30)),
        keepalive_max: 3,
        preferred,
        ..Default::default()
    })
}

/// Parse an address into host and port.
///
/// Supports `host`, `host:port` and `[v6]:port`. A bare IPv6 address keeps
/// the default port.
pub(crate) fn parse_address(address: &str) -> Result<(String, u16), ConfigError> {
    let bare_ipv6 = address.matches(':').count() > 1 && !address.starts_with('[');

    match address.rsplit_once(':') {
        Some((host, port_str)) if !bare_ipv6 => {
            let port = port_str
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidAddress {
                    address: address.to_string(),
                    reason: format!("Invalid port number: {}", e),
                })?;
            Ok((host.to_string(), port))
        }
        _ => Ok((address.to_string(), DEFAULT_SSH_PORT)),
    }
}

/// Map a russh handshake error onto the connection error taxonomy.
fn classify_handshake_error(host: &str, err: russh::Error) -> ConnectError {
    match err {
        russh::Error::UnknownKey => ConnectError::HostKeyRejected {
            host: host.to_string(),
        },
        russh::Error::IO(source) => ConnectError::Socket {
            host: host.to_string(),
            source,
        },
        other => ConnectError::Protocol {
            host: host.to_string(),
            reason: other.to_string(),
        },
    }
}

/// Connect with retry logic using exponential backoff with jitter.
///
/// Returns the handle and the number of retries that were needed.
pub(crate) async fn connect_to_ssh_with_retry(
    host: &str,
    port: u16,
    username: &str,
    credentials: &Credentials,
    options: &ConnectOptions,
) -> Result<(client::Handle<SshClientHandler>, u32), ConnectError> {
    let attempt_counter = AtomicU32::new(0);

    let backoff = ExponentialBuilder::default()
        .with_min_delay(options.retry_delay)
        .with_max_delay(MAX_RETRY_DELAY)
        .with_max_times(options.max_retries as usize)
        .with_jitter();

    let result = (|| async {
        let current_attempt = attempt_counter.fetch_add(1, Ordering::SeqCst);

        if current_attempt > 0 {
            warn!(
                "SSH connection retry attempt {} to {}@{}",
                current_attempt, username, host
            );
        }

        connect_to_ssh(host, port, username, credentials, options).await
    })
    .retry(backoff)
    .when(|e: &ConnectError| e.is_retryable())
    .notify(|err: &ConnectError, dur: Duration| {
        warn!("SSH connection failed: {}. Retrying in {:?}", err, dur);
    })
    .await;

    let total_attempts = attempt_counter.load(Ordering::SeqCst);
    let retry_count = total_attempts.saturating_sub(1);

    match result {
        Ok(handle) => {
            if retry_count > 0 {
                info!(
                    "SSH connection to {}@{} succeeded after {} retry attempt(s)",
                    username, host, retry_count
                );
            }
            Ok((handle, retry_count))
        }
        Err(e) => {
            error!(
                "SSH connection to {}@{} failed after {} attempt(s): {}",
                username, host, total_attempts, e
            );
            Err(e)
        }
    }
}

/// Establish an SSH connection and authenticate.
async fn connect_to_ssh(
    host: &str,
    port: u16,
    username: &str,
    credentials: &Credentials,
    options: &ConnectOptions,
) -> Result<client::Handle<SshClientHandler>, ConnectError> {
    // A missing key is reported before touching the network
    if let Credentials::Key(path) = credentials {
        KeyAuth::new(path.clone()).load()?;
    }

    let lookup_host = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((lookup_host, port))
        .await
        .map_err(|source| ConnectError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ConnectError::Resolve {
            host: host.to_string(),
            source: std::io::Error::other("no addresses found"),
        });
    }

    let config = build_client_config(options.command_timeout, options.compress);
    let handler = SshClientHandler::new(
        options.host_key_policy,
        lookup_host,
        port,
        options.known_hosts.clone(),
    );

    let transport = async {
        let stream = TcpStream::connect(&addrs[..])
            .await
            .map_err(|source| ConnectError::Socket {
                host: host.to_string(),
                source,
            })?;
        client::connect_stream(config, stream, handler)
            .await
            .map_err(|e| classify_handshake_error(host, e))
    };

    let mut handle = tokio::time::timeout(options.connect_timeout, transport)
        .await
        .map_err(|_| ConnectError::Timeout {
            host: host.to_string(),
            timeout: options.connect_timeout,
        })??;

    let strategy = credentials.strategy();
    debug!("Authenticating {}@{} with {}", username, host, strategy.name());

    let authenticated = match strategy.authenticate(&mut handle, username).await {
        Ok(authenticated) => authenticated,
        Err(e) => {
            disconnect(&handle).await;
            return Err(e);
        }
    };

    if !authenticated {
        disconnect(&handle).await;
        return Err(ConnectError::AuthRejected {
            username: username.to_string(),
            mechanism: strategy.name(),
        });
    }

    Ok(handle)
}

async fn disconnect(handle: &client::Handle<SshClientHandler>) {
    if let Err(e) = handle
        .disconnect(Disconnect::ByApplication, "Session closed", "en")
        .await
    {
        debug!("Disconnect reported an error: {}", e);
    }
}

/// Execute a command on an SSH session with timeout support.
///
/// On timeout the partial output is returned with `timed_out: true` and the
/// channel is closed, leaving the connection usable.
pub(crate) async fn execute_ssh_command(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, ExecError> {
    let mut channel = handle
        .channel_open_session()
        .await
        .map_err(|e| ExecError {
            command: command.to_string(),
            reason: format!("Failed to open channel: {}", e),
        })?;

    channel.exec(true, command).await.map_err(|e| ExecError {
        command: command.to_string(),
        reason: e.to_string(),
    })?;

    let mut stdout = Vec::with_capacity(4096);
    let mut stderr = Vec::with_capacity(1024);
    let mut exit_code: Option<u32> = None;

    let result = tokio::time::timeout(timeout, async {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    // ext == 1 is stderr in SSH protocol
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = Some(exit_status);
                }
                Some(ChannelMsg::Eof) => {
                    if exit_code.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    })
    .await;

    let timed_out = result.is_err();
    if timed_out {
        warn!(
            "Command timed out after {:?}, returning partial output ({} bytes stdout, {} bytes stderr)",
            timeout,
            stdout.len(),
            stderr.len()
        );
    }

    let _ = channel.close().await;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
        timed_out,
    })
}

/// An authenticated russh connection.
pub struct SshExec {
    handle: client::Handle<SshClientHandler>,
    command_timeout: Duration,
    closed: bool,
}

#[async_trait]
impl RemoteExec for SshExec {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput, ExecError> {
        if self.closed {
            return Err(ExecError {
                command: command.to_string(),
                reason: "session is closed".to_string(),
            });
        }
        execute_ssh_command(&self.handle, command, self.command_timeout).await
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            disconnect(&self.handle).await;
        }
    }
}

/// Opens real SSH connections.
pub struct SshConnector {
    options: ConnectOptions,
}

impl SshConnector {
    pub fn new(options: ConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        address: &str,
        username: &str,
        credentials: &Credentials,
    ) -> Result<Box<dyn RemoteExec>, ConnectError> {
        let (host, port) = parse_address(address).map_err(|e| ConnectError::Protocol {
            host: address.to_string(),
            reason: e.to_string(),
        })?;

        let (handle, _retries) =
            connect_to_ssh_with_retry(&host, port, username, credentials, &self.options).await?;

        Ok(Box::new(SshExec {
            handle,
            command_timeout: self.options.command_timeout,
            closed: false,
        }))
    }
}
