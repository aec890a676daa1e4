//! Remote session lifecycle and VCS inspection.
//!
//! A [`RemoteSession`] describes one host and its credentials and does no
//! I/O until it is opened. [`RemoteSession::open`] connects and authenticates
//! and returns an [`OpenSession`], which is the only way to run commands.
//! `OpenSession::close` consumes the session, so a closed session cannot be
//! used again. Dropping an `OpenSession` without closing it drops the
//! transport, which also tears the connection down.
//!
//! [`RemoteSession::inspect`] runs the whole scoped operation: open, detect
//! the VCS kind, query branch and revision, then close on every exit path.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::survey::auth::Credentials;
use crate::survey::error::{ConnectError, DetectError, ExecError, Result, SurveyError};
use crate::survey::vcs::{
    VcsCommands, VcsKind, VcsResult, VcsState, in_work_dir, quote_path, strip_newlines,
};

/// Output of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` if the server never reported an exit status
    pub exit_code: Option<u32>,
    pub timed_out: bool,
}

/// An open, authenticated connection able to run shell commands.
#[async_trait]
pub trait RemoteExec: Send {
    async fn exec(&mut self, command: &str) -> std::result::Result<CommandOutput, ExecError>;

    /// Release the transport. Calling it more than once is a no-op.
    async fn close(&mut self);
}

/// Opens connections to hosts.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        address: &str,
        username: &str,
        credentials: &Credentials,
    ) -> std::result::Result<Box<dyn RemoteExec>, ConnectError>;
}

/// Connection parameters for one host. Constructing it does no I/O.
pub struct RemoteSession {
    host: String,
    username: String,
    credentials: Credentials,
    work_dir: String,
    connector: Arc<dyn Connector>,
}

impl RemoteSession {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        credentials: Credentials,
        work_dir: impl Into<String>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            credentials,
            work_dir: work_dir.into(),
            connector,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn work_dir(&self) -> &str {
        &self.work_dir
    }

    /// Connect and authenticate.
    pub async fn open(&self) -> std::result::Result<OpenSession<'_>, ConnectError> {
        info!(
            "Connecting to host \"{}\" with user \"{}\" using {}",
            self.host,
            self.username,
            self.credentials.mechanism()
        );

        let transport = self
            .connector
            .connect(&self.host, &self.username, &self.credentials)
            .await?;

        info!("Connected to {}", self.host);
        Ok(OpenSession {
            session: self,
            transport,
            vcs: VcsState::Undetermined,
            closed: false,
        })
    }

    /// Open, inspect and close.
    pub async fn inspect(&self) -> Result<VcsResult> {
        self.inspect_until(&CancellationToken::new()).await
    }

    /// Like [`inspect`](Self::inspect), but stops early when `cancel` fires.
    ///
    /// The transport is closed before this returns, whichever way it ends.
    pub async fn inspect_until(&self, cancel: &CancellationToken) -> Result<VcsResult> {
        let mut open = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SurveyError::Cancelled),
            opened = self.open() => opened?,
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SurveyError::Cancelled),
            inspected = open.inspect() => inspected,
        };

        open.close().await;
        result
    }
}

/// A connected session. See the module docs for the lifecycle.
pub struct OpenSession<'a> {
    session: &'a RemoteSession,
    transport: Box<dyn RemoteExec>,
    vcs: VcsState,
    closed: bool,
}

impl OpenSession<'_> {
    pub fn vcs_state(&self) -> VcsState {
        self.vcs
    }

    /// Detect which VCS manages the working directory.
    ///
    /// The kind is fixed once detected; later calls return it without
    /// touching the remote host. On failure the transport is released.
    pub async fn detect_vcs_kind(&mut self) -> Result<VcsKind> {
        if let VcsState::Detected(kind) = self.vcs {
            return Ok(kind);
        }
        if self.closed {
            return Err(DetectError::NotDetected.into());
        }

        let listing = format!("ls -a {}", quote_path(&self.session.work_dir));
        let output = match self.transport.exec(&listing).await {
            Ok(output) => output,
            Err(e) => {
                self.release().await;
                return Err(e.into());
            }
        };

        match classify_listing(
            &output.stdout,
            &output.stderr,
            &self.session.work_dir,
            &self.session.username,
        ) {
            Ok(kind) => {
                debug!("Detected {} in {} on {}", kind, self.session.work_dir, self.session.host);
                self.vcs = VcsState::Detected(kind);
                Ok(kind)
            }
            Err(e) => {
                debug!("{} on {}", e, self.session.host);
                self.release().await;
                Err(e.into())
            }
        }
    }

    /// Read branch and revision. Requires a detected VCS kind.
    ///
    /// The two commands run independently. A failing command usually yields
    /// an empty string rather than an error; that value is recorded as is.
    pub async fn query_branch_and_revision(&mut self) -> Result<VcsResult> {
        let kind = self.vcs.kind().ok_or(DetectError::NotDetected)?;
        let commands = VcsCommands::for_kind(kind);

        info!("Retrieving {} data from {}", kind, self.session.host);
        let branch = self.capture(commands.branch).await?;
        let revision = self.capture(commands.revision).await?;

        Ok(VcsResult {
            kind,
            branch,
            revision,
        })
    }

    /// Detect, then query.
    pub async fn inspect(&mut self) -> Result<VcsResult> {
        self.detect_vcs_kind().await?;
        self.query_branch_and_revision().await
    }

    /// Release the connection.
    pub async fn close(mut self) {
        self.release().await;
    }

    async fn capture(&mut self, command: &str) -> std::result::Result<String, ExecError> {
        let output = self
            .transport
            .exec(&in_work_dir(&self.session.work_dir, command))
            .await?;

        let value = strip_newlines(&output.stdout);
        if value.is_empty() || !output.stderr.trim().is_empty() || output.timed_out {
            warn!(
                "`{}` on {} gave {:?} (stderr: {:?}, timed out: {})",
                command,
                self.session.host,
                value,
                output.stderr.trim(),
                output.timed_out
            );
        }
        Ok(value)
    }

    async fn release(&mut self) {
        if !self.closed {
            self.closed = true;
            self.transport.close().await;
            debug!("Closed session to {}", self.session.host);
        }
    }
}

impl Drop for OpenSession<'_> {
    fn drop(&mut self) {
        if !self.closed {
            debug!(
                "Session to {} dropped without close; transport released on drop",
                self.session.host
            );
        }
    }
}

/// Decide the VCS kind from a directory listing.
///
/// `.svn` wins over `.git`. Without either, stderr decides the error:
/// a permission problem, a missing directory or silence (no VCS), or
/// anything else verbatim.
pub fn classify_listing(
    stdout: &str,
    stderr: &str,
    work_dir: &str,
    username: &str,
) -> std::result::Result<VcsKind, DetectError> {
    let has = |name: &str| stdout.lines().any(|line| line.trim_end_matches('\r') == name);

    if has(".svn") {
        return Ok(VcsKind::Subversion);
    }
    if has(".git") {
        return Ok(VcsKind::Git);
    }

    if stderr.contains("Permission denied") {
        Err(DetectError::PermissionDenied {
            work_dir: work_dir.to_string(),
            username: username.to_string(),
        })
    } else if stderr.contains("No such file or directory") || stderr.trim().is_empty() {
        Err(DetectError::NoVcs {
            work_dir: work_dir.to_string(),
        })
    } else {
        Err(DetectError::Shell(stderr.trim().to_string()))
    }
}
