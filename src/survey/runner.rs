//! Visits every host in an inventory and records the results.
//!
//! Hosts are inspected with bounded concurrency; results are applied to the
//! document in input order regardless of completion order. A failed host is
//! recorded with a `survey_error` marker and the run continues, unless
//! `fail_fast` is set, in which case the first failure aborts the run.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::survey::auth::Credentials;
use crate::survey::error::{ConfigError, Result, SurveyError};
use crate::survey::inventory::{HostEntry, Inventory};
use crate::survey::remote::{Connector, RemoteSession};
use crate::survey::vcs::VcsResult;

/// Credentials applied to hosts that do not carry their own.
#[derive(Debug, Clone, Default)]
pub struct CredentialDefaults {
    pub key: Option<String>,
    pub password: Option<String>,
    /// Use the username as the password when nothing else is configured
    pub password_from_user: bool,
}

impl CredentialDefaults {
    /// Per-host fields first, then the run-wide key or password, then the
    /// username-as-password opt-in.
    pub fn resolve(&self, entry: &HostEntry) -> std::result::Result<Credentials, ConfigError> {
        if let Some(creds) = Credentials::from_parts(entry.password.clone(), entry.key.as_deref())
        {
            return Ok(creds);
        }
        if let Some(creds) = Credentials::from_parts(self.password.clone(), self.key.as_deref()) {
            return Ok(creds);
        }
        if self.password_from_user {
            return Ok(Credentials::Password(entry.user.clone()));
        }
        Err(ConfigError::MissingCredentials {
            host: entry.host.clone(),
            user: entry.user.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub work_dir: String,
    pub concurrency: usize,
    pub fail_fast: bool,
    pub credentials: CredentialDefaults,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.cancelled == 0
    }
}

async fn inspect_host(
    entry: &HostEntry,
    connector: Arc<dyn Connector>,
    options: &RunOptions,
    cancel: &CancellationToken,
) -> Result<VcsResult> {
    if cancel.is_cancelled() {
        return Err(SurveyError::Cancelled);
    }
    let credentials = options.credentials.resolve(entry)?;
    let session = RemoteSession::new(
        entry.host.clone(),
        entry.user.clone(),
        credentials,
        options.work_dir.clone(),
        connector,
    );
    session.inspect_until(cancel).await
}

/// Inspect every host and write the outcome into `inventory`.
///
/// Returns an error only for document problems (before any host is
/// contacted) or, with `fail_fast`, for the first failed host. In the latter
/// case the hosts still in flight are cancelled and their sessions closed
/// before the error is returned.
pub async fn survey(
    inventory: &mut Inventory,
    connector: Arc<dyn Connector>,
    options: &RunOptions,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let entries = inventory.host_entries()?;
    info!(
        "Surveying {} host(s) with concurrency {}",
        entries.len(),
        options.concurrency
    );

    // Cancelled on a fail-fast abort without touching the caller's token
    let run_cancel = cancel.child_token();
    let cancel = &run_cancel;

    let mut outcomes = futures::stream::iter(entries.into_iter().map(|(name, entry)| {
        let connector = connector.clone();
        async move {
            let outcome = inspect_host(&entry, connector, options, cancel).await;
            (name, entry, outcome)
        }
    }))
    .buffered(options.concurrency.max(1));

    let mut summary = RunSummary::default();
    let mut aborted: Option<SurveyError> = None;
    while let Some((name, entry, outcome)) = outcomes.next().await {
        // Draining after an abort: sessions close, outcomes are discarded
        if aborted.is_some() {
            continue;
        }
        match outcome {
            Ok(result) => {
                info!(
                    "{} ({}): {} branch \"{}\" at \"{}\"",
                    name, entry.host, result.kind, result.branch, result.revision
                );
                inventory.record_result(&name, &result);
                summary.succeeded += 1;
            }
            Err(SurveyError::Cancelled) => {
                warn!("{} ({}): cancelled", name, entry.host);
                inventory.record_error(&name, &SurveyError::Cancelled.to_string());
                summary.cancelled += 1;
            }
            Err(e) => {
                error!("{} ({}@{}): {}", name, entry.user, entry.host, e);
                if options.fail_fast {
                    warn!("Aborting survey, closing sessions still in flight");
                    run_cancel.cancel();
                    aborted = Some(e);
                    continue;
                }
                inventory.record_error(&name, &e.to_string());
                summary.failed += 1;
            }
        }
    }

    if let Some(e) = aborted {
        return Err(e);
    }

    info!(
        "Survey finished: {} succeeded, {} failed, {} cancelled",
        summary.succeeded, summary.failed, summary.cancelled
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(password: Option<&str>, key: Option<&str>) -> HostEntry {
        HostEntry {
            host: "10.0.0.5".into(),
            user: "deploy".into(),
            password: password.map(str::to_string),
            key: key.map(str::to_string),
        }
    }

    mod credential_resolution {
        use super::*;

        #[test]
        fn test_host_key_beats_global_password() {
            let defaults = CredentialDefaults {
                password: Some("global".into()),
                ..Default::default()
            };
            let creds = defaults.resolve(&entry(None, Some("/keys/web"))).unwrap();
            assert_eq!(creds, Credentials::Key(PathBuf::from("/keys/web")));
        }

        #[test]
        fn test_host_password_beats_global_key() {
            let defaults = CredentialDefaults {
                key: Some("/keys/global".into()),
                ..Default::default()
            };
            let creds = defaults.resolve(&entry(Some("pw"), None)).unwrap();
            assert_eq!(creds, Credentials::Password("pw".into()));
        }

        #[test]
        fn test_global_key_applies_to_bare_entries() {
            let defaults = CredentialDefaults {
                key: Some("/keys/global".into()),
                ..Default::default()
            };
            let creds = defaults.resolve(&entry(None, None)).unwrap();
            assert_eq!(creds, Credentials::Key(PathBuf::from("/keys/global")));
        }

        #[test]
        fn test_password_from_user_is_opt_in() {
            let defaults = CredentialDefaults {
                password_from_user: true,
                ..Default::default()
            };
            let creds = defaults.resolve(&entry(None, None)).unwrap();
            assert_eq!(creds, Credentials::Password("deploy".into()));
        }

        #[test]
        fn test_no_credentials_is_an_error() {
            let result = CredentialDefaults::default().resolve(&entry(None, None));
            assert!(matches!(
                result,
                Err(ConfigError::MissingCredentials { .. })
            ));
        }
    }

    mod summary {
        use super::*;

        #[test]
        fn test_all_succeeded() {
            let summary = RunSummary {
                succeeded: 3,
                ..Default::default()
            };
            assert!(summary.all_succeeded());
        }

        #[test]
        fn test_cancellation_is_not_success() {
            let summary = RunSummary {
                succeeded: 1,
                cancelled: 1,
                ..Default::default()
            };
            assert!(!summary.all_succeeded());
        }
    }
}
