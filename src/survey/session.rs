//! russh client handler and host key policy.
//!
//! # Host key policies
//!
//! - `AcceptAny`: accepts all server keys without verification, similar to
//!   `StrictHostKeyChecking=no` in OpenSSH. This is the default and offers
//!   no protection against man-in-the-middle attacks.
//! - `AcceptNew`: accepts and records unknown keys in known_hosts, rejects
//!   keys that changed (`StrictHostKeyChecking=accept-new`).
//! - `Strict`: only accepts keys already recorded in known_hosts.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use russh::{client, keys};
use tracing::{info, warn};

use crate::survey::error::ConfigError;

/// Default location of the known_hosts file.
pub const DEFAULT_KNOWN_HOSTS: &str = "~/.ssh/known_hosts";

/// Host key verification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    #[default]
    AcceptAny,
    AcceptNew,
    Strict,
}

impl FromStr for HostKeyPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept-any" | "accept_any" | "no" => Ok(HostKeyPolicy::AcceptAny),
            "accept-new" | "accept_new" => Ok(HostKeyPolicy::AcceptNew),
            "strict" | "yes" => Ok(HostKeyPolicy::Strict),
            _ => Err(ConfigError::InvalidHostKeyPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostKeyPolicy::AcceptAny => "accept-any",
            HostKeyPolicy::AcceptNew => "accept-new",
            HostKeyPolicy::Strict => "strict",
        };
        f.write_str(name)
    }
}

/// What to do with a server key, given what known_hosts says about it.
///
/// `known` is `Ok(true)` for a recorded matching key, `Ok(false)` for an
/// unknown host, and `Err` for a changed key or an unreadable file.
pub(crate) fn host_key_decision<E>(policy: HostKeyPolicy, known: Result<bool, E>) -> KeyDecision {
    match (policy, known) {
        (HostKeyPolicy::AcceptAny, _) => KeyDecision::Accept,
        (_, Ok(true)) => KeyDecision::Accept,
        (HostKeyPolicy::AcceptNew, Ok(false)) => KeyDecision::AcceptAndLearn,
        (HostKeyPolicy::Strict, Ok(false)) => KeyDecision::Reject,
        (_, Err(_)) => KeyDecision::Reject,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyDecision {
    Accept,
    AcceptAndLearn,
    Reject,
}

/// Client handler for russh that applies a [`HostKeyPolicy`].
pub struct SshClientHandler {
    pub(crate) policy: HostKeyPolicy,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) known_hosts: PathBuf,
}

impl SshClientHandler {
    pub fn new(policy: HostKeyPolicy, host: &str, port: u16, known_hosts: PathBuf) -> Self {
        Self {
            policy,
            host: host.to_string(),
            port,
            known_hosts,
        }
    }
}

impl SshClientHandler {
    /// Apply the policy to a server key, recording it when the policy allows.
    pub(crate) fn accepts(&self, server_public_key: &keys::PublicKey) -> bool {
        if self.policy == HostKeyPolicy::AcceptAny {
            return true;
        }

        let known = keys::check_known_hosts_path(
            &self.host,
            self.port,
            server_public_key,
            &self.known_hosts,
        );
        if let Err(e) = &known {
            warn!("Host key check for {}:{} failed: {}", self.host, self.port, e);
        }

        match host_key_decision(self.policy, known) {
            KeyDecision::Accept => true,
            KeyDecision::AcceptAndLearn => {
                info!(
                    "Recording new host key for {}:{} in {:?}",
                    self.host, self.port, self.known_hosts
                );
                if let Err(e) = keys::known_hosts::learn_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    &self.known_hosts,
                ) {
                    warn!("Failed to record host key for {}: {}", self.host, e);
                }
                true
            }
            KeyDecision::Reject => {
                warn!(
                    "Rejecting host key for {}:{} under policy {}",
                    self.host, self.port, self.policy
                );
                false
            }
        }
    }
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(self.accepts(server_public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod policy_parsing {
        use super::*;

        #[test]
        fn test_parses_all_names() {
            assert_eq!("accept-any".parse::<HostKeyPolicy>().unwrap(), HostKeyPolicy::AcceptAny);
            assert_eq!("accept-new".parse::<HostKeyPolicy>().unwrap(), HostKeyPolicy::AcceptNew);
            assert_eq!("strict".parse::<HostKeyPolicy>().unwrap(), HostKeyPolicy::Strict);
        }

        #[test]
        fn test_parsing_is_case_insensitive() {
            assert_eq!("STRICT".parse::<HostKeyPolicy>().unwrap(), HostKeyPolicy::Strict);
        }

        #[test]
        fn test_rejects_unknown_name() {
            assert!("maybe".parse::<HostKeyPolicy>().is_err());
        }

        #[test]
        fn test_display_round_trips() {
            for policy in [
                HostKeyPolicy::AcceptAny,
                HostKeyPolicy::AcceptNew,
                HostKeyPolicy::Strict,
            ] {
                assert_eq!(policy.to_string().parse::<HostKeyPolicy>().unwrap(), policy);
            }
        }
    }

    mod decisions {
        use super::*;

        #[test]
        fn test_accept_any_ignores_known_hosts() {
            assert_eq!(
                host_key_decision::<()>(HostKeyPolicy::AcceptAny, Err(())),
                KeyDecision::Accept
            );
        }

        #[test]
        fn test_accept_new_learns_unknown_host() {
            assert_eq!(
                host_key_decision::<()>(HostKeyPolicy::AcceptNew, Ok(false)),
                KeyDecision::AcceptAndLearn
            );
        }

        #[test]
        fn test_accept_new_rejects_changed_key() {
            assert_eq!(
                host_key_decision(HostKeyPolicy::AcceptNew, Err("key changed")),
                KeyDecision::Reject
            );
        }

        #[test]
        fn test_strict_rejects_unknown_host() {
            assert_eq!(
                host_key_decision::<()>(HostKeyPolicy::Strict, Ok(false)),
                KeyDecision::Reject
            );
        }

        #[test]
        fn test_strict_accepts_known_host() {
            assert_eq!(
                host_key_decision::<()>(HostKeyPolicy::Strict, Ok(true)),
                KeyDecision::Accept
            );
        }
    }

    mod known_hosts_file {
        use super::*;

        const SERVER_KEY: &str =
            "AAAAC3NzaC1lZDI1NTE5AAAAIHewDJgoMeGwDDG1hhV4ewl7T7YXKoKpldO0uyWtpLR9";
        const OTHER_KEY: &str =
            "AAAAC3NzaC1lZDI1NTE5AAAAIC63kbteki3OmXvavZ374W7wA2/v/+ecC9DqiKVJIp8m";

        fn handler(policy: HostKeyPolicy, known_hosts: PathBuf) -> SshClientHandler {
            SshClientHandler::new(policy, "build.example", 2222, known_hosts)
        }

        fn key(base64: &str) -> keys::PublicKey {
            keys::parse_public_key_base64(base64).unwrap()
        }

        #[test]
        fn test_accept_new_records_then_recognizes_key() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("ssh").join("known_hosts");

            assert!(handler(HostKeyPolicy::AcceptNew, path.clone()).accepts(&key(SERVER_KEY)));
            assert!(path.is_file());
            assert!(handler(HostKeyPolicy::Strict, path).accepts(&key(SERVER_KEY)));
        }

        #[test]
        fn test_accept_new_rejects_changed_key() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");

            assert!(handler(HostKeyPolicy::AcceptNew, path.clone()).accepts(&key(SERVER_KEY)));
            assert!(!handler(HostKeyPolicy::AcceptNew, path).accepts(&key(OTHER_KEY)));
        }

        #[test]
        fn test_strict_rejects_unrecorded_host() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");

            assert!(!handler(HostKeyPolicy::Strict, path.clone()).accepts(&key(SERVER_KEY)));
            assert!(!path.exists());
        }

        #[test]
        fn test_accept_any_never_touches_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("known_hosts");

            assert!(handler(HostKeyPolicy::AcceptAny, path.clone()).accepts(&key(SERVER_KEY)));
            assert!(!path.exists());
        }
    }
}
