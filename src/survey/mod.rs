//! Remote VCS survey over SSH.
//!
//! This module is organized into the following submodules:
//!
//! - `vcs`: VCS kinds, per-kind commands and results
//! - `config`: Configuration resolution with environment variable support
//! - `error`: Error taxonomy and retry classification
//! - `session`: russh client handler and host key policy
//! - `auth`: Password and key authentication
//! - `client`: SSH connection and command execution
//! - `remote`: Session lifecycle and VCS detection
//! - `inventory`: The host inventory document
//! - `source`: Input discovery, loading and write-back
//! - `runner`: Per-host orchestration

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod inventory;
pub mod remote;
pub mod runner;
pub mod session;
pub mod source;
pub mod vcs;

pub use client::{ConnectOptions, SshConnector};
pub use error::SurveyError;
pub use inventory::{HostEntry, Inventory};
pub use remote::{CommandOutput, Connector, OpenSession, RemoteExec, RemoteSession};
pub use runner::{CredentialDefaults, RunOptions, RunSummary, survey};
pub use vcs::{VcsKind, VcsResult};
