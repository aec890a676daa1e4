#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use vcs_survey::survey::config::{
    resolve_command_timeout, resolve_compression, resolve_concurrency, resolve_connect_timeout,
    resolve_host_key_policy, resolve_max_retries, resolve_retry_delay, resolve_work_dir,
};
use vcs_survey::survey::session::DEFAULT_KNOWN_HOSTS;
use vcs_survey::survey::source::{self, FetchOptions};
use vcs_survey::survey::{ConnectOptions, CredentialDefaults, RunOptions, SshConnector, survey};

/// Record the checked-out branch and revision of every host in a JSON inventory.
#[derive(Parser)]
#[command(name = "vcs-survey", version)]
struct Cli {
    /// JSON file path, could be url (http://host/json_file)
    #[arg(short, long)]
    file: Option<String>,

    /// Path to SSH-key file to connect to hosts
    #[arg(short, long)]
    key: Option<String>,

    /// Environment variable holding the password for hosts without their own credentials
    #[arg(long, value_name = "VAR")]
    password_env: Option<String>,

    /// Use each host's username as its password when no other credentials are set
    #[arg(long)]
    password_from_user: bool,

    /// Remote directory to inspect (default: ~/bw/, env: SURVEY_WORK_DIR)
    #[arg(long)]
    work_dir: Option<String>,

    /// Hosts inspected at the same time (default: 1, env: SURVEY_CONCURRENCY)
    #[arg(short = 'j', long)]
    concurrency: Option<usize>,

    /// Abort on the first failed host instead of recording the error
    #[arg(long)]
    fail_fast: bool,

    /// Connection timeout in seconds (default: 30, env: SSH_CONNECT_TIMEOUT)
    #[arg(long)]
    connect_timeout: Option<u64>,

    /// Per-command timeout in seconds (default: 180, env: SSH_COMMAND_TIMEOUT)
    #[arg(long)]
    command_timeout: Option<u64>,

    /// Retries for transient connection failures (default: 0, env: SSH_MAX_RETRIES)
    #[arg(long)]
    max_retries: Option<u32>,

    /// Initial retry delay in milliseconds (default: 1000, env: SSH_RETRY_DELAY_MS)
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Enable zlib compression (default: true, env: SSH_COMPRESSION)
    #[arg(long)]
    compress: Option<bool>,

    /// Host key policy: accept-any, accept-new or strict (env: SURVEY_HOST_KEY_POLICY)
    #[arg(long)]
    host_key_policy: Option<String>,

    /// known_hosts file used by the accept-new and strict policies
    #[arg(long, default_value = DEFAULT_KNOWN_HOSTS)]
    known_hosts: String,

    /// Accept invalid TLS certificates when fetching the inventory from a URL
    #[arg(long)]
    insecure: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    info!("########## Survey starting");

    let connect_options = ConnectOptions {
        connect_timeout: resolve_connect_timeout(cli.connect_timeout),
        command_timeout: resolve_command_timeout(cli.command_timeout),
        max_retries: resolve_max_retries(cli.max_retries),
        retry_delay: resolve_retry_delay(cli.retry_delay_ms),
        compress: resolve_compression(cli.compress),
        host_key_policy: resolve_host_key_policy(cli.host_key_policy.as_deref())?,
        known_hosts: PathBuf::from(shellexpand::tilde(&cli.known_hosts).as_ref()),
    };

    let password = match &cli.password_env {
        Some(var) => Some(std::env::var(var).map_err(|_| {
            format!("Environment variable \"{}\" with the password is not set", var)
        })?),
        None => None,
    };
    if cli.password_from_user {
        warn!("Using each host's username as its password");
    }

    let run_options = RunOptions {
        work_dir: resolve_work_dir(cli.work_dir),
        concurrency: resolve_concurrency(cli.concurrency),
        fail_fast: cli.fail_fast,
        credentials: CredentialDefaults {
            key: cli.key,
            password,
            password_from_user: cli.password_from_user,
        },
    };

    // Local configuration errors end the run before any host is contacted
    let cwd = std::env::current_dir()?;
    let input = source::resolve_source(cli.file.as_deref(), &cwd)?;
    let mut inventory = source::load(
        &input,
        FetchOptions {
            insecure: cli.insecure,
        },
    )
    .await?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, closing open sessions");
            ctrl_c.cancel();
        }
    });

    info!(
        "Host key policy: {}, work dir: {}",
        connect_options.host_key_policy, run_options.work_dir
    );
    let connector = Arc::new(SshConnector::new(connect_options));
    let summary = survey(&mut inventory, connector, &run_options, &cancel).await?;

    let output = input.output_path(&cwd);
    source::write_document(&output, &inventory).await?;
    info!("########## Finished");

    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
