//! Authentication strategy trait definition.

use async_trait::async_trait;
use russh::client;

use crate::survey::error::ConnectError;
use crate::survey::session::SshClientHandler;

/// Trait for SSH authentication strategies.
///
/// Implementations must be thread-safe (`Send + Sync`) so that hosts can be
/// inspected from concurrent tasks.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - Authentication succeeded
    /// * `Ok(false)` - Authentication failed (credentials rejected)
    /// * `Err(error)` - The credentials could not be used at all
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, ConnectError>;

    /// Name of the mechanism, used in logs and error messages.
    fn name(&self) -> &'static str;
}
