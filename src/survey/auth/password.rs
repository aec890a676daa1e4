//! Password-based SSH authentication.

use async_trait::async_trait;
use russh::client;

use crate::survey::error::ConnectError;
use crate::survey::session::SshClientHandler;

use super::traits::AuthStrategy;

/// Password authentication strategy.
pub struct PasswordAuth {
    password: String,
}

impl PasswordAuth {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }
}

#[async_trait]
impl AuthStrategy for PasswordAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<SshClientHandler>,
        username: &str,
    ) -> Result<bool, ConnectError> {
        let result = handle
            .authenticate_password(username, &self.password)
            .await
            .map_err(|e| ConnectError::AuthFailed {
                mechanism: self.name(),
                reason: e.to_string(),
            })?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "password"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_auth_name() {
        let auth = PasswordAuth::new("secret");
        assert_eq!(auth.name(), "password");
    }

    #[test]
    fn test_password_auth_from_string() {
        let auth = PasswordAuth::new(String::from("secret"));
        assert_eq!(auth.password, "secret");
    }
}
