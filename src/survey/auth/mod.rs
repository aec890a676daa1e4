//! Authentication for SSH connections.
//!
//! A host is authenticated with exactly one mechanism, chosen by
//! [`Credentials`]. Each mechanism is an [`AuthStrategy`].
//!
//! # Available Strategies
//!
//! - [`PasswordAuth`]: Password-based authentication
//! - [`KeyAuth`]: Private key file authentication

mod key;
mod password;
mod traits;

use std::fmt;
use std::path::PathBuf;

pub use key::KeyAuth;
pub use password::PasswordAuth;
pub use traits::AuthStrategy;

/// The single authentication mechanism used for one host.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password(String),
    Key(PathBuf),
}

impl Credentials {
    /// Pick the mechanism from optional parts. A key wins over a password;
    /// `None` when neither is given.
    pub fn from_parts(password: Option<String>, key: Option<&str>) -> Option<Self> {
        match (key, password) {
            (Some(key), _) => Some(Credentials::Key(expand_key_path(key))),
            (None, Some(password)) => Some(Credentials::Password(password)),
            (None, None) => None,
        }
    }

    /// Name of the mechanism, matching [`AuthStrategy::name`].
    pub fn mechanism(&self) -> &'static str {
        match self {
            Credentials::Password(_) => "password",
            Credentials::Key(_) => "key",
        }
    }

    pub fn strategy(&self) -> Box<dyn AuthStrategy> {
        match self {
            Credentials::Password(password) => Box::new(PasswordAuth::new(password.clone())),
            Credentials::Key(path) => Box::new(KeyAuth::new(path.clone())),
        }
    }
}

// Passwords must never end up in logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password(_) => f.write_str("Password(***)"),
            Credentials::Key(path) => f.debug_tuple("Key").field(path).finish(),
        }
    }
}

/// Expand `~` and environment variables in a key path.
pub fn expand_key_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}
