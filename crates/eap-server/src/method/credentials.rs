//! Credential lookup for the password-based leaf methods

use crate::config::User;
use std::collections::HashMap;

/// Source of the cleartext secrets challenge-response methods need.
///
/// MD5-Challenge computes the expected response from the stored password,
/// so a source that only verifies hashes cannot back it.
pub trait CredentialSource: Send + Sync {
    /// Cleartext password of `username`, `None` for unknown users
    fn get_user_password(&self, username: &str) -> Option<String>;

    fn user_exists(&self, username: &str) -> bool {
        self.get_user_password(username).is_some()
    }
}

/// In-memory user table
#[derive(Debug, Clone, Default)]
pub struct SimpleCredentialStore {
    users: HashMap<String, String>,
}

impl SimpleCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users(users: &[User]) -> Self {
        let mut store = Self::new();
        for user in users {
            store.add_user(&user.username, &user.password);
        }
        store
    }

    pub fn add_user(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.users.insert(username.into(), password.into());
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialSource for SimpleCredentialStore {
    fn get_user_password(&self, username: &str) -> Option<String> {
        self.users.get(username).cloned()
    }
}
