//! Core types used throughout the native user store

use serde::{Deserialize, Serialize};
use std::fmt;

/// Username
pub type Username = String;

/// A user as stored in the backing index, minus the password hash
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub username: Username,
    /// Ordered role names; may be empty
    pub roles: Vec<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// A decoded user together with its stored password hash
///
/// Only the verification path ever sees this pair; the hash must not leave
/// the store and is never handed to change listeners.
#[derive(Clone)]
pub(crate) struct UserAndPassword {
    user: User,
    password_hash: String,
}

impl UserAndPassword {
    pub(crate) fn new(user: User, password_hash: String) -> Self {
        Self {
            user,
            password_hash,
        }
    }

    pub(crate) fn into_user(self) -> User {
        self.user
    }

    pub(crate) fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

impl fmt::Debug for UserAndPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAndPassword")
            .field("user", &self.user)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

/// Request to create or fully replace a user document
#[derive(Clone, Default)]
pub struct PutUserRequest {
    pub username: Username,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Whether the write should be immediately visible to searches
    pub refresh: bool,
}

impl fmt::Debug for PutUserRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutUserRequest")
            .field("username", &self.username)
            .field("password_hash", &"<redacted>")
            .field("roles", &self.roles)
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("metadata", &self.metadata)
            .field("refresh", &self.refresh)
            .finish()
    }
}

/// Request to delete a user document
#[derive(Debug, Clone)]
pub struct DeleteUserRequest {
    pub username: Username,
    pub refresh: bool,
}

/// Lifecycle state of the native user store
///
/// Transitions are irreversible within a lifecycle except through the
/// test-only reset: `Initialized -> Starting -> Started -> Stopping ->
/// Stopped`, with any stage able to move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Initialized,
    Starting,
    Started,
    Stopping,
    Stopped,
    Failed,
}

impl State {
    pub(crate) fn from_u8(value: u8) -> State {
        match value {
            0 => State::Initialized,
            1 => State::Starting,
            2 => State::Started,
            3 => State::Stopping,
            4 => State::Stopped,
            _ => State::Failed,
        }
    }
}
