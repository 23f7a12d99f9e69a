//! User model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// User row. `password` is absent for passwordless, identity-only accounts.
#[derive(Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Input for inserting a user row.
#[derive(Clone)]
pub struct CreateUser {
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for CreateUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUser")
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Input for provisioning a user together with its first identity.
///
/// `identity_type` is validated by the workflow, not here, so that an
/// unknown type surfaces as an invalid-argument error.
#[derive(Clone)]
pub struct CreateUserWithIdentity {
    pub identity_type: String,
    pub identity_value: String,
    pub password: Option<String>,
}

impl CreateUserWithIdentity {
    pub fn new(identity_type: impl Into<String>, identity_value: impl Into<String>) -> Self {
        Self {
            identity_type: identity_type.into(),
            identity_value: identity_value.into(),
            password: None,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl fmt::Debug for CreateUserWithIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserWithIdentity")
            .field("identity_type", &self.identity_type)
            .field("identity_value", &self.identity_value)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
