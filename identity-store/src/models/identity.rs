//! Identity model - credentials (email, username) bound to a user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Identity types accepted when provisioning a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityType {
    Email,
    Username,
}

impl IdentityType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Username => "username",
        }
    }
}

impl std::fmt::Display for IdentityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IdentityType {
    type Err = String;

    /// Exact match only: `"Email"` is not an identity type.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "username" => Ok(Self::Username),
            _ => Err(format!("invalid identity type: {}", s)),
        }
    }
}

/// Identity row.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub user_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub identity_type: String,
    pub value: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Get parsed identity type. Rows written outside this crate may carry
    /// types it does not know about.
    pub fn parsed_type(&self) -> Option<IdentityType> {
        self.identity_type.parse().ok()
    }
}

/// Input for inserting an identity row.
#[derive(Debug, Clone)]
pub struct CreateIdentity {
    pub user_id: Uuid,
    pub identity_type: IdentityType,
    pub value: String,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
}

impl CreateIdentity {
    /// Build the row for a user's first, unverified identity.
    pub fn unverified(user_id: Uuid, identity_type: IdentityType, value: String) -> Self {
        Self {
            user_id,
            identity_type,
            value,
            verified: false,
            created_at: Utc::now(),
        }
    }
}
