//! Account model for registered users.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Presence status stored on the account document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A registered account. The document id is the stable user identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub email: String,
    pub name: String,
    pub phone: Option<String>,
    pub current_group_id: Option<String>,
    pub status: Option<PresenceStatus>,
}

impl Account {
    pub fn display_name(&self) -> &str {
        &self.name
    }
}

/// Summary of the duplicate-account sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateSweepReport {
    /// Emails held by more than one account document.
    pub found: usize,
    /// Account documents deleted.
    pub cleaned: usize,
    pub errors: Vec<String>,
}

/// Name used when an account document has none: the local part of the email.
pub fn fallback_name(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
