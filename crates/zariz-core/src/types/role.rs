//! Principal role enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Roles a Zariz principal can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Delivers orders; uses the mobile app.
    Courier,
    /// Store staff creating and tracking orders.
    Store,
    /// Operator of the admin console.
    Admin,
}

impl Role {
    /// Check if this role is an admin.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Courier => "courier",
            Self::Store => "store",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "courier" => Ok(Self::Courier),
            "store" => Ok(Self::Store),
            "admin" => Ok(Self::Admin),
            _ => Err(AppError::validation(format!(
                "Invalid role: '{s}'. Expected one of: courier, store, admin"
            ))),
        }
    }
}
