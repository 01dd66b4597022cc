//! Role policy deciding whether decoded claims may hold a session here.

use std::fmt;

use zariz_core::types::Role;

use crate::jwt::Claims;

/// Claims were decoded fine but are not allowed in this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyViolation {
    /// Subject of the rejected credential.
    pub subject: String,
    /// The role that was refused.
    pub role: Role,
}

impl fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "role '{}' of subject '{}' is not allowed",
            self.role, self.subject
        )
    }
}

/// Allow-list of roles that may hold a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePolicy {
    allowed: Vec<Role>,
}

impl RolePolicy {
    /// Creates a policy allowing exactly `allowed`.
    pub fn new(allowed: impl IntoIterator<Item = Role>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    /// A policy allowing every role.
    pub fn allow_all() -> Self {
        Self::new([Role::Courier, Role::Store, Role::Admin])
    }

    /// The admin console policy.
    pub fn admin_only() -> Self {
        Self::new([Role::Admin])
    }

    /// Checks the claims against the allow-list.
    pub fn check(&self, claims: &Claims) -> Result<(), PolicyViolation> {
        if self.allowed.contains(&claims.role) {
            Ok(())
        } else {
            Err(PolicyViolation {
                subject: claims.sub.clone(),
                role: claims.role,
            })
        }
    }

    /// Whether the role is allowed.
    pub fn allows(&self, role: Role) -> bool {
        self.allowed.contains(&role)
    }
}

impl Default for RolePolicy {
    fn default() -> Self {
        Self::allow_all()
    }
}
