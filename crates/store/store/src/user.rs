use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role hierarchy (§6.5): `admin(4) > operator(3) > service(2) > viewer(1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Service,
    Operator,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::Viewer => 1,
            Self::Service => 2,
            Self::Operator => 3,
            Self::Admin => 4,
        }
    }

    /// `require_role(r)` grants access iff the caller's level ≥ r (§6.5).
    #[must_use]
    pub const fn satisfies(self, required: Self) -> bool {
        self.level() >= required.level()
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "viewer" => Ok(Self::Viewer),
            "service" => Ok(Self::Service),
            "operator" => Ok(Self::Operator),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Viewer => "viewer",
            Self::Service => "service",
            Self::Operator => "operator",
            Self::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// A row in the `users` table (§6.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// A row in the `api_keys` table (§6.6). Only the hash is stored; the
/// first 8 characters of the raw key are retained for display.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy() {
        assert!(Role::Admin.satisfies(Role::Operator));
        assert!(Role::Operator.satisfies(Role::Operator));
        assert!(!Role::Viewer.satisfies(Role::Operator));
        assert!(Role::Service.satisfies(Role::Viewer));
    }
}
