use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardianRole {
    Guardian,
    Admin,
}

impl std::fmt::Display for GuardianRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuardianRole::Guardian => write!(f, "guardian"),
            GuardianRole::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for GuardianRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "guardian" => Ok(GuardianRole::Guardian),
            "admin" => Ok(GuardianRole::Admin),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Claims minted by the login service after the Discord OAuth callback.
/// `sub` is the guardian's row id, not the Discord snowflake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub discord_id: i64,
    pub role: GuardianRole,
    pub iat: i64,
    pub exp: i64,
    pub jti: Uuid,
}

impl Claims {
    pub fn new(guardian_id: Uuid, discord_id: i64, role: GuardianRole, duration_secs: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: guardian_id,
            discord_id,
            role,
            iat: now,
            exp: now + duration_secs,
            jti: Uuid::now_v7(),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }

    pub fn is_admin(&self) -> bool {
        self.role == GuardianRole::Admin
    }
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub discord_id: i64,
    pub role: GuardianRole,
    pub token_id: Uuid,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            discord_id: claims.discord_id,
            role: claims.role,
            token_id: claims.jti,
        }
    }
}
