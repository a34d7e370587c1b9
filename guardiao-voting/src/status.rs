//! Closed status enums for every stateful row, stored as `VARCHAR`.
//!
//! Each lifecycle enum exposes `can_transition_to` and `transition`; the voting
//! code never assigns a status field without going through `transition`.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use serde::{Deserialize, Serialize};

use crate::error::{VotingError, VotingResult};

/// Generates `as_str`, `Display`, `FromStr` and the diesel `Text` mapping.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {}: {other}", stringify!($name))),
                }
            }
        }

        impl ToSql<Text, Pg> for $name {
            fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
                out.write_all(self.as_str().as_bytes())?;
                Ok(IsNull::No)
            }
        }

        impl FromSql<Text, Pg> for $name {
            fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
                let raw = <String as FromSql<Text, Pg>>::from_sql(bytes)?;
                raw.parse::<$name>().map_err(Into::into)
            }
        }
    };
}

fn check<T: fmt::Display + Copy>(
    entity: &'static str,
    from: T,
    to: T,
    allowed: bool,
) -> VotingResult<T> {
    if allowed {
        Ok(to)
    } else {
        Err(VotingError::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

// --- Report ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Voting,
    Completed,
    Appealed,
    Closed,
}

text_enum!(ReportStatus {
    Pending => "pending",
    Voting => "voting",
    Completed => "completed",
    Appealed => "appealed",
    Closed => "closed",
});

impl ReportStatus {
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        use ReportStatus::*;
        matches!(
            (self, next),
            (Pending, Voting)
                | (Pending, Completed)
                | (Voting, Completed)
                | (Completed, Appealed)
                | (Completed, Closed)
                | (Appealed, Closed)
        )
    }

    pub fn transition(self, next: ReportStatus) -> VotingResult<ReportStatus> {
        check("report", self, next, self.can_transition_to(next))
    }

    /// Still reachable through the review queue.
    pub fn is_reviewable(self) -> bool {
        matches!(self, ReportStatus::Pending | ReportStatus::Voting)
    }
}

// --- Punishment ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
pub enum Punishment {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "mute_1h")]
    MuteShort,
    #[serde(rename = "mute_12h")]
    MuteLong,
    #[serde(rename = "ban_24h")]
    TempBan,
}

text_enum!(Punishment {
    None => "none",
    MuteShort => "mute_1h",
    MuteLong => "mute_12h",
    TempBan => "ban_24h",
});

impl Punishment {
    pub fn duration(self) -> Option<chrono::Duration> {
        match self {
            Punishment::None => None,
            Punishment::MuteShort => Some(chrono::Duration::hours(1)),
            Punishment::MuteLong => Some(chrono::Duration::hours(12)),
            Punishment::TempBan => Some(chrono::Duration::hours(24)),
        }
    }

    /// Severe punishments also page the elevated-level reviewers.
    pub fn is_severe(self) -> bool {
        matches!(self, Punishment::TempBan)
    }

    /// Label used in user-facing notices.
    pub fn describe(self) -> &'static str {
        match self {
            Punishment::None => "Nenhuma",
            Punishment::MuteShort => "Mute 1 hora",
            Punishment::MuteLong => "Mute 12 horas",
            Punishment::TempBan => "Banimento 24 horas",
        }
    }
}

// --- Vote category ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum VoteCategory {
    Improcedente,
    Intimidou,
    Grave,
}

text_enum!(VoteCategory {
    Improcedente => "improcedente",
    Intimidou => "intimidou",
    Grave => "grave",
});

// --- Queue entry ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Assigned,
    Processing,
    Completed,
    Cancelled,
}

text_enum!(QueueStatus {
    Pending => "pending",
    Assigned => "assigned",
    Processing => "processing",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl QueueStatus {
    pub fn can_transition_to(self, next: QueueStatus) -> bool {
        use QueueStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Pending, Cancelled)
                | (Pending, Completed)
                | (Assigned, Processing)
                | (Assigned, Completed)
                | (Assigned, Pending)
                | (Assigned, Cancelled)
                | (Processing, Completed)
                | (Processing, Pending)
        )
    }

    pub fn transition(self, next: QueueStatus) -> VotingResult<QueueStatus> {
        check("queue entry", self, next, self.can_transition_to(next))
    }

    /// Eligible for the claim scan.
    pub fn is_open(self) -> bool {
        matches!(self, QueueStatus::Pending | QueueStatus::Assigned)
    }
}

// --- Voting session ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Voting,
    Completed,
    Cancelled,
}

text_enum!(SessionStatus {
    Waiting => "waiting",
    Voting => "voting",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl SessionStatus {
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Waiting, Voting) | (Waiting, Cancelled) | (Voting, Completed) | (Voting, Cancelled)
        )
    }

    pub fn transition(self, next: SessionStatus) -> VotingResult<SessionStatus> {
        check("session", self, next, self.can_transition_to(next))
    }

    pub fn is_open(self) -> bool {
        matches!(self, SessionStatus::Waiting | SessionStatus::Voting)
    }
}

// --- Guardian presence ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsExpression, FromSqlRow)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "lowercase")]
pub enum GuardianStatus {
    Online,
    Offline,
}

text_enum!(GuardianStatus {
    Online => "online",
    Offline => "offline",
});
