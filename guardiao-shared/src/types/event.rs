use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `guardiao.{domain}.{entity}.{action}`
/// Example: `guardiao.moderation.report.completed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            data,
        }
    }

    /// Ties the event to the report or session it describes.
    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    pub const MODERATION_REPORT_FILED: &str = "guardiao.moderation.report.filed";
    pub const MODERATION_REPORT_COMPLETED: &str = "guardiao.moderation.report.completed";
    pub const MODERATION_SESSION_STARTED: &str = "guardiao.moderation.session.started";
    pub const MODERATION_SESSION_CANCELLED: &str = "guardiao.moderation.session.cancelled";
    pub const MODERATION_VOTE_CAST: &str = "guardiao.moderation.vote.cast";
}

/// Event data payloads. Reviewer identities never appear in vote events.
pub mod payloads {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ReportFiled {
        pub report_id: Uuid,
        pub guild_id: i64,
        pub reported_user_id: i64,
        pub reporter_user_id: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ReportCompleted {
        pub report_id: Uuid,
        pub session_id: Uuid,
        pub punishment: String,
        pub votes_improcedente: i32,
        pub votes_intimidou: i32,
        pub votes_grave: i32,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SessionStarted {
        pub session_id: Uuid,
        pub report_id: Uuid,
        pub voting_deadline: chrono::DateTime<chrono::Utc>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SessionCancelled {
        pub session_id: Uuid,
        pub report_id: Uuid,
        pub reason: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct VoteCast {
        pub report_id: Uuid,
        pub session_id: Uuid,
        pub category: String,
        pub total_votes: i32,
    }
}
