use uuid::Uuid;

use guardiao_shared::errors::{AppError, ErrorCode};

use crate::status::SessionStatus;

#[derive(Debug, thiserror::Error)]
pub enum VotingError {
    #[error("report {0} not found")]
    ReportNotFound(Uuid),

    #[error("voting session {0} not found")]
    SessionNotFound(Uuid),

    #[error("guardian {0} not found")]
    GuardianNotFound(Uuid),

    #[error("guardian is not an active member of this session")]
    NotMember,

    #[error("guardian already voted on this report")]
    AlreadyVoted,

    #[error("voting session expired, poll again for a new report")]
    SessionExpired,

    #[error("voting session is already {0}")]
    SessionClosed(SessionStatus),

    #[error("guardian already took part in this session")]
    AlreadyMember,

    #[error("report {0} is no longer in the review queue")]
    NotQueued(Uuid),

    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("a user cannot report themselves")]
    SelfReport,

    /// Concurrent writer won; the whole transaction can be retried.
    #[error("concurrent update, retry")]
    Contention,

    #[error("store error: {0}")]
    Store(String),
}

pub type VotingResult<T> = Result<T, VotingError>;

impl VotingError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, VotingError::Contention)
    }
}

impl From<diesel::result::Error> for VotingError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::DatabaseError(DatabaseErrorKind::SerializationFailure, _) => VotingError::Contention,
            other => VotingError::Store(other.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for VotingError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        VotingError::Store(format!("db pool error: {err}"))
    }
}

impl From<VotingError> for AppError {
    fn from(err: VotingError) -> Self {
        if let VotingError::Store(detail) = &err {
            tracing::error!(error = %detail, "voting store failure");
            return AppError::internal("internal server error");
        }
        let code = match &err {
            VotingError::ReportNotFound(_) => ErrorCode::ReportNotFound,
            VotingError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            VotingError::GuardianNotFound(_) => ErrorCode::GuardianNotFound,
            VotingError::NotMember => ErrorCode::NotSessionMember,
            VotingError::AlreadyVoted => ErrorCode::AlreadyVoted,
            VotingError::SessionExpired => ErrorCode::SessionExpired,
            VotingError::SessionClosed(_) => ErrorCode::SessionClosed,
            VotingError::AlreadyMember => ErrorCode::AlreadyMember,
            VotingError::NotQueued(_) => ErrorCode::ReportNotQueued,
            VotingError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            VotingError::SelfReport => ErrorCode::CannotReportSelf,
            VotingError::Contention => ErrorCode::Conflict,
            VotingError::Store(_) => ErrorCode::InternalError,
        };
        AppError::new(code, err.to_string())
    }
}
