//! Transactional storage seam for the voting core.
//!
//! Everything the queue, session and tally code does happens inside
//! [`ReviewStore::transaction`]; implementations must give each transaction
//! serializable isolation and enforce the uniqueness rules below, translating
//! violations into domain errors rather than raw constraint failures:
//!
//! - one vote per `(report, guardian)` → [`VotingError::AlreadyVoted`]
//! - one membership per `(session, guardian)` → [`VotingError::AlreadyMember`]
//! - one open session per report → [`VotingError::Contention`]
//! - one queue entry per report → [`VotingError::Contention`]
//!
//! [`VotingError::AlreadyVoted`]: crate::error::VotingError::AlreadyVoted
//! [`VotingError::AlreadyMember`]: crate::error::VotingError::AlreadyMember
//! [`VotingError::Contention`]: crate::error::VotingError::Contention

use uuid::Uuid;

use crate::error::VotingResult;
use crate::models::{
    Guardian, QueueEntry, Report, ReportMessage, SessionGuardian, Vote, VotingSession,
};
use crate::status::{GuardianStatus, ReportStatus};

pub mod memory;
pub mod pg;

pub use memory::MemoryReviewStore;
pub use pg::PgReviewStore;

/// How many times a transaction is re-run after losing a race.
pub const MAX_TRANSACTION_ATTEMPTS: usize = 3;

pub trait ReviewStore: Send + Sync + 'static {
    /// Runs `f` atomically. `f` may be invoked more than once when the store
    /// retries after [`VotingError::Contention`](crate::error::VotingError::Contention).
    fn transaction<T, F>(&self, f: F) -> VotingResult<T>
    where
        F: FnMut(&mut dyn ReviewTx) -> VotingResult<T>;

    /// Cheap liveness probe for `/health`.
    fn ping(&self) -> VotingResult<()> {
        Ok(())
    }
}

/// Row-level operations available inside a transaction.
pub trait ReviewTx {
    // --- reports ---
    fn insert_report(&mut self, report: &Report) -> VotingResult<()>;
    fn report(&mut self, id: Uuid) -> VotingResult<Option<Report>>;
    fn update_report(&mut self, report: &Report) -> VotingResult<()>;
    fn list_reports(
        &mut self,
        status: Option<ReportStatus>,
        offset: u64,
        limit: u64,
    ) -> VotingResult<(Vec<Report>, u64)>;
    fn count_reports(&mut self, status: ReportStatus) -> VotingResult<u64>;
    /// Reviewable reports (pending or voting) with no queue entry at all.
    fn orphaned_report_ids(&mut self) -> VotingResult<Vec<Uuid>>;

    fn insert_messages(&mut self, messages: &[ReportMessage]) -> VotingResult<()>;
    fn messages(&mut self, report_id: Uuid) -> VotingResult<Vec<ReportMessage>>;

    // --- queue ---
    fn insert_queue_entry(&mut self, entry: &QueueEntry) -> VotingResult<()>;
    fn queue_entry_for_report(&mut self, report_id: Uuid) -> VotingResult<Option<QueueEntry>>;
    /// Pending and assigned entries, priority descending then oldest first.
    fn open_queue_entries(&mut self) -> VotingResult<Vec<QueueEntry>>;
    fn update_queue_entry(&mut self, entry: &QueueEntry) -> VotingResult<()>;

    // --- sessions ---
    fn insert_session(&mut self, session: &VotingSession) -> VotingResult<()>;
    fn session(&mut self, id: Uuid) -> VotingResult<Option<VotingSession>>;
    fn open_session_for_report(&mut self, report_id: Uuid) -> VotingResult<Option<VotingSession>>;
    fn sessions_for_report(&mut self, report_id: Uuid) -> VotingResult<Vec<VotingSession>>;
    fn open_sessions(&mut self) -> VotingResult<Vec<VotingSession>>;
    fn update_session(&mut self, session: &VotingSession) -> VotingResult<()>;

    // --- memberships ---
    fn insert_member(&mut self, member: &SessionGuardian) -> VotingResult<()>;
    fn member(&mut self, session_id: Uuid, guardian_id: Uuid) -> VotingResult<Option<SessionGuardian>>;
    fn members(&mut self, session_id: Uuid) -> VotingResult<Vec<SessionGuardian>>;
    /// Active, not-yet-voted memberships of one guardian across all sessions.
    fn pending_memberships(&mut self, guardian_id: Uuid) -> VotingResult<Vec<SessionGuardian>>;
    fn update_member(&mut self, member: &SessionGuardian) -> VotingResult<()>;
    fn delete_member(&mut self, member_id: Uuid) -> VotingResult<()>;

    // --- votes ---
    fn insert_vote(&mut self, vote: &Vote) -> VotingResult<()>;
    fn vote_exists(&mut self, report_id: Uuid, guardian_id: Uuid) -> VotingResult<bool>;
    fn voted_report_ids(&mut self, guardian_id: Uuid) -> VotingResult<Vec<Uuid>>;
    /// Oldest first.
    fn votes_for_report(&mut self, report_id: Uuid) -> VotingResult<Vec<Vote>>;

    // --- guardians ---
    fn insert_guardian(&mut self, guardian: &Guardian) -> VotingResult<()>;
    fn guardian(&mut self, id: Uuid) -> VotingResult<Option<Guardian>>;
    fn guardian_by_discord_id(&mut self, discord_id: i64) -> VotingResult<Option<Guardian>>;
    fn update_guardian(&mut self, guardian: &Guardian) -> VotingResult<()>;
    fn guardians_by_status(&mut self, status: GuardianStatus) -> VotingResult<Vec<Guardian>>;
    fn guardians_min_level(&mut self, level: i32) -> VotingResult<Vec<Guardian>>;
}
