use diesel::dsl::{count_star, exists, not};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use uuid::Uuid;

use guardiao_shared::clients::db::DbPool;

use crate::error::{VotingError, VotingResult};
use crate::models::{
    Guardian, QueueEntry, Report, ReportMessage, SessionGuardian, Vote, VotingSession,
};
use crate::schema::{
    guardians, queue_entries, report_messages, reports, session_guardians, votes, voting_sessions,
};
use crate::status::{GuardianStatus, QueueStatus, ReportStatus, SessionStatus};
use crate::store::{ReviewStore, ReviewTx, MAX_TRANSACTION_ATTEMPTS};

const OPEN_SESSION: [SessionStatus; 2] = [SessionStatus::Waiting, SessionStatus::Voting];
const OPEN_QUEUE: [QueueStatus; 2] = [QueueStatus::Pending, QueueStatus::Assigned];
const REVIEWABLE: [ReportStatus; 2] = [ReportStatus::Pending, ReportStatus::Voting];

/// Postgres-backed store. Every transaction runs at `SERIALIZABLE`.
#[derive(Clone)]
pub struct PgReviewStore {
    pool: DbPool,
}

impl PgReviewStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl ReviewStore for PgReviewStore {
    fn transaction<T, F>(&self, mut f: F) -> VotingResult<T>
    where
        F: FnMut(&mut dyn ReviewTx) -> VotingResult<T>,
    {
        let mut conn = self.pool.get()?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = conn
                .build_transaction()
                .serializable()
                .run(|conn| f(&mut PgTx { conn }));

            match result {
                Err(err) if err.is_retryable() && attempt < MAX_TRANSACTION_ATTEMPTS => {
                    tracing::warn!(attempt, "serialization conflict, retrying transaction");
                }
                other => return other,
            }
        }
    }

    fn ping(&self) -> VotingResult<()> {
        let mut conn = self.pool.get()?;
        diesel::sql_query("SELECT 1").execute(&mut conn)?;
        Ok(())
    }
}

/// Maps a unique violation to the domain error for that constraint.
fn unique_as(err: DieselError, mapped: VotingError) -> VotingError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => mapped,
        other => other.into(),
    }
}

fn expect_row(updated: usize, what: &str, id: Uuid) -> VotingResult<()> {
    if updated == 0 {
        return Err(VotingError::Store(format!("{what} {id} does not exist")));
    }
    Ok(())
}

struct PgTx<'a> {
    conn: &'a mut PgConnection,
}

impl ReviewTx for PgTx<'_> {
    fn insert_report(&mut self, report: &Report) -> VotingResult<()> {
        diesel::insert_into(reports::table)
            .values(report)
            .execute(self.conn)?;
        Ok(())
    }

    fn report(&mut self, id: Uuid) -> VotingResult<Option<Report>> {
        Ok(reports::table
            .find(id)
            .select(Report::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn update_report(&mut self, report: &Report) -> VotingResult<()> {
        let n = diesel::update(reports::table.find(report.id))
            .set(report)
            .execute(self.conn)?;
        expect_row(n, "report", report.id)
    }

    fn list_reports(
        &mut self,
        status: Option<ReportStatus>,
        offset: u64,
        limit: u64,
    ) -> VotingResult<(Vec<Report>, u64)> {
        let mut query = reports::table.select(Report::as_select()).into_boxed();
        let mut count = reports::table.select(count_star()).into_boxed();
        if let Some(status) = status {
            query = query.filter(reports::status.eq(status));
            count = count.filter(reports::status.eq(status));
        }

        let total: i64 = count.get_result(self.conn)?;
        let rows = query
            .order((reports::created_at.desc(), reports::id.desc()))
            .offset(offset as i64)
            .limit(limit as i64)
            .load(self.conn)?;
        Ok((rows, total as u64))
    }

    fn count_reports(&mut self, status: ReportStatus) -> VotingResult<u64> {
        let n: i64 = reports::table
            .filter(reports::status.eq(status))
            .count()
            .get_result(self.conn)?;
        Ok(n as u64)
    }

    fn orphaned_report_ids(&mut self) -> VotingResult<Vec<Uuid>> {
        Ok(reports::table
            .filter(reports::status.eq_any(REVIEWABLE))
            .filter(not(exists(
                queue_entries::table.filter(queue_entries::report_id.eq(reports::id)),
            )))
            .order(reports::created_at.asc())
            .select(reports::id)
            .load(self.conn)?)
    }

    fn insert_messages(&mut self, messages: &[ReportMessage]) -> VotingResult<()> {
        if messages.is_empty() {
            return Ok(());
        }
        diesel::insert_into(report_messages::table)
            .values(messages)
            .execute(self.conn)?;
        Ok(())
    }

    fn messages(&mut self, report_id: Uuid) -> VotingResult<Vec<ReportMessage>> {
        Ok(report_messages::table
            .filter(report_messages::report_id.eq(report_id))
            .order(report_messages::position.asc())
            .select(ReportMessage::as_select())
            .load(self.conn)?)
    }

    fn insert_queue_entry(&mut self, entry: &QueueEntry) -> VotingResult<()> {
        diesel::insert_into(queue_entries::table)
            .values(entry)
            .execute(self.conn)
            .map_err(|e| unique_as(e, VotingError::Contention))?;
        Ok(())
    }

    fn queue_entry_for_report(&mut self, report_id: Uuid) -> VotingResult<Option<QueueEntry>> {
        Ok(queue_entries::table
            .filter(queue_entries::report_id.eq(report_id))
            .select(QueueEntry::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn open_queue_entries(&mut self) -> VotingResult<Vec<QueueEntry>> {
        Ok(queue_entries::table
            .filter(queue_entries::status.eq_any(OPEN_QUEUE))
            .order((
                queue_entries::priority.desc(),
                queue_entries::created_at.asc(),
                queue_entries::id.asc(),
            ))
            .select(QueueEntry::as_select())
            .load(self.conn)?)
    }

    fn update_queue_entry(&mut self, entry: &QueueEntry) -> VotingResult<()> {
        let n = diesel::update(queue_entries::table.find(entry.id))
            .set(entry)
            .execute(self.conn)?;
        expect_row(n, "queue entry", entry.id)
    }

    fn insert_session(&mut self, session: &VotingSession) -> VotingResult<()> {
        diesel::insert_into(voting_sessions::table)
            .values(session)
            .execute(self.conn)
            .map_err(|e| unique_as(e, VotingError::Contention))?;
        Ok(())
    }

    fn session(&mut self, id: Uuid) -> VotingResult<Option<VotingSession>> {
        Ok(voting_sessions::table
            .find(id)
            .select(VotingSession::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn open_session_for_report(&mut self, report_id: Uuid) -> VotingResult<Option<VotingSession>> {
        Ok(voting_sessions::table
            .filter(voting_sessions::report_id.eq(report_id))
            .filter(voting_sessions::status.eq_any(OPEN_SESSION))
            .select(VotingSession::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn sessions_for_report(&mut self, report_id: Uuid) -> VotingResult<Vec<VotingSession>> {
        Ok(voting_sessions::table
            .filter(voting_sessions::report_id.eq(report_id))
            .order(voting_sessions::created_at.asc())
            .select(VotingSession::as_select())
            .load(self.conn)?)
    }

    fn open_sessions(&mut self) -> VotingResult<Vec<VotingSession>> {
        Ok(voting_sessions::table
            .filter(voting_sessions::status.eq_any(OPEN_SESSION))
            .order(voting_sessions::voting_deadline.asc())
            .select(VotingSession::as_select())
            .load(self.conn)?)
    }

    fn update_session(&mut self, session: &VotingSession) -> VotingResult<()> {
        let n = diesel::update(voting_sessions::table.find(session.id))
            .set(session)
            .execute(self.conn)
            .map_err(|e| unique_as(e, VotingError::Contention))?;
        expect_row(n, "session", session.id)
    }

    fn insert_member(&mut self, member: &SessionGuardian) -> VotingResult<()> {
        diesel::insert_into(session_guardians::table)
            .values(member)
            .execute(self.conn)
            .map_err(|e| unique_as(e, VotingError::AlreadyMember))?;
        Ok(())
    }

    fn member(&mut self, session_id: Uuid, guardian_id: Uuid) -> VotingResult<Option<SessionGuardian>> {
        Ok(session_guardians::table
            .filter(session_guardians::session_id.eq(session_id))
            .filter(session_guardians::guardian_id.eq(guardian_id))
            .select(SessionGuardian::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn members(&mut self, session_id: Uuid) -> VotingResult<Vec<SessionGuardian>> {
        Ok(session_guardians::table
            .filter(session_guardians::session_id.eq(session_id))
            .order(session_guardians::joined_at.asc())
            .select(SessionGuardian::as_select())
            .load(self.conn)?)
    }

    fn pending_memberships(&mut self, guardian_id: Uuid) -> VotingResult<Vec<SessionGuardian>> {
        Ok(session_guardians::table
            .filter(session_guardians::guardian_id.eq(guardian_id))
            .filter(session_guardians::is_active.eq(true))
            .filter(session_guardians::has_voted.eq(false))
            .order(session_guardians::joined_at.asc())
            .select(SessionGuardian::as_select())
            .load(self.conn)?)
    }

    fn update_member(&mut self, member: &SessionGuardian) -> VotingResult<()> {
        let n = diesel::update(session_guardians::table.find(member.id))
            .set(member)
            .execute(self.conn)?;
        expect_row(n, "session member", member.id)
    }

    fn delete_member(&mut self, member_id: Uuid) -> VotingResult<()> {
        diesel::delete(session_guardians::table.find(member_id)).execute(self.conn)?;
        Ok(())
    }

    fn insert_vote(&mut self, vote: &Vote) -> VotingResult<()> {
        diesel::insert_into(votes::table)
            .values(vote)
            .execute(self.conn)
            .map_err(|e| unique_as(e, VotingError::AlreadyVoted))?;
        Ok(())
    }

    fn vote_exists(&mut self, report_id: Uuid, guardian_id: Uuid) -> VotingResult<bool> {
        Ok(diesel::select(exists(
            votes::table
                .filter(votes::report_id.eq(report_id))
                .filter(votes::guardian_id.eq(guardian_id)),
        ))
        .get_result(self.conn)?)
    }

    fn voted_report_ids(&mut self, guardian_id: Uuid) -> VotingResult<Vec<Uuid>> {
        Ok(votes::table
            .filter(votes::guardian_id.eq(guardian_id))
            .select(votes::report_id)
            .load(self.conn)?)
    }

    fn votes_for_report(&mut self, report_id: Uuid) -> VotingResult<Vec<Vote>> {
        Ok(votes::table
            .filter(votes::report_id.eq(report_id))
            .order(votes::created_at.asc())
            .select(Vote::as_select())
            .load(self.conn)?)
    }

    fn insert_guardian(&mut self, guardian: &Guardian) -> VotingResult<()> {
        diesel::insert_into(guardians::table)
            .values(guardian)
            .execute(self.conn)
            .map_err(|e| unique_as(e, VotingError::Contention))?;
        Ok(())
    }

    fn guardian(&mut self, id: Uuid) -> VotingResult<Option<Guardian>> {
        Ok(guardians::table
            .find(id)
            .select(Guardian::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn guardian_by_discord_id(&mut self, discord_id: i64) -> VotingResult<Option<Guardian>> {
        Ok(guardians::table
            .filter(guardians::discord_id.eq(discord_id))
            .select(Guardian::as_select())
            .first(self.conn)
            .optional()?)
    }

    fn update_guardian(&mut self, guardian: &Guardian) -> VotingResult<()> {
        let n = diesel::update(guardians::table.find(guardian.id))
            .set(guardian)
            .execute(self.conn)?;
        expect_row(n, "guardian", guardian.id)
    }

    fn guardians_by_status(&mut self, status: GuardianStatus) -> VotingResult<Vec<Guardian>> {
        Ok(guardians::table
            .filter(guardians::status.eq(status))
            .order(guardians::discord_id.asc())
            .select(Guardian::as_select())
            .load(self.conn)?)
    }

    fn guardians_min_level(&mut self, level: i32) -> VotingResult<Vec<Guardian>> {
        Ok(guardians::table
            .filter(guardians::level.ge(level))
            .order(guardians::discord_id.asc())
            .select(Guardian::as_select())
            .load(self.conn)?)
    }
}
