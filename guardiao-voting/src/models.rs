use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::VotingResult;
use crate::schema::{
    guardians, queue_entries, report_messages, reports, session_guardians, votes, voting_sessions,
};
use crate::status::{
    GuardianStatus, Punishment, QueueStatus, ReportStatus, SessionStatus, VoteCategory,
};
use crate::voting::disposition::Tally;
use crate::voting::scoring;

// --- Guardian ---

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = guardians)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Guardian {
    pub id: Uuid,
    pub discord_id: i64,
    pub discord_username: String,
    pub discord_display_name: String,
    pub status: GuardianStatus,
    pub level: i32,
    pub points: i32,
    pub correct_votes: i32,
    pub incorrect_votes: i32,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Guardian {
    pub fn new(discord_id: i64, username: &str, display_name: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            discord_id,
            discord_username: username.to_string(),
            discord_display_name: display_name.to_string(),
            status: GuardianStatus::Offline,
            level: 1,
            points: 0,
            correct_votes: 0,
            incorrect_votes: 0,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn accuracy_percentage(&self) -> f64 {
        scoring::accuracy_percentage(self.correct_votes, self.incorrect_votes)
    }

    /// Applies one scored vote. Returns `(old, new)` when the level changed.
    pub fn record_outcome(&mut self, correct: bool) -> Option<(i32, i32)> {
        if correct {
            self.correct_votes += 1;
            self.points += 1;
        } else {
            self.incorrect_votes += 1;
        }
        let old = self.level;
        self.level = scoring::level_for_points(self.points);
        (self.level != old).then_some((old, self.level))
    }
}

// --- Report ---

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = reports)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Report {
    pub id: Uuid,
    pub guild_id: i64,
    pub channel_id: i64,
    pub reported_user_id: i64,
    pub reporter_user_id: i64,
    pub reason: String,
    pub status: ReportStatus,
    pub punishment: Punishment,
    pub votes_improcedente: i32,
    pub votes_intimidou: i32,
    pub votes_grave: i32,
    pub total_votes: i32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Report {
    pub fn new(
        guild_id: i64,
        channel_id: i64,
        reported_user_id: i64,
        reporter_user_id: i64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            guild_id,
            channel_id,
            reported_user_id,
            reporter_user_id,
            reason: reason.to_string(),
            status: ReportStatus::Pending,
            punishment: Punishment::None,
            votes_improcedente: 0,
            votes_intimidou: 0,
            votes_grave: 0,
            total_votes: 0,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn tally(&self) -> Tally {
        Tally {
            improcedente: self.votes_improcedente,
            intimidou: self.votes_intimidou,
            grave: self.votes_grave,
        }
    }

    /// Adds one vote to the matching counter and to `total_votes`.
    pub fn record_vote(&mut self, category: VoteCategory) -> VotingResult<()> {
        match self.status {
            ReportStatus::Voting => {}
            other => self.status = other.transition(ReportStatus::Voting)?,
        }
        match category {
            VoteCategory::Improcedente => self.votes_improcedente += 1,
            VoteCategory::Intimidou => self.votes_intimidou += 1,
            VoteCategory::Grave => self.votes_grave += 1,
        }
        self.total_votes += 1;
        Ok(())
    }

    pub fn complete(&mut self, punishment: Punishment, now: DateTime<Utc>) -> VotingResult<()> {
        self.status = self.status.transition(ReportStatus::Completed)?;
        self.punishment = punishment;
        self.completed_at = Some(now);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = report_messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReportMessage {
    pub id: Uuid,
    pub report_id: Uuid,
    pub position: i32,
    pub author_alias: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub from_accused: bool,
}

// --- Vote ---

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Insertable)]
#[diesel(table_name = votes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Vote {
    pub id: Uuid,
    pub report_id: Uuid,
    pub guardian_id: Uuid,
    pub category: VoteCategory,
    pub created_at: DateTime<Utc>,
}

impl Vote {
    pub fn new(report_id: Uuid, guardian_id: Uuid, category: VoteCategory, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            report_id,
            guardian_id,
            category,
            created_at: now,
        }
    }
}

// --- Queue entry ---

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = queue_entries)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct QueueEntry {
    pub id: Uuid,
    pub report_id: Uuid,
    pub status: QueueStatus,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    pub const DEFAULT_PRIORITY: i32 = 0;

    pub fn new(report_id: Uuid, priority: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            report_id,
            status: QueueStatus::Pending,
            priority,
            created_at: now,
            assigned_at: None,
            completed_at: None,
        }
    }

    pub fn assign(&mut self, now: DateTime<Utc>) -> VotingResult<()> {
        self.status = self.status.transition(QueueStatus::Assigned)?;
        self.assigned_at = Some(now);
        Ok(())
    }

    /// Back to the backlog; the assignment timestamp is cleared.
    pub fn release(&mut self) -> VotingResult<()> {
        self.status = self.status.transition(QueueStatus::Pending)?;
        self.assigned_at = None;
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> VotingResult<()> {
        self.status = self.status.transition(QueueStatus::Completed)?;
        self.completed_at = Some(now);
        Ok(())
    }
}

// --- Voting session ---

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = voting_sessions)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct VotingSession {
    pub id: Uuid,
    pub report_id: Uuid,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub voting_deadline: DateTime<Utc>,
}

impl VotingSession {
    pub fn open(report_id: Uuid, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            report_id,
            status: SessionStatus::Waiting,
            created_at: now,
            started_at: None,
            completed_at: None,
            voting_deadline: now + window,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.voting_deadline
    }

    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.voting_deadline - now).num_seconds().max(0)
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> VotingResult<()> {
        self.status = self.status.transition(SessionStatus::Voting)?;
        self.started_at = Some(now);
        Ok(())
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> VotingResult<()> {
        self.status = self.status.transition(SessionStatus::Completed)?;
        self.completed_at = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> VotingResult<()> {
        self.status = self.status.transition(SessionStatus::Cancelled)?;
        self.completed_at = Some(now);
        Ok(())
    }
}

// --- Session membership ---

#[derive(Debug, Clone, Serialize, Queryable, Selectable, Identifiable, Insertable, AsChangeset)]
#[diesel(table_name = session_guardians)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SessionGuardian {
    pub id: Uuid,
    pub session_id: Uuid,
    pub guardian_id: Uuid,
    pub is_active: bool,
    pub has_voted: bool,
    pub category: Option<VoteCategory>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub voted_at: Option<DateTime<Utc>>,
}

impl SessionGuardian {
    pub fn join(session_id: Uuid, guardian_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            session_id,
            guardian_id,
            is_active: true,
            has_voted: false,
            category: None,
            joined_at: now,
            left_at: None,
            voted_at: None,
        }
    }

    /// Active and still expected to vote.
    pub fn is_pending(&self) -> bool {
        self.is_active && !self.has_voted
    }

    pub fn record_vote(&mut self, category: VoteCategory, now: DateTime<Utc>) {
        self.has_voted = true;
        self.category = Some(category);
        self.voted_at = Some(now);
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) {
        self.is_active = false;
        self.left_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> Report {
        Report::new(1, 2, 3, 4, "spam", Utc::now())
    }

    #[test]
    fn first_vote_moves_report_into_voting() {
        let mut r = report();
        r.record_vote(VoteCategory::Grave).unwrap();
        assert_eq!(r.status, ReportStatus::Voting);
        assert_eq!(r.total_votes, 1);
        assert_eq!(r.votes_grave, 1);
    }

    #[test]
    fn total_always_matches_category_counters() {
        let mut r = report();
        for c in [
            VoteCategory::Grave,
            VoteCategory::Intimidou,
            VoteCategory::Improcedente,
            VoteCategory::Grave,
        ] {
            r.record_vote(c).unwrap();
            assert_eq!(r.total_votes, r.tally().total());
        }
    }

    #[test]
    fn completed_report_rejects_further_votes() {
        let mut r = report();
        r.record_vote(VoteCategory::Grave).unwrap();
        r.complete(Punishment::TempBan, Utc::now()).unwrap();

        assert!(r.record_vote(VoteCategory::Grave).is_err());
        assert_eq!(r.total_votes, 1);
    }

    #[test]
    fn session_expires_strictly_after_deadline() {
        let now = Utc::now();
        let s = VotingSession::open(Uuid::new_v4(), now, Duration::minutes(5));
        assert!(!s.is_expired(now + Duration::minutes(5)));
        assert!(s.is_expired(now + Duration::minutes(5) + Duration::seconds(1)));
        assert_eq!(s.seconds_remaining(now + Duration::minutes(10)), 0);
    }

    #[test]
    fn released_queue_entry_forgets_assignment_time() {
        let now = Utc::now();
        let mut q = QueueEntry::new(Uuid::new_v4(), QueueEntry::DEFAULT_PRIORITY, now);
        q.assign(now).unwrap();
        q.release().unwrap();
        assert_eq!(q.status, QueueStatus::Pending);
        assert!(q.assigned_at.is_none());
    }

    #[test]
    fn guardian_levels_up_at_fifty_points() {
        let mut g = Guardian::new(10, "ana", "Ana", Utc::now());
        g.points = 49;
        assert_eq!(g.record_outcome(true), Some((1, 2)));
        assert_eq!(g.record_outcome(false), None);
        assert_eq!(g.incorrect_votes, 1);
    }
}
