//! In-process store used by tests and local runs without Postgres.
//!
//! A transaction works on a private copy of the whole state and swaps it in
//! on success, so a failed closure leaves nothing behind. The mutex is held
//! for the full transaction, which makes every transaction serial.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{VotingError, VotingResult};
use crate::models::{
    Guardian, QueueEntry, Report, ReportMessage, SessionGuardian, Vote, VotingSession,
};
use crate::status::{GuardianStatus, ReportStatus};
use crate::store::{ReviewStore, ReviewTx, MAX_TRANSACTION_ATTEMPTS};

#[derive(Debug, Default, Clone)]
struct State {
    guardians: HashMap<Uuid, Guardian>,
    reports: HashMap<Uuid, Report>,
    messages: Vec<ReportMessage>,
    votes: Vec<Vote>,
    queue: HashMap<Uuid, QueueEntry>,
    sessions: HashMap<Uuid, VotingSession>,
    members: HashMap<Uuid, SessionGuardian>,
}

#[derive(Debug, Default)]
pub struct MemoryReviewStore {
    state: Mutex<State>,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStore for MemoryReviewStore {
    fn transaction<T, F>(&self, mut f: F) -> VotingResult<T>
    where
        F: FnMut(&mut dyn ReviewTx) -> VotingResult<T>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut guard = self
                .state
                .lock()
                .map_err(|_| VotingError::Store("memory store poisoned".into()))?;
            let mut tx = MemoryTx {
                state: guard.clone(),
            };
            match f(&mut tx) {
                Ok(value) => {
                    *guard = tx.state;
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt < MAX_TRANSACTION_ATTEMPTS => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

struct MemoryTx {
    state: State,
}

fn missing(what: &str, id: Uuid) -> VotingError {
    VotingError::Store(format!("{what} {id} does not exist"))
}

impl ReviewTx for MemoryTx {
    fn insert_report(&mut self, report: &Report) -> VotingResult<()> {
        self.state.reports.insert(report.id, report.clone());
        Ok(())
    }

    fn report(&mut self, id: Uuid) -> VotingResult<Option<Report>> {
        Ok(self.state.reports.get(&id).cloned())
    }

    fn update_report(&mut self, report: &Report) -> VotingResult<()> {
        let slot = self
            .state
            .reports
            .get_mut(&report.id)
            .ok_or_else(|| missing("report", report.id))?;
        *slot = report.clone();
        Ok(())
    }

    fn list_reports(
        &mut self,
        status: Option<ReportStatus>,
        offset: u64,
        limit: u64,
    ) -> VotingResult<(Vec<Report>, u64)> {
        let mut rows: Vec<Report> = self
            .state
            .reports
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    fn count_reports(&mut self, status: ReportStatus) -> VotingResult<u64> {
        Ok(self.state.reports.values().filter(|r| r.status == status).count() as u64)
    }

    fn orphaned_report_ids(&mut self) -> VotingResult<Vec<Uuid>> {
        let mut orphans: Vec<&Report> = self
            .state
            .reports
            .values()
            .filter(|r| r.status.is_reviewable())
            .filter(|r| !self.state.queue.values().any(|q| q.report_id == r.id))
            .collect();
        orphans.sort_by_key(|r| r.created_at);
        Ok(orphans.into_iter().map(|r| r.id).collect())
    }

    fn insert_messages(&mut self, messages: &[ReportMessage]) -> VotingResult<()> {
        self.state.messages.extend_from_slice(messages);
        Ok(())
    }

    fn messages(&mut self, report_id: Uuid) -> VotingResult<Vec<ReportMessage>> {
        let mut rows: Vec<ReportMessage> = self
            .state
            .messages
            .iter()
            .filter(|m| m.report_id == report_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.position);
        Ok(rows)
    }

    fn insert_queue_entry(&mut self, entry: &QueueEntry) -> VotingResult<()> {
        if self.state.queue.values().any(|q| q.report_id == entry.report_id) {
            return Err(VotingError::Contention);
        }
        self.state.queue.insert(entry.id, entry.clone());
        Ok(())
    }

    fn queue_entry_for_report(&mut self, report_id: Uuid) -> VotingResult<Option<QueueEntry>> {
        Ok(self
            .state
            .queue
            .values()
            .find(|q| q.report_id == report_id)
            .cloned())
    }

    fn open_queue_entries(&mut self) -> VotingResult<Vec<QueueEntry>> {
        let mut rows: Vec<QueueEntry> = self
            .state
            .queue
            .values()
            .filter(|q| q.status.is_open())
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(rows)
    }

    fn update_queue_entry(&mut self, entry: &QueueEntry) -> VotingResult<()> {
        let slot = self
            .state
            .queue
            .get_mut(&entry.id)
            .ok_or_else(|| missing("queue entry", entry.id))?;
        *slot = entry.clone();
        Ok(())
    }

    fn insert_session(&mut self, session: &VotingSession) -> VotingResult<()> {
        let clash = self
            .state
            .sessions
            .values()
            .any(|s| s.report_id == session.report_id && s.status.is_open());
        if clash && session.status.is_open() {
            return Err(VotingError::Contention);
        }
        self.state.sessions.insert(session.id, session.clone());
        Ok(())
    }

    fn session(&mut self, id: Uuid) -> VotingResult<Option<VotingSession>> {
        Ok(self.state.sessions.get(&id).cloned())
    }

    fn open_session_for_report(&mut self, report_id: Uuid) -> VotingResult<Option<VotingSession>> {
        Ok(self
            .state
            .sessions
            .values()
            .find(|s| s.report_id == report_id && s.status.is_open())
            .cloned())
    }

    fn sessions_for_report(&mut self, report_id: Uuid) -> VotingResult<Vec<VotingSession>> {
        let mut rows: Vec<VotingSession> = self
            .state
            .sessions
            .values()
            .filter(|s| s.report_id == report_id)
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.created_at);
        Ok(rows)
    }

    fn open_sessions(&mut self) -> VotingResult<Vec<VotingSession>> {
        let mut rows: Vec<VotingSession> = self
            .state
            .sessions
            .values()
            .filter(|s| s.status.is_open())
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.voting_deadline);
        Ok(rows)
    }

    fn update_session(&mut self, session: &VotingSession) -> VotingResult<()> {
        let slot = self
            .state
            .sessions
            .get_mut(&session.id)
            .ok_or_else(|| missing("session", session.id))?;
        *slot = session.clone();
        Ok(())
    }

    fn insert_member(&mut self, member: &SessionGuardian) -> VotingResult<()> {
        let exists = self.state.members.values().any(|m| {
            m.session_id == member.session_id && m.guardian_id == member.guardian_id
        });
        if exists {
            return Err(VotingError::AlreadyMember);
        }
        self.state.members.insert(member.id, member.clone());
        Ok(())
    }

    fn member(&mut self, session_id: Uuid, guardian_id: Uuid) -> VotingResult<Option<SessionGuardian>> {
        Ok(self
            .state
            .members
            .values()
            .find(|m| m.session_id == session_id && m.guardian_id == guardian_id)
            .cloned())
    }

    fn members(&mut self, session_id: Uuid) -> VotingResult<Vec<SessionGuardian>> {
        let mut rows: Vec<SessionGuardian> = self
            .state
            .members
            .values()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.joined_at);
        Ok(rows)
    }

    fn pending_memberships(&mut self, guardian_id: Uuid) -> VotingResult<Vec<SessionGuardian>> {
        let mut rows: Vec<SessionGuardian> = self
            .state
            .members
            .values()
            .filter(|m| m.guardian_id == guardian_id && m.is_pending())
            .cloned()
            .collect();
        rows.sort_by_key(|m| m.joined_at);
        Ok(rows)
    }

    fn update_member(&mut self, member: &SessionGuardian) -> VotingResult<()> {
        let slot = self
            .state
            .members
            .get_mut(&member.id)
            .ok_or_else(|| missing("session member", member.id))?;
        *slot = member.clone();
        Ok(())
    }

    fn delete_member(&mut self, member_id: Uuid) -> VotingResult<()> {
        self.state.members.remove(&member_id);
        Ok(())
    }

    fn insert_vote(&mut self, vote: &Vote) -> VotingResult<()> {
        if self.vote_exists(vote.report_id, vote.guardian_id)? {
            return Err(VotingError::AlreadyVoted);
        }
        self.state.votes.push(vote.clone());
        Ok(())
    }

    fn vote_exists(&mut self, report_id: Uuid, guardian_id: Uuid) -> VotingResult<bool> {
        Ok(self
            .state
            .votes
            .iter()
            .any(|v| v.report_id == report_id && v.guardian_id == guardian_id))
    }

    fn voted_report_ids(&mut self, guardian_id: Uuid) -> VotingResult<Vec<Uuid>> {
        Ok(self
            .state
            .votes
            .iter()
            .filter(|v| v.guardian_id == guardian_id)
            .map(|v| v.report_id)
            .collect())
    }

    fn votes_for_report(&mut self, report_id: Uuid) -> VotingResult<Vec<Vote>> {
        let mut rows: Vec<Vote> = self
            .state
            .votes
            .iter()
            .filter(|v| v.report_id == report_id)
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.created_at);
        Ok(rows)
    }

    fn insert_guardian(&mut self, guardian: &Guardian) -> VotingResult<()> {
        if self
            .state
            .guardians
            .values()
            .any(|g| g.discord_id == guardian.discord_id)
        {
            return Err(VotingError::Contention);
        }
        self.state.guardians.insert(guardian.id, guardian.clone());
        Ok(())
    }

    fn guardian(&mut self, id: Uuid) -> VotingResult<Option<Guardian>> {
        Ok(self.state.guardians.get(&id).cloned())
    }

    fn guardian_by_discord_id(&mut self, discord_id: i64) -> VotingResult<Option<Guardian>> {
        Ok(self
            .state
            .guardians
            .values()
            .find(|g| g.discord_id == discord_id)
            .cloned())
    }

    fn update_guardian(&mut self, guardian: &Guardian) -> VotingResult<()> {
        let slot = self
            .state
            .guardians
            .get_mut(&guardian.id)
            .ok_or_else(|| missing("guardian", guardian.id))?;
        *slot = guardian.clone();
        Ok(())
    }

    fn guardians_by_status(&mut self, status: GuardianStatus) -> VotingResult<Vec<Guardian>> {
        let mut rows: Vec<Guardian> = self
            .state
            .guardians
            .values()
            .filter(|g| g.status == status)
            .cloned()
            .collect();
        rows.sort_by_key(|g| g.discord_id);
        Ok(rows)
    }

    fn guardians_min_level(&mut self, level: i32) -> VotingResult<Vec<Guardian>> {
        let mut rows: Vec<Guardian> = self
            .state
            .guardians
            .values()
            .filter(|g| g.level >= level)
            .cloned()
            .collect();
        rows.sort_by_key(|g| g.discord_id);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::status::VoteCategory;

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = MemoryReviewStore::new();
        let report = Report::new(1, 2, 3, 4, "spam", Utc::now());

        let result: VotingResult<()> = store.transaction(|tx| {
            tx.insert_report(&report)?;
            Err(VotingError::SelfReport)
        });
        assert!(result.is_err());

        let found = store.transaction(|tx| tx.report(report.id)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn second_vote_by_same_guardian_is_rejected() {
        let store = MemoryReviewStore::new();
        let (report, guardian) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        store
            .transaction(|tx| tx.insert_vote(&Vote::new(report, guardian, VoteCategory::Grave, now)))
            .unwrap();
        let err = store
            .transaction(|tx| tx.insert_vote(&Vote::new(report, guardian, VoteCategory::Intimidou, now)))
            .unwrap_err();
        assert!(matches!(err, VotingError::AlreadyVoted));
    }

    #[test]
    fn second_membership_in_same_session_is_rejected() {
        let store = MemoryReviewStore::new();
        let (session, guardian) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();

        store
            .transaction(|tx| tx.insert_member(&SessionGuardian::join(session, guardian, now)))
            .unwrap();
        let err = store
            .transaction(|tx| tx.insert_member(&SessionGuardian::join(session, guardian, now)))
            .unwrap_err();
        assert!(matches!(err, VotingError::AlreadyMember));

        let members = store.transaction(|tx| tx.members(session)).unwrap();
        assert_eq!(members.len(), 1);
    }

    #[test]
    fn only_one_open_session_per_report() {
        let store = MemoryReviewStore::new();
        let report = Uuid::new_v4();
        let now = Utc::now();

        store
            .transaction(|tx| tx.insert_session(&VotingSession::open(report, now, Duration::minutes(5))))
            .unwrap();
        let err = store
            .transaction(|tx| tx.insert_session(&VotingSession::open(report, now, Duration::minutes(5))))
            .unwrap_err();
        assert!(matches!(err, VotingError::Contention));
    }

    #[test]
    fn queue_scan_orders_by_priority_then_age() {
        let store = MemoryReviewStore::new();
        let now = Utc::now();
        let old_low = QueueEntry::new(Uuid::new_v4(), 0, now - Duration::minutes(10));
        let new_high = QueueEntry::new(Uuid::new_v4(), 5, now);
        let old_high = QueueEntry::new(Uuid::new_v4(), 5, now - Duration::minutes(1));

        let order = store
            .transaction(|tx| {
                for e in [&old_low, &new_high, &old_high] {
                    tx.insert_queue_entry(e)?;
                }
                tx.open_queue_entries()
            })
            .unwrap();

        let ids: Vec<Uuid> = order.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![old_high.id, new_high.id, old_low.id]);
    }
}
