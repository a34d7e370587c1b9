//! Vote casting, quorum detection and resolution.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{VotingError, VotingResult};
use crate::models::{Report, Vote, VotingSession};
use crate::status::{Punishment, VoteCategory};
use crate::store::ReviewTx;
use crate::voting::{anonymized_votes, disposition, scoring, session, AnonymousVote, PanelSettings, Touched};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUp {
    pub guardian_id: Uuid,
    pub discord_id: i64,
    pub old_level: i32,
    pub new_level: i32,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub punishment: Punishment,
    pub level_ups: Vec<LevelUp>,
}

#[derive(Debug, Clone)]
pub struct VoteReceipt {
    pub report: Report,
    pub session: VotingSession,
    pub category: VoteCategory,
    /// Present when this vote reached quorum.
    pub resolution: Option<Resolution>,
    pub tally: Vec<AnonymousVote>,
}

impl VoteReceipt {
    pub fn completed(&self) -> bool {
        self.resolution.is_some()
    }
}

pub fn cast_vote(
    tx: &mut dyn ReviewTx,
    session_id: Uuid,
    guardian_id: Uuid,
    category: VoteCategory,
    settings: &PanelSettings,
    now: DateTime<Utc>,
) -> VotingResult<Touched<VoteReceipt>> {
    let member = tx.member(session_id, guardian_id)?;
    if member.as_ref().is_some_and(|m| m.has_voted) {
        return Err(VotingError::AlreadyVoted);
    }

    let mut session = match session::load_open(tx, session_id, now)? {
        Touched::Live(s) => s,
        Touched::Expired(c) => return Ok(Touched::Expired(c)),
    };

    let mut member = member.filter(|m| m.is_active).ok_or(VotingError::NotMember)?;
    if tx.vote_exists(session.report_id, guardian_id)? {
        return Err(VotingError::AlreadyVoted);
    }

    let mut report = tx
        .report(session.report_id)?
        .ok_or(VotingError::ReportNotFound(session.report_id))?;

    member.record_vote(category, now);
    tx.update_member(&member)?;
    tx.insert_vote(&Vote::new(report.id, guardian_id, category, now))?;
    report.record_vote(category)?;
    tx.update_report(&report)?;

    tracing::info!(
        %session_id,
        report_id = %report.id,
        %category,
        total_votes = report.total_votes,
        "vote recorded"
    );

    let resolution = if report.total_votes >= settings.panel_size {
        Some(resolve(tx, &mut report, &mut session, now)?)
    } else {
        None
    };

    let tally = anonymized_votes(tx, report.id)?;
    Ok(Touched::Live(VoteReceipt {
        report,
        session,
        category,
        resolution,
        tally,
    }))
}

/// Completes the report, its session and queue entry, then scores every vote.
fn resolve(
    tx: &mut dyn ReviewTx,
    report: &mut Report,
    session: &mut VotingSession,
    now: DateTime<Utc>,
) -> VotingResult<Resolution> {
    let punishment = disposition::resolve(report.tally());

    report.complete(punishment, now)?;
    tx.update_report(report)?;

    session.complete(now)?;
    tx.update_session(session)?;

    for mut member in tx.members(session.id)? {
        if member.is_pending() {
            member.deactivate(now);
            tx.update_member(&member)?;
        }
    }

    if let Some(mut entry) = tx.queue_entry_for_report(report.id)? {
        entry.complete(now)?;
        tx.update_queue_entry(&entry)?;
    }

    let mut level_ups = Vec::new();
    for vote in tx.votes_for_report(report.id)? {
        let Some(mut guardian) = tx.guardian(vote.guardian_id)? else {
            continue;
        };
        let correct = scoring::is_vote_correct(vote.category, punishment);
        if let Some((old_level, new_level)) = guardian.record_outcome(correct) {
            level_ups.push(LevelUp {
                guardian_id: guardian.id,
                discord_id: guardian.discord_id,
                old_level,
                new_level,
            });
        }
        tx.update_guardian(&guardian)?;
    }

    tracing::info!(
        report_id = %report.id,
        session_id = %session.id,
        %punishment,
        "report resolved"
    );

    Ok(Resolution {
        punishment,
        level_ups,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::{Guardian, QueueEntry};
    use crate::status::{QueueStatus, ReportStatus, SessionStatus};
    use crate::store::{MemoryReviewStore, ReviewStore};
    use crate::voting::queue;

    struct Fixture {
        store: MemoryReviewStore,
        report_id: Uuid,
        guardians: Vec<Uuid>,
        now: DateTime<Utc>,
    }

    fn fixture(reviewers: i64) -> Fixture {
        let store = MemoryReviewStore::new();
        let now = Utc::now();
        let report = Report::new(1, 2, 3, 4, "ameaças no chat", now);
        let guardians: Vec<Guardian> = (1..=reviewers)
            .map(|id| Guardian::new(id, "g", "G", now))
            .collect();
        store
            .transaction(|tx| {
                tx.insert_report(&report)?;
                tx.insert_queue_entry(&QueueEntry::new(report.id, 0, now))?;
                for g in &guardians {
                    tx.insert_guardian(g)?;
                }
                Ok(())
            })
            .unwrap();
        Fixture {
            store,
            report_id: report.id,
            guardians: guardians.iter().map(|g| g.id).collect(),
            now,
        }
    }

    fn seat(f: &Fixture, guardian: Uuid) -> Uuid {
        f.store
            .transaction(|tx| queue::claim_next(tx, guardian, &PanelSettings::default(), f.now))
            .unwrap()
            .seat
            .unwrap()
            .session
            .id
    }

    fn vote(f: &Fixture, session: Uuid, guardian: Uuid, c: VoteCategory) -> VotingResult<Touched<VoteReceipt>> {
        f.store
            .transaction(|tx| cast_vote(tx, session, guardian, c, &PanelSettings::default(), f.now))
    }

    fn live(t: Touched<VoteReceipt>) -> VoteReceipt {
        match t {
            Touched::Live(r) => r,
            Touched::Expired(c) => panic!("session {} expired", c.session_id),
        }
    }

    #[test]
    fn fifth_vote_resolves_to_mute_long() {
        let f = fixture(5);
        let ballots = [
            VoteCategory::Intimidou,
            VoteCategory::Grave,
            VoteCategory::Intimidou,
            VoteCategory::Grave,
            VoteCategory::Intimidou,
        ];

        let mut last = None;
        for (g, c) in f.guardians.iter().zip(ballots) {
            let session = seat(&f, *g);
            last = Some(live(vote(&f, session, *g, c).unwrap()));
        }

        let receipt = last.unwrap();
        let resolution = receipt.resolution.clone().unwrap();
        assert_eq!(resolution.punishment, Punishment::MuteLong);
        assert_eq!(receipt.report.status, ReportStatus::Completed);
        assert_eq!(receipt.session.status, SessionStatus::Completed);
        assert_eq!(receipt.tally.len(), 5);

        let entry = f
            .store
            .transaction(|tx| tx.queue_entry_for_report(f.report_id))
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, QueueStatus::Completed);
    }

    #[test]
    fn fewer_than_five_votes_leave_report_voting() {
        let f = fixture(4);
        for g in &f.guardians {
            let session = seat(&f, *g);
            let receipt = live(vote(&f, session, *g, VoteCategory::Grave).unwrap());
            assert!(!receipt.completed());
        }
        let report = f.store.transaction(|tx| tx.report(f.report_id)).unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Voting);
        assert_eq!(report.total_votes, 4);
    }

    #[test]
    fn double_vote_is_rejected() {
        let f = fixture(1);
        let g = f.guardians[0];
        let session = seat(&f, g);
        vote(&f, session, g, VoteCategory::Grave).unwrap();

        let err = vote(&f, session, g, VoteCategory::Improcedente).unwrap_err();
        assert!(matches!(err, VotingError::AlreadyVoted));

        let report = f.store.transaction(|tx| tx.report(f.report_id)).unwrap().unwrap();
        assert_eq!(report.total_votes, 1);
    }

    #[test]
    fn outsider_cannot_vote() {
        let f = fixture(2);
        let session = seat(&f, f.guardians[0]);
        let err = vote(&f, session, f.guardians[1], VoteCategory::Grave).unwrap_err();
        assert!(matches!(err, VotingError::NotMember));
    }

    #[test]
    fn vote_after_deadline_cancels_session() {
        let f = fixture(1);
        let g = f.guardians[0];
        let session = seat(&f, g);

        let late = f.now + Duration::minutes(5) + Duration::seconds(1);
        let outcome = f
            .store
            .transaction(|tx| cast_vote(tx, session, g, VoteCategory::Grave, &PanelSettings::default(), late))
            .unwrap();
        assert!(matches!(outcome, Touched::Expired(_)));

        let report = f.store.transaction(|tx| tx.report(f.report_id)).unwrap().unwrap();
        assert_eq!(report.total_votes, 0);
    }

    #[test]
    fn resolution_scores_every_voter() {
        let f = fixture(5);
        for (i, g) in f.guardians.iter().enumerate() {
            let session = seat(&f, *g);
            let c = if i < 3 { VoteCategory::Improcedente } else { VoteCategory::Grave };
            vote(&f, session, *g, c).unwrap();
        }

        let scored: Vec<Guardian> = f
            .store
            .transaction(|tx| {
                let mut out = Vec::new();
                for g in &f.guardians {
                    out.extend(tx.guardian(*g)?);
                }
                Ok(out)
            })
            .unwrap();
        let correct: i32 = scored.iter().map(|g| g.correct_votes).sum();
        let incorrect: i32 = scored.iter().map(|g| g.incorrect_votes).sum();
        assert_eq!((correct, incorrect), (3, 2));
    }
}
