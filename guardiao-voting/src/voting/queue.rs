//! Review queue: backfill and the claim scan that seats a reviewer in a
//! session.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{VotingError, VotingResult};
use crate::models::{QueueEntry, Report, SessionGuardian, VotingSession};
use crate::status::QueueStatus;
use crate::store::ReviewTx;
use crate::voting::{session, Cancellation, PanelSettings};

/// A reviewer's seat in a session.
#[derive(Debug, Clone)]
pub struct Seat {
    pub session: VotingSession,
    pub member: SessionGuardian,
    pub report: Report,
    /// The session was opened by this claim.
    pub opened: bool,
}

#[derive(Debug, Default)]
pub struct ClaimResult {
    /// `None` means nothing is pending for this reviewer.
    pub seat: Option<Seat>,
    pub cancelled: Vec<Cancellation>,
}

/// Gives every reviewable report without a queue entry a default-priority one.
pub fn backfill(tx: &mut dyn ReviewTx, now: DateTime<Utc>) -> VotingResult<usize> {
    let orphans = tx.orphaned_report_ids()?;
    for report_id in &orphans {
        tx.insert_queue_entry(&QueueEntry::new(*report_id, QueueEntry::DEFAULT_PRIORITY, now))?;
        tracing::info!(%report_id, "backfilled queue entry for orphaned report");
    }
    Ok(orphans.len())
}

/// Returns the reviewer's current seat or finds them a new one.
pub fn claim_next(
    tx: &mut dyn ReviewTx,
    guardian_id: Uuid,
    settings: &PanelSettings,
    now: DateTime<Utc>,
) -> VotingResult<ClaimResult> {
    if tx.guardian(guardian_id)?.is_none() {
        return Err(VotingError::GuardianNotFound(guardian_id));
    }

    let mut result = ClaimResult::default();
    // Reports whose session lapsed under this reviewer during this claim;
    // they go back to the queue for someone else.
    let mut lapsed: HashSet<Uuid> = HashSet::new();

    for mut member in tx.pending_memberships(guardian_id)? {
        let Some(mut current) = tx.session(member.session_id)? else {
            continue;
        };
        if !current.status.is_open() {
            member.deactivate(now);
            tx.update_member(&member)?;
            continue;
        }
        if let Some(c) = session::expire_if_due(tx, &mut current, now)? {
            lapsed.insert(c.report_id);
            result.cancelled.push(c);
            continue;
        }

        let report = tx
            .report(current.report_id)?
            .ok_or(VotingError::ReportNotFound(current.report_id))?;
        result.seat = Some(Seat {
            session: current,
            member,
            report,
            opened: false,
        });
        return Ok(result);
    }

    backfill(tx, now)?;

    let voted: HashSet<Uuid> = tx.voted_report_ids(guardian_id)?.into_iter().collect();

    for mut entry in tx.open_queue_entries()? {
        if voted.contains(&entry.report_id) || lapsed.contains(&entry.report_id) {
            continue;
        }
        let Some(report) = tx.report(entry.report_id)? else {
            continue;
        };
        if !report.status.is_reviewable() {
            tracing::warn!(report_id = %report.id, status = %report.status, "skipping stale queue entry");
            continue;
        }

        if let Some(mut open) = tx.open_session_for_report(report.id)? {
            if let Some(c) = session::expire_if_due(tx, &mut open, now)? {
                lapsed.insert(c.report_id);
                result.cancelled.push(c);
                continue;
            }
            if tx.member(open.id, guardian_id)?.is_some() {
                // Still holds a row here, so voted and left; no way back in.
                continue;
            }
            let seated = tx
                .members(open.id)?
                .iter()
                .filter(|m| m.is_pending())
                .count() as i32;
            if report.total_votes + seated >= settings.panel_size {
                continue;
            }

            let member = SessionGuardian::join(open.id, guardian_id, now);
            tx.insert_member(&member)?;
            tracing::info!(session_id = %open.id, report_id = %report.id, %guardian_id, "guardian joined session");

            result.seat = Some(Seat {
                session: open,
                member,
                report,
                opened: false,
            });
            return Ok(result);
        }

        let mut fresh = VotingSession::open(report.id, now, settings.voting_window);
        tx.insert_session(&fresh)?;
        let member = SessionGuardian::join(fresh.id, guardian_id, now);
        tx.insert_member(&member)?;
        fresh.start(now)?;
        tx.update_session(&fresh)?;

        if entry.status == QueueStatus::Pending {
            entry.assign(now)?;
            tx.update_queue_entry(&entry)?;
        }

        tracing::info!(
            session_id = %fresh.id,
            report_id = %report.id,
            %guardian_id,
            deadline = %fresh.voting_deadline,
            "voting session opened"
        );

        result.seat = Some(Seat {
            session: fresh,
            member,
            report,
            opened: true,
        });
        return Ok(result);
    }

    Ok(result)
}
