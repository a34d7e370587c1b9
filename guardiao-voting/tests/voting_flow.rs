mod common;

use chrono::Duration;

use guardiao_shared::types::event::routing_keys;
use guardiao_voting::error::VotingError;
use guardiao_voting::services::moderation_service::NewReport;
use guardiao_voting::status::{Punishment, QueueStatus, ReportStatus, SessionStatus, VoteCategory};

use common::harness;

use VoteCategory::{Grave, Improcedente, Intimidou};

/// Seats each reviewer in turn and casts the matching ballot.
async fn vote_round(h: &common::Harness, reviewers: &[uuid::Uuid], ballots: &[VoteCategory]) {
    for (g, c) in reviewers.iter().zip(ballots) {
        let packet = h.service.claim_next(*g).await.unwrap().expect("a report is pending");
        let receipt = h.service.cast_vote(packet.session_id, *g, *c).await.unwrap();
        let t = receipt.report.tally();
        assert_eq!(receipt.report.total_votes, t.improcedente + t.intimidou + t.grave);
    }
}

#[tokio::test]
async fn scenario_a_three_improcedente_two_grave_is_no_punishment() {
    let h = harness();
    let reviewers = h.guardians(5).await;
    let report_id = h.report().await;

    vote_round(&h, &reviewers, &[Improcedente, Grave, Improcedente, Grave, Improcedente]).await;

    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.report.status, ReportStatus::Completed);
    assert_eq!(details.report.punishment, Punishment::None);
    h.settled().await;
    assert!(h.bot.orders.lock().unwrap().is_empty());
}

#[tokio::test]
async fn scenario_b_three_intimidou_two_grave_is_mute_long() {
    let h = harness();
    let reviewers = h.guardians(5).await;
    let report_id = h.report().await;

    vote_round(&h, &reviewers, &[Intimidou, Intimidou, Grave, Grave, Intimidou]).await;

    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.report.punishment, Punishment::MuteLong);
    assert_eq!(details.queue_entry.unwrap().status, QueueStatus::Completed);
    assert_eq!(details.sessions.len(), 1);
    assert_eq!(details.sessions[0].status, SessionStatus::Completed);

    h.settled().await;
    let orders = h.bot.orders.lock().unwrap();
    assert_eq!(orders.len(), 1, "enforcement is dispatched exactly once");
    assert_eq!(orders[0].target_user_id, 300);
    assert_eq!(orders[0].punishment, Punishment::MuteLong);
    assert_eq!(h.event_count(routing_keys::MODERATION_REPORT_COMPLETED), 1);
}

#[tokio::test]
async fn scenario_c_abandoned_report_is_reachable_again() {
    let h = harness();
    let reviewers = h.guardians(2).await;
    let report_id = h.report().await;

    let first = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    let outcome = h.service.leave(first.session_id, reviewers[0]).await.unwrap();
    assert!(outcome.cancelled.is_some());

    let details = h.service.report_details(report_id).await.unwrap();
    let entry = details.queue_entry.unwrap();
    assert_eq!(entry.status, QueueStatus::Pending);
    assert!(entry.assigned_at.is_none());

    let second = h.service.claim_next(reviewers[1]).await.unwrap().unwrap();
    assert_eq!(second.report_id, report_id);
    assert_ne!(second.session_id, first.session_id);

    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.queue_entry.unwrap().status, QueueStatus::Assigned);
}

#[tokio::test]
async fn scenario_d_lapsed_session_is_cancelled_on_next_poll() {
    let h = harness();
    let reviewers = h.guardians(2).await;
    let report_id = h.report().await;

    let seat = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    h.clock.advance(Duration::minutes(5) + Duration::seconds(1));

    let again = h.service.claim_next(reviewers[0]).await.unwrap();
    assert!(again.is_none());

    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.sessions[0].id, seat.session_id);
    assert_eq!(details.sessions[0].status, SessionStatus::Cancelled);
    assert_eq!(details.queue_entry.unwrap().status, QueueStatus::Pending);
    assert_eq!(details.report.total_votes, 0);
    assert_eq!(h.event_count(routing_keys::MODERATION_SESSION_CANCELLED), 1);

    // Another reviewer picks it up in a fresh session.
    let fresh = h.service.claim_next(reviewers[1]).await.unwrap().unwrap();
    assert_eq!(fresh.report_id, report_id);
    assert_ne!(fresh.session_id, seat.session_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_e_concurrent_claims_share_one_session() {
    let h = harness();
    let reviewers = h.guardians(2).await;
    let report_id = h.report().await;

    let (a, b) = tokio::join!(
        h.service.claim_next(reviewers[0]),
        h.service.claim_next(reviewers[1]),
    );
    let (a, b) = (a.unwrap().unwrap(), b.unwrap().unwrap());
    assert_eq!(a.session_id, b.session_id);

    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.sessions.len(), 1);
}

#[tokio::test]
async fn vote_on_lapsed_session_asks_to_poll_again() {
    let h = harness();
    let reviewers = h.guardians(1).await;
    let report_id = h.report().await;

    let seat = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    h.clock.advance(Duration::minutes(6));

    let err = h.service.cast_vote(seat.session_id, reviewers[0], Grave).await.unwrap_err();
    assert!(matches!(err, VotingError::SessionExpired));

    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.report.total_votes, 0);
    assert_eq!(details.sessions[0].status, SessionStatus::Cancelled);
    assert_eq!(details.queue_entry.unwrap().status, QueueStatus::Pending);
}

#[tokio::test]
async fn reviewer_cannot_vote_twice_on_a_report() {
    let h = harness();
    let reviewers = h.guardians(1).await;
    h.report().await;

    let seat = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    h.service.cast_vote(seat.session_id, reviewers[0], Grave).await.unwrap();

    let err = h
        .service
        .cast_vote(seat.session_id, reviewers[0], Improcedente)
        .await
        .unwrap_err();
    assert!(matches!(err, VotingError::AlreadyVoted));
}

#[tokio::test]
async fn cast_vote_disqualifies_reviewer_after_session_is_cancelled() {
    let h = harness();
    let reviewers = h.guardians(2).await;
    let report_id = h.report().await;

    let seat = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    h.service.cast_vote(seat.session_id, reviewers[0], Grave).await.unwrap();
    h.service.claim_next(reviewers[1]).await.unwrap().unwrap();

    h.clock.advance(Duration::minutes(6));
    assert_eq!(h.service.sweep_expired().await.unwrap().len(), 1);

    // The vote carries over; the voter is never offered the report again.
    assert!(h.service.claim_next(reviewers[0]).await.unwrap().is_none());
    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.report.total_votes, 1);
    assert_eq!(details.report.status, ReportStatus::Voting);
}

#[tokio::test]
async fn leaving_after_voting_keeps_the_ballot() {
    let h = harness();
    let reviewers = h.guardians(2).await;
    let report_id = h.report().await;

    let seat = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    h.service.claim_next(reviewers[1]).await.unwrap().unwrap();
    h.service.cast_vote(seat.session_id, reviewers[0], Intimidou).await.unwrap();

    let outcome = h.service.leave(seat.session_id, reviewers[0]).await.unwrap();
    assert!(outcome.cancelled.is_none(), "second reviewer is still seated");

    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.votes.len(), 1);
    assert_eq!(details.sessions[0].status, SessionStatus::Voting);
}

#[tokio::test]
async fn sixth_reviewer_finds_nothing_after_quorum() {
    let h = harness();
    let reviewers = h.guardians(6).await;
    h.report().await;

    vote_round(&h, &reviewers[..5], &[Grave, Grave, Grave, Grave, Intimidou]).await;

    assert!(h.service.claim_next(reviewers[5]).await.unwrap().is_none());
    h.settled().await;
    assert_eq!(h.bot.orders.lock().unwrap()[0].punishment, Punishment::TempBan);
}

#[tokio::test]
async fn completion_notifies_reporter_accused_and_reviewers() {
    let h = harness();
    let reviewers = h.guardians(5).await;
    let report_id = h.report().await;

    vote_round(&h, &reviewers, &[Grave, Grave, Grave, Intimidou, Intimidou]).await;
    h.settled().await;

    let direct = h.bot.direct.lock().unwrap();
    let recipients: Vec<i64> = direct.iter().map(|(id, _)| *id).collect();
    assert!(recipients.contains(&400), "reporter is told the outcome");
    assert!(recipients.contains(&300), "accused is told the punishment");

    let pings = h.bot.pings.lock().unwrap();
    // One ping when filed, one when completed.
    assert_eq!(pings.iter().filter(|(id, _)| *id == report_id).count(), 2);
}

#[tokio::test]
async fn self_report_is_rejected() {
    let h = harness();
    let err = h
        .service
        .file_report(NewReport {
            guild_id: 1,
            channel_id: 2,
            reported_user_id: 77,
            reporter_user_id: 77,
            reason: "teste".into(),
            transcript: Vec::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, VotingError::SelfReport));
}

#[tokio::test]
async fn reprioritize_moves_report_to_front_until_resolved() {
    let h = harness();
    let reviewers = h.guardians(1).await;
    h.report().await;
    let urgent = h.report().await;

    h.service.reprioritize(urgent, 10).await.unwrap();
    let seat = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    assert_eq!(seat.report_id, urgent);

    let h2 = harness();
    let voters = h2.guardians(5).await;
    let done = h2.report().await;
    vote_round(&h2, &voters, &[Improcedente, Improcedente, Improcedente, Grave, Grave]).await;
    let err = h2.service.reprioritize(done, 5).await.unwrap_err();
    assert!(matches!(err, VotingError::NotQueued(_)));
}

#[tokio::test]
async fn dashboard_counts_reports_and_backlog() {
    let h = harness();
    h.guardians(2).await;
    h.report().await;
    h.report().await;

    let stats = h.service.dashboard_stats().await.unwrap();
    assert_eq!(stats.reports_by_status["pending"], 2);
    assert_eq!(stats.queue_backlog, 2);
    assert_eq!(stats.online_guardians, 2);
    assert_eq!(stats.open_sessions, 0);
}

#[tokio::test]
async fn register_guardian_is_idempotent() {
    let h = harness();
    let a = h.service.register_guardian(55, "ana".into(), "Ana".into()).await.unwrap();
    let b = h.service.register_guardian(55, "ana".into(), "Ana B".into()).await.unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(b.discord_display_name, "Ana B");
}

#[tokio::test]
async fn stalled_bot_never_holds_intake_or_the_deciding_vote() {
    let h = common::stalled_harness(std::time::Duration::from_secs(30));
    let reviewers = h.guardians(5).await;

    let quick = std::time::Duration::from_secs(5);
    let report_id = tokio::time::timeout(quick, h.report())
        .await
        .expect("intake returns while the announcement is pending");

    let deciding = tokio::time::timeout(
        quick,
        vote_round(&h, &reviewers, &[Grave, Grave, Grave, Grave, Intimidou]),
    )
    .await;
    assert!(deciding.is_ok(), "fifth vote returns while dispatch is pending");

    let details = h.service.report_details(report_id).await.unwrap();
    assert_eq!(details.report.status, ReportStatus::Completed);
    assert_eq!(details.report.punishment, Punishment::TempBan);
}

#[tokio::test]
async fn unvoted_leaver_can_be_seated_again_while_session_stays_open() {
    let h = harness();
    let reviewers = h.guardians(2).await;
    let report_id = h.report().await;

    let first = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    let second = h.service.claim_next(reviewers[1]).await.unwrap().unwrap();
    assert_eq!(first.session_id, second.session_id);

    let outcome = h.service.leave(first.session_id, reviewers[0]).await.unwrap();
    assert!(outcome.cancelled.is_none(), "another reviewer is still seated");

    let again = h.service.claim_next(reviewers[0]).await.unwrap().unwrap();
    assert_eq!(again.report_id, report_id);
    assert_eq!(again.session_id, first.session_id);
    assert!(!again.has_voted);
}
