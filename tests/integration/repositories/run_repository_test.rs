// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::test_db;
use chrono::{Duration, Utc};
use crawlkeeper::domain::models::attempt::{AttemptContext, AttemptOutcome, TaskAttempt};
use crawlkeeper::domain::models::run::{Run, RunChange, RunQuery, RunState};
use crawlkeeper::domain::repositories::run_repository::RunRepository;
use crawlkeeper::infrastructure::repositories::run_repo_impl::RunRepositoryImpl;
use std::sync::Arc;
use uuid::Uuid;

async fn repo() -> Arc<RunRepositoryImpl> {
    Arc::new(RunRepositoryImpl::new(test_db().await))
}

fn run_at(source: &str, minutes_ago: i64) -> Run {
    let mut run = Run::new(Uuid::new_v4(), source, 3);
    run.requested_at = Utc::now() - Duration::minutes(minutes_ago);
    run.updated_at = run.requested_at;
    run
}

#[tokio::test]
async fn test_create_and_find_round_trip() {
    let repo = repo().await;
    let run = Run::new(Uuid::new_v4(), "bbc", 3);
    repo.create(&run).await.unwrap();

    let found = repo.find(run.id).await.unwrap().unwrap();
    assert_eq!(found.id, run.id);
    assert_eq!(found.state, RunState::Requested);
    assert_eq!(found.max_attempts, 3);
    assert!(!found.needs_repair);

    let history = repo.history(run.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_state, None);
    assert_eq!(history[0].to_state, RunState::Requested);

    assert!(repo.find(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_transition_requires_expected_state() {
    let repo = repo().await;
    let run = Run::new(Uuid::new_v4(), "bbc", 3);
    repo.create(&run).await.unwrap();

    let rejected = repo
        .transition(run.id, &[RunState::Scheduled], RunChange::to(RunState::Running))
        .await
        .unwrap();
    assert!(rejected.is_none());

    let scheduled = repo
        .transition(run.id, &[RunState::Requested], RunChange::to(RunState::Scheduled))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(scheduled.state, RunState::Scheduled);

    let running = repo
        .transition(
            run.id,
            &[RunState::Scheduled],
            RunChange::to(RunState::Running)
                .with_attempt(1)
                .with_started_at(Utc::now()),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(running.attempt_count, 1);
    assert!(running.started_at.is_some());

    let history = repo.history(run.id).await.unwrap();
    let states: Vec<RunState> = history.iter().map(|t| t.to_state).collect();
    assert_eq!(
        states,
        vec![RunState::Requested, RunState::Scheduled, RunState::Running]
    );
    assert_eq!(history[2].from_state, Some(RunState::Scheduled));
    assert_eq!(history[2].attempt, 1);
}

async fn running_run(repo: &RunRepositoryImpl) -> Run {
    let run = Run::new(Uuid::new_v4(), "bbc", 3);
    repo.create(&run).await.unwrap();
    repo.transition(run.id, &[RunState::Requested], RunChange::to(RunState::Scheduled))
        .await
        .unwrap();
    repo.transition(
        run.id,
        &[RunState::Scheduled],
        RunChange::to(RunState::Running).with_attempt(1),
    )
    .await
    .unwrap()
    .unwrap()
}

fn attempt_of(run: &Run, outcome: &AttemptOutcome) -> TaskAttempt {
    let ctx = AttemptContext {
        run_id: run.id,
        attempt: 1,
        started_at: Utc::now(),
    };
    TaskAttempt::from_outcome(&ctx, outcome)
}

#[tokio::test]
async fn test_transition_writes_attempt_in_same_commit() {
    let repo = repo().await;
    let run = running_run(&repo).await;
    let outcome = AttemptOutcome::transient("connection reset");

    // 状态不匹配时尝试记录也不写入
    let rejected = repo
        .transition(
            run.id,
            &[RunState::Scheduled],
            RunChange::to(RunState::Failed).recording(attempt_of(&run, &outcome)),
        )
        .await
        .unwrap();
    assert!(rejected.is_none());
    assert!(repo.attempts(run.id).await.unwrap().is_empty());

    repo.transition(
        run.id,
        &[RunState::Running],
        RunChange::to(RunState::Scheduled)
            .with_error("connection reset")
            .recording(attempt_of(&run, &outcome)),
    )
    .await
    .unwrap()
    .unwrap();

    let attempts = repo.attempts(run.id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].attempt, 1);
    assert_eq!(attempts[0].retry_cause.as_deref(), Some("connection reset"));
}

#[tokio::test]
async fn test_clearing_error_resets_error_detail() {
    let repo = repo().await;
    let run = running_run(&repo).await;

    let retried = repo
        .transition(
            run.id,
            &[RunState::Running],
            RunChange::to(RunState::Scheduled).with_error("timeout"),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retried.error_detail.as_deref(), Some("timeout"));

    // 未指定时保留原值
    let claimed = repo
        .transition(
            run.id,
            &[RunState::Scheduled],
            RunChange::to(RunState::Running).with_attempt(2),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.error_detail.as_deref(), Some("timeout"));

    repo.transition(
        run.id,
        &[RunState::Running],
        RunChange::to(RunState::Succeeded).clearing_error(),
    )
    .await
    .unwrap();
    let stored = repo.find(run.id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Succeeded);
    assert_eq!(stored.error_detail, None);
}

#[tokio::test]
async fn test_unknown_run_transition_is_not_found() {
    let repo = repo().await;
    let result = repo
        .transition(
            Uuid::new_v4(),
            &[RunState::Scheduled],
            RunChange::to(RunState::Running),
        )
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_concurrent_claims_have_single_winner() {
    let repo = repo().await;
    let run = Run::new(Uuid::new_v4(), "bbc", 3);
    repo.create(&run).await.unwrap();
    repo.transition(run.id, &[RunState::Requested], RunChange::to(RunState::Scheduled))
        .await
        .unwrap();

    let claims = (0..4).map(|_| {
        let repo = repo.clone();
        let id = run.id;
        tokio::spawn(async move {
            repo.transition(
                id,
                &[RunState::Scheduled],
                RunChange::to(RunState::Running).with_attempt(1),
            )
            .await
            .unwrap()
        })
    });

    let results = futures::future::join_all(claims).await;
    let winners = results
        .into_iter()
        .filter(|r| r.as_ref().unwrap().is_some())
        .count();
    assert_eq!(winners, 1);

    let history = repo.history(run.id).await.unwrap();
    assert_eq!(history.len(), 3);
}

#[tokio::test]
async fn test_terminal_state_is_final() {
    let repo = repo().await;
    let run = Run::new(Uuid::new_v4(), "bbc", 3);
    repo.create(&run).await.unwrap();
    for (from, to) in [
        (RunState::Requested, RunState::Scheduled),
        (RunState::Scheduled, RunState::Running),
        (RunState::Running, RunState::Succeeded),
    ] {
        repo.transition(run.id, &[from], RunChange::to(to))
            .await
            .unwrap()
            .unwrap();
    }

    let cancel = repo
        .transition(
            run.id,
            &RunState::predecessors(RunState::Cancelled),
            RunChange::to(RunState::Cancelled),
        )
        .await
        .unwrap();
    assert!(cancel.is_none());
    assert_eq!(
        repo.find(run.id).await.unwrap().unwrap().state,
        RunState::Succeeded
    );
}

#[tokio::test]
async fn test_query_filters_and_pagination() {
    let repo = repo().await;
    let oldest = run_at("bbc", 50);
    let runs = vec![
        oldest.clone(),
        run_at("reuters", 40),
        run_at("bbc", 30),
        run_at("reuters", 20),
        run_at("bbc", 10),
    ];
    for run in &runs {
        repo.create(run).await.unwrap();
    }
    repo.transition(oldest.id, &[RunState::Requested], RunChange::to(RunState::Scheduled))
        .await
        .unwrap();

    let bbc = repo
        .query(&RunQuery {
            source_name: Some("bbc".to_string()),
            per_page: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(bbc.total, 3);
    assert_eq!(bbc.items.len(), 2);
    // 最新的在前
    assert_eq!(bbc.items[0].id, runs[4].id);
    assert_eq!(bbc.items[1].id, runs[2].id);

    let second_page = repo
        .query(&RunQuery {
            source_name: Some("bbc".to_string()),
            page: 1,
            per_page: 2,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(second_page.items.len(), 1);
    assert_eq!(second_page.items[0].id, oldest.id);

    let window = repo
        .query(&RunQuery {
            requested_from: Some(Utc::now() - Duration::minutes(45)),
            requested_to: Some(Utc::now() - Duration::minutes(15)),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(window.total, 3);

    let scheduled = repo
        .query(&RunQuery {
            states: Some(vec![RunState::Scheduled]),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(scheduled.total, 1);
    assert_eq!(scheduled.items[0].id, oldest.id);
}

#[tokio::test]
async fn test_find_stale_running_and_active() {
    let repo = repo().await;

    let mut stale = run_at("bbc", 60);
    stale.state = RunState::Running;
    stale.attempt_count = 1;
    repo.create(&stale).await.unwrap();

    let mut fresh = Run::new(Uuid::new_v4(), "reuters", 3);
    fresh.state = RunState::Running;
    fresh.attempt_count = 1;
    repo.create(&fresh).await.unwrap();

    let found = repo
        .find_stale_running(Utc::now() - Duration::minutes(15))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, stale.id);

    assert!(repo.has_active_run("bbc").await.unwrap());
    assert!(!repo.has_active_run("ap").await.unwrap());
    assert_eq!(repo.find_by_state(RunState::Running).await.unwrap().len(), 2);
}
