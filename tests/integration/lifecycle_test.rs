// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::fakes::Step;
use super::helpers::{create_test_app, fast_config, feed, json_source};
use chrono::Utc;
use crawlkeeper::domain::models::attempt::{
    AttemptContext, AttemptOutcome, AttemptStats, AttemptStatus, FailureClass, UnitFailure,
};
use crawlkeeper::domain::models::content::ContentUnit;
use crawlkeeper::domain::models::run::{
    DispatchMode, JobRequest, Run, RunChange, RunOutcome, RunQuery, RunState,
};
use crawlkeeper::domain::repositories::content_repository::ContentRepository;
use crawlkeeper::domain::repositories::run_repository::RunRepository;
use crawlkeeper::utils::errors::LifecycleError;
use crawlkeeper::utils::retry_policy::RetryPolicy;
use crawlkeeper::workers::lifecycle::{AttemptDecision, LifecycleConfig};
use std::time::Duration;
use uuid::Uuid;

const BBC_FEED: [(&str, &str); 3] = [
    ("https://www.bbc.example.com/news/a", "Markets rally on rate cut."),
    ("https://www.bbc.example.com/news/b", "Storm hits the coast."),
    ("https://www.bbc.example.com/news/c", "Election results are in."),
];

async fn run_single(
    app: &super::helpers::TestApp,
    source: &str,
) -> crawlkeeper::domain::models::run::RunStatus {
    let submission = app
        .lifecycle
        .submit(JobRequest::single(source))
        .await
        .unwrap();
    let mut statuses = app.lifecycle.dispatch(&submission).wait().await.unwrap();
    assert_eq!(statuses.len(), 1);
    statuses.remove(0)
}

/// 3 个单元中 1 个已存在：2 条新记录，运行成功
#[tokio::test]
async fn test_scenario_bbc_with_one_duplicate() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.persistence
        .persist(
            &ContentUnit::new(BBC_FEED[1].0, BBC_FEED[1].1),
            "bbc",
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    app.fetcher.script("bbc", vec![Step::Body(feed(&BBC_FEED))]);

    let status = run_single(&app, "bbc").await;

    assert_eq!(status.state(), RunState::Succeeded);
    assert_eq!(status.run.outcome, Some(RunOutcome::Success));
    assert!(!status.run.needs_repair);
    assert!(status.run.ended_at.is_some());
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(status.attempts[0].outcome, AttemptStatus::Success);
    assert_eq!(status.attempts[0].stats.stored, 2);
    assert_eq!(status.attempts[0].stats.duplicates, 1);
    assert_eq!(app.content.count_by_source("bbc").await.unwrap(), 3);

    let history = app.lifecycle.history(status.run.id).await.unwrap();
    let states: Vec<RunState> = history.iter().map(|t| t.to_state).collect();
    assert_eq!(
        states,
        vec![
            RunState::Requested,
            RunState::Scheduled,
            RunState::Running,
            RunState::Succeeded
        ]
    );
}

/// 两次临时性抓取失败后成功：3 次尝试，同一个运行ID
#[tokio::test]
async fn test_scenario_reuters_transient_then_success() {
    let app = create_test_app(vec![json_source("reuters")], fast_config(3)).await;
    app.fetcher.script(
        "reuters",
        vec![
            Step::Refused,
            Step::Refused,
            Step::Body(feed(&[("https://reuters.example.com/1", "Oil prices climb.")])),
        ],
    );

    let status = run_single(&app, "reuters").await;

    assert_eq!(status.state(), RunState::Succeeded);
    assert_eq!(status.run.attempt_count, 3);
    assert_eq!(status.run.outcome, Some(RunOutcome::Success));
    assert_eq!(status.run.error_detail, None);
    let outcomes: Vec<AttemptStatus> = status.attempts.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            AttemptStatus::Failure,
            AttemptStatus::Failure,
            AttemptStatus::Success
        ]
    );
    assert_eq!(
        status.attempts[0].failure_class,
        Some(FailureClass::Transient)
    );
    assert_eq!(app.fetcher.calls_for("reuters"), 3);

    let history = app.lifecycle.history(status.run.id).await.unwrap();
    let retries = history
        .iter()
        .filter(|t| t.from_state == Some(RunState::Running) && t.to_state == RunState::Scheduled)
        .count();
    assert_eq!(retries, 2);
}

/// 订阅中有条目缺少链接：其余条目照常存储，运行按部分成功结束
#[tokio::test]
async fn test_items_without_link_make_run_partial() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    let body = serde_json::json!([
        { "url": "https://www.bbc.example.com/news/ok", "body": "Kept story." },
        { "title": "Dangling headline", "body": "No link." }
    ])
    .to_string();
    app.fetcher.script("bbc", vec![Step::Body(body)]);

    let status = run_single(&app, "bbc").await;

    assert_eq!(status.state(), RunState::PartiallySucceeded);
    assert_eq!(status.run.outcome, Some(RunOutcome::Partial));
    assert!(status
        .run
        .error_detail
        .as_deref()
        .is_some_and(|e| e.contains("no url")));
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(status.attempts[0].stats.stored, 1);
    assert_eq!(status.attempts[0].stats.failed, 1);
    assert_eq!(app.content.count_by_source("bbc").await.unwrap(), 1);
}

/// 对象存储持续失败：记录留下 payload_pending，运行成功但需要修复
#[tokio::test]
async fn test_payload_store_failure_marks_needs_repair() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.storage.set_failing(true);
    app.fetcher
        .script("bbc", vec![Step::Body(feed(&BBC_FEED[..1]))]);

    let status = run_single(&app, "bbc").await;

    assert_eq!(status.state(), RunState::Succeeded);
    assert!(status.run.needs_repair);
    assert_eq!(status.attempts[0].stats.payload_pending, 1);

    let pending = app.content.list_payload_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].payload_pending);
}

#[tokio::test]
async fn test_unknown_source_creates_no_runs() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;

    let result = app
        .lifecycle
        .submit(JobRequest::batch(["bbc", "unknown_site"], DispatchMode::Parallel))
        .await;
    assert!(matches!(result, Err(LifecycleError::UnknownSource(name)) if name == "unknown_site"));

    let page = app.lifecycle.list_runs(&RunQuery::default()).await.unwrap();
    assert_eq!(page.total, 0);

    let empty = app
        .lifecycle
        .submit(JobRequest::batch(Vec::<String>::new(), DispatchMode::Parallel))
        .await;
    assert!(matches!(empty, Err(LifecycleError::EmptyRequest)));
}

#[tokio::test]
async fn test_submit_deduplicates_source_names() {
    let app = create_test_app(vec![json_source("bbc"), json_source("ap")], fast_config(3)).await;

    let submission = app
        .lifecycle
        .submit(JobRequest::batch(["bbc", "ap", "bbc"], DispatchMode::Serial))
        .await
        .unwrap();
    assert_eq!(submission.run_ids.len(), 2);
    assert_eq!(submission.mode, DispatchMode::Serial);

    for id in &submission.run_ids {
        let status = app.lifecycle.status(*id).await.unwrap();
        assert_eq!(status.state(), RunState::Scheduled);
        assert_eq!(status.run.batch_id, submission.batch_id);
    }
}

#[tokio::test]
async fn test_transient_exhaustion_fails_run() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.fetcher.script("bbc", vec![Step::Refused]);

    let status = run_single(&app, "bbc").await;

    assert_eq!(status.state(), RunState::Failed);
    assert_eq!(status.run.outcome, Some(RunOutcome::Failure));
    assert_eq!(status.attempts.len(), 3);
    assert!(status
        .run
        .error_detail
        .as_deref()
        .unwrap_or_default()
        .contains("connection refused"));
    assert_eq!(app.fetcher.calls_for("bbc"), 3);
}

#[tokio::test]
async fn test_permanent_failure_is_not_retried() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.fetcher.script("bbc", vec![Step::Status(404)]);

    let status = run_single(&app, "bbc").await;

    assert_eq!(status.state(), RunState::Failed);
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(
        status.attempts[0].failure_class,
        Some(FailureClass::Permanent)
    );
}

#[tokio::test]
async fn test_schema_mismatch_is_permanent() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.fetcher
        .script("bbc", vec![Step::Body(r#"{"entries": []}"#.to_string())]);

    let status = run_single(&app, "bbc").await;

    assert_eq!(status.state(), RunState::Failed);
    assert_eq!(status.attempts.len(), 1);
}

#[tokio::test]
async fn test_attempt_timeout_goes_through_retry_policy() {
    let config = LifecycleConfig {
        retry: RetryPolicy::immediate(2),
        attempt_timeout: Duration::from_millis(200),
        retry_partial: false,
    };
    let app = create_test_app(vec![json_source("bbc")], config).await;
    app.fetcher.script(
        "bbc",
        vec![Step::Hang(Duration::from_secs(5), feed(&BBC_FEED))],
    );

    let status = run_single(&app, "bbc").await;

    assert_eq!(status.state(), RunState::Failed);
    assert_eq!(status.attempts.len(), 2);
    assert!(status
        .attempts
        .iter()
        .all(|a| a.outcome == AttemptStatus::TimedOut));
    assert!(status
        .run
        .error_detail
        .as_deref()
        .unwrap_or_default()
        .contains("timed out"));
}

#[tokio::test]
async fn test_cancel_terminal_run_is_noop() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.fetcher
        .script("bbc", vec![Step::Body(feed(&BBC_FEED[..1]))]);
    let status = run_single(&app, "bbc").await;
    let before = app.lifecycle.history(status.run.id).await.unwrap();

    let after_cancel = app.lifecycle.cancel(status.run.id).await.unwrap();

    assert_eq!(after_cancel.state(), RunState::Succeeded);
    assert_eq!(app.lifecycle.history(status.run.id).await.unwrap(), before);
}

#[tokio::test]
async fn test_cancel_scheduled_run_skips_execution() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.fetcher
        .script("bbc", vec![Step::Body(feed(&BBC_FEED[..1]))]);

    let submission = app.lifecycle.submit(JobRequest::single("bbc")).await.unwrap();
    let cancelled = app.lifecycle.cancel(submission.run_ids[0]).await.unwrap();
    assert_eq!(cancelled.state(), RunState::Cancelled);

    let statuses = app.lifecycle.dispatch(&submission).wait().await.unwrap();
    assert_eq!(statuses[0].state(), RunState::Cancelled);
    assert!(statuses[0].attempts.is_empty());
    assert!(app.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_run_errors() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    let id = Uuid::new_v4();

    assert!(matches!(
        app.lifecycle.status(id).await,
        Err(LifecycleError::UnknownRun(_))
    ));
    assert!(matches!(
        app.lifecycle.cancel(id).await,
        Err(LifecycleError::UnknownRun(_))
    ));
    assert!(matches!(
        app.lifecycle.history(id).await,
        Err(LifecycleError::UnknownRun(_))
    ));
}

#[tokio::test]
async fn test_serial_dispatch_runs_one_at_a_time() {
    let sources = vec![json_source("a"), json_source("b"), json_source("c")];
    let app = create_test_app(sources, fast_config(3)).await;
    for name in ["a", "b", "c"] {
        let url = format!("https://{}.example.com/1", name);
        app.fetcher
            .script(name, vec![Step::Body(feed(&[(url.as_str(), "Story body")]))]);
    }

    let submission = app
        .lifecycle
        .submit(JobRequest::batch(["a", "b", "c"], DispatchMode::Serial))
        .await
        .unwrap();
    let statuses = app.lifecycle.dispatch(&submission).wait().await.unwrap();

    assert!(statuses.iter().all(|s| s.state() == RunState::Succeeded));
    assert_eq!(app.fetcher.calls(), vec!["a", "b", "c"]);
    assert_eq!(app.fetcher.max_in_flight(), 1);
    for pair in statuses.windows(2) {
        assert!(pair[0].run.ended_at.unwrap() <= pair[1].run.started_at.unwrap());
    }
}

#[tokio::test]
async fn test_parallel_dispatch_drives_every_run() {
    let sources = vec![json_source("a"), json_source("b"), json_source("c")];
    let app = create_test_app(sources, fast_config(3)).await;
    for name in ["a", "b", "c"] {
        let url = format!("https://{}.example.com/1", name);
        app.fetcher
            .script(name, vec![Step::Body(feed(&[(url.as_str(), "Story body")]))]);
    }

    let submission = app
        .lifecycle
        .submit(JobRequest::batch(["a", "b", "c"], DispatchMode::Parallel))
        .await
        .unwrap();
    let statuses = app.lifecycle.dispatch(&submission).wait().await.unwrap();

    assert_eq!(statuses.len(), 3);
    assert!(statuses.iter().all(|s| s.state() == RunState::Succeeded));
    assert_eq!(app.fetcher.calls().len(), 3);
}

#[tokio::test]
async fn test_dispatch_scheduled_picks_up_admitted_runs() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.fetcher
        .script("bbc", vec![Step::Body(feed(&BBC_FEED[..1]))]);
    let submission = app.lifecycle.submit(JobRequest::single("bbc")).await.unwrap();

    let handle = app
        .lifecycle
        .dispatch_scheduled(DispatchMode::Parallel)
        .await
        .unwrap();
    assert_eq!(handle.run_ids(), submission.run_ids.as_slice());

    let statuses = handle.wait().await.unwrap();
    assert_eq!(statuses[0].state(), RunState::Succeeded);
}

async fn claim(app: &super::helpers::TestApp) -> (Uuid, AttemptContext) {
    let submission = app.lifecycle.submit(JobRequest::single("bbc")).await.unwrap();
    let run_id = submission.run_ids[0];
    let started_at = Utc::now();
    app.runs
        .transition(
            run_id,
            &[RunState::Scheduled],
            RunChange::to(RunState::Running)
                .with_attempt(1)
                .with_started_at(started_at),
        )
        .await
        .unwrap()
        .unwrap();
    (
        run_id,
        AttemptContext {
            run_id,
            attempt: 1,
            started_at,
        },
    )
}

fn partial(class: FailureClass) -> AttemptOutcome {
    AttemptOutcome::PartialSuccess {
        stats: AttemptStats {
            stored: 2,
            failed: 1,
            ..Default::default()
        },
        failed_units: vec![UnitFailure {
            url: "https://bbc.example.com/broken".to_string(),
            class,
            cause: "database is locked".to_string(),
        }],
    }
}

#[tokio::test]
async fn test_late_result_after_cancel_is_discarded() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    let (run_id, ctx) = claim(&app).await;

    app.lifecycle.cancel(run_id).await.unwrap();
    let decision = app
        .lifecycle
        .on_attempt_result(
            run_id,
            &ctx,
            AttemptOutcome::Success {
                stats: AttemptStats::default(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        decision,
        AttemptDecision::Discarded {
            state: RunState::Cancelled
        }
    );
    let status = app.lifecycle.status(run_id).await.unwrap();
    assert_eq!(status.state(), RunState::Cancelled);
    assert_eq!(status.attempts.len(), 1);
    assert_eq!(status.attempts[0].outcome, AttemptStatus::Discarded);
}

#[tokio::test]
async fn test_partial_success_is_terminal_by_default() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    let (run_id, ctx) = claim(&app).await;

    let decision = app
        .lifecycle
        .on_attempt_result(run_id, &ctx, partial(FailureClass::Transient))
        .await
        .unwrap();

    assert_eq!(
        decision,
        AttemptDecision::Finished {
            state: RunState::PartiallySucceeded
        }
    );
    let run: Run = app.lifecycle.status(run_id).await.unwrap().run;
    assert_eq!(run.outcome, Some(RunOutcome::Partial));
}

#[tokio::test]
async fn test_partial_success_retried_when_enabled() {
    let config = LifecycleConfig {
        retry_partial: true,
        ..fast_config(3)
    };
    let app = create_test_app(vec![json_source("bbc")], config).await;
    let (run_id, ctx) = claim(&app).await;

    let decision = app
        .lifecycle
        .on_attempt_result(run_id, &ctx, partial(FailureClass::Transient))
        .await
        .unwrap();
    assert!(matches!(decision, AttemptDecision::Retry { .. }));
    assert_eq!(
        app.lifecycle.status(run_id).await.unwrap().state(),
        RunState::Scheduled
    );
}

#[tokio::test]
async fn test_partial_with_permanent_failure_not_retried() {
    let config = LifecycleConfig {
        retry_partial: true,
        ..fast_config(3)
    };
    let app = create_test_app(vec![json_source("bbc")], config).await;
    let (run_id, ctx) = claim(&app).await;

    let decision = app
        .lifecycle
        .on_attempt_result(run_id, &ctx, partial(FailureClass::Permanent))
        .await
        .unwrap();
    assert_eq!(
        decision,
        AttemptDecision::Finished {
            state: RunState::PartiallySucceeded
        }
    );
}

#[tokio::test]
async fn test_recover_stale_running_runs() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(2)).await;

    let mut retryable = Run::new(Uuid::new_v4(), "bbc", 2);
    retryable.state = RunState::Running;
    retryable.attempt_count = 1;
    retryable.updated_at = Utc::now() - chrono::Duration::hours(1);
    app.runs.create(&retryable).await.unwrap();

    let mut exhausted = Run::new(Uuid::new_v4(), "bbc", 2);
    exhausted.state = RunState::Running;
    exhausted.attempt_count = 2;
    exhausted.updated_at = Utc::now() - chrono::Duration::hours(1);
    app.runs.create(&exhausted).await.unwrap();

    let rescheduled = app
        .lifecycle
        .recover_stale(Duration::from_secs(600))
        .await
        .unwrap();

    assert_eq!(rescheduled, vec![retryable.id]);
    let retryable = app.lifecycle.status(retryable.id).await.unwrap();
    assert_eq!(retryable.state(), RunState::Scheduled);
    assert_eq!(
        retryable.attempts[0].failure_class,
        Some(FailureClass::Transient)
    );
    assert_eq!(
        app.lifecycle.status(exhausted.id).await.unwrap().state(),
        RunState::Failed
    );
}
