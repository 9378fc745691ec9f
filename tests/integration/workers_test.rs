// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::helpers::fakes::Step;
use super::helpers::{create_test_app, fast_config, feed, json_source, TestApp};
use chrono::Utc;
use crawlkeeper::domain::models::content::ContentUnit;
use crawlkeeper::domain::models::run::{DispatchMode, Run, RunQuery, RunState};
use crawlkeeper::domain::repositories::content_repository::ContentRepository;
use crawlkeeper::domain::repositories::run_repository::RunRepository;
use crawlkeeper::domain::repositories::storage_repository::StorageRepository;
use crawlkeeper::utils::errors::WorkerError;
use crawlkeeper::workers::cron_scheduler::CronScheduler;
use crawlkeeper::workers::manager::WorkerManager;
use crawlkeeper::workers::recovery_worker::RecoveryWorker;
use crawlkeeper::workers::repair_worker::RepairWorker;
use crawlkeeper::workers::scheduler::SourceScheduler;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn wait_for_state(app: &TestApp, run_id: Uuid, state: RunState) {
    for _ in 0..100 {
        let run = app.runs.find(run_id).await.unwrap().unwrap();
        if run.state == state {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("run {} never reached {}", run_id, state);
}

fn repair_worker(app: &TestApp) -> RepairWorker {
    RepairWorker::new(
        app.content.clone(),
        app.storage.clone(),
        Duration::from_secs(60),
    )
}

#[tokio::test]
async fn test_repair_worker_clears_flag_once_payload_exists() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.storage.set_failing(true);
    app.persistence
        .persist(
            &ContentUnit::new("https://bbc.example.com/a", "Storm hits the coast."),
            "bbc",
            Uuid::new_v4(),
        )
        .await
        .unwrap();
    app.storage.set_failing(false);

    let worker = repair_worker(&app);
    assert_eq!(worker.run_once().await.unwrap(), 0);

    let pending = app.content.list_payload_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);

    // 负载由其他途径写入后，下一轮清除标记
    app.storage
        .save(&pending[0].payload_key, b"{}")
        .await
        .unwrap();
    assert_eq!(worker.run_once().await.unwrap(), 1);
    assert!(app.content.list_payload_pending(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_recovery_worker_redispatches_stale_runs() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    app.fetcher.script(
        "bbc",
        vec![Step::Body(feed(&[("https://bbc.example.com/a", "Body")]))],
    );

    let mut stale = Run::new(Uuid::new_v4(), "bbc", 3);
    stale.state = RunState::Running;
    stale.attempt_count = 1;
    stale.updated_at = Utc::now() - chrono::Duration::hours(1);
    app.runs.create(&stale).await.unwrap();

    let worker = RecoveryWorker::new(
        app.lifecycle.clone(),
        Duration::from_secs(600),
        Duration::from_secs(60),
        DispatchMode::Parallel,
    );
    assert_eq!(worker.run_once().await.unwrap(), 1);

    wait_for_state(&app, stale.id, RunState::Succeeded).await;
    let status = app.lifecycle.status(stale.id).await.unwrap();
    assert_eq!(status.run.attempt_count, 2);
    assert_eq!(status.attempts.len(), 2);

    // 没有卡住的运行时什么也不做
    assert_eq!(worker.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_scheduler_skips_while_run_active() {
    let mut source = json_source("bbc");
    source.schedule_interval_secs = Some(3600);
    let app = create_test_app(vec![source], fast_config(3)).await;
    app.fetcher.script(
        "bbc",
        vec![Step::Hang(
            Duration::from_millis(500),
            feed(&[("https://bbc.example.com/a", "Body")]),
        )],
    );

    let source = app.lifecycle.catalog().get("bbc").unwrap();
    let scheduler = SourceScheduler::new(app.lifecycle.clone(), source).unwrap();

    assert_eq!(scheduler.run_once().await.unwrap(), 1);
    assert_eq!(scheduler.run_once().await.unwrap(), 0);

    let page = app.lifecycle.list_runs(&RunQuery::default()).await.unwrap();
    assert_eq!(page.total, 1);
    wait_for_state(&app, page.items[0].id, RunState::Succeeded).await;

    // 上一个运行结束后可以再次提交
    assert_eq!(scheduler.run_once().await.unwrap(), 1);
}

#[tokio::test]
async fn test_scheduler_requires_interval() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    let source = app.lifecycle.catalog().get("bbc").unwrap();
    assert!(SourceScheduler::new(app.lifecycle.clone(), source).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cron_scheduler_registers_only_cron_sources() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    let mut cron = CronScheduler::new(app.lifecycle.clone()).await.unwrap();

    let plain = app.lifecycle.catalog().get("bbc").unwrap();
    assert!(!cron.add_source(plain).await.unwrap());
    assert!(cron.is_empty());

    let mut bad = json_source("bad");
    bad.schedule_cron = Some("banana * * * *".to_string());
    let err = cron.add_source(Arc::new(bad)).await.unwrap_err();
    assert!(matches!(err, WorkerError::Schedule(_)));

    let mut hourly = json_source("hourly");
    hourly.schedule_cron = Some("0 * * * *".to_string());
    assert!(cron.add_source(Arc::new(hourly)).await.unwrap());
    assert_eq!(cron.sources(), ["hourly".to_string()]);

    cron.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cron_scheduler_submits_on_fire() {
    let mut source = json_source("bbc");
    source.schedule_cron = Some("* * * * * *".to_string());
    let app = create_test_app(vec![source], fast_config(3)).await;
    app.fetcher.script(
        "bbc",
        vec![Step::Body(feed(&[("https://bbc.example.com/a", "Body")]))],
    );

    let mut cron = CronScheduler::new(app.lifecycle.clone()).await.unwrap();
    let source = app.lifecycle.catalog().get("bbc").unwrap();
    assert!(cron.add_source(source).await.unwrap());
    cron.start().await.unwrap();

    let mut submitted = 0;
    for _ in 0..60 {
        submitted = app.lifecycle.list_runs(&RunQuery::default()).await.unwrap().total;
        if submitted > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    cron.shutdown().await.unwrap();
    assert!(submitted > 0, "cron job never fired");
}

#[tokio::test]
async fn test_worker_manager_spawns_and_shuts_down() {
    let app = create_test_app(vec![json_source("bbc")], fast_config(3)).await;
    let mut manager = WorkerManager::new();
    assert!(manager.is_empty());

    manager.spawn(RepairWorker::new(
        app.content.clone(),
        Arc::new(crawlkeeper::infrastructure::storage::InMemoryStorage::new()),
        Duration::from_millis(20),
    ));
    assert_eq!(manager.len(), 1);
    assert_eq!(manager.names(), ["repair".to_string()]);

    tokio::time::sleep(Duration::from_millis(60)).await;
    manager.shutdown();
    assert!(manager.is_empty());
}
