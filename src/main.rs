// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crawlkeeper::config::settings::Settings;
use crawlkeeper::config::sources::SourceCatalog;
use crawlkeeper::domain::repositories::content_repository::ContentRepository;
use crawlkeeper::domain::repositories::run_repository::RunRepository;
use crawlkeeper::domain::services::dedup_service::DedupIndex;
use crawlkeeper::domain::services::extraction_service::ExtractorRegistry;
use crawlkeeper::domain::services::persistence_service::PersistenceCoordinator;
use crawlkeeper::engines::reqwest_engine::ReqwestFetcher;
use crawlkeeper::infrastructure::database::connection;
use crawlkeeper::infrastructure::metrics;
use crawlkeeper::infrastructure::repositories::content_repo_impl::ContentRepositoryImpl;
use crawlkeeper::infrastructure::repositories::run_repo_impl::RunRepositoryImpl;
use crawlkeeper::infrastructure::storage::create_storage_repository;
use crawlkeeper::utils::telemetry;
use crawlkeeper::workers::cron_scheduler::CronScheduler;
use crawlkeeper::workers::lifecycle::{JobLifecycleManager, LifecycleConfig};
use crawlkeeper::workers::manager::WorkerManager;
use crawlkeeper::workers::recovery_worker::RecoveryWorker;
use crawlkeeper::workers::repair_worker::RepairWorker;
use crawlkeeper::workers::scheduler::SourceScheduler;
use crawlkeeper::workers::task_executor::TaskExecutor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动后台工作器
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Settings::new()?;

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(&settings.telemetry);
    info!("Starting crawlkeeper...");
    metrics::init_metrics(&settings.metrics);

    let orchestrator = &settings.orchestrator;
    if orchestrator.stale_after() <= orchestrator.attempt_timeout() {
        warn!(
            stale_after_secs = orchestrator.stale_after_secs,
            attempt_timeout_secs = orchestrator.attempt_timeout_secs,
            "stale_after should exceed attempt_timeout, live attempts may be recovered twice"
        );
    }

    // 3. Connect to database and run migrations
    let db = Arc::new(connection::connect_and_migrate(&settings.database).await?);
    info!("Database connection established");

    let runs: Arc<dyn RunRepository> = Arc::new(RunRepositoryImpl::new(db.clone()));
    let content: Arc<dyn ContentRepository> = Arc::new(ContentRepositoryImpl::new(db.clone()));

    // 4. Object storage
    let storage = create_storage_repository(&settings.storage).await?;
    info!(storage_type = %settings.storage.storage_type, "Object storage initialized");

    // 5. Source catalog
    let catalog = Arc::new(SourceCatalog::load(&settings.sources.path)?);
    info!(sources = catalog.len(), path = %settings.sources.path, "Source catalog loaded");

    // 6. Executor
    let extractors = Arc::new(ExtractorRegistry::with_builtins());
    let fetcher = Arc::new(ReqwestFetcher::new()?);
    let persistence = PersistenceCoordinator::new(
        content.clone(),
        storage.clone(),
        settings.storage.payload_retry_policy(),
    );
    let executor = Arc::new(TaskExecutor::new(
        fetcher,
        extractors,
        DedupIndex::new(content.clone()),
        persistence,
        orchestrator.unit_concurrency,
    ));

    // 7. Lifecycle manager
    let lifecycle = JobLifecycleManager::new(
        runs,
        catalog.clone(),
        executor,
        LifecycleConfig::from_settings(orchestrator),
    );

    // 8. Take over runs left behind by a previous process
    let recovered = lifecycle.recover_stale(orchestrator.stale_after()).await?;
    if !recovered.is_empty() {
        warn!(runs = recovered.len(), "Recovered stale runs at startup");
    }
    let startup = lifecycle
        .dispatch_scheduled(orchestrator.dispatch_mode)
        .await?;
    info!(runs = startup.run_ids().len(), "Startup dispatch started");

    // 9. Background workers
    let mut manager = WorkerManager::new();
    manager.spawn(RecoveryWorker::new(
        lifecycle.clone(),
        orchestrator.stale_after(),
        Duration::from_secs(orchestrator.recovery_interval_secs.max(1)),
        orchestrator.dispatch_mode,
    ));
    manager.spawn(RepairWorker::new(
        content,
        storage,
        Duration::from_secs(orchestrator.repair_interval_secs.max(1)),
    ));
    for source in catalog.scheduled() {
        if let Some(scheduler) = SourceScheduler::new(lifecycle.clone(), source.clone()) {
            manager.spawn(scheduler);
        }
    }
    info!(workers = ?manager.names(), "Workers started");

    let mut cron = CronScheduler::new(lifecycle.clone()).await?;
    for source in catalog.cron_scheduled() {
        cron.add_source(source.clone()).await?;
    }
    if !cron.is_empty() {
        cron.start().await?;
        info!(sources = ?cron.sources(), "Cron scheduler started");
    }

    manager.wait_for_shutdown().await;
    cron.shutdown().await?;
    Ok(())
}
