// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::OrchestratorSettings;
use crate::config::sources::SourceCatalog;
use crate::domain::models::attempt::{AttemptContext, AttemptOutcome, FailureClass, TaskAttempt};
use crate::domain::models::run::{
    DispatchMode, JobRequest, Page, Run, RunChange, RunOutcome, RunQuery, RunState, RunStatus,
    RunTransition, Submission,
};
use crate::domain::repositories::run_repository::RunRepository;
use crate::infrastructure::metrics;
use crate::utils::errors::LifecycleError;
use crate::utils::retry_policy::{RetryDecision, RetryPolicy};
use crate::workers::task_executor::TaskExecutor;

/// 生命周期管理器对一次尝试结果的处理决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptDecision {
    /// 运行已回到 Scheduled，等待 `delay` 后进行下一次尝试
    Retry { delay: Duration },
    /// 运行进入终止状态
    Finished { state: RunState },
    /// 运行已不归这次尝试所有，结果被丢弃
    Discarded { state: RunState },
}

/// 生命周期管理器配置
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// 运行级重试策略
    pub retry: RetryPolicy,
    /// 单次尝试超时
    pub attempt_timeout: Duration,
    /// 部分成功时是否整体重试
    pub retry_partial: bool,
}

impl LifecycleConfig {
    /// 从编排器配置构建
    pub fn from_settings(settings: &OrchestratorSettings) -> Self {
        Self {
            retry: settings.retry_policy(),
            attempt_timeout: settings.attempt_timeout(),
            retry_partial: settings.retry_partial,
        }
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            attempt_timeout: Duration::from_secs(300),
            retry_partial: false,
        }
    }
}

/// 派发句柄
///
/// 等待一批运行全部进入终止状态
pub struct DispatchHandle {
    run_ids: Vec<Uuid>,
    handle: JoinHandle<()>,
    manager: JobLifecycleManager,
}

impl DispatchHandle {
    pub fn run_ids(&self) -> &[Uuid] {
        &self.run_ids
    }

    /// 等待派发结束并返回每个运行的最终状态
    pub async fn wait(self) -> Result<Vec<RunStatus>, LifecycleError> {
        self.handle
            .await
            .map_err(|e| LifecycleError::Dispatch(e.to_string()))?;

        let mut statuses = Vec::with_capacity(self.run_ids.len());
        for id in &self.run_ids {
            statuses.push(self.manager.status(*id).await?);
        }
        Ok(statuses)
    }
}

/// 作业生命周期管理器
///
/// 运行状态的唯一写入者。所有转换都经由运行登记表的比较并交换完成，
/// 并发的取消、恢复和尝试结果之间只有第一个提交的终止转换生效。
#[derive(Clone)]
pub struct JobLifecycleManager {
    runs: Arc<dyn RunRepository>,
    catalog: Arc<SourceCatalog>,
    executor: Arc<TaskExecutor>,
    config: LifecycleConfig,
}

impl JobLifecycleManager {
    /// 创建新的生命周期管理器
    ///
    /// # 参数
    ///
    /// * `runs` - 运行登记表
    /// * `catalog` - 数据源目录
    /// * `executor` - 任务执行器
    /// * `config` - 重试、超时与部分重试配置
    pub fn new(
        runs: Arc<dyn RunRepository>,
        catalog: Arc<SourceCatalog>,
        executor: Arc<TaskExecutor>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            runs,
            catalog,
            executor,
            config,
        }
    }

    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    /// 提交作业
    ///
    /// 先校验所有数据源名称，任一未知则不创建任何运行。
    /// 重复的名称只创建一个运行，顺序与请求一致。
    #[instrument(skip(self))]
    pub async fn submit(&self, request: JobRequest) -> Result<Submission, LifecycleError> {
        if request.sources.is_empty() {
            return Err(LifecycleError::EmptyRequest);
        }

        let mut seen = HashSet::new();
        let names: Vec<String> = request
            .sources
            .into_iter()
            .filter(|name| seen.insert(name.clone()))
            .collect();

        if let Some(unknown) = names.iter().find(|name| !self.catalog.contains(name)) {
            warn!(source = %unknown, "Rejected job for unknown source");
            return Err(LifecycleError::UnknownSource(unknown.clone()));
        }

        let batch_id = Uuid::new_v4();
        let mut run_ids = Vec::with_capacity(names.len());

        for name in &names {
            let run = Run::new(batch_id, name.clone(), self.config.retry.max_attempts);
            self.runs.create(&run).await?;
            self.runs
                .transition(
                    run.id,
                    &[RunState::Requested],
                    RunChange::to(RunState::Scheduled).with_detail("admitted"),
                )
                .await?;
            metrics::record_submitted(name);
            run_ids.push(run.id);
        }

        info!(%batch_id, runs = run_ids.len(), mode = ?request.mode, "Job submitted");

        Ok(Submission {
            batch_id,
            run_ids,
            mode: request.mode,
        })
    }

    /// 派发一次提交中的运行
    pub fn dispatch(&self, submission: &Submission) -> DispatchHandle {
        self.dispatch_runs(submission.run_ids.clone(), submission.mode)
    }

    /// 派发所有处于 Scheduled 状态的运行
    ///
    /// 用于启动时接管上一个进程留下的运行
    pub async fn dispatch_scheduled(
        &self,
        mode: DispatchMode,
    ) -> Result<DispatchHandle, LifecycleError> {
        let run_ids: Vec<Uuid> = self
            .runs
            .find_by_state(RunState::Scheduled)
            .await?
            .into_iter()
            .map(|run| run.id)
            .collect();

        if !run_ids.is_empty() {
            info!(runs = run_ids.len(), "Dispatching scheduled runs");
        }
        Ok(self.dispatch_runs(run_ids, mode))
    }

    /// 按派发模式驱动一组运行
    pub fn dispatch_runs(&self, run_ids: Vec<Uuid>, mode: DispatchMode) -> DispatchHandle {
        let manager = self.clone();
        let ids = run_ids.clone();

        let handle = tokio::spawn(async move {
            match mode {
                DispatchMode::Parallel => {
                    let mut set = JoinSet::new();
                    for id in ids {
                        let manager = manager.clone();
                        set.spawn(async move { manager.drive_logged(id).await });
                    }
                    while let Some(joined) = set.join_next().await {
                        if let Err(e) = joined {
                            error!("Run driver panicked: {}", e);
                        }
                    }
                }
                DispatchMode::Serial => {
                    for id in ids {
                        manager.drive_logged(id).await;
                    }
                }
            }
        });

        DispatchHandle {
            run_ids,
            handle,
            manager: self.clone(),
        }
    }

    async fn drive_logged(&self, run_id: Uuid) {
        match self.drive_run(run_id).await {
            Ok(state) => debug!(%run_id, %state, "Run driver finished"),
            Err(e) => error!(%run_id, error = %e, "Run driver failed"),
        }
    }

    /// 驱动一个运行直到终止，或直到它不再处于 Scheduled
    ///
    /// # 返回值
    ///
    /// 驱动结束时运行所处的状态
    pub async fn drive_run(&self, run_id: Uuid) -> Result<RunState, LifecycleError> {
        loop {
            let run = self
                .runs
                .find(run_id)
                .await?
                .ok_or(LifecycleError::UnknownRun(run_id))?;

            // Running 由别的驱动者持有；终止状态无事可做
            if run.state != RunState::Scheduled {
                return Ok(run.state);
            }

            let Some(source) = self.catalog.get(&run.source_name) else {
                let change = RunChange::to(RunState::Failed)
                    .finished(Some(RunOutcome::Failure))
                    .with_error(format!("source `{}` is no longer configured", run.source_name));
                if let Some(run) = self
                    .runs
                    .transition(run_id, &[RunState::Scheduled], change)
                    .await?
                {
                    metrics::record_finished(&run.source_name, run.state);
                }
                continue;
            };

            let attempt = run.attempt_count + 1;
            let started_at = Utc::now();
            let claimed = self
                .runs
                .transition(
                    run_id,
                    &[RunState::Scheduled],
                    RunChange::to(RunState::Running)
                        .with_attempt(attempt)
                        .with_started_at(started_at)
                        .clearing_error()
                        .with_detail(format!("attempt {}", attempt)),
                )
                .await?;
            if claimed.is_none() {
                // 被取消或被其他驱动者抢先，重新读取状态
                continue;
            }

            let ctx = AttemptContext {
                run_id,
                attempt,
                started_at,
            };

            let timer = Instant::now();
            let outcome = match tokio::time::timeout(
                self.config.attempt_timeout,
                self.executor.execute(&source, &ctx),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(%run_id, attempt, "Attempt timed out");
                    AttemptOutcome::TimedOut {
                        after: self.config.attempt_timeout,
                    }
                }
            };
            metrics::record_attempt(&source.name, outcome.status(), timer.elapsed());

            match self.on_attempt_result(run_id, &ctx, outcome).await? {
                AttemptDecision::Retry { delay } => {
                    debug!(%run_id, ?delay, "Waiting before next attempt");
                    tokio::time::sleep(delay).await;
                }
                AttemptDecision::Finished { state } | AttemptDecision::Discarded { state } => {
                    return Ok(state)
                }
            }
        }
    }

    /// 处理一次尝试的结果
    ///
    /// 只有运行仍处于 Running 且尝试序号一致时结果才生效，否则记录为 discarded
    #[instrument(skip(self, outcome), fields(attempt = ctx.attempt))]
    pub async fn on_attempt_result(
        &self,
        run_id: Uuid,
        ctx: &AttemptContext,
        outcome: AttemptOutcome,
    ) -> Result<AttemptDecision, LifecycleError> {
        let run = self
            .runs
            .find(run_id)
            .await?
            .ok_or(LifecycleError::UnknownRun(run_id))?;
        let record = TaskAttempt::from_outcome(ctx, &outcome);

        if run.state != RunState::Running || run.attempt_count != ctx.attempt {
            info!(state = %run.state, "Discarding late attempt result");
            self.runs.record_attempt(&record.discarded()).await?;
            return Ok(AttemptDecision::Discarded { state: run.state });
        }

        let stats = outcome.stats();
        let needs_repair = stats.payload_pending > 0;
        let policy = RetryPolicy {
            max_attempts: run.max_attempts.max(1) as u32,
            ..self.config.retry.clone()
        };

        let (change, retry_delay) = match &outcome {
            AttemptOutcome::Success { .. } => (
                RunChange::to(RunState::Succeeded)
                    .finished(Some(RunOutcome::Success))
                    .clearing_error(),
                None,
            ),
            AttemptOutcome::PartialSuccess { failed_units, .. } => {
                let all_transient = failed_units.iter().all(|f| f.class.is_transient());
                let decision = if self.config.retry_partial && all_transient {
                    Some(policy.should_retry(FailureClass::Transient, ctx.attempt as u32))
                } else {
                    None
                };
                match decision {
                    Some(RetryDecision::Retry { delay, .. }) => (
                        RunChange::to(RunState::Scheduled)
                            .with_detail(format!("retrying partial success in {:?}", delay)),
                        Some(delay),
                    ),
                    _ => {
                        warn!(failed = failed_units.len(), "Run partially succeeded");
                        let change = RunChange::to(RunState::PartiallySucceeded)
                            .finished(Some(RunOutcome::Partial));
                        let change = match outcome.cause() {
                            Some(cause) => change.with_error(cause),
                            None => change.clearing_error(),
                        };
                        (change, None)
                    }
                }
            }
            AttemptOutcome::Failure { .. } | AttemptOutcome::TimedOut { .. } => {
                let class = outcome.failure_class().unwrap_or(FailureClass::Permanent);
                let cause = outcome.cause().unwrap_or_default();
                match policy.should_retry(class, ctx.attempt as u32) {
                    RetryDecision::Retry { delay, .. } => (
                        RunChange::to(RunState::Scheduled)
                            .with_error(cause.clone())
                            .with_detail(format!("retry in {:?}: {}", delay, cause)),
                        Some(delay),
                    ),
                    RetryDecision::GiveUp { reason } => (
                        RunChange::to(RunState::Failed)
                            .finished(Some(RunOutcome::Failure))
                            .with_error(cause.clone())
                            .with_detail(format!("{}: {}", reason, cause)),
                        None,
                    ),
                }
            }
        };

        // 尝试记录与转换同时提交，审计轨迹不会缺少已生效的尝试
        let change = change
            .with_needs_repair(needs_repair)
            .recording(record.clone());
        let Some(updated) = self
            .runs
            .transition(run_id, &[RunState::Running], change)
            .await?
        else {
            // 与取消或恢复竞争失败
            let state = self
                .runs
                .find(run_id)
                .await?
                .map(|r| r.state)
                .unwrap_or(run.state);
            self.runs.record_attempt(&record.discarded()).await?;
            return Ok(AttemptDecision::Discarded { state });
        };

        if let Some(delay) = retry_delay {
            info!(next_attempt = ctx.attempt + 1, ?delay, "Attempt will be retried");
            return Ok(AttemptDecision::Retry { delay });
        }

        metrics::record_finished(&updated.source_name, updated.state);
        info!(state = %updated.state, needs_repair = updated.needs_repair, "Run finished");
        Ok(AttemptDecision::Finished {
            state: updated.state,
        })
    }

    /// 运行状态与尝试记录
    pub async fn status(&self, run_id: Uuid) -> Result<RunStatus, LifecycleError> {
        let run = self
            .runs
            .find(run_id)
            .await?
            .ok_or(LifecycleError::UnknownRun(run_id))?;
        let attempts = self.runs.attempts(run_id).await?;
        Ok(RunStatus { run, attempts })
    }

    /// 运行的转换日志
    pub async fn history(&self, run_id: Uuid) -> Result<Vec<RunTransition>, LifecycleError> {
        if self.runs.find(run_id).await?.is_none() {
            return Err(LifecycleError::UnknownRun(run_id));
        }
        Ok(self.runs.history(run_id).await?)
    }

    /// 取消运行
    ///
    /// 终止状态的运行保持不变；执行中的尝试会跑完，但结果被丢弃
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: Uuid) -> Result<RunStatus, LifecycleError> {
        let run = self
            .runs
            .find(run_id)
            .await?
            .ok_or(LifecycleError::UnknownRun(run_id))?;

        if run.state.is_terminal() {
            debug!(state = %run.state, "Cancel ignored for terminal run");
            return self.status(run_id).await;
        }

        let cancelled = self
            .runs
            .transition(
                run_id,
                &RunState::predecessors(RunState::Cancelled),
                RunChange::to(RunState::Cancelled)
                    .finished(None)
                    .with_detail("cancelled by request"),
            )
            .await?;

        if let Some(run) = cancelled {
            metrics::record_finished(&run.source_name, run.state);
            info!("Run cancelled");
        }
        self.status(run_id).await
    }

    /// 数据源是否有未终止的运行
    pub async fn has_active_run(&self, source_name: &str) -> Result<bool, LifecycleError> {
        Ok(self.runs.has_active_run(source_name).await?)
    }

    /// 分页查询运行
    pub async fn list_runs(&self, query: &RunQuery) -> Result<Page<Run>, LifecycleError> {
        Ok(self.runs.query(query).await?)
    }

    /// 将卡在 Running 的运行按临时性失败处理
    ///
    /// # 参数
    ///
    /// * `stale_after` - Running 状态超过该时长未更新即视为卡住
    ///
    /// # 返回值
    ///
    /// 回到 Scheduled、需要重新派发的运行ID
    pub async fn recover_stale(&self, stale_after: Duration) -> Result<Vec<Uuid>, LifecycleError> {
        let threshold = chrono::Duration::from_std(stale_after)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let stale = self.runs.find_stale_running(threshold).await?;

        let mut rescheduled = Vec::new();
        for run in stale {
            warn!(
                run_id = %run.id,
                source = %run.source_name,
                since = %run.updated_at,
                "Recovering stale run"
            );
            let ctx = AttemptContext {
                run_id: run.id,
                attempt: run.attempt_count,
                started_at: run.updated_at,
            };
            let outcome = AttemptOutcome::transient(format!(
                "attempt abandoned, no progress since {}",
                run.updated_at
            ));
            let decision = self.on_attempt_result(run.id, &ctx, outcome).await?;
            if let AttemptDecision::Retry { .. } = decision {
                rescheduled.push(run.id);
            }
        }
        Ok(rescheduled)
    }
}
