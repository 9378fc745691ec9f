// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::models::run::JobRequest;
use crate::domain::models::source::Source;
use crate::utils::errors::WorkerError;
use crate::workers::lifecycle::JobLifecycleManager;
use crate::workers::worker::Worker;

/// 周期调度器
///
/// 按数据源配置的间隔提交单源作业。上一个运行尚未终止时跳过本轮。
pub struct SourceScheduler {
    lifecycle: JobLifecycleManager,
    source: Arc<Source>,
    interval: Duration,
    name: String,
}

impl SourceScheduler {
    /// 为带调度间隔的数据源创建调度器
    ///
    /// # 返回值
    ///
    /// 数据源未配置调度间隔时返回 None
    pub fn new(lifecycle: JobLifecycleManager, source: Arc<Source>) -> Option<Self> {
        let interval = source.schedule_interval()?;
        if interval.is_zero() {
            return None;
        }
        let name = format!("scheduler:{}", source.name);
        Some(Self {
            lifecycle,
            source,
            interval,
            name,
        })
    }

    /// 执行一轮调度，返回提交的运行数
    pub async fn run_once(&self) -> Result<u64, WorkerError> {
        submit_if_idle(&self.lifecycle, &self.source).await
    }
}

/// 数据源没有未终止的运行时提交并派发一个单源作业
///
/// # 返回值
///
/// 提交的运行数；上一个运行尚未终止时为 0
pub async fn submit_if_idle(
    lifecycle: &JobLifecycleManager,
    source: &Source,
) -> Result<u64, WorkerError> {
    if lifecycle.has_active_run(&source.name).await? {
        debug!(source = %source.name, "Previous run still active, skipping");
        return Ok(0);
    }

    let submission = lifecycle
        .submit(JobRequest::single(source.name.clone()))
        .await?;
    info!(
        source = %source.name,
        batch_id = %submission.batch_id,
        "Scheduled job submitted"
    );
    drop(lifecycle.dispatch(&submission));
    Ok(submission.run_ids.len() as u64)
}

#[async_trait]
impl Worker for SourceScheduler {
    async fn tick(&self) -> Result<u64, WorkerError> {
        self.run_once().await
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &str {
        &self.name
    }
}
