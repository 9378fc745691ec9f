// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::domain::models::source::Source;
use crate::utils::errors::WorkerError;
use crate::workers::lifecycle::JobLifecycleManager;
use crate::workers::scheduler::submit_if_idle;

/// cron 调度器
///
/// 为配置了 `schedule_cron` 的数据源注册定时任务。触发时的行为与
/// 间隔调度一致：上一个运行尚未终止时跳过本次触发。
pub struct CronScheduler {
    scheduler: JobScheduler,
    lifecycle: JobLifecycleManager,
    sources: Vec<String>,
    started: bool,
}

impl CronScheduler {
    pub async fn new(lifecycle: JobLifecycleManager) -> Result<Self, WorkerError> {
        Ok(Self {
            scheduler: JobScheduler::new().await?,
            lifecycle,
            sources: Vec::new(),
            started: false,
        })
    }

    /// 注册数据源的 cron 任务
    ///
    /// # 返回值
    ///
    /// * `Ok(true)` - 已注册
    /// * `Ok(false)` - 数据源未配置 cron 表达式
    /// * `Err(WorkerError::Schedule)` - 表达式无法解析
    pub async fn add_source(&mut self, source: Arc<Source>) -> Result<bool, WorkerError> {
        let Some(expression) = source.cron_expression() else {
            return Ok(false);
        };

        let lifecycle = self.lifecycle.clone();
        let job_source = source.clone();
        let job = Job::new_async(expression.as_str(), move |_uuid, _lock| {
            let lifecycle = lifecycle.clone();
            let source = job_source.clone();
            Box::pin(async move {
                if let Err(e) = submit_if_idle(&lifecycle, &source).await {
                    error!(source = %source.name, error = %e, "Cron submission failed");
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!(source = %source.name, cron = %expression, "Cron schedule registered");
        self.sources.push(source.name.clone());
        Ok(true)
    }

    /// 已注册的数据源名称
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub async fn start(&mut self) -> Result<(), WorkerError> {
        self.scheduler.start().await?;
        self.started = true;
        Ok(())
    }

    /// 停止调度器；未启动时无事可做
    pub async fn shutdown(mut self) -> Result<(), WorkerError> {
        if self.started {
            self.scheduler.shutdown().await?;
            info!("Cron scheduler stopped");
        }
        Ok(())
    }
}
