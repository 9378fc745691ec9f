// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use crate::domain::models::run::DispatchMode;
use crate::utils::errors::WorkerError;
use crate::workers::lifecycle::JobLifecycleManager;
use crate::workers::worker::Worker;

/// 卡死运行恢复工作器
///
/// 定期找出长时间停留在 Running 的运行，按临时性失败处理后重新派发
pub struct RecoveryWorker {
    lifecycle: JobLifecycleManager,
    stale_after: Duration,
    interval: Duration,
    mode: DispatchMode,
}

impl RecoveryWorker {
    pub fn new(
        lifecycle: JobLifecycleManager,
        stale_after: Duration,
        interval: Duration,
        mode: DispatchMode,
    ) -> Self {
        Self {
            lifecycle,
            stale_after,
            interval,
            mode,
        }
    }

    /// 执行一轮恢复，返回被重新派发的运行数
    pub async fn run_once(&self) -> Result<u64, WorkerError> {
        let rescheduled = self.lifecycle.recover_stale(self.stale_after).await?;
        if rescheduled.is_empty() {
            return Ok(0);
        }

        warn!(runs = rescheduled.len(), "Redispatching recovered runs");
        let count = rescheduled.len() as u64;
        // 派发句柄不需要等待，运行在后台驱动到终止
        drop(self.lifecycle.dispatch_runs(rescheduled, self.mode));
        Ok(count)
    }
}

#[async_trait]
impl Worker for RecoveryWorker {
    async fn tick(&self) -> Result<u64, WorkerError> {
        self.run_once().await
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &str {
        "recovery"
    }
}
