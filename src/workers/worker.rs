// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::utils::errors::WorkerError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Worker trait定义
///
/// 所有周期性后台工作器都必须实现此trait
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// 执行一轮工作，返回处理的条目数
    async fn tick(&self) -> Result<u64, WorkerError>;

    /// 两轮之间的间隔
    fn interval(&self) -> Duration;

    /// 获取工作器名称
    fn name(&self) -> &str;
}

/// 按工作器的间隔循环执行
///
/// 第一轮在一个间隔之后开始，落后的轮次直接跳过
pub async fn run_periodic<W: Worker + ?Sized>(worker: &W) {
    let period = worker.interval();
    info!(worker = worker.name(), ?period, "Worker started");

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        match worker.tick().await {
            Ok(0) => debug!(worker = worker.name(), "Nothing to do"),
            Ok(count) => info!(worker = worker.name(), count, "Worker round finished"),
            Err(e) => error!(worker = worker.name(), error = %e, "Worker round failed"),
        }
    }
}
