// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::workers::worker::{run_periodic, Worker};

/// 工作管理器
///
/// 持有所有后台工作器的任务句柄
#[derive(Default)]
pub struct WorkerManager {
    handles: Vec<JoinHandle<()>>,
    names: Vec<String>,
}

impl WorkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 在独立任务中启动工作器
    ///
    /// # 参数
    ///
    /// * `worker` - 要启动的工作器
    pub fn spawn<W: Worker>(&mut self, worker: W) {
        let worker = Arc::new(worker);
        self.names.push(worker.name().to_string());
        let handle = tokio::spawn(async move {
            run_periodic(worker.as_ref()).await;
        });
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// 中止所有工作器
    pub fn shutdown(&mut self) {
        info!("Shutting down workers...");
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Workers shut down successfully");
    }

    /// 等待关闭信号并关闭工作进程
    pub async fn wait_for_shutdown(&mut self) {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
        self.shutdown();
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
