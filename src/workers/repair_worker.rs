// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::repositories::content_repository::ContentRepository;
use crate::domain::repositories::storage_repository::StorageRepository;
use crate::infrastructure::metrics;
use crate::utils::errors::WorkerError;
use crate::workers::worker::Worker;

/// 负载修复工作器
///
/// 扫描 payload_pending 的记录。对象存储中已有负载的记录清除标记；
/// 负载缺失的记录保留标记，等下次抽取到相同内容时由持久化协调器补写。
pub struct RepairWorker {
    content: Arc<dyn ContentRepository>,
    storage: Arc<dyn StorageRepository>,
    interval: Duration,
    batch_size: u64,
}

impl RepairWorker {
    pub fn new(
        content: Arc<dyn ContentRepository>,
        storage: Arc<dyn StorageRepository>,
        interval: Duration,
    ) -> Self {
        Self {
            content,
            storage,
            interval,
            batch_size: 100,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// 执行一轮修复
    ///
    /// # 返回值
    ///
    /// 清除了标记的记录数
    pub async fn run_once(&self) -> Result<u64, WorkerError> {
        let pending = self.content.list_payload_pending(self.batch_size).await?;
        let mut repaired = 0u64;

        for record in pending {
            match self.storage.exists(&record.payload_key).await {
                Ok(true) => {
                    self.content
                        .set_payload_pending(&record.fingerprint, false)
                        .await?;
                    debug!(fingerprint = %record.fingerprint, "Payload found, flag cleared");
                    repaired += 1;
                }
                Ok(false) => {
                    warn!(
                        fingerprint = %record.fingerprint,
                        key = %record.payload_key,
                        "Payload still missing"
                    );
                }
                Err(e) => {
                    warn!(key = %record.payload_key, error = %e, "Failed to check payload");
                }
            }
        }

        if repaired > 0 {
            metrics::record_repaired(repaired);
        }
        Ok(repaired)
    }
}

#[async_trait]
impl Worker for RepairWorker {
    async fn tick(&self) -> Result<u64, WorkerError> {
        self.run_once().await
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn name(&self) -> &str {
        "repair"
    }
}
