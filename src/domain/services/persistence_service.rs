// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::domain::models::attempt::FailureClass;
use crate::domain::models::content::{
    ContentPayload, ContentRecord, ContentUnit, Fingerprint, InsertOutcome, PersistOutcome,
};
use crate::domain::repositories::content_repository::ContentRepository;
use crate::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crate::domain::services::fingerprint::compute_fingerprint;
use crate::utils::errors::RepositoryError;
use crate::utils::retry_policy::RetryPolicy;
use crate::utils::url_utils::canonicalize_url;

/// 持久化错误类型
#[derive(Error, Debug)]
pub enum PersistError {
    /// 元数据写入失败
    #[error("Metadata write failed: {0}")]
    Repository(#[from] RepositoryError),
    /// 负载无法序列化
    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistError {
    pub fn class(&self) -> FailureClass {
        match self {
            PersistError::Repository(RepositoryError::Database(_)) => FailureClass::Transient,
            _ => FailureClass::Permanent,
        }
    }
}

/// 负载在对象存储中的键
pub fn payload_key(source_name: &str, fingerprint: &Fingerprint) -> String {
    format!("{}/{}.json", source_name, fingerprint)
}

/// 持久化协调器
///
/// 跨结构化存储与对象存储的两阶段写入：
/// 1. 以指纹唯一插入元数据，`payload_pending = true`；
/// 2. 写入负载（有界重试），成功后清除标记。
///
/// 元数据一旦提交就不回滚，负载失败只会留下待修复标记。
#[derive(Clone)]
pub struct PersistenceCoordinator {
    content_repository: Arc<dyn ContentRepository>,
    storage: Arc<dyn StorageRepository>,
    payload_retry: RetryPolicy,
}

impl PersistenceCoordinator {
    /// 创建新的持久化协调器
    ///
    /// # 参数
    ///
    /// * `content_repository` - 结构化存储
    /// * `storage` - 对象存储
    /// * `payload_retry` - 负载写入的重试策略
    pub fn new(
        content_repository: Arc<dyn ContentRepository>,
        storage: Arc<dyn StorageRepository>,
        payload_retry: RetryPolicy,
    ) -> Self {
        Self {
            content_repository,
            storage,
            payload_retry,
        }
    }

    /// 持久化一个内容单元
    pub async fn persist(
        &self,
        unit: &ContentUnit,
        source_name: &str,
        run_id: Uuid,
    ) -> Result<PersistOutcome, PersistError> {
        let fingerprint = compute_fingerprint(source_name, unit);
        self.persist_with_fingerprint(&fingerprint, unit, source_name, run_id)
            .await
    }

    /// 使用已计算好的指纹持久化内容单元
    ///
    /// # 返回值
    ///
    /// * `Ok(PersistOutcome::AlreadyExists)` - 指纹已存在，对象存储未被改动
    /// * `Ok(PersistOutcome::Stored { payload_pending })` - 新记录已提交
    /// * `Err(PersistError)` - 元数据未能写入
    #[instrument(
        skip_all,
        fields(source = %source_name, run_id = %run_id, fingerprint = %fingerprint)
    )]
    pub async fn persist_with_fingerprint(
        &self,
        fingerprint: &Fingerprint,
        unit: &ContentUnit,
        source_name: &str,
        run_id: Uuid,
    ) -> Result<PersistOutcome, PersistError> {
        let now = Utc::now();
        let record = ContentRecord {
            fingerprint: fingerprint.clone(),
            source_name: source_name.to_string(),
            run_id,
            url: canonicalize_url(&unit.url),
            title: unit.title.clone(),
            author: unit.author.clone(),
            published_at: unit.published_at,
            metadata: unit.metadata.clone(),
            extracted_at: now,
            payload_key: payload_key(source_name, fingerprint),
            payload_pending: true,
            created_at: now,
        };

        match self.content_repository.insert_unique(&record).await? {
            InsertOutcome::Conflict => {
                debug!("Fingerprint already stored");
                if let Some(existing) = self.content_repository.find(fingerprint).await? {
                    if existing.payload_pending {
                        self.heal(&existing, unit).await;
                    }
                }
                return Ok(PersistOutcome::AlreadyExists);
            }
            InsertOutcome::Inserted => {}
        }

        let body = serde_json::to_vec(&Self::payload_for(&record, unit))?;
        if let Err(e) = self.put_payload(&record.payload_key, &body).await {
            warn!(
                error = %e,
                key = %record.payload_key,
                "Payload write failed, record left payload_pending"
            );
            return Ok(PersistOutcome::Stored {
                payload_pending: true,
            });
        }

        if let Err(e) = self
            .content_repository
            .set_payload_pending(fingerprint, false)
            .await
        {
            // 负载已落盘，修复任务会清除标记
            warn!(error = %e, "Failed to clear payload_pending flag");
            return Ok(PersistOutcome::Stored {
                payload_pending: true,
            });
        }

        Ok(PersistOutcome::Stored {
            payload_pending: false,
        })
    }

    /// 为仍处于待修复状态的记录补写负载
    ///
    /// 负载由记录自身的字段和当前持有的内容单元构成，多次补写结果相同。
    ///
    /// # 返回值
    ///
    /// 标记被清除时返回 true
    pub async fn heal(&self, record: &ContentRecord, unit: &ContentUnit) -> bool {
        let result = async {
            if !self.storage.exists(&record.payload_key).await? {
                let body = serde_json::to_vec(&Self::payload_for(record, unit))
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                self.put_payload(&record.payload_key, &body).await?;
            }
            Ok::<(), StorageError>(())
        }
        .await;

        match result {
            Ok(()) => match self
                .content_repository
                .set_payload_pending(&record.fingerprint, false)
                .await
            {
                Ok(()) => {
                    debug!(fingerprint = %record.fingerprint, "Healed payload_pending record");
                    true
                }
                Err(e) => {
                    warn!(
                        fingerprint = %record.fingerprint,
                        error = %e,
                        "Failed to clear payload_pending flag"
                    );
                    false
                }
            },
            Err(e) => {
                warn!(fingerprint = %record.fingerprint, error = %e, "Payload heal failed");
                false
            }
        }
    }

    fn payload_for(record: &ContentRecord, unit: &ContentUnit) -> ContentPayload {
        ContentPayload {
            fingerprint: record.fingerprint.clone(),
            source_name: record.source_name.clone(),
            run_id: record.run_id,
            canonical_url: record.url.clone(),
            extracted_at: record.extracted_at,
            unit: unit.clone(),
        }
    }

    async fn put_payload(&self, key: &str, body: &[u8]) -> Result<(), StorageError> {
        let mut attempt = 1;
        loop {
            match self.storage.save(key, body).await {
                Ok(()) => return Ok(()),
                Err(e) if self.payload_retry.has_attempts_remaining(attempt) => {
                    let delay = self.payload_retry.calculate_backoff(attempt);
                    debug!(attempt, error = %e, ?delay, "Retrying payload write");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
