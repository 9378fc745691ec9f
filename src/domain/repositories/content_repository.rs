// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;

use crate::domain::models::content::{ContentRecord, Fingerprint, InsertOutcome};
use crate::utils::errors::RepositoryError;

/// 内容记录仓库特质
///
/// 结构化存储，指纹唯一约束是去重的唯一事实来源
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// 以指纹为唯一键插入；冲突时不做修改
    async fn insert_unique(&self, record: &ContentRecord) -> Result<InsertOutcome, RepositoryError>;

    /// 指纹是否已存在
    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, RepositoryError>;

    /// 根据指纹查找记录
    async fn find(&self, fingerprint: &Fingerprint)
        -> Result<Option<ContentRecord>, RepositoryError>;

    /// 设置负载待修复标记
    async fn set_payload_pending(
        &self,
        fingerprint: &Fingerprint,
        pending: bool,
    ) -> Result<(), RepositoryError>;

    /// 列出负载待修复的记录
    async fn list_payload_pending(&self, limit: u64) -> Result<Vec<ContentRecord>, RepositoryError>;

    /// 某数据源的记录数
    async fn count_by_source(&self, source_name: &str) -> Result<u64, RepositoryError>;
}
