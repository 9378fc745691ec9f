// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::Arc;

use crate::domain::models::content::{ContentRecord, Fingerprint};
use crate::domain::repositories::content_repository::ContentRepository;
use crate::utils::errors::RepositoryError;

/// 去重索引
///
/// 直接读取结构化存储，不做缓存。这里的判断只是提示，
/// 最终以唯一键插入的结果为准。
#[derive(Clone)]
pub struct DedupIndex {
    content_repository: Arc<dyn ContentRepository>,
}

impl DedupIndex {
    pub fn new(content_repository: Arc<dyn ContentRepository>) -> Self {
        Self { content_repository }
    }

    /// 指纹是否已存在
    pub async fn is_duplicate(&self, fingerprint: &Fingerprint) -> Result<bool, RepositoryError> {
        self.content_repository.exists(fingerprint).await
    }

    /// 查找已存在的记录
    pub async fn lookup(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ContentRecord>, RepositoryError> {
        self.content_repository.find(fingerprint).await
    }
}
