// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::domain::models::content::{ContentRecord, Fingerprint, InsertOutcome};
use crate::domain::repositories::content_repository::ContentRepository;
use crate::infrastructure::database::entities::content_record as content_entity;
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::sync::Arc;

/// 内容记录仓库实现
///
/// 基于SeaORM实现，依赖 `fingerprint` 主键完成去重
#[derive(Clone)]
pub struct ContentRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl ContentRepositoryImpl {
    /// 创建新的内容记录仓库实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

impl From<content_entity::Model> for ContentRecord {
    fn from(model: content_entity::Model) -> Self {
        Self {
            fingerprint: Fingerprint::from_hex(model.fingerprint),
            source_name: model.source_name,
            run_id: model.run_id,
            url: model.url,
            title: model.title,
            author: model.author,
            published_at: model.published_at,
            metadata: model.metadata,
            extracted_at: model.extracted_at,
            payload_key: model.payload_key,
            payload_pending: model.payload_pending,
            created_at: model.created_at,
        }
    }
}

impl From<&ContentRecord> for content_entity::ActiveModel {
    fn from(record: &ContentRecord) -> Self {
        Self {
            fingerprint: Set(record.fingerprint.as_str().to_string()),
            source_name: Set(record.source_name.clone()),
            run_id: Set(record.run_id),
            url: Set(record.url.clone()),
            title: Set(record.title.clone()),
            author: Set(record.author.clone()),
            published_at: Set(record.published_at),
            metadata: Set(record.metadata.clone()),
            payload_key: Set(record.payload_key.clone()),
            payload_pending: Set(record.payload_pending),
            extracted_at: Set(record.extracted_at),
            created_at: Set(record.created_at),
        }
    }
}

#[async_trait]
impl ContentRepository for ContentRepositoryImpl {
    async fn insert_unique(
        &self,
        record: &ContentRecord,
    ) -> Result<InsertOutcome, RepositoryError> {
        let model: content_entity::ActiveModel = record.into();

        let inserted = content_entity::Entity::insert(model)
            .on_conflict(
                OnConflict::column(content_entity::Column::Fingerprint)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;

        Ok(if inserted == 0 {
            InsertOutcome::Conflict
        } else {
            InsertOutcome::Inserted
        })
    }

    async fn exists(&self, fingerprint: &Fingerprint) -> Result<bool, RepositoryError> {
        let count = content_entity::Entity::find_by_id(fingerprint.as_str().to_string())
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }

    async fn find(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<ContentRecord>, RepositoryError> {
        let model = content_entity::Entity::find_by_id(fingerprint.as_str().to_string())
            .one(self.db.as_ref())
            .await?;
        Ok(model.map(Into::into))
    }

    async fn set_payload_pending(
        &self,
        fingerprint: &Fingerprint,
        pending: bool,
    ) -> Result<(), RepositoryError> {
        let result = content_entity::Entity::update_many()
            .col_expr(content_entity::Column::PayloadPending, Expr::value(pending))
            .filter(content_entity::Column::Fingerprint.eq(fingerprint.as_str()))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list_payload_pending(
        &self,
        limit: u64,
    ) -> Result<Vec<ContentRecord>, RepositoryError> {
        let models = content_entity::Entity::find()
            .filter(content_entity::Column::PayloadPending.eq(true))
            .order_by_asc(content_entity::Column::CreatedAt)
            .limit(limit)
            .all(self.db.as_ref())
            .await?;
        Ok(models.into_iter().map(Into::into).collect())
    }

    async fn count_by_source(&self, source_name: &str) -> Result<u64, RepositoryError> {
        let count = content_entity::Entity::find()
            .filter(content_entity::Column::SourceName.eq(source_name))
            .count(self.db.as_ref())
            .await?;
        Ok(count)
    }
}
