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

use crate::domain::models::attempt::{AttemptStats, TaskAttempt};
use crate::domain::models::run::{Page, Run, RunChange, RunQuery, RunState, RunTransition};
use crate::domain::repositories::run_repository::RunRepository;
use crate::infrastructure::database::entities::{
    run as run_entity, run_transition as transition_entity, task_attempt as attempt_entity,
};
use crate::utils::errors::RepositoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, NotSet, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// 默认分页大小
const DEFAULT_PER_PAGE: u64 = 50;

/// 运行登记表实现
///
/// 基于SeaORM实现，`runs` 为当前投影，`run_transitions` 为只追加日志
#[derive(Clone)]
pub struct RunRepositoryImpl {
    /// 数据库连接
    db: Arc<DatabaseConnection>,
}

impl RunRepositoryImpl {
    /// 创建新的运行登记表实例
    ///
    /// # 参数
    ///
    /// * `db` - 数据库连接
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn append_transition<C: ConnectionTrait>(
        conn: &C,
        transition: &RunTransition,
    ) -> Result<(), RepositoryError> {
        let model = transition_entity::ActiveModel {
            id: NotSet,
            run_id: Set(transition.run_id),
            from_state: Set(transition.from_state.map(|s| s.to_string())),
            to_state: Set(transition.to_state.to_string()),
            attempt: Set(transition.attempt),
            detail: Set(transition.detail.clone()),
            at: Set(transition.at),
        };
        model.insert(conn).await?;
        Ok(())
    }

    async fn insert_attempt<C: ConnectionTrait>(
        conn: &C,
        attempt: &TaskAttempt,
    ) -> Result<(), RepositoryError> {
        let model = attempt_entity::ActiveModel {
            id: NotSet,
            run_id: Set(attempt.run_id),
            attempt: Set(attempt.attempt),
            started_at: Set(attempt.started_at),
            ended_at: Set(attempt.ended_at),
            outcome: Set(attempt.outcome.to_string()),
            failure_class: Set(attempt.failure_class.map(|c| c.to_string())),
            retry_cause: Set(attempt.retry_cause.clone()),
            units_stored: Set(attempt.stats.stored as i32),
            units_duplicate: Set(attempt.stats.duplicates as i32),
            units_pending: Set(attempt.stats.payload_pending as i32),
            units_failed: Set(attempt.stats.failed as i32),
        };
        model.insert(conn).await?;
        Ok(())
    }
}

impl TryFrom<run_entity::Model> for Run {
    type Error = RepositoryError;

    fn try_from(model: run_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            batch_id: model.batch_id,
            source_name: model.source_name,
            state: model.state.parse()?,
            outcome: model.outcome.map(|o| o.parse()).transpose()?,
            attempt_count: model.attempt_count,
            max_attempts: model.max_attempts,
            error_detail: model.error_detail,
            needs_repair: model.needs_repair,
            requested_at: model.requested_at,
            started_at: model.started_at,
            ended_at: model.ended_at,
            updated_at: model.updated_at,
        })
    }
}

impl From<&Run> for run_entity::ActiveModel {
    fn from(run: &Run) -> Self {
        Self {
            id: Set(run.id),
            batch_id: Set(run.batch_id),
            source_name: Set(run.source_name.clone()),
            state: Set(run.state.to_string()),
            outcome: Set(run.outcome.map(|o| o.to_string())),
            attempt_count: Set(run.attempt_count),
            max_attempts: Set(run.max_attempts),
            error_detail: Set(run.error_detail.clone()),
            needs_repair: Set(run.needs_repair),
            requested_at: Set(run.requested_at),
            started_at: Set(run.started_at),
            ended_at: Set(run.ended_at),
            updated_at: Set(run.updated_at),
        }
    }
}

impl TryFrom<transition_entity::Model> for RunTransition {
    type Error = RepositoryError;

    fn try_from(model: transition_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            run_id: model.run_id,
            from_state: model.from_state.map(|s| s.parse()).transpose()?,
            to_state: model.to_state.parse()?,
            attempt: model.attempt,
            detail: model.detail,
            at: model.at,
        })
    }
}

impl TryFrom<attempt_entity::Model> for TaskAttempt {
    type Error = RepositoryError;

    fn try_from(model: attempt_entity::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            run_id: model.run_id,
            attempt: model.attempt,
            started_at: model.started_at,
            ended_at: model.ended_at,
            outcome: model.outcome.parse()?,
            failure_class: model.failure_class.map(|c| c.parse()).transpose()?,
            retry_cause: model.retry_cause,
            stats: AttemptStats {
                stored: model.units_stored.max(0) as u32,
                duplicates: model.units_duplicate.max(0) as u32,
                payload_pending: model.units_pending.max(0) as u32,
                failed: model.units_failed.max(0) as u32,
            },
        })
    }
}

/// 将变更应用到内存中的运行副本
fn apply_change(mut run: Run, change: &RunChange, now: DateTime<Utc>) -> Run {
    run.state = change.to;
    run.updated_at = now;
    if let Some(attempt) = change.attempt_count {
        run.attempt_count = attempt;
    }
    if change.started_at.is_some() && run.started_at.is_none() {
        run.started_at = change.started_at;
    }
    if change.ended_at.is_some() {
        run.ended_at = change.ended_at;
    }
    if change.outcome.is_some() {
        run.outcome = change.outcome;
    }
    if change.clear_error {
        run.error_detail = None;
    } else if change.error_detail.is_some() {
        run.error_detail = change.error_detail.clone();
    }
    run.needs_repair |= change.needs_repair;
    run
}

fn to_runs(models: Vec<run_entity::Model>) -> Result<Vec<Run>, RepositoryError> {
    models.into_iter().map(Run::try_from).collect()
}

#[async_trait]
impl RunRepository for RunRepositoryImpl {
    async fn create(&self, run: &Run) -> Result<Run, RepositoryError> {
        let txn = self.db.begin().await?;

        let model: run_entity::ActiveModel = run.into();
        model.insert(&txn).await?;

        Self::append_transition(
            &txn,
            &RunTransition {
                run_id: run.id,
                from_state: None,
                to_state: run.state,
                attempt: run.attempt_count,
                detail: None,
                at: run.requested_at,
            },
        )
        .await?;

        txn.commit().await?;
        Ok(run.clone())
    }

    async fn transition(
        &self,
        id: Uuid,
        expected: &[RunState],
        change: RunChange,
    ) -> Result<Option<Run>, RepositoryError> {
        let txn = self.db.begin().await?;

        let current = run_entity::Entity::find_by_id(id)
            .one(&txn)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        let current = Run::try_from(current)?;

        if !expected.contains(&current.state) {
            txn.rollback().await?;
            return Ok(None);
        }

        let now = Utc::now();
        let updated = apply_change(current.clone(), &change, now);

        // 以当前状态为条件更新，并发写入者中只有一个能成功
        let result = run_entity::Entity::update_many()
            .col_expr(run_entity::Column::State, Expr::value(updated.state.to_string()))
            .col_expr(run_entity::Column::UpdatedAt, Expr::value(updated.updated_at))
            .col_expr(
                run_entity::Column::AttemptCount,
                Expr::value(updated.attempt_count),
            )
            .col_expr(run_entity::Column::StartedAt, Expr::value(updated.started_at))
            .col_expr(run_entity::Column::EndedAt, Expr::value(updated.ended_at))
            .col_expr(
                run_entity::Column::Outcome,
                Expr::value(updated.outcome.map(|o| o.to_string())),
            )
            .col_expr(
                run_entity::Column::ErrorDetail,
                Expr::value(updated.error_detail.clone()),
            )
            .col_expr(
                run_entity::Column::NeedsRepair,
                Expr::value(updated.needs_repair),
            )
            .filter(run_entity::Column::Id.eq(id))
            .filter(run_entity::Column::State.eq(current.state.to_string()))
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            debug!(run_id = %id, from = %current.state, to = %change.to, "Lost transition race");
            txn.rollback().await?;
            return Ok(None);
        }

        Self::append_transition(
            &txn,
            &RunTransition {
                run_id: id,
                from_state: Some(current.state),
                to_state: change.to,
                attempt: updated.attempt_count,
                detail: change.detail.clone(),
                at: now,
            },
        )
        .await?;

        if let Some(attempt) = &change.attempt_record {
            Self::insert_attempt(&txn, attempt).await?;
        }

        txn.commit().await?;
        Ok(Some(updated))
    }

    async fn find(&self, id: Uuid) -> Result<Option<Run>, RepositoryError> {
        run_entity::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .map(Run::try_from)
            .transpose()
    }

    async fn history(&self, id: Uuid) -> Result<Vec<RunTransition>, RepositoryError> {
        transition_entity::Entity::find()
            .filter(transition_entity::Column::RunId.eq(id))
            .order_by_asc(transition_entity::Column::Id)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(RunTransition::try_from)
            .collect()
    }

    async fn record_attempt(&self, attempt: &TaskAttempt) -> Result<(), RepositoryError> {
        Self::insert_attempt(self.db.as_ref(), attempt).await
    }

    async fn attempts(&self, run_id: Uuid) -> Result<Vec<TaskAttempt>, RepositoryError> {
        attempt_entity::Entity::find()
            .filter(attempt_entity::Column::RunId.eq(run_id))
            .order_by_asc(attempt_entity::Column::Id)
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(TaskAttempt::try_from)
            .collect()
    }

    async fn query(&self, query: &RunQuery) -> Result<Page<Run>, RepositoryError> {
        let mut select = run_entity::Entity::find();

        if let Some(source) = &query.source_name {
            select = select.filter(run_entity::Column::SourceName.eq(source.as_str()));
        }
        if let Some(from) = query.requested_from {
            select = select.filter(run_entity::Column::RequestedAt.gte(from));
        }
        if let Some(to) = query.requested_to {
            select = select.filter(run_entity::Column::RequestedAt.lt(to));
        }
        if let Some(states) = &query.states {
            select = select.filter(
                run_entity::Column::State.is_in(states.iter().map(|s| s.to_string())),
            );
        }

        let per_page = if query.per_page == 0 {
            DEFAULT_PER_PAGE
        } else {
            query.per_page
        };

        let paginator = select
            .order_by_desc(run_entity::Column::RequestedAt)
            .order_by_desc(run_entity::Column::Id)
            .paginate(self.db.as_ref(), per_page);

        let total = paginator.num_items().await?;
        let items = to_runs(paginator.fetch_page(query.page).await?)?;

        Ok(Page {
            items,
            total,
            page: query.page,
            per_page,
        })
    }

    async fn find_stale_running(&self, before: DateTime<Utc>) -> Result<Vec<Run>, RepositoryError> {
        let models = run_entity::Entity::find()
            .filter(run_entity::Column::State.eq(RunState::Running.to_string()))
            .filter(run_entity::Column::UpdatedAt.lt(before))
            .order_by_asc(run_entity::Column::UpdatedAt)
            .all(self.db.as_ref())
            .await?;
        to_runs(models)
    }

    async fn find_by_state(&self, state: RunState) -> Result<Vec<Run>, RepositoryError> {
        let models = run_entity::Entity::find()
            .filter(run_entity::Column::State.eq(state.to_string()))
            .order_by_asc(run_entity::Column::RequestedAt)
            .all(self.db.as_ref())
            .await?;
        to_runs(models)
    }

    async fn has_active_run(&self, source_name: &str) -> Result<bool, RepositoryError> {
        let active: Vec<String> = RunState::ALL
            .into_iter()
            .filter(|s| !s.is_terminal())
            .map(|s| s.to_string())
            .collect();

        let count = run_entity::Entity::find()
            .filter(run_entity::Column::SourceName.eq(source_name))
            .filter(run_entity::Column::State.is_in(active))
            .count(self.db.as_ref())
            .await?;
        Ok(count > 0)
    }
}
