// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::attempt::TaskAttempt;
use crate::domain::models::run::{Page, Run, RunChange, RunQuery, RunState, RunTransition};
use crate::utils::errors::RepositoryError;

/// 运行登记表特质
///
/// 运行的当前投影与只追加的转换日志。所有状态变更都经由 [`RunRepository::transition`]。
#[async_trait]
pub trait RunRepository: Send + Sync {
    /// 写入新运行，并追加 `∅ → Requested` 转换
    async fn create(&self, run: &Run) -> Result<Run, RepositoryError>;

    /// 比较并交换式的状态转换
    ///
    /// `change.attempt_record` 与状态更新、转换日志在同一事务中写入
    ///
    /// # 参数
    ///
    /// * `id` - 运行ID
    /// * `expected` - 允许的当前状态
    /// * `change` - 要应用的变更
    ///
    /// # 返回值
    ///
    /// * `Ok(Some(Run))` - 转换已提交，返回更新后的运行
    /// * `Ok(None)` - 当前状态不在 `expected` 中，未做任何修改
    /// * `Err(RepositoryError::NotFound)` - 运行不存在
    async fn transition(
        &self,
        id: Uuid,
        expected: &[RunState],
        change: RunChange,
    ) -> Result<Option<Run>, RepositoryError>;

    /// 根据ID查找运行
    async fn find(&self, id: Uuid) -> Result<Option<Run>, RepositoryError>;

    /// 运行的转换日志，按时间顺序
    async fn history(&self, id: Uuid) -> Result<Vec<RunTransition>, RepositoryError>;

    /// 记录一次尝试
    async fn record_attempt(&self, attempt: &TaskAttempt) -> Result<(), RepositoryError>;

    /// 运行的所有尝试，按序号排序
    async fn attempts(&self, run_id: Uuid) -> Result<Vec<TaskAttempt>, RepositoryError>;

    /// 分页查询，按请求时间倒序
    async fn query(&self, query: &RunQuery) -> Result<Page<Run>, RepositoryError>;

    /// 查找 `updated_at` 早于 `before` 的 Running 运行
    async fn find_stale_running(&self, before: DateTime<Utc>) -> Result<Vec<Run>, RepositoryError>;

    /// 按状态查找运行，按请求时间正序
    async fn find_by_state(&self, state: RunState) -> Result<Vec<Run>, RepositoryError>;

    /// 数据源是否存在未终止的运行
    async fn has_active_run(&self, source_name: &str) -> Result<bool, RepositoryError>;
}
