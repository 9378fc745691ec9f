// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sea_orm::DbErr;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;
use uuid::Uuid;

use crate::domain::models::run::ParseEnumError;
use crate::domain::repositories::storage_repository::StorageError;

/// 仓库层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    /// 记录未找到
    #[error("Record not found")]
    NotFound,

    /// 持久化字段无法还原为领域类型
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<ParseEnumError> for RepositoryError {
    fn from(err: ParseEnumError) -> Self {
        RepositoryError::Corrupt(err.to_string())
    }
}

/// 生命周期管理错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// 数据源不在目录中
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// 运行不存在
    #[error("Unknown run: {0}")]
    UnknownRun(Uuid),

    /// 空的作业请求
    #[error("Job request names no sources")]
    EmptyRequest,

    /// 派发任务异常结束
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// 后台工作器错误类型
#[derive(Error, Debug)]
pub enum WorkerError {
    /// 生命周期错误
    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    /// 仓库错误
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// cron 调度器错误
    #[error("Schedule error: {0}")]
    Schedule(#[from] JobSchedulerError),
}
