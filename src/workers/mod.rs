// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 提供运行生命周期管理、任务执行和周期性后台工作器
pub mod cron_scheduler;
pub mod lifecycle;
pub mod manager;
pub mod recovery_worker;
pub mod repair_worker;
pub mod scheduler;
pub mod task_executor;
pub mod worker;

pub use lifecycle::{AttemptDecision, DispatchHandle, JobLifecycleManager, LifecycleConfig};
pub use task_executor::TaskExecutor;
pub use worker::Worker;
