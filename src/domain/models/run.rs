// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::attempt::TaskAttempt;

/// 枚举解析错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    /// 枚举类型名称
    pub kind: &'static str,
    /// 无法识别的原始值
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// 运行状态枚举
///
/// 状态转换遵循以下流程：
/// Requested → Scheduled → Running → Succeeded/Failed/PartiallySucceeded
///
/// Scheduled 与 Running 可以被取消；Running 在等待重试或被恢复时回到 Scheduled。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// 已请求，刚被接纳
    #[default]
    Requested,
    /// 已调度，等待派发
    Scheduled,
    /// 执行中
    Running,
    /// 全部成功
    Succeeded,
    /// 已失败
    Failed,
    /// 部分成功
    PartiallySucceeded,
    /// 已取消
    Cancelled,
}

impl RunState {
    /// 所有状态
    pub const ALL: [RunState; 7] = [
        RunState::Requested,
        RunState::Scheduled,
        RunState::Running,
        RunState::Succeeded,
        RunState::Failed,
        RunState::PartiallySucceeded,
        RunState::Cancelled,
    ];

    /// 是否为终止状态
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Succeeded
                | RunState::Failed
                | RunState::PartiallySucceeded
                | RunState::Cancelled
        )
    }

    /// 判断是否允许从当前状态转换到 `next`
    pub fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Requested, Scheduled)
                | (Scheduled, Running)
                | (Scheduled, Cancelled)
                | (Scheduled, Failed)
                | (Running, Scheduled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, PartiallySucceeded)
                | (Running, Cancelled)
        )
    }

    /// 可以转换到 `next` 的所有前驱状态
    pub fn predecessors(next: RunState) -> Vec<RunState> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(next))
            .collect()
    }

    /// 字符串表示，用于持久化
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Requested => "requested",
            RunState::Scheduled => "scheduled",
            RunState::Running => "running",
            RunState::Succeeded => "succeeded",
            RunState::Failed => "failed",
            RunState::PartiallySucceeded => "partially_succeeded",
            RunState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunState {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(RunState::Requested),
            "scheduled" => Ok(RunState::Scheduled),
            "running" => Ok(RunState::Running),
            "succeeded" => Ok(RunState::Succeeded),
            "failed" => Ok(RunState::Failed),
            "partially_succeeded" => Ok(RunState::PartiallySucceeded),
            "cancelled" => Ok(RunState::Cancelled),
            _ => Err(ParseEnumError::new("run state", s)),
        }
    }
}

/// 运行结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// 成功
    Success,
    /// 失败
    Failure,
    /// 部分成功
    Partial,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunOutcome::Success => write!(f, "success"),
            RunOutcome::Failure => write!(f, "failure"),
            RunOutcome::Partial => write!(f, "partial"),
        }
    }
}

impl FromStr for RunOutcome {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunOutcome::Success),
            "failure" => Ok(RunOutcome::Failure),
            "partial" => Ok(RunOutcome::Partial),
            _ => Err(ParseEnumError::new("run outcome", s)),
        }
    }
}

/// 派发顺序策略
///
/// 由调用方在每次提交时选择，不属于单个运行的属性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// 并行派发，不等待前一个运行结束
    #[default]
    Parallel,
    /// 串行派发，前一个运行进入终止状态后才派发下一个
    Serial,
}

impl FromStr for DispatchMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "parallel" => Ok(DispatchMode::Parallel),
            "serial" => Ok(DispatchMode::Serial),
            _ => Err(ParseEnumError::new("dispatch mode", s)),
        }
    }
}

/// 运行实体
///
/// 对一个数据源的一次爬取（含重试）。只由生命周期管理器修改，
/// 在运行登记表中永久保留。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// 运行唯一标识符
    pub id: Uuid,
    /// 同一次提交中所有运行共享的批次ID
    pub batch_id: Uuid,
    /// 数据源名称
    pub source_name: String,
    /// 当前状态
    pub state: RunState,
    /// 最终结果
    pub outcome: Option<RunOutcome>,
    /// 已开始的尝试次数
    pub attempt_count: i32,
    /// 最大尝试次数（含首次）
    pub max_attempts: i32,
    /// 失败详情
    pub error_detail: Option<String>,
    /// 是否存在等待修复的负载
    pub needs_repair: bool,
    /// 请求时间
    pub requested_at: DateTime<Utc>,
    /// 首次开始执行时间
    pub started_at: Option<DateTime<Utc>>,
    /// 结束时间
    pub ended_at: Option<DateTime<Utc>>,
    /// 最后更新时间
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// 创建一个处于 Requested 状态的新运行
    pub fn new(batch_id: Uuid, source_name: impl Into<String>, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            batch_id,
            source_name: source_name.into(),
            state: RunState::Requested,
            outcome: None,
            attempt_count: 0,
            max_attempts: max_attempts.max(1) as i32,
            error_detail: None,
            needs_repair: false,
            requested_at: now,
            started_at: None,
            ended_at: None,
            updated_at: now,
        }
    }

    /// 是否还有剩余尝试次数
    pub fn has_attempts_remaining(&self) -> bool {
        self.attempt_count < self.max_attempts
    }
}

/// 状态转换日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTransition {
    pub run_id: Uuid,
    /// 创建时为空
    pub from_state: Option<RunState>,
    pub to_state: RunState,
    pub attempt: i32,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// 一次状态变更请求
///
/// 由生命周期管理器构造，交给运行登记表以比较并交换的方式应用。
#[derive(Debug, Clone, PartialEq)]
pub struct RunChange {
    pub to: RunState,
    pub attempt_count: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
    pub error_detail: Option<String>,
    /// 清除已记录的失败详情，优先于 `error_detail`
    pub clear_error: bool,
    /// 只会把标记置为 true，不会清除
    pub needs_repair: bool,
    /// 写入转换日志的说明
    pub detail: Option<String>,
    /// 与转换在同一事务中写入的尝试记录
    pub attempt_record: Option<TaskAttempt>,
}

impl RunChange {
    /// 只改变状态的变更
    pub fn to(state: RunState) -> Self {
        Self {
            to: state,
            attempt_count: None,
            started_at: None,
            ended_at: None,
            outcome: None,
            error_detail: None,
            clear_error: false,
            needs_repair: false,
            detail: None,
            attempt_record: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_attempt(mut self, attempt: i32) -> Self {
        self.attempt_count = Some(attempt);
        self
    }

    pub fn with_started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// 进入终止状态时记录结束时间与结果
    pub fn finished(mut self, outcome: Option<RunOutcome>) -> Self {
        self.ended_at = Some(Utc::now());
        self.outcome = outcome;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_detail = Some(error.into());
        self.clear_error = false;
        self
    }

    /// 清除上一次尝试留下的失败详情
    pub fn clearing_error(mut self) -> Self {
        self.error_detail = None;
        self.clear_error = true;
        self
    }

    /// 转换提交时一并写入尝试记录
    pub fn recording(mut self, attempt: TaskAttempt) -> Self {
        self.attempt_record = Some(attempt);
        self
    }

    pub fn with_needs_repair(mut self, needs_repair: bool) -> Self {
        self.needs_repair = needs_repair;
        self
    }
}

/// 运行状态查询结果
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run: Run,
    pub attempts: Vec<TaskAttempt>,
}

impl RunStatus {
    pub fn state(&self) -> RunState {
        self.run.state
    }
}

/// 作业请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// 需要爬取的数据源名称
    pub sources: Vec<String>,
    /// 派发顺序策略
    #[serde(default)]
    pub mode: DispatchMode,
}

impl JobRequest {
    /// 单个数据源的作业请求
    pub fn single(source: impl Into<String>) -> Self {
        Self {
            sources: vec![source.into()],
            mode: DispatchMode::Parallel,
        }
    }

    /// 多个数据源的批量请求
    pub fn batch<I, S>(sources: I, mode: DispatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            mode,
        }
    }
}

/// 提交结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub batch_id: Uuid,
    pub run_ids: Vec<Uuid>,
    pub mode: DispatchMode,
}

/// 运行查询参数
#[derive(Debug, Clone, Default)]
pub struct RunQuery {
    pub source_name: Option<String>,
    /// 请求时间下界（含）
    pub requested_from: Option<DateTime<Utc>>,
    /// 请求时间上界（不含）
    pub requested_to: Option<DateTime<Utc>>,
    pub states: Option<Vec<RunState>>,
    /// 从 0 开始的页码
    pub page: u64,
    pub per_page: u64,
}

/// 分页结果
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}
