// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::models::run::ParseEnumError;

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// 临时性失败，可以重试
    Transient,
    /// 永久性失败，重试无意义
    Permanent,
}

impl FailureClass {
    pub fn is_transient(self) -> bool {
        matches!(self, FailureClass::Transient)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FailureClass::Transient => write!(f, "transient"),
            FailureClass::Permanent => write!(f, "permanent"),
        }
    }
}

impl FromStr for FailureClass {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transient" => Ok(FailureClass::Transient),
            "permanent" => Ok(FailureClass::Permanent),
            _ => Err(ParseEnumError::new("failure class", s)),
        }
    }
}

/// 单个内容单元的处理失败
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub url: String,
    pub class: FailureClass,
    pub cause: String,
}

/// 一次尝试的单元统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptStats {
    /// 新写入的记录数
    pub stored: u32,
    /// 判定为重复的单元数
    pub duplicates: u32,
    /// 已写入但负载待修复的记录数（包含在 stored 中）
    pub payload_pending: u32,
    /// 处理失败的单元数
    pub failed: u32,
}

impl AttemptStats {
    /// 处理成功的单元数
    pub fn succeeded(&self) -> u32 {
        self.stored + self.duplicates
    }
}

/// 任务执行器返回给生命周期管理器的尝试结果
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// 所有单元均已存储或判定为重复
    Success { stats: AttemptStats },
    /// 部分单元失败，至少一个成功
    PartialSuccess {
        stats: AttemptStats,
        failed_units: Vec<UnitFailure>,
    },
    /// 整体失败
    Failure { class: FailureClass, cause: String },
    /// 看门狗超时
    TimedOut { after: Duration },
}

impl AttemptOutcome {
    pub fn transient(cause: impl Into<String>) -> Self {
        AttemptOutcome::Failure {
            class: FailureClass::Transient,
            cause: cause.into(),
        }
    }

    pub fn permanent(cause: impl Into<String>) -> Self {
        AttemptOutcome::Failure {
            class: FailureClass::Permanent,
            cause: cause.into(),
        }
    }

    /// 失败分类；超时视为临时性失败
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            AttemptOutcome::Failure { class, .. } => Some(*class),
            AttemptOutcome::TimedOut { .. } => Some(FailureClass::Transient),
            _ => None,
        }
    }

    /// 失败原因描述
    pub fn cause(&self) -> Option<String> {
        match self {
            AttemptOutcome::Failure { cause, .. } => Some(cause.clone()),
            AttemptOutcome::TimedOut { after } => {
                Some(format!("attempt timed out after {}s", after.as_secs_f64()))
            }
            AttemptOutcome::PartialSuccess { failed_units, .. } => Some(format!(
                "{} unit(s) failed: {}",
                failed_units.len(),
                failed_units
                    .iter()
                    .map(|u| format!("{} ({})", u.url, u.cause))
                    .collect::<Vec<_>>()
                    .join("; ")
            )),
            AttemptOutcome::Success { .. } => None,
        }
    }

    pub fn stats(&self) -> AttemptStats {
        match self {
            AttemptOutcome::Success { stats } | AttemptOutcome::PartialSuccess { stats, .. } => {
                *stats
            }
            _ => AttemptStats::default(),
        }
    }

    pub fn status(&self) -> AttemptStatus {
        match self {
            AttemptOutcome::Success { .. } => AttemptStatus::Success,
            AttemptOutcome::PartialSuccess { .. } => AttemptStatus::PartialSuccess,
            AttemptOutcome::Failure { .. } => AttemptStatus::Failure,
            AttemptOutcome::TimedOut { .. } => AttemptStatus::TimedOut,
        }
    }
}

/// 传递给执行器的尝试上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    pub run_id: Uuid,
    /// 从 1 开始
    pub attempt: i32,
    pub started_at: DateTime<Utc>,
}

/// 尝试记录的结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    PartialSuccess,
    Failure,
    TimedOut,
    /// 运行已终止，结果被丢弃
    Discarded,
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AttemptStatus::Success => "success",
            AttemptStatus::PartialSuccess => "partial_success",
            AttemptStatus::Failure => "failure",
            AttemptStatus::TimedOut => "timed_out",
            AttemptStatus::Discarded => "discarded",
        };
        f.write_str(s)
    }
}

impl FromStr for AttemptStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AttemptStatus::Success),
            "partial_success" => Ok(AttemptStatus::PartialSuccess),
            "failure" => Ok(AttemptStatus::Failure),
            "timed_out" => Ok(AttemptStatus::TimedOut),
            "discarded" => Ok(AttemptStatus::Discarded),
            _ => Err(ParseEnumError::new("attempt status", s)),
        }
    }
}

/// 任务尝试记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAttempt {
    pub run_id: Uuid,
    pub attempt: i32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: AttemptStatus,
    pub failure_class: Option<FailureClass>,
    pub retry_cause: Option<String>,
    pub stats: AttemptStats,
}

impl TaskAttempt {
    /// 根据执行结果构建尝试记录
    pub fn from_outcome(ctx: &AttemptContext, outcome: &AttemptOutcome) -> Self {
        Self {
            run_id: ctx.run_id,
            attempt: ctx.attempt,
            started_at: ctx.started_at,
            ended_at: Utc::now(),
            outcome: outcome.status(),
            failure_class: outcome.failure_class(),
            retry_cause: outcome.cause(),
            stats: outcome.stats(),
        }
    }

    /// 将记录标记为已丢弃
    pub fn discarded(mut self) -> Self {
        self.outcome = AttemptStatus::Discarded;
        self
    }
}
