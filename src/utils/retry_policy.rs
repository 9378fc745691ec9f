// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::models::attempt::FailureClass;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 是否启用抖动
    pub enable_jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            enable_jitter: true,
        }
    }
}

/// 重试决策
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// 等待 `delay` 后进行第 `next_attempt` 次尝试
    Retry { delay: Duration, next_attempt: u32 },
    /// 不再重试
    GiveUp { reason: String },
}

impl RetryPolicy {
    /// 创建标准重试策略
    pub fn standard() -> Self {
        Self::default()
    }

    /// 没有退避的策略，测试中使用
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_factor: 0.0,
            enable_jitter: false,
        }
    }

    /// 计算第 `attempt` 次失败之后的退避时间
    ///
    /// # 参数
    ///
    /// * `attempt` - 刚失败的尝试序号，从 1 开始
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // 限制最大退避时间
        let capped_backoff = backoff_secs.min(self.max_backoff.as_secs_f64());

        // 添加抖动
        let final_backoff = if self.enable_jitter && capped_backoff > 0.0 {
            let jitter_range = capped_backoff * self.jitter_factor;
            if jitter_range > 0.0 {
                let jitter = rand::random_range(-jitter_range..jitter_range);
                (capped_backoff + jitter).max(0.0)
            } else {
                capped_backoff
            }
        } else {
            capped_backoff
        };

        Duration::from_secs_f64(final_backoff)
    }

    /// 计算下次重试时间
    pub fn next_retry_time(&self, attempt: u32, base_time: DateTime<Utc>) -> DateTime<Utc> {
        let backoff = self.calculate_backoff(attempt);
        base_time + chrono::Duration::milliseconds(backoff.as_millis() as i64)
    }

    /// 是否还有剩余尝试次数
    pub fn has_attempts_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// 根据失败分类与已完成的尝试次数决定是否重试
    ///
    /// # 参数
    ///
    /// * `class` - 失败分类
    /// * `attempt` - 刚失败的尝试序号，从 1 开始
    pub fn should_retry(&self, class: FailureClass, attempt: u32) -> RetryDecision {
        if !class.is_transient() {
            return RetryDecision::GiveUp {
                reason: "permanent failure".to_string(),
            };
        }
        if !self.has_attempts_remaining(attempt) {
            return RetryDecision::GiveUp {
                reason: format!("retries exhausted after {} attempt(s)", attempt),
            };
        }
        RetryDecision::Retry {
            delay: self.calculate_backoff(attempt),
            next_attempt: attempt + 1,
        }
    }
}
