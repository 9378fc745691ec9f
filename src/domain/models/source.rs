// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use validator::Validate;

/// 默认抓取超时时间（秒）
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// 数据源实体
///
/// 启动时从配置加载的不可变爬取目标。核心流程只读取数据源，
/// 从不修改它。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Source {
    /// 数据源唯一名称
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    /// 抓取目标描述
    #[validate(nested)]
    pub fetch: FetchTarget,
    /// 提取规则集
    #[validate(nested)]
    pub ruleset: Ruleset,
    /// 周期调度间隔（秒），为空表示只接受手动触发
    #[serde(default)]
    #[validate(range(min = 1))]
    pub schedule_interval_secs: Option<u64>,
    /// cron 调度表达式，与 `schedule_interval_secs` 互斥
    ///
    /// 接受五段（分 时 日 月 周）或带秒的六段写法
    #[serde(default)]
    #[validate(length(min = 1))]
    pub schedule_cron: Option<String>,
    /// 单次运行最多处理的内容单元数
    #[serde(default)]
    #[validate(range(min = 1))]
    pub max_items: Option<usize>,
}

/// 抓取目标描述
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FetchTarget {
    /// 目标URL
    #[validate(url)]
    pub url: String,
    /// 额外请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// 请求超时时间（秒）
    #[serde(default = "default_fetch_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

/// 提取规则集
///
/// `extractor` 用于在插件表中选择提取器，`options` 原样交给该提取器解释。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct Ruleset {
    /// 提取器标识
    #[validate(length(min = 1))]
    pub extractor: String,
    /// 提取器参数
    #[serde(default)]
    pub options: serde_json::Value,
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_FETCH_TIMEOUT_SECS
}

impl Source {
    /// 请求超时时间
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    /// 周期调度间隔
    pub fn schedule_interval(&self) -> Option<Duration> {
        self.schedule_interval_secs.map(Duration::from_secs)
    }

    /// 带秒字段的 cron 表达式
    ///
    /// 五段写法补上 `0` 秒，以便交给调度器解析
    pub fn cron_expression(&self) -> Option<String> {
        let raw = self.schedule_cron.as_deref()?.trim();
        match raw.split_whitespace().count() {
            5 => Some(format!("0 {}", raw)),
            _ => Some(raw.to_string()),
        }
    }

    /// 调度配置的一致性检查
    ///
    /// # 返回值
    ///
    /// 同时配置了间隔与 cron，或 cron 段数不是 5 到 7 段时返回错误说明
    pub fn check_schedule(&self) -> Result<(), String> {
        if self.schedule_interval_secs.is_some() && self.schedule_cron.is_some() {
            return Err("schedule_interval_secs and schedule_cron are mutually exclusive".into());
        }
        if let Some(cron) = &self.schedule_cron {
            let fields = cron.split_whitespace().count();
            if !(5..=7).contains(&fields) {
                return Err(format!(
                    "schedule_cron `{}` has {} fields, expected 5 to 7",
                    cron, fields
                ));
            }
        }
        Ok(())
    }
}

impl FetchTarget {
    /// 使用默认参数创建抓取目标
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
        }
    }
}

impl Ruleset {
    /// 创建不带参数的规则集
    pub fn new(extractor: impl Into<String>) -> Self {
        Self {
            extractor: extractor.into(),
            options: serde_json::Value::Null,
        }
    }
}
