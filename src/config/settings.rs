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

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::models::run::DispatchMode;
use crate::utils::retry_policy::RetryPolicy;

/// 应用程序配置设置
///
/// 包含数据库、对象存储、编排器、数据源目录、日志和指标等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 编排器配置
    pub orchestrator: OrchestratorSettings,
    /// 数据源目录配置
    pub sources: SourcesSettings,
    /// 日志配置
    pub telemetry: TelemetrySettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (local, s3, memory)
    pub storage_type: String,
    /// 本地存储路径 (当 type=local 时使用)
    pub local_path: Option<String>,
    /// S3 区域
    pub s3_region: Option<String>,
    /// S3 存储桶名称
    pub s3_bucket: Option<String>,
    /// S3 访问密钥
    pub s3_access_key: Option<String>,
    /// S3 密钥
    pub s3_secret_key: Option<String>,
    /// S3 端点 (可选，用于 MinIO 等兼容服务)
    pub s3_endpoint: Option<String>,
    /// 负载写入的最大尝试次数
    pub payload_retry_attempts: u32,
    /// 负载写入重试的初始退避（毫秒）
    pub payload_retry_base_delay_ms: u64,
}

impl StorageSettings {
    /// 负载写入的重试策略
    pub fn payload_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.payload_retry_attempts.max(1),
            initial_backoff: Duration::from_millis(self.payload_retry_base_delay_ms),
            max_backoff: Duration::from_secs(10),
            ..RetryPolicy::default()
        }
    }
}

/// 编排器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSettings {
    /// 每个运行的最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始退避时间（毫秒）
    pub backoff_base_ms: u64,
    /// 最大退避时间（毫秒）
    pub backoff_max_ms: u64,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
    /// 单次尝试超时（秒）
    pub attempt_timeout_secs: u64,
    /// Running 状态超过该时长未更新即视为卡住（秒）
    pub stale_after_secs: u64,
    /// 恢复扫描间隔（秒）
    pub recovery_interval_secs: u64,
    /// 负载修复扫描间隔（秒）
    pub repair_interval_secs: u64,
    /// 单次尝试内的内容单元并发数
    pub unit_concurrency: usize,
    /// 部分成功且失败单元均为临时性失败时是否整体重试
    pub retry_partial: bool,
    /// 默认派发模式
    pub dispatch_mode: DispatchMode,
}

impl OrchestratorSettings {
    /// 运行级重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            initial_backoff: Duration::from_millis(self.backoff_base_ms),
            max_backoff: Duration::from_millis(self.backoff_max_ms),
            backoff_multiplier: self.backoff_multiplier,
            jitter_factor: self.jitter_factor,
            enable_jitter: self.jitter_factor > 0.0,
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            attempt_timeout_secs: 300,
            stale_after_secs: 900,
            recovery_interval_secs: 60,
            repair_interval_secs: 300,
            unit_concurrency: 8,
            retry_partial: false,
            dispatch_mode: DispatchMode::Parallel,
        }
    }
}

/// 数据源目录配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct SourcesSettings {
    /// 数据源 YAML 文件路径
    pub path: String,
}

/// 日志配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetrySettings {
    /// 输出格式 (text, json)
    pub format: String,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用 Prometheus 导出
    pub enabled: bool,
    /// 监听地址
    pub listen: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 依次加载默认值、`config/default`、`config/{APP_ENVIRONMENT}` 与环境变量
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());

        Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("CRAWLKEEPER").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let defaults = OrchestratorSettings::default();
        Config::builder()
            // Default DB pool settings
            .set_default("database.url", "sqlite://crawlkeeper.db?mode=rwc")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default Storage settings
            .set_default("storage.storage_type", "local")?
            .set_default("storage.local_path", "./storage")?
            .set_default("storage.payload_retry_attempts", 3)?
            .set_default("storage.payload_retry_base_delay_ms", 200)?
            // Default Orchestrator settings
            .set_default("orchestrator.max_attempts", defaults.max_attempts)?
            .set_default("orchestrator.backoff_base_ms", defaults.backoff_base_ms)?
            .set_default("orchestrator.backoff_max_ms", defaults.backoff_max_ms)?
            .set_default("orchestrator.backoff_multiplier", defaults.backoff_multiplier)?
            .set_default("orchestrator.jitter_factor", defaults.jitter_factor)?
            .set_default(
                "orchestrator.attempt_timeout_secs",
                defaults.attempt_timeout_secs,
            )?
            .set_default("orchestrator.stale_after_secs", defaults.stale_after_secs)?
            .set_default(
                "orchestrator.recovery_interval_secs",
                defaults.recovery_interval_secs,
            )?
            .set_default(
                "orchestrator.repair_interval_secs",
                defaults.repair_interval_secs,
            )?
            .set_default(
                "orchestrator.unit_concurrency",
                defaults.unit_concurrency as u64,
            )?
            .set_default("orchestrator.retry_partial", defaults.retry_partial)?
            .set_default("orchestrator.dispatch_mode", "parallel")?
            // Default Sources settings
            .set_default("sources.path", "config/sources.yaml")?
            // Default Telemetry settings
            .set_default("telemetry.format", "text")?
            // Default Metrics settings
            .set_default("metrics.enabled", true)?
            .set_default("metrics.listen", "0.0.0.0:9000")
    }
}
