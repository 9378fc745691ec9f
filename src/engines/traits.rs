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

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::attempt::FailureClass;
use crate::domain::models::source::Source;

/// 抓取错误类型
#[derive(Error, Debug)]
pub enum FetchError {
    /// 请求超时
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// 连接失败
    #[error("Connection failed: {0}")]
    Connect(String),
    /// 非成功的HTTP状态码
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    /// 抓取目标无效
    #[error("Invalid fetch target: {0}")]
    InvalidTarget(String),
    /// 其他传输层错误
    #[error("Transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// 错误分类
    ///
    /// 超时、连接失败、5xx、408 与 429 为临时性失败，其余为永久性失败
    pub fn class(&self) -> FailureClass {
        match self {
            FetchError::Timeout(_) | FetchError::Connect(_) | FetchError::Transport(_) => {
                FailureClass::Transient
            }
            FetchError::Status { status, .. } => {
                if *status >= 500 || *status == 408 || *status == 429 {
                    FailureClass::Transient
                } else {
                    FailureClass::Permanent
                }
            }
            FetchError::InvalidTarget(_) => FailureClass::Permanent,
        }
    }

    /// 判断错误是否可重试
    pub fn is_retryable(&self) -> bool {
        self.class().is_transient()
    }
}

/// 抓取得到的原始负载
#[derive(Debug, Clone)]
pub struct RawPayload {
    /// 最终URL（跟随重定向之后）
    pub url: String,
    /// HTTP状态码
    pub status_code: u16,
    /// 内容类型
    pub content_type: String,
    /// 响应内容
    pub body: String,
    /// 响应头
    pub headers: HashMap<String, String>,
    /// 响应时间（毫秒）
    pub response_time_ms: u64,
}

impl RawPayload {
    /// 以给定内容构造负载
    pub fn new(
        url: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            status_code: 200,
            content_type: content_type.into(),
            body: body.into(),
            headers: HashMap::new(),
            response_time_ms: 0,
        }
    }
}

/// 抓取器特质
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// 抓取数据源的目标
    async fn fetch(&self, source: &Source) -> Result<RawPayload, FetchError>;

    /// 抓取器名称
    fn name(&self) -> &'static str;
}
