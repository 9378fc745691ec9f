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

use crate::domain::models::source::Source;
use crate::engines::traits::{FetchError, Fetcher, RawPayload};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, instrument};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; crawlkeeper/0.1)";

/// 抓取器
///
/// 基于reqwest实现的HTTP GET抓取器，客户端在所有抓取间共享
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// 创建新的抓取器
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn classify(err: reqwest::Error, source: &Source) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(source.fetch_timeout())
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else if err.is_builder() {
            FetchError::InvalidTarget(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                url: source.fetch.url.clone(),
            }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for ReqwestFetcher {
    /// 执行HTTP抓取
    ///
    /// # 参数
    ///
    /// * `source` - 数据源
    ///
    /// # 返回值
    ///
    /// * `Ok(RawPayload)` - 2xx 响应内容
    /// * `Err(FetchError)` - 已分类的抓取错误
    #[instrument(skip(self, source), fields(source = %source.name, url = %source.fetch.url))]
    async fn fetch(&self, source: &Source) -> Result<RawPayload, FetchError> {
        let url = reqwest::Url::parse(&source.fetch.url)
            .map_err(|e| FetchError::InvalidTarget(format!("{}: {}", source.fetch.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(FetchError::InvalidTarget(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        // Build headers
        let mut headers = HeaderMap::new();
        for (k, v) in &source.fetch.headers {
            let name = HeaderName::from_bytes(k.as_bytes())
                .map_err(|e| FetchError::InvalidTarget(format!("header {}: {}", k, e)))?;
            let value = HeaderValue::from_str(v)
                .map_err(|e| FetchError::InvalidTarget(format!("header {}: {}", k, e)))?;
            headers.insert(name, value);
        }

        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .headers(headers)
            .timeout(source.fetch_timeout())
            .send()
            .await
            .map_err(|e| Self::classify(e, source))?;

        let status = response.status();
        let final_url = response.url().to_string();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: final_url,
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .unwrap_or("text/html")
            .to_string();

        let mut response_headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(v_str) = v.to_str() {
                response_headers.insert(k.as_str().to_string(), v_str.to_string());
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| Self::classify(e, source))?;

        let response_time_ms = start.elapsed().as_millis() as u64;
        debug!(status = status.as_u16(), bytes = body.len(), response_time_ms, "Fetched");

        Ok(RawPayload {
            url: final_url,
            status_code: status.as_u16(),
            content_type,
            body,
            headers: response_headers,
            response_time_ms,
        })
    }

    fn name(&self) -> &'static str {
        "reqwest"
    }
}
