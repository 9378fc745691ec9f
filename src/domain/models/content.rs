// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 内容单元
///
/// 提取器对原始负载解析后产生的一条内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub url: String,
    pub title: Option<String>,
    pub body: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    /// 任意附加字段，始终为 JSON 对象
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl ContentUnit {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            body: body.into(),
            published_at: None,
            author: None,
            metadata: empty_object(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// 内容指纹
///
/// 64 位小写十六进制 SHA-256 摘要
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 内容记录
///
/// 结构化存储中的一行元数据，以指纹为主键
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub fingerprint: Fingerprint,
    pub source_name: String,
    pub run_id: Uuid,
    /// 规范化后的URL
    pub url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub extracted_at: DateTime<Utc>,
    /// 对象存储中的负载键
    pub payload_key: String,
    pub payload_pending: bool,
    pub created_at: DateTime<Utc>,
}

/// 写入对象存储的完整负载文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPayload {
    pub fingerprint: Fingerprint,
    pub source_name: String,
    pub run_id: Uuid,
    pub canonical_url: String,
    pub extracted_at: DateTime<Utc>,
    pub unit: ContentUnit,
}

/// 持久化结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// 新记录已写入；`payload_pending` 表示负载尚未落盘
    Stored { payload_pending: bool },
    /// 相同指纹的记录已存在
    AlreadyExists,
}

/// 唯一键插入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Conflict,
}
