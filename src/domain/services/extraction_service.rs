// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::models::content::ContentUnit;
use crate::domain::models::source::Ruleset;
use crate::engines::traits::RawPayload;

/// 提取错误类型
///
/// 都属于永久性失败：同样的负载和规则重试不会得到不同结果
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// 规则集选择的提取器未注册
    #[error("Unknown extractor: {0}")]
    UnknownExtractor(String),
    /// 规则参数无效
    #[error("Invalid rules: {0}")]
    InvalidRules(String),
    /// 负载结构与规则不符
    #[error("Schema mismatch: {0}")]
    Schema(String),
}

/// 无法转换为内容单元的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedItem {
    /// 条目在负载中的位置，从 0 开始
    pub index: usize,
    pub reason: String,
}

/// 一次提取的结果
///
/// 被拒绝的条目由执行器计为永久性失败的单元
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub units: Vec<ContentUnit>,
    pub rejected: Vec<RejectedItem>,
    /// `units` 中每个单元在负载中的位置
    positions: Vec<usize>,
}

impl Extraction {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            units: Vec::with_capacity(capacity),
            rejected: Vec::new(),
            positions: Vec::with_capacity(capacity),
        }
    }

    /// 追加下一个条目产生的单元
    ///
    /// 提取器按负载顺序对每个条目调用一次 `push` 或 `reject`
    pub fn push(&mut self, unit: ContentUnit) {
        let position = self.next_position();
        self.units.push(unit);
        self.positions.push(position);
    }

    fn next_position(&self) -> usize {
        let after_unit = self.positions.last().map(|p| p + 1);
        let after_rejected = self.rejected.last().map(|r| r.index + 1);
        after_unit.max(after_rejected).unwrap_or(0)
    }

    /// 只保留负载中前 `max_items` 个条目，无论其是否被拒绝
    pub fn truncate_items(&mut self, max_items: usize) {
        let kept = self.positions.partition_point(|&p| p < max_items);
        self.units.truncate(kept);
        self.positions.truncate(kept);
        self.rejected.retain(|item| item.index < max_items);
    }

    pub fn into_parts(self) -> (Vec<ContentUnit>, Vec<RejectedItem>) {
        (self.units, self.rejected)
    }

    /// 记录一个被拒绝的条目
    pub fn reject(&mut self, index: usize, reason: impl Into<String>) {
        self.rejected.push(RejectedItem {
            index,
            reason: reason.into(),
        });
    }
}

impl From<Vec<ContentUnit>> for Extraction {
    fn from(units: Vec<ContentUnit>) -> Self {
        Self {
            positions: (0..units.len()).collect(),
            units,
            rejected: Vec::new(),
        }
    }
}

/// 提取器特质
///
/// 将原始负载按规则集解析为内容单元。实现必须是纯函数。
pub trait Extractor: Send + Sync {
    /// 插件表中的标识
    fn id(&self) -> &'static str;

    /// 执行提取
    fn extract(
        &self,
        payload: &RawPayload,
        ruleset: &Ruleset,
    ) -> Result<Extraction, ExtractionError>;
}

/// 提取器插件表
///
/// 以规则集中的 `extractor` 标识选择插件
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    /// 空的插件表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册全部内置提取器
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::extractors::json_feed::JsonFeedExtractor));
        registry.register(Arc::new(crate::extractors::css_selector::CssSelectorExtractor));
        registry.register(Arc::new(crate::extractors::rss::RssExtractor));
        registry
    }

    /// 注册提取器，同名时覆盖
    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(extractor.id().to_string(), extractor);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.extractors.contains_key(id)
    }

    /// 按规则集选择提取器并执行
    pub fn extract(
        &self,
        payload: &RawPayload,
        ruleset: &Ruleset,
    ) -> Result<Extraction, ExtractionError> {
        let extractor = self
            .get(&ruleset.extractor)
            .ok_or_else(|| ExtractionError::UnknownExtractor(ruleset.extractor.clone()))?;
        extractor.extract(payload, ruleset)
    }
}
