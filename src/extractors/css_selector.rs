// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::warn;

use crate::domain::models::content::ContentUnit;
use crate::domain::models::source::Ruleset;
use crate::domain::services::extraction_service::{Extraction, ExtractionError, Extractor};
use crate::engines::traits::RawPayload;
use crate::extractors::{absolutize, parse_timestamp};

/// CSS 选择器规则
#[derive(Debug, Clone, Deserialize)]
pub struct CssRules {
    /// 每个条目的根元素
    pub item: String,
    /// 标题，相对条目根元素
    pub title: Option<String>,
    /// 链接元素，读取其 `href`；为空时读取条目根元素的 `href`
    pub link: Option<String>,
    /// 正文；为空时取条目根元素的全部文本
    pub body: Option<String>,
    /// 发布时间，优先读取 `datetime` 属性
    pub published: Option<String>,
    /// 作者
    pub author: Option<String>,
    /// 额外字段，值写入 metadata
    #[serde(default)]
    pub fields: HashMap<String, String>,
}

struct CompiledRules {
    item: Selector,
    title: Option<Selector>,
    link: Option<Selector>,
    body: Option<Selector>,
    published: Option<Selector>,
    author: Option<Selector>,
    fields: Vec<(String, Selector)>,
}

fn compile(selector: &str) -> Result<Selector, ExtractionError> {
    Selector::parse(selector)
        .map_err(|e| ExtractionError::InvalidRules(format!("selector `{}`: {:?}", selector, e)))
}

fn compile_opt(selector: &Option<String>) -> Result<Option<Selector>, ExtractionError> {
    selector.as_deref().map(compile).transpose()
}

impl CssRules {
    fn compile(&self) -> Result<CompiledRules, ExtractionError> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, selector) in &self.fields {
            fields.push((name.clone(), compile(selector)?));
        }
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(CompiledRules {
            item: compile(&self.item)?,
            title: compile_opt(&self.title)?,
            link: compile_opt(&self.link)?,
            body: compile_opt(&self.body)?,
            published: compile_opt(&self.published)?,
            author: compile_opt(&self.author)?,
            fields,
        })
    }
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn select_text(root: ElementRef, selector: &Option<Selector>) -> Option<String> {
    let selector = selector.as_ref()?;
    root.select(selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

/// CSS 选择器提取器
///
/// `options` 反序列化为 [`CssRules`]
pub struct CssSelectorExtractor;

impl Extractor for CssSelectorExtractor {
    fn id(&self) -> &'static str {
        "css_selector"
    }

    fn extract(
        &self,
        payload: &RawPayload,
        ruleset: &Ruleset,
    ) -> Result<Extraction, ExtractionError> {
        let rules: CssRules = serde_json::from_value(ruleset.options.clone())
            .map_err(|e| ExtractionError::InvalidRules(e.to_string()))?;
        let rules = rules.compile()?;

        let document = Html::parse_document(&payload.body);
        let mut extraction = Extraction::default();

        for (index, item) in document.select(&rules.item).enumerate() {
            let href = match &rules.link {
                Some(link) => item
                    .select(link)
                    .next()
                    .and_then(|a| a.value().attr("href")),
                None => item.value().attr("href"),
            };
            let Some(href) = href.map(str::trim).filter(|h| !h.is_empty()) else {
                warn!(index, "Rejecting item without link");
                extraction.reject(index, "item has no link");
                continue;
            };

            let published_at = rules.published.as_ref().and_then(|selector| {
                let element = item.select(selector).next()?;
                element
                    .value()
                    .attr("datetime")
                    .and_then(parse_timestamp)
                    .or_else(|| parse_timestamp(&element_text(element)))
            });

            let mut metadata = Map::new();
            for (name, selector) in &rules.fields {
                if let Some(element) = item.select(selector).next() {
                    metadata.insert(name.clone(), Value::String(element_text(element)));
                }
            }

            extraction.push(ContentUnit {
                url: absolutize(&payload.url, href),
                title: select_text(item, &rules.title),
                body: select_text(item, &rules.body).unwrap_or_else(|| element_text(item)),
                published_at,
                author: select_text(item, &rules.author),
                metadata: Value::Object(metadata),
            });
        }

        Ok(extraction)
    }
}
