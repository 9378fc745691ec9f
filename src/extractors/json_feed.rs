// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::models::content::ContentUnit;
use crate::domain::models::source::Ruleset;
use crate::domain::services::extraction_service::{Extraction, ExtractionError, Extractor};
use crate::engines::traits::RawPayload;
use crate::extractors::{absolutize, clean_html, parse_timestamp};

const URL_KEYS: [&str; 3] = ["url", "link", "href"];
const TITLE_KEYS: [&str; 2] = ["title", "headline"];
const BODY_KEYS: [&str; 6] = [
    "body",
    "content",
    "content_text",
    "content_html",
    "summary",
    "description",
];
const AUTHOR_KEYS: [&str; 3] = ["author", "creator", "byline"];
const PUBLISHED_KEYS: [&str; 4] = ["published_at", "date_published", "published", "pubDate"];

/// JSON 订阅提取器
///
/// 接受顶层数组，或包含条目数组的对象（字段名由 `options.items_field` 指定，默认 `items`）。
/// 正文中的 HTML 标记会被清除。
pub struct JsonFeedExtractor;

fn take_string(item: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = item.remove(*key) {
            match value {
                Value::String(s) if !s.trim().is_empty() => return Some(s.trim().to_string()),
                // JSON Feed 的作者是 { "name": ... }
                Value::Object(mut obj) => {
                    if let Some(Value::String(name)) = obj.remove("name") {
                        return Some(name);
                    }
                }
                _ => {}
            }
        }
    }
    None
}

impl Extractor for JsonFeedExtractor {
    fn id(&self) -> &'static str {
        "json_feed"
    }

    fn extract(
        &self,
        payload: &RawPayload,
        ruleset: &Ruleset,
    ) -> Result<Extraction, ExtractionError> {
        let items_field = ruleset
            .options
            .get("items_field")
            .and_then(Value::as_str)
            .unwrap_or("items");

        let document: Value = serde_json::from_str(&payload.body)
            .map_err(|e| ExtractionError::Schema(format!("payload is not JSON: {}", e)))?;

        let items = match document {
            Value::Array(items) => items,
            Value::Object(mut obj) => match obj.remove(items_field) {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(ExtractionError::Schema(format!(
                        "expected an array under `{}`",
                        items_field
                    )))
                }
            },
            _ => {
                return Err(ExtractionError::Schema(
                    "expected a JSON array or object".to_string(),
                ))
            }
        };

        let mut extraction = Extraction::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(mut item) = item else {
                warn!(index, "Rejecting non-object feed item");
                extraction.reject(index, "feed item is not an object");
                continue;
            };

            let Some(url) = take_string(&mut item, &URL_KEYS) else {
                warn!(index, "Rejecting feed item without url");
                extraction.reject(index, "feed item has no url");
                continue;
            };

            let published_at = take_string(&mut item, &PUBLISHED_KEYS)
                .as_deref()
                .and_then(parse_timestamp);

            extraction.push(ContentUnit {
                url: absolutize(&payload.url, &url),
                title: take_string(&mut item, &TITLE_KEYS),
                body: take_string(&mut item, &BODY_KEYS)
                    .map(|body| clean_html(&body))
                    .unwrap_or_default(),
                published_at,
                author: take_string(&mut item, &AUTHOR_KEYS),
                metadata: Value::Object(item),
            });
        }

        Ok(extraction)
    }
}
