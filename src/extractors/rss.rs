// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use feed_rs::model::{Entry, FeedType, Link};
use feed_rs::parser;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::models::content::ContentUnit;
use crate::domain::models::source::Ruleset;
use crate::domain::services::extraction_service::{Extraction, ExtractionError, Extractor};
use crate::engines::traits::RawPayload;
use crate::extractors::{absolutize, clean_html};

/// RSS / Atom 订阅提取器
///
/// 正文依次取 content、summary（RSS 的 description）；
/// 发布时间取 published，缺失时取 updated。
/// 每个单元的 metadata 记录订阅的 `feed_title` 与 `feed_link`。
pub struct RssExtractor;

/// 条目的主链接：优先没有 rel 或 rel 为 alternate 的链接
fn primary_link(links: &[Link]) -> Option<&str> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.trim())
        .filter(|href| !href.is_empty())
}

fn entry_body(entry: &Entry) -> Option<String> {
    entry
        .content
        .as_ref()
        .and_then(|c| c.body.clone())
        .filter(|b| !b.trim().is_empty())
        .or_else(|| entry.summary.as_ref().map(|s| s.content.clone()))
}

/// RSS 的 `<author>` 形如 `desk@example.com (Desk Name)`，有括号中的名字时取名字
fn display_name(raw: &str) -> &str {
    let raw = raw.trim();
    raw.split_once('(')
        .and_then(|(_, rest)| rest.strip_suffix(')'))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(raw)
}

/// 条目作者
///
/// RSS 的 `<author>` 被解析为 name 为标签名、email 为正文的 Person；
/// Atom 与 `dc:creator` 的作者在 name 中。
fn entry_author(entry: &Entry, rss: bool) -> Option<String> {
    entry.authors.iter().find_map(|person| {
        let name = match (&person.email, rss) {
            (Some(email), true) => display_name(email),
            _ => person.name.trim(),
        };
        (!name.is_empty()).then(|| name.to_string())
    })
}

impl Extractor for RssExtractor {
    fn id(&self) -> &'static str {
        "rss"
    }

    fn extract(
        &self,
        payload: &RawPayload,
        _ruleset: &Ruleset,
    ) -> Result<Extraction, ExtractionError> {
        let feed = parser::parse(payload.body.as_bytes())
            .map_err(|e| ExtractionError::Schema(format!("payload is not a feed: {}", e)))?;

        let feed_title = feed
            .title
            .as_ref()
            .map(|t| clean_html(&t.content))
            .unwrap_or_default();
        let feed_link = primary_link(&feed.links).unwrap_or_default().to_string();
        let rss = matches!(feed.feed_type, FeedType::RSS0 | FeedType::RSS2);
        debug!(entries = feed.entries.len(), feed_title = %feed_title, "Parsed feed");

        let mut extraction = Extraction::with_capacity(feed.entries.len());
        for (index, entry) in feed.entries.iter().enumerate() {
            let Some(link) = primary_link(&entry.links) else {
                warn!(index, id = %entry.id, "Rejecting feed entry without link");
                extraction.reject(index, "feed entry has no link");
                continue;
            };

            let mut metadata = Map::new();
            metadata.insert("feed_title".to_string(), Value::String(feed_title.clone()));
            metadata.insert("feed_link".to_string(), Value::String(feed_link.clone()));
            if !entry.id.is_empty() {
                metadata.insert("guid".to_string(), Value::String(entry.id.clone()));
            }

            extraction.push(ContentUnit {
                url: absolutize(&payload.url, link),
                title: entry
                    .title
                    .as_ref()
                    .map(|t| clean_html(&t.content))
                    .filter(|t| !t.is_empty()),
                body: entry_body(entry)
                    .map(|body| clean_html(&body))
                    .unwrap_or_default(),
                published_at: entry.published.or(entry.updated),
                author: entry_author(entry, rss),
                metadata: Value::Object(metadata),
            });
        }

        Ok(extraction)
    }
}
