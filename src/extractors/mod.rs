// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 内置提取器
///
/// - `json_feed`：JSON 数组或 `{ "items": [...] }` 形式的订阅
/// - `css_selector`：按 CSS 选择器从 HTML 页面中切分条目
/// - `rss`：RSS 2.0 / Atom 订阅
pub mod css_selector;
pub mod json_feed;
pub mod rss;

use chrono::{DateTime, Utc};
use scraper::Html;
use url::Url;

/// 不输出文本的元素
const HIDDEN_ELEMENTS: [&str; 3] = ["script", "style", "noscript"];

/// 从可能含有标记的正文中取出纯文本
///
/// 丢弃 script/style 内容，解码实体并折叠空白，
/// 同一条内容以 HTML 或纯文本提供时得到相同结果。
pub fn clean_html(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut parts: Vec<&str> = Vec::new();

    for node in fragment.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if !hidden {
            parts.push(text);
        }
    }

    parts
        .iter()
        .flat_map(|part| part.split_whitespace())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 解析 RFC 3339 / RFC 2822 时间，失败时返回 None
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// 以负载URL为基准解析可能为相对路径的链接
pub(crate) fn absolutize(base: &str, link: &str) -> String {
    match Url::parse(base) {
        Ok(base) => crate::utils::url_utils::resolve_url(&base, link)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| link.to_string()),
        Err(_) => link.to_string(),
    }
}
