// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use sha2::{Digest, Sha256};

use crate::domain::models::content::{ContentUnit, Fingerprint};
use crate::utils::url_utils::canonicalize_url;

/// 指纹格式版本，改变规范化规则时递增
const FINGERPRINT_VERSION: &str = "v1";

/// 规范化正文
///
/// 转为小写，只保留字母数字和空白，合并连续空白并去掉首尾空白
pub fn normalize_body(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 计算内容单元的指纹
///
/// 只依赖数据源名称、规范化URL和规范化正文，与运行、尝试和时间无关
///
/// # 参数
///
/// * `source_name` - 数据源名称
/// * `unit` - 内容单元
///
/// # 返回值
///
/// 64 位小写十六进制 SHA-256 摘要
pub fn compute_fingerprint(source_name: &str, unit: &ContentUnit) -> Fingerprint {
    fingerprint_parts(source_name, &canonicalize_url(&unit.url), &unit.body)
}

fn fingerprint_parts(source_name: &str, canonical_url: &str, body: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION.as_bytes());
    hasher.update(b"\n");
    hasher.update(source_name.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_url.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize_body(body).as_bytes());
    Fingerprint::from_hex(hex::encode(hasher.finalize()))
}
