// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;

use crate::domain::models::source::Source;

/// 数据源目录错误类型
#[derive(Error, Debug)]
pub enum CatalogError {
    /// 读取文件失败
    #[error("Failed to read source catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// YAML 解析失败
    #[error("Failed to parse source catalog: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// 字段校验失败
    #[error("Invalid source `{name}`: {errors}")]
    Invalid { name: String, errors: String },
    /// 名称重复
    #[error("Duplicate source name: {0}")]
    Duplicate(String),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    sources: Vec<Source>,
}

/// 数据源目录
///
/// 启动时加载，之后只读。保留文件中的顺序。
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    sources: Vec<Arc<Source>>,
    index: HashMap<String, usize>,
}

impl SourceCatalog {
    /// 从数据源列表构建目录
    ///
    /// # 返回值
    ///
    /// * `Ok(SourceCatalog)` - 所有数据源均通过校验且名称唯一
    /// * `Err(CatalogError)` - 第一个校验失败的数据源
    pub fn from_sources(sources: Vec<Source>) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for source in sources {
            source.validate().map_err(|e| CatalogError::Invalid {
                name: source.name.clone(),
                errors: e.to_string(),
            })?;
            source.check_schedule().map_err(|errors| CatalogError::Invalid {
                name: source.name.clone(),
                errors,
            })?;
            if catalog.index.contains_key(&source.name) {
                return Err(CatalogError::Duplicate(source.name));
            }
            catalog
                .index
                .insert(source.name.clone(), catalog.sources.len());
            catalog.sources.push(Arc::new(source));
        }
        Ok(catalog)
    }

    /// 解析 YAML 文本
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(yaml)?;
        Self::from_sources(file.sources)
    }

    /// 从文件加载
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Source>> {
        self.index.get(name).map(|&i| self.sources[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Source>> {
        self.sources.iter()
    }

    /// 配置了周期调度间隔的数据源
    pub fn scheduled(&self) -> impl Iterator<Item = &Arc<Source>> {
        self.sources
            .iter()
            .filter(|s| s.schedule_interval_secs.is_some())
    }

    /// 配置了 cron 调度的数据源
    pub fn cron_scheduled(&self) -> impl Iterator<Item = &Arc<Source>> {
        self.sources.iter().filter(|s| s.schedule_cron.is_some())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
