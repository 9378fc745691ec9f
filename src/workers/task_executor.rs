// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::models::attempt::{
    AttemptContext, AttemptOutcome, AttemptStats, FailureClass, UnitFailure,
};
use crate::domain::models::content::{ContentUnit, PersistOutcome};
use crate::domain::models::source::Source;
use crate::domain::services::dedup_service::DedupIndex;
use crate::domain::services::extraction_service::ExtractorRegistry;
use crate::domain::services::fingerprint::compute_fingerprint;
use crate::domain::services::persistence_service::PersistenceCoordinator;
use crate::engines::traits::Fetcher;
use crate::infrastructure::metrics;

/// 单个内容单元的处理结果
enum UnitResult {
    Stored { payload_pending: bool },
    Duplicate,
    Failed(UnitFailure),
}

/// 任务执行器
///
/// 对一个数据源执行一次尝试：抓取、提取、去重、持久化。
/// 执行器本身不保存状态，重复执行的幂等性来自存储层的唯一约束。
#[derive(Clone)]
pub struct TaskExecutor {
    fetcher: Arc<dyn Fetcher>,
    extractors: Arc<ExtractorRegistry>,
    dedup: DedupIndex,
    persistence: PersistenceCoordinator,
    unit_concurrency: usize,
}

impl TaskExecutor {
    /// 创建新的任务执行器
    ///
    /// # 参数
    ///
    /// * `fetcher` - 抓取器
    /// * `extractors` - 提取器插件表
    /// * `dedup` - 去重索引
    /// * `persistence` - 持久化协调器
    /// * `unit_concurrency` - 单次尝试内并发处理的内容单元数
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        extractors: Arc<ExtractorRegistry>,
        dedup: DedupIndex,
        persistence: PersistenceCoordinator,
        unit_concurrency: usize,
    ) -> Self {
        Self {
            fetcher,
            extractors,
            dedup,
            persistence,
            unit_concurrency: unit_concurrency.max(1),
        }
    }

    /// 执行一次尝试
    ///
    /// # 返回值
    ///
    /// 汇总后的尝试结果；执行器从不返回错误，所有失败都被分类为结果
    #[instrument(
        skip_all,
        fields(source = %source.name, run_id = %ctx.run_id, attempt = ctx.attempt)
    )]
    pub async fn execute(&self, source: &Source, ctx: &AttemptContext) -> AttemptOutcome {
        let payload = match self.fetcher.fetch(source).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, class = %e.class(), "Fetch failed");
                return AttemptOutcome::Failure {
                    class: e.class(),
                    cause: e.to_string(),
                };
            }
        };

        let mut extraction = match self.extractors.extract(&payload, &source.ruleset) {
            Ok(extraction) => extraction,
            Err(e) => {
                warn!(error = %e, "Extraction failed");
                return AttemptOutcome::permanent(e.to_string());
            }
        };

        if let Some(max_items) = source.max_items {
            extraction.truncate_items(max_items);
        }
        let (units, rejected) = extraction.into_parts();

        if units.is_empty() && rejected.is_empty() {
            info!("No content units extracted");
            return AttemptOutcome::Success {
                stats: AttemptStats::default(),
            };
        }

        if !rejected.is_empty() {
            warn!(rejected = rejected.len(), "Some items could not be extracted");
        }

        let tasks: Vec<_> = units
            .into_iter()
            .map(|unit| self.process_unit(source, ctx, unit))
            .collect();
        let mut results: Vec<UnitResult> = stream::iter(tasks)
            .buffer_unordered(self.unit_concurrency)
            .collect()
            .await;

        // 无法提取的条目重试也不会成功
        results.extend(rejected.into_iter().map(|item| {
            UnitResult::Failed(UnitFailure {
                url: format!("{}#item-{}", payload.url, item.index),
                class: FailureClass::Permanent,
                cause: item.reason,
            })
        }));

        let outcome = aggregate(results);
        info!(stats = ?outcome.stats(), "Attempt finished");
        outcome
    }

    async fn process_unit(
        &self,
        source: &Source,
        ctx: &AttemptContext,
        unit: ContentUnit,
    ) -> UnitResult {
        let fingerprint = compute_fingerprint(&source.name, &unit);

        match self.dedup.lookup(&fingerprint).await {
            Ok(Some(existing)) => {
                if existing.payload_pending {
                    self.persistence.heal(&existing, &unit).await;
                }
                debug!(fingerprint = %fingerprint, "Duplicate unit");
                metrics::record_duplicate(&source.name);
                return UnitResult::Duplicate;
            }
            Ok(None) => {}
            Err(e) => {
                return UnitResult::Failed(UnitFailure {
                    url: unit.url,
                    class: FailureClass::Transient,
                    cause: e.to_string(),
                })
            }
        }

        match self
            .persistence
            .persist_with_fingerprint(&fingerprint, &unit, &source.name, ctx.run_id)
            .await
        {
            Ok(PersistOutcome::Stored { payload_pending }) => {
                metrics::record_stored(&source.name, payload_pending);
                UnitResult::Stored { payload_pending }
            }
            Ok(PersistOutcome::AlreadyExists) => {
                metrics::record_duplicate(&source.name);
                UnitResult::Duplicate
            }
            Err(e) => {
                warn!(url = %unit.url, error = %e, "Failed to persist unit");
                UnitResult::Failed(UnitFailure {
                    url: unit.url,
                    class: e.class(),
                    cause: e.to_string(),
                })
            }
        }
    }
}

/// 汇总单元结果
///
/// 没有失败为 Success；有失败但至少一个成功为 PartialSuccess；
/// 全部失败为 Failure，只有当所有失败都是临时性时才归为临时性失败
fn aggregate(results: Vec<UnitResult>) -> AttemptOutcome {
    let mut stats = AttemptStats::default();
    let mut failed_units = Vec::new();

    for result in results {
        match result {
            UnitResult::Stored { payload_pending } => {
                stats.stored += 1;
                if payload_pending {
                    stats.payload_pending += 1;
                }
            }
            UnitResult::Duplicate => stats.duplicates += 1,
            UnitResult::Failed(failure) => {
                stats.failed += 1;
                failed_units.push(failure);
            }
        }
    }

    if failed_units.is_empty() {
        return AttemptOutcome::Success { stats };
    }

    if stats.succeeded() > 0 {
        return AttemptOutcome::PartialSuccess {
            stats,
            failed_units,
        };
    }

    let class = if failed_units.iter().all(|f| f.class.is_transient()) {
        FailureClass::Transient
    } else {
        FailureClass::Permanent
    };
    AttemptOutcome::Failure {
        class,
        cause: format!(
            "all {} unit(s) failed; first: {}",
            failed_units.len(),
            failed_units[0].cause
        ),
    }
}
