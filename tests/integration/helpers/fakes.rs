// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use crawlkeeper::domain::models::source::Source;
use crawlkeeper::domain::repositories::storage_repository::{StorageError, StorageRepository};
use crawlkeeper::engines::traits::{FetchError, Fetcher, RawPayload};
use crawlkeeper::infrastructure::storage::InMemoryStorage;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 抓取脚本中的一步
#[derive(Debug, Clone)]
pub enum Step {
    /// 返回给定的 JSON 内容
    Body(String),
    /// 连接失败（临时性）
    Refused,
    /// 返回给定状态码
    Status(u16),
    /// 挂起给定时长后返回内容
    Hang(Duration, String),
}

/// 按数据源脚本返回结果的抓取器
///
/// 脚本耗尽后重复最后一步
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, source: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(source.to_string(), steps.into());
    }

    /// 按调用顺序记录的数据源名称
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, source: &str) -> usize {
        self.calls().iter().filter(|s| s.as_str() == source).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self, source: &str) -> Step {
        let mut scripts = self.scripts.lock().unwrap();
        let steps = scripts
            .get_mut(source)
            .unwrap_or_else(|| panic!("no script for source {}", source));
        if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().expect("empty script")
        }
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, source: &Source) -> Result<RawPayload, FetchError> {
        self.calls.lock().unwrap().push(source.name.clone());
        let step = self.next_step(&source.name);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = match step {
            Step::Body(body) => {
                // 让并行派发的抓取有机会重叠
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(RawPayload::new(&source.fetch.url, "application/json", body))
            }
            Step::Refused => Err(FetchError::Connect("connection refused".to_string())),
            Step::Status(status) => Err(FetchError::Status {
                status,
                url: source.fetch.url.clone(),
            }),
            Step::Hang(duration, body) => {
                tokio::time::sleep(duration).await;
                Ok(RawPayload::new(&source.fetch.url, "application/json", body))
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// 可切换为写入失败的对象存储
#[derive(Default)]
pub struct FlakyStorage {
    inner: InMemoryStorage,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl FlakyStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// 包括失败在内的写入次数
    pub fn save_calls(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.keys()
    }
}

#[async_trait]
impl StorageRepository for FlakyStorage {
    async fn save(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Other("object store unavailable".to_string()));
        }
        self.inner.save(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        self.inner.exists(key).await
    }
}
