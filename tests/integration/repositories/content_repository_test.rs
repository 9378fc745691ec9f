// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::super::helpers::test_db;
use chrono::Utc;
use crawlkeeper::domain::models::content::{ContentRecord, Fingerprint, InsertOutcome};
use crawlkeeper::domain::repositories::content_repository::ContentRepository;
use crawlkeeper::infrastructure::repositories::content_repo_impl::ContentRepositoryImpl;
use crawlkeeper::utils::errors::RepositoryError;
use uuid::Uuid;

fn record(fingerprint: &str, source: &str, pending: bool) -> ContentRecord {
    let now = Utc::now();
    ContentRecord {
        fingerprint: Fingerprint::from_hex(fingerprint),
        source_name: source.to_string(),
        run_id: Uuid::new_v4(),
        url: format!("https://{}.example.com/{}", source, fingerprint),
        title: Some("headline".to_string()),
        author: None,
        published_at: None,
        metadata: serde_json::json!({ "section": "world" }),
        extracted_at: now,
        payload_key: format!("{}/{}.json", source, fingerprint),
        payload_pending: pending,
        created_at: now,
    }
}

#[tokio::test]
async fn test_insert_unique_reports_conflict() {
    let repo = ContentRepositoryImpl::new(test_db().await);
    let first = record("aa01", "bbc", true);

    assert_eq!(
        repo.insert_unique(&first).await.unwrap(),
        InsertOutcome::Inserted
    );

    let mut second = record("aa01", "bbc", false);
    second.title = Some("other".to_string());
    assert_eq!(
        repo.insert_unique(&second).await.unwrap(),
        InsertOutcome::Conflict
    );

    // 冲突的写入不会覆盖已有记录
    let stored = repo.find(&first.fingerprint).await.unwrap().unwrap();
    assert_eq!(stored.title.as_deref(), Some("headline"));
    assert!(stored.payload_pending);
    assert_eq!(stored.metadata["section"], "world");
    assert!(repo.exists(&first.fingerprint).await.unwrap());
}

#[tokio::test]
async fn test_payload_pending_listing() {
    let repo = ContentRepositoryImpl::new(test_db().await);
    repo.insert_unique(&record("bb01", "bbc", true)).await.unwrap();
    repo.insert_unique(&record("bb02", "bbc", false)).await.unwrap();
    repo.insert_unique(&record("bb03", "reuters", true)).await.unwrap();

    assert_eq!(repo.list_payload_pending(10).await.unwrap().len(), 2);
    assert_eq!(repo.list_payload_pending(1).await.unwrap().len(), 1);

    repo.set_payload_pending(&Fingerprint::from_hex("bb01"), false)
        .await
        .unwrap();
    let pending = repo.list_payload_pending(10).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].fingerprint.as_str(), "bb03");

    assert_eq!(repo.count_by_source("bbc").await.unwrap(), 2);
    assert_eq!(repo.count_by_source("ap").await.unwrap(), 0);
}

#[tokio::test]
async fn test_set_payload_pending_unknown_fingerprint() {
    let repo = ContentRepositoryImpl::new(test_db().await);
    let result = repo
        .set_payload_pending(&Fingerprint::from_hex("missing"), false)
        .await;
    assert!(matches!(result, Err(RepositoryError::NotFound)));
}
