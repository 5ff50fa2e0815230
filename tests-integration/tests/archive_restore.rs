//! Archive and restore integration tests

use anyhow::Result;
use chrono::{Duration, Utc};
use common::dataset::{DatasetRecord, Mode, Policy};
use common::store::{HierarchicalStore, ObjectStoreClient};
use tests_integration::fixtures::{ARCHIVE_CONTAINER, DATA_REPO, RetentionTestContext};
use tests_integration::generators::{DatasetGeneratorConfig, generate_dataset};

/// Test: restoring a swept dataset reproduces every canonical path and
/// leaves no archived copy behind
#[tokio::test]
async fn test_archive_then_restore_round_trip() -> Result<()> {
    tests_integration::init_test_logging();
    let ctx = RetentionTestContext::new_in_memory().await?;

    let config = DatasetGeneratorConfig {
        partition_count: 3,
        files_per_partition: 2,
        file_size: 32,
        newest: Utc::now() - Duration::days(5),
    };
    let dataset = generate_dataset(&ctx.storage, DATA_REPO, "netflow", &config).await?;
    ctx.catalog
        .persist(&DatasetRecord {
            id: "netflow".to_string(),
            path: dataset.path.clone(),
            policy: Policy::Age,
            mode: Mode::Archive,
            retention: Some(1),
        })
        .await?;
    ctx.service.refresh().await;

    let sweep = ctx
        .enforcer(RetentionTestContext::live_config())
        .run_sweep(&*ctx.service.snapshot().await)
        .await;
    assert_eq!(sweep.total_files_actioned, 6);
    assert!(ctx.storage.files_under(&dataset.path).is_empty());

    let manifest = ctx.archive.manifest("netflow").await?;
    assert_eq!(manifest.entries.len(), 6);
    assert!(manifest.failures.is_empty());

    let result = ctx.archive.restore_prefix("netflow").await?;
    assert!(result.is_complete());
    assert_eq!(result.restored.len(), 6);

    let mut expected: Vec<String> = dataset.files.iter().map(|(p, _)| p.clone()).collect();
    expected.sort();
    assert_eq!(ctx.storage.files_under(&dataset.path), expected);

    let content = ctx.storage.filesystem.read(&expected[0]).await?;
    assert_eq!(content.len(), 32);

    assert!(ctx.storage.archive.list(ARCHIVE_CONTAINER).await?.is_empty());
    Ok(())
}

/// Test: undecodable archive keys fail individually while the rest restore
#[tokio::test]
async fn test_restore_with_foreign_keys() -> Result<()> {
    let ctx = RetentionTestContext::new_in_memory().await?;

    ctx.storage
        .write_file("/scratch/plain.log", "plain", Utc::now())
        .await?;
    let flat_key = ctx.archive.archive("/scratch/plain.log").await?;
    assert_eq!(flat_key, "archive/plain.log");

    let path = format!("{DATA_REPO}/source=dns/year=2024/month=05/day=06/hour=07/part-1");
    ctx.storage.write_file(&path, "dns", Utc::now()).await?;
    ctx.archive.archive(&path).await?;

    let result = ctx.archive.restore_prefix("").await?;
    assert_eq!(result.restored.len(), 1);
    assert_eq!(result.restored[0].path, path);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].key, flat_key);

    assert!(ctx.storage.exists(&path));
    assert_eq!(
        ctx.storage.archive.list(ARCHIVE_CONTAINER).await?,
        vec![flat_key]
    );
    Ok(())
}
