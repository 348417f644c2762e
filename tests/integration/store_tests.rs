use super::*;
use store_watcher::config::{StoreBackend, StoreConfig};
use store_watcher::store;
use tempfile::tempdir;

#[tokio::test]
async fn test_legacy_state_file_is_migrated_on_first_tick() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("seen_items.json");
    std::fs::write(
        &path,
        r#"{
            "100001": {"url": "https://www.store.com/pin-100001.html", "name": "Old Pin", "status": 1,
                       "first_seen": "2024-12-01T00:00:00Z", "status_since": "2024-12-01T00:00:00Z"},
            "https://www.store.com/mug-100002.html?x=1": {"status": 0, "last_seen": "2024-12-02T00:00:00"}
        }"#,
    )?;

    let adapter = FakeAdapter::new();
    let (mut watcher, notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    adapter.push_listing(vec![item("100001"), item("100002")]);
    let report = watcher.tick_at(at(0)).await?;

    assert_eq!(report.new, 0);
    assert_eq!(report.restocked, 1);
    assert_eq!(watcher.state().keys().cloned().collect::<Vec<_>>(), vec![key("100001"), key("100002")]);

    let old_pin = &watcher.state()[&key("100001")];
    assert_eq!(old_pin.name, "Old Pin");
    assert_eq!(old_pin.first_seen.to_rfc3339(), "2024-12-01T00:00:00+00:00");

    let stored = JsonRecordStore::new(&path).load().await?;
    assert!(stored.contains_key(&key("100002")));
    assert!(!stored.contains_key("100001"));

    let digests = notifier.digests();
    assert_eq!(digests.len(), 1);
    assert_eq!(digests[0].subject, "[Store Watch] 1 restocked (now 2 total)");
    Ok(())
}

#[tokio::test]
async fn test_url_array_state_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    std::fs::write(
        dir.path().join("seen_items.json"),
        r#"["https://www.store.com/pin-100001.html", "https://www.store.com/not-a-product"]"#,
    )?;

    let adapter = FakeAdapter::new();
    let (mut watcher, notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    adapter.push_listing(vec![item("100001")]);
    let report = watcher.tick_at(at(0)).await?;

    assert_eq!(report.new, 0);
    assert_eq!(watcher.state().len(), 1);
    assert!(notifier.digests().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_backend_full_cycle() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let config = StoreConfig {
        backend: StoreBackend::Sqlite,
        path: String::new(),
        database_url: format!("sqlite://{}", dir.path().join("watch.db").display()),
    };

    let adapter = FakeAdapter::new();
    {
        let (mut watcher, _) = create_watcher(adapter.clone(), store::open(&config).await?, 24).await?;
        adapter.push_listing(vec![item("100001").with_price("$10"), item("100002")]);
        adapter.push_listing(vec![item("100001").with_price("$12")]);
        watcher.tick_at(at(0)).await?;
        watcher.tick_at(at(1)).await?;
    }

    let reopened = store::open(&config).await?;
    let records = reopened.load().await?;
    assert_eq!(records.len(), 2);

    let pin = &records[&key("100001")];
    assert_eq!(pin.price.as_deref(), Some("$12"));
    assert_eq!(pin.prev_price.as_deref(), Some("$10"));
    assert!(pin.price_changed);
    assert!(!records[&key("100002")].is_present());

    reopened.clear().await?;
    assert!(reopened.load().await?.is_empty());
    Ok(())
}
