use super::*;
use store_watcher::models::ItemStatus;
use tempfile::tempdir;
use tokio_test::assert_ok;

#[tokio::test]
async fn test_new_absent_restocked_cycle() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();
    let (mut watcher, notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    adapter.push_listing(vec![item("1")]);
    let report = watcher.tick_at(at(0)).await?;
    assert_eq!(report.new, 1);
    assert_eq!(report.notifications_sent, 1);

    adapter.push_listing(vec![]);
    let report = watcher.tick_at(at(1)).await?;
    assert_eq!(report.present, 0);
    assert_eq!(report.new + report.restocked, 0);
    let record = &watcher.state()[&key("1")];
    assert_eq!(record.status, ItemStatus::Absent);
    assert_eq!(record.status_since, at(1));

    adapter.push_listing(vec![item("1")]);
    let report = watcher.tick_at(at(26)).await?;
    assert_eq!(report.restocked, 1);
    let record = &watcher.state()[&key("1")];
    assert_eq!(record.status, ItemStatus::Present);
    assert_eq!(record.status_since, at(26));
    assert_eq!(record.first_seen, at(0));

    let digests = notifier.digests();
    assert_eq!(digests.len(), 2);
    assert_eq!(digests[0].subject, "[Store Watch] 1 new (now 1 total)");
    assert_eq!(digests[1].subject, "[Store Watch] 1 restocked (now 1 total)");
    assert!(digests[1].text_body.contains("Restocked (≥24h absent) (1):"));
    Ok(())
}

#[tokio::test]
async fn test_short_absence_is_not_a_restock() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();
    let (mut watcher, notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    adapter.push_listing(vec![item("100001"), item("100002")]);
    adapter.push_listing(vec![item("100001")]);
    adapter.push_listing(vec![item("100001"), item("100002")]);

    assert_ok!(watcher.tick_at(at(0)).await);
    assert_ok!(watcher.tick_at(at(1)).await);
    let report = watcher.tick_at(at(2)).await?;

    assert_eq!(report.restocked, 0);
    assert_eq!(report.present, 2);
    assert_eq!(watcher.state()[&key("100002")].status_since, at(2));
    // Only the first tick had anything to report.
    assert_eq!(notifier.digests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_continuously_present_item_keeps_status_since() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();
    let (mut watcher, _notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    for hour in 0..5 {
        adapter.push_listing(vec![item("100001")]);
        watcher.tick_at(at(hour * 10)).await?;
    }

    let record = &watcher.state()[&key("100001")];
    assert!(record.is_present());
    assert_eq!(record.status_since, at(0));
    assert_eq!(record.first_seen, at(0));
    Ok(())
}

#[tokio::test]
async fn test_price_tracking_across_ticks() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();
    let (mut watcher, _notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    adapter.push_listing(vec![item("100001").with_price("$10")]);
    adapter.push_listing(vec![item("100001").with_price("$12")]);
    adapter.push_listing(vec![item("100001")]);

    watcher.tick_at(at(0)).await?;

    let report = watcher.tick_at(at(1)).await?;
    assert_eq!(report.price_changes, 1);
    let record = &watcher.state()[&key("100001")];
    assert_eq!(record.price.as_deref(), Some("$12"));
    assert_eq!(record.prev_price.as_deref(), Some("$10"));
    assert!(record.price_changed);

    let report = watcher.tick_at(at(2)).await?;
    assert_eq!(report.price_changes, 0);
    let record = &watcher.state()[&key("100001")];
    assert_eq!(record.price.as_deref(), Some("$12"));
    assert!(!record.price_changed);
    Ok(())
}

#[tokio::test]
async fn test_detail_recheck_restores_swept_item() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();
    let (mut watcher, notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    adapter.push_listing(vec![item("100001"), item("100002")]);
    watcher.tick_at(at(0)).await?;

    // 100002 drops off the grid but is still buyable.
    adapter.set_detail(
        item("100002")
            .with_available(true)
            .with_availability_message("In Stock")
            .with_in_stock_allocation(3),
    );
    adapter.push_listing(vec![item("100001")]);
    let report = watcher.tick_at(at(30)).await?;

    assert_eq!(adapter.detail_calls(), vec!["100002"]);
    assert_eq!(report.rechecked, 1);
    assert_eq!(report.restocked, 0);

    let record = &watcher.state()[&key("100002")];
    assert!(record.is_present());
    assert_eq!(record.status_since, at(0));
    assert_eq!(record.in_stock_allocation, Some(3));
    assert_eq!(record.availability_message.as_deref(), Some("In Stock"));
    assert_eq!(notifier.digests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_detail_leaves_item_absent() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();
    let (mut watcher, _notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    adapter.push_listing(vec![item("100001"), item("100002")]);
    adapter.push_listing(vec![item("100001")]);
    watcher.tick_at(at(0)).await?;
    let report = watcher.tick_at(at(1)).await?;

    assert_eq!(report.rechecked, 0);
    assert_eq!(watcher.state()[&key("100002")].status, ItemStatus::Absent);
    Ok(())
}

#[tokio::test]
async fn test_failed_listing_sweeps_nothing() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();
    let (mut watcher, notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;

    adapter.push_listing(vec![item("100001")]);
    adapter.push_failure();
    watcher.tick_at(at(0)).await?;

    assert!(watcher.tick_at(at(1)).await.is_err());
    assert!(watcher.state()[&key("100001")].is_present());

    let stored = JsonRecordStore::new(dir.path().join("seen_items.json")).load().await?;
    assert!(stored[&key("100001")].is_present());

    let stats = watcher.stats();
    assert_eq!(stats.total_ticks, 2);
    assert_eq!(stats.failed_ticks, 1);
    assert_eq!(notifier.digests().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_failing_notifier_does_not_stop_others() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();

    let plugins = PluginManager::new();
    plugins.register_adapter(adapter.clone()).await;
    plugins.register_notifier(Box::new(FailingNotifier)).await;
    let recorder = RecordingNotifier::new();
    plugins.register_notifier(Box::new(SharedNotifier(recorder.clone()))).await;

    let session = HttpSession::new(&test_http_config())?;
    let mut watcher = WatchScheduler::new(plugins, "fake", session, json_store(dir.path()), test_settings(24)).await?;

    adapter.push_listing(vec![item("100001")]);
    let report = watcher.tick_at(at(0)).await?;

    assert_eq!(report.notifications_sent, 1);
    assert_eq!(report.notifications_failed, 1);
    assert_eq!(recorder.digests().len(), 1);

    let stats = watcher.stats();
    assert_eq!(stats.notifications_failed, 1);
    assert_eq!(stats.failed_ticks, 0);
    Ok(())
}

#[tokio::test]
async fn test_filters_apply_to_listing() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();

    let plugins = PluginManager::new();
    plugins.register_adapter(adapter.clone()).await;
    let session = HttpSession::new(&test_http_config())?;

    let mut settings = test_settings(24);
    settings.filters = ItemFilters::new(None, Some("100002"))?;
    let mut watcher = WatchScheduler::new(plugins, "fake", session, json_store(dir.path()), settings).await?;

    adapter.push_listing(vec![item("100001"), item("100002")]);
    let report = watcher.tick_at(at(0)).await?;

    assert_eq!(report.new, 1);
    assert!(!watcher.state().contains_key(&key("100002")));
    Ok(())
}

#[tokio::test]
async fn test_state_survives_restart() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let adapter = FakeAdapter::new();

    {
        let (mut watcher, _) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;
        adapter.push_listing(vec![item("100001")]);
        watcher.tick_at(at(0)).await?;
    }

    let (mut watcher, notifier) = create_watcher(adapter.clone(), json_store(dir.path()), 24).await?;
    assert_eq!(watcher.stats().known_items, 1);

    adapter.push_listing(vec![item("100001")]);
    let report = watcher.tick_at(at(1)).await?;
    assert_eq!(report.new, 0);
    assert!(notifier.digests().is_empty());
    Ok(())
}
