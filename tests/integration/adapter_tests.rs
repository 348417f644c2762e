use super::*;
use serde_json::json;
use store_watcher::plugins::adapters::SfccGridAdapter;
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GRID_PATH: &str = "/on/demandware.store/Sites-Test-Site/default/Search-UpdateGrid";
const VARIATION_PATH: &str = "/on/demandware.store/Sites-Test-Site/default/Product-Variation";

const FULL_GRID: &str = r#"
    <div class="product-grid">
      <div class="product-tile"><a href="/stitch-pin-438039197642.html" title="Stitch Pin">Stitch</a></div>
      <div class="product-tile"><a href="/mickey-mug-438018657693.html">Mickey Mug</a></div>
    </div>"#;

const SHORT_GRID: &str = r#"
    <div class="product-grid">
      <div class="product-tile"><a href="/stitch-pin-438039197642.html" title="Stitch Pin">Stitch</a></div>
    </div>"#;

fn variation(price: &str, allocation: u32, message: &str) -> serde_json::Value {
    json!({
        "product": {
            "availability": {"messages": [message], "inStockAllocation": allocation},
            "price": {"sales": {"formatted": price}}
        }
    })
}

async fn mount_grid(server: &MockServer, body: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path(GRID_PATH))
        .and(query_param("start", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sfcc_watch_cycle_over_http() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    mount_grid(&server, FULL_GRID, 1).await;
    mount_grid(&server, SHORT_GRID, 1).await;

    // Second page is always empty, which ends pagination.
    Mock::given(method("GET"))
        .and(path(GRID_PATH))
        .and(query_param("start", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<div></div>"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(VARIATION_PATH))
        .and(query_param("pid", "438039197642"))
        .respond_with(ResponseTemplate::new(200).set_body_json(variation("$17.99", 12, "In Stock")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(VARIATION_PATH))
        .and(query_param("pid", "438018657693"))
        .respond_with(ResponseTemplate::new(200).set_body_json(variation("$24.99", 2, "Low Stock")))
        .mount(&server)
        .await;

    let plugins = PluginManager::new();
    plugins.register_adapter(Arc::new(SfccGridAdapter::new())).await;
    let recorder = RecordingNotifier::new();
    plugins.register_notifier(Box::new(SharedNotifier(recorder.clone()))).await;

    let dir = tempdir()?;
    let mut settings = test_settings(24);
    settings.target_url = format!("{}{}?cgid=pins&start=0&sz=2", server.uri(), GRID_PATH);

    let session = HttpSession::new(&test_http_config())?;
    let mut watcher = WatchScheduler::new(plugins, "sfcc", session, json_store(dir.path()), settings).await?;

    let first = watcher.tick_at(at(0)).await?;
    assert_eq!(first.new, 2);
    assert_eq!(first.present, 2);

    let pin = watcher
        .state()
        .values()
        .find(|r| r.key.ends_with(":438039197642"))
        .expect("pin record");
    assert_eq!(pin.name, "Stitch Pin");
    assert_eq!(pin.price.as_deref(), Some("$17.99"));
    assert_eq!(pin.in_stock_allocation, Some(12));

    // The mug leaves the grid but the variation endpoint still has stock.
    let second = watcher.tick_at(at(1)).await?;
    assert_eq!(second.present, 1);
    assert_eq!(second.rechecked, 1);
    assert_eq!(second.restocked, 0);

    let mug = watcher
        .state()
        .values()
        .find(|r| r.key.ends_with(":438018657693"))
        .expect("mug record");
    assert!(mug.is_present());
    assert_eq!(mug.availability_message.as_deref(), Some("Low Stock"));
    assert_eq!(mug.status_since, at(0));

    let digests = recorder.digests();
    assert_eq!(digests.len(), 1);
    assert_eq!(digests[0].subject, "[Store Watch] 2 new (now 2 total)");
    assert!(digests[0].text_body.contains("$17.99"));
    Ok(())
}

#[tokio::test]
async fn test_listing_error_status_fails_tick() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let plugins = PluginManager::with_default_adapters().await;
    let dir = tempdir()?;
    let mut settings = test_settings(24);
    settings.target_url = format!("{}/grid?cgid=pins", server.uri());

    let session = HttpSession::new(&test_http_config())?;
    let mut watcher = WatchScheduler::new(plugins, "disneystore", session, json_store(dir.path()), settings).await?;

    let err = watcher.tick_at(at(0)).await.unwrap_err();
    assert!(err.to_string().contains("404"));
    assert!(watcher.state().is_empty());
    Ok(())
}
