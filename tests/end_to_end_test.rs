use httpmock::prelude::*;
use meteogram::domain::ports::ConfigStore;
use meteogram::{
    AcquisitionController, AcquisitionState, DocumentClient, ForecastClient, LocalStorage,
    TomlConfig, WidgetConfig,
};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;

fn hourly_forecast() -> serde_json::Value {
    let timeseries: Vec<_> = (0..6)
        .map(|i| {
            json!({
                "time": format!("2024-06-01T{:02}:00:00Z", 12 + i),
                "data": {
                    "instant": {
                        "details": {
                            "air_temperature": 10.0 + i as f64,
                            "wind_speed": 2.0 + 0.6 * i as f64
                        }
                    }
                }
            })
        })
        .collect();

    json!({
        "type": "Feature",
        "properties": {
            "meta": { "updated_at": "2024-06-01T11:30:00Z" },
            "timeseries": timeseries
        }
    })
}

fn path_d<'a>(markup: &'a str, class: &str) -> Option<&'a str> {
    let marker = format!(r#"class="{}" d=""#, class);
    let start = markup.find(&marker)? + marker.len();
    let end = markup[start..].find('"')? + start;
    Some(&markup[start..end])
}

async fn settled(handle: &mut meteogram::ControllerHandle) -> AcquisitionState {
    tokio::time::timeout(Duration::from_secs(10), handle.next_settled())
        .await
        .expect("controller settled in time")
        .expect("controller still running")
}

#[tokio::test]
async fn test_coordinate_url_renders_forecast_meteogram() {
    let server = MockServer::start();
    let api_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/weatherapi/locationforecast/2.0/compact")
            .query_param("lat", "63.4")
            .query_param("lon", "10.4");
        then.status(200)
            .header("Content-Type", "application/json")
            .json_body(hourly_forecast());
    });

    let storage_dir = TempDir::new().unwrap();
    let storage = LocalStorage::new(storage_dir.path());
    let mut handle = AcquisitionController::spawn(
        ForecastClient::with_endpoint(server.url("/weatherapi/locationforecast/2.0/compact")),
        DocumentClient::new(),
        storage.clone(),
    );

    handle.reconfigure(WidgetConfig {
        source_url: Some("https://www.yr.no/en/forecast/graph/63.4,10.4".to_string()),
        ..Default::default()
    });

    let state = settled(&mut handle).await;
    api_mock.assert();

    let doc = state.document().expect("ready document");
    let temperature = path_d(&doc.sanitized_html, "temperature-line").unwrap();
    assert_eq!(temperature.matches('M').count(), 1, "{temperature}");
    assert_eq!(temperature.matches('L').count(), 5, "{temperature}");
    assert!(!doc.sanitized_html.contains("precipitation-bar"));
    assert!(!doc.sanitized_html.contains("gust-line"));
    assert!(doc.sanitized_html.contains(r#"viewBox="0 0 960 540""#));
    assert!(doc
        .sanitized_html
        .contains(r#"preserveAspectRatio="xMidYMid meet""#));

    // The freshly rendered chart becomes the stored fallback.
    let stored = storage.read_svg_code().await.unwrap();
    assert_eq!(stored.as_deref(), Some(doc.raw_svg.as_str()));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_direct_url_extracts_and_sanitizes_svg_from_page() {
    let server = MockServer::start();
    let page_mock = server.mock(|when, then| {
        when.method(GET).path("/meteogram");
        then.status(200)
            .header("Content-Type", "text/html")
            .body(
                r##"<!doctype html><html><head><title>Forecast</title></head><body>
<svg width="800px" height="400px" xmlns="http://www.w3.org/2000/svg">
<style>text { font-family: serif }</style>
<rect width="800" height="400" fill="#FFFFFF"/>
<polyline points="0,0 10,10" stroke="#c60000"/>
</svg></body></html>"##,
            );
    });

    let storage_dir = TempDir::new().unwrap();
    let mut handle = AcquisitionController::spawn(
        ForecastClient::new(),
        DocumentClient::new(),
        LocalStorage::new(storage_dir.path()),
    );

    handle.reconfigure(WidgetConfig {
        source_url: Some(server.url("/meteogram")),
        ..Default::default()
    });

    let state = settled(&mut handle).await;
    page_mock.assert();

    let doc = state.document().expect("ready document");
    assert!(doc.raw_svg.starts_with("<svg"));
    assert!(doc.sanitized_html.contains(r#"viewBox="0 0 800 400""#));
    assert!(!doc.sanitized_html.contains("<style"));
    assert!(doc.sanitized_html.contains(r#"fill="none""#));
    assert!(doc.sanitized_html.contains("#c60000"));

    handle.shutdown().await;
}

#[tokio::test]
async fn test_literal_svg_from_toml_needs_no_network() {
    let config = TomlConfig::from_toml_str(
        r##"
[source]
svg_code = '<svg width="40" height="20"><rect fill="white"/></svg>'

[theme]
backgroundColor = "#0b1220"
"##,
    )
    .unwrap();

    let storage_dir = TempDir::new().unwrap();
    let mut handle = AcquisitionController::spawn(
        ForecastClient::with_endpoint("http://127.0.0.1:9/unused"),
        DocumentClient::new(),
        LocalStorage::new(storage_dir.path()),
    );
    handle.reconfigure(config.to_widget_config());

    let state = settled(&mut handle).await;
    let doc = state.document().expect("ready document");
    assert!(doc.sanitized_html.contains(r#"viewBox="0 0 40 20""#));
    assert!(doc.sanitized_html.contains(r#"fill="none""#));

    handle.shutdown().await;
}
