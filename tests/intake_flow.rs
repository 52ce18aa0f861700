use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use upload_server::telemetry::AllocationLedger;
use upload_server::{build, spawn_upload_echo, EchoConfig, ServerConfig, UploadStore};

struct TestServer {
    base_url: String,
    store: Arc<UploadStore>,
    ledger: AllocationLedger,
    _uploads: TempDir,
}

async fn boot() -> TestServer {
    let uploads = TempDir::new().expect("temp upload dir");
    let config = ServerConfig {
        upload_dir: uploads.path().to_path_buf(),
        echo_enabled: false,
        ..ServerConfig::default()
    };
    let app = build(&config).await.expect("build app");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let router = app.router;
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    TestServer {
        base_url: format!("http://{}", addr),
        store: app.store,
        ledger: app.ledger,
        _uploads: uploads,
    }
}

fn file_form(name: &str, payload: Vec<u8>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(payload).file_name(name.to_string());
    reqwest::multipart::Form::new().part("file", part)
}

#[tokio::test]
async fn upload_stores_file_and_answers_with_stored_name() {
    let server = boot().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/upload", server.base_url))
        .multipart(file_form("report.txt", b"hello".to_vec()))
        .send()
        .await
        .expect("upload request");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.expect("response body");
    assert!(
        body.starts_with("File uploaded successfully: "),
        "unexpected body: {}",
        body
    );
    assert!(body.ends_with("_report.txt"));
    assert_eq!(server.store.uploaded_file_count().await, 1);
}

#[tokio::test]
async fn upload_without_file_field_is_rejected() {
    let server = boot().await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().text("comment", "no file here");
    let response = client
        .post(format!("{}/upload", server.base_url))
        .multipart(form)
        .send()
        .await
        .expect("upload request");

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert_eq!(response.text().await.expect("body"), "No file uploaded.");
    assert_eq!(server.store.uploaded_file_count().await, 0);
}

#[tokio::test]
async fn server_info_exposes_snapshot_version_and_file_count() {
    let server = boot().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/upload", server.base_url))
        .multipart(file_form("dummy.txt", vec![b'x'; 1024]))
        .send()
        .await
        .expect("seed upload");

    let info: serde_json::Value = client
        .get(format!("{}/server-info", server.base_url))
        .send()
        .await
        .expect("server-info request")
        .json()
        .await
        .expect("server-info json");

    for field in ["rss", "heapTotal", "heapUsed", "external"] {
        let value = info[field].as_str().unwrap_or_default();
        assert!(value.ends_with(" MB"), "{} = {:?}", field, value);
    }
    assert!(info["cpuUsage"]["percentage"]
        .as_str()
        .unwrap_or_default()
        .ends_with('%'));
    assert!(info["cpuUsage"]["userMs"]
        .as_str()
        .unwrap_or_default()
        .ends_with("ms"));
    assert!(info["allocationDelta"]["heapSizeBytes"].is_i64());
    assert!(info["topGrowingTypes"].is_array());
    assert!(info["topTypesByCount"].is_array());
    assert_eq!(info["serverVersion"], env!("CARGO_PKG_VERSION"));
    assert_eq!(info["uploadedFilesCount"], 1);
}

#[tokio::test]
async fn repeated_polling_ranks_the_upload_record_category() {
    let server = boot().await;
    let client = reqwest::Client::new();

    // baseline poll, then grow the manifest, then poll again
    client
        .get(format!("{}/server-info", server.base_url))
        .send()
        .await
        .expect("baseline poll");
    for _ in 0..3 {
        client
            .post(format!("{}/upload", server.base_url))
            .multipart(file_form("dummy.txt", vec![b'x'; 512]))
            .send()
            .await
            .expect("upload");
    }
    let info: serde_json::Value = client
        .get(format!("{}/server-info", server.base_url))
        .send()
        .await
        .expect("second poll")
        .json()
        .await
        .expect("json");

    let by_count = info["topTypesByCount"].as_array().expect("count ranking");
    assert!(
        by_count
            .iter()
            .any(|row| row["type"] == "UploadRecord" && row["count"] == 3),
        "ranking missing UploadRecord: {}",
        info["topTypesByCount"]
    );
}

#[tokio::test]
async fn dashboard_serves_the_html_page() {
    let server = boot().await;

    let response = reqwest::get(&server.base_url).await.expect("dashboard");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body = response.text().await.expect("body");
    assert!(body.contains("File Upload Server"));
    assert!(body.contains("fetch('/server-info')"));
}

#[tokio::test]
async fn echo_loop_posts_dummy_uploads_to_itself() {
    let server = boot().await;
    let cancel = CancellationToken::new();
    let echo = spawn_upload_echo(
        EchoConfig {
            endpoint: format!("{}/upload", server.base_url),
            period: Duration::from_millis(20),
            payload_bytes: 1024,
        },
        server.ledger.register("EchoPayload"),
        cancel.clone(),
    );

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while server.store.uploaded_file_count().await == 0 {
        assert!(
            tokio::time::Instant::now() < deadline,
            "echo upload never arrived"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    cancel.cancel();
    echo.await.expect("echo task");
}
