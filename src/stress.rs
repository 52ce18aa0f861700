use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::select;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::telemetry::{CategoryCounter, ResourceSampler, Snapshot};

/// Periodic telemetry logger. Owns its cadence; the sampler stays a pure
/// function of "time since last call".
pub fn spawn_telemetry_logger(
    sampler: Arc<ResourceSampler>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = sampler.sample();
                    info!("Memory Usage: {}", summarize(&snapshot));
                }
            }
        }
    })
}

fn summarize(snapshot: &Snapshot) -> String {
    let top_growth = snapshot
        .top_growing_types
        .first()
        .map(|g| format!("{}(+{})", g.name, g.growth))
        .unwrap_or_else(|| "-".to_string());
    format!(
        "rss={} heapUsed={} cpu={} delta={}B/{}obj topGrowth={}",
        snapshot.rss,
        snapshot.heap_used,
        snapshot.cpu_usage.percentage,
        snapshot.allocation_delta.heap_size_bytes,
        snapshot.allocation_delta.object_count,
        top_growth,
    )
}

pub struct EchoConfig {
    /// Full URL of our own upload endpoint.
    pub endpoint: String,
    pub period: Duration,
    pub payload_bytes: usize,
}

/// Self-upload echo loop: POSTs a dummy payload to our own `/upload` on a
/// fixed cadence to keep the intake path and the allocation ledger busy.
/// Failures are logged, never fatal.
pub fn spawn_upload_echo(
    config: EchoConfig,
    payloads: CategoryCounter,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut ticker = interval(config.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    echo_once(&client, &config, &payloads).await;
                }
            }
        }
    })
}

async fn echo_once(client: &reqwest::Client, config: &EchoConfig, payloads: &CategoryCounter) {
    // live for the duration of the request, visible to the sampler
    let _live = payloads.track();
    let payload = vec![b'x'; config.payload_bytes];
    let part = reqwest::multipart::Part::bytes(payload).file_name("dummy.txt");
    let form = reqwest::multipart::Form::new().part("file", part);

    match client.post(&config.endpoint).multipart(form).send().await {
        Ok(response) if response.status().is_success() => {
            match response.text().await {
                Ok(body) => info!("Dummy file uploaded successfully: {}", body),
                Err(err) => error!("Error reading echo response: {}", err),
            }
        }
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Error uploading dummy file: {} {}", status, body);
        }
        Err(err) => error!("Error uploading dummy file: {}", err),
    }
}
