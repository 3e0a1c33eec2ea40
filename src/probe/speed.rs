//! HTTP throughput probe implementation.
//!
//! Talks to speed-test endpoints exposing `GET {base}/__down?bytes=N` and
//! `POST {base}/__up`. The endpoint with the lowest round trip is used.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::timeout_at;

use super::ProbeError;

/// Upper bound on bytes requested for the download measurement.
pub const DOWNLOAD_BYTES: usize = 25_000_000;

/// Upper bound on bytes sent for the upload measurement.
pub const UPLOAD_BYTES: usize = 10_000_000;

/// Size of each upload request; slow links finish fewer of them.
pub const UPLOAD_CHUNK_BYTES: usize = 500_000;

/// Bound on the whole probe: server selection, download and upload.
pub const SPEEDTEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Time spent measuring each direction.
pub const TRANSFER_WINDOW: Duration = Duration::from_secs(20);

/// Bound on each zero-byte server selection request.
const SELECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Download and upload rates in megabits per second.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Throughput {
    pub download_mbps: Option<f64>,
    pub upload_mbps: Option<f64>,
}

impl Throughput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.download_mbps.is_none() && self.upload_mbps.is_none()
    }
}

/// Throughput tester over a fixed list of candidate endpoints.
///
/// Each direction is measured over a time window rather than a fixed
/// transfer size, so slow links still report a rate.
pub struct SpeedTester {
    client: reqwest::Client,
    servers: Vec<String>,
    window: Duration,
}

impl SpeedTester {
    pub fn new(servers: Vec<String>) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .connect_timeout(SELECT_TIMEOUT)
            .build()
            .map_err(|e| ProbeError::Network(e.to_string()))?;
        Ok(Self {
            client,
            servers,
            window: TRANSFER_WINDOW,
        })
    }

    /// Measure download and upload rates.
    ///
    /// Any failure, including a provider refusing the test, yields
    /// [`Throughput::none`].
    pub async fn run(&self) -> Throughput {
        match tokio::time::timeout(SPEEDTEST_TIMEOUT, self.measure()).await {
            Ok(Ok(throughput)) => throughput,
            Ok(Err(e)) => {
                tracing::error!("Speed test failed: {}", e);
                Throughput::none()
            }
            Err(_) => {
                tracing::error!("Speed test timed out after {:?}", SPEEDTEST_TIMEOUT);
                Throughput::none()
            }
        }
    }

    async fn measure(&self) -> Result<Throughput, ProbeError> {
        let server = self.best_server().await?;
        tracing::debug!("Speed test using {}", server);

        let download = self.download(server).await?;
        let upload = self.upload(server).await?;

        Ok(Throughput {
            download_mbps: Some(download),
            upload_mbps: Some(upload),
        })
    }

    /// Pick the endpoint answering a zero-byte download fastest.
    async fn best_server(&self) -> Result<&str, ProbeError> {
        let mut best: Option<(&str, Duration)> = None;

        for server in &self.servers {
            let start = Instant::now();
            let response = self
                .client
                .get(format!("{}/__down?bytes=0", server))
                .timeout(SELECT_TIMEOUT)
                .send()
                .await
                .and_then(|r| r.error_for_status());

            match response {
                Ok(_) => {
                    let rtt = start.elapsed();
                    if best.map_or(true, |(_, b)| rtt < b) {
                        best = Some((server.as_str(), rtt));
                    }
                }
                Err(e) => tracing::debug!("Speed test server {} unusable: {}", server, e),
            }
        }

        best.map(|(server, _)| server)
            .ok_or_else(|| ProbeError::Network("no speed test server reachable".to_string()))
    }

    /// Read the body until it ends or the window closes.
    async fn download(&self, server: &str) -> Result<f64, ProbeError> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.window;

        let mut response = timeout_at(
            deadline,
            self.client
                .get(format!("{}/__down?bytes={}", server, DOWNLOAD_BYTES))
                .send(),
        )
        .await
        .map_err(|_| ProbeError::Timeout(self.window))?
        .and_then(|r| r.error_for_status())
        .map_err(map_reqwest_error)?;

        let mut received = 0usize;
        loop {
            match timeout_at(deadline, response.chunk()).await {
                Ok(Ok(Some(chunk))) => received += chunk.len(),
                Ok(Ok(None)) | Err(_) => break,
                Ok(Err(e)) if received > 0 => {
                    tracing::debug!("Download interrupted after {} bytes: {}", received, e);
                    break;
                }
                Ok(Err(e)) => return Err(map_reqwest_error(e)),
            }
        }

        mbps(received, start.elapsed())
    }

    /// Post fixed-size chunks until the byte cap or the window is reached.
    async fn upload(&self, server: &str) -> Result<f64, ProbeError> {
        let mut payload = vec![0u8; UPLOAD_CHUNK_BYTES];
        rand::thread_rng().fill(&mut payload[..]);

        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.window;
        let mut sent = 0usize;

        while sent < UPLOAD_BYTES {
            let request = self
                .client
                .post(format!("{}/__up", server))
                .body(payload.clone())
                .send();

            match timeout_at(deadline, request).await {
                Ok(Ok(r)) => {
                    r.error_for_status().map_err(map_reqwest_error)?;
                    sent += UPLOAD_CHUNK_BYTES;
                }
                Ok(Err(e)) => return Err(map_reqwest_error(e)),
                Err(_) => break,
            }
        }

        if sent == 0 {
            return Err(ProbeError::Timeout(self.window));
        }
        mbps(sent, start.elapsed())
    }
}

fn map_reqwest_error(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(SELECT_TIMEOUT)
    } else {
        ProbeError::Network(e.to_string())
    }
}

/// Convert a transfer of `bytes` over `elapsed` into megabits per second.
pub fn mbps(bytes: usize, elapsed: Duration) -> Result<f64, ProbeError> {
    let secs = elapsed.as_secs_f64();
    if bytes == 0 || secs <= 0.0 {
        return Err(ProbeError::Parse(format!(
            "cannot derive rate from {} bytes in {:?}",
            bytes, elapsed
        )));
    }
    Ok(bytes as f64 * 8.0 / secs / 1_000_000.0)
}
