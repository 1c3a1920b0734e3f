//! Periodic fetch of the monitoring endpoint.
//!
//! `SensorPoller` performs one request and turns the payload into the two
//! display strings. Scheduling is left to the GUI event loop; `PollSchedule`
//! holds the bookkeeping so a failed poll can never stop the cycle.

use crate::config::AppConfig;
use crate::error::PollError;
use crate::sensor::{find_nodes_by_id, SensorTree, TargetIdSet};
use std::time::Duration;

/// Shown before the first poll completes.
pub const PENDING: &str = "...";
/// Shown when the sensor id was not found or has no value.
pub const NOT_AVAILABLE: &str = "N/A";
/// Shown when the endpoint could not be reached or decoded.
pub const ERROR: &str = "Error";

/// Label text for both readings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readings {
    pub cpu: String,
    pub gpu: String,
}

impl Readings {
    fn labelled(cpu: &str, gpu: &str) -> Self {
        Self {
            cpu: format!("CPU: {}", cpu),
            gpu: format!("GPU: {}", gpu),
        }
    }

    pub fn pending() -> Self {
        Self::labelled(PENDING, PENDING)
    }

    pub fn error() -> Self {
        Self::labelled(ERROR, ERROR)
    }

    /// Pull both values out of a decoded tree, `N/A` for anything missing.
    pub fn from_tree(tree: &SensorTree, targets: &TargetIdSet) -> Self {
        let found = find_nodes_by_id(tree, targets);
        let value_of = |id: i64| {
            found
                .get(&id)
                .and_then(|node| node.value.as_deref())
                .unwrap_or(NOT_AVAILABLE)
        };
        Self::labelled(value_of(targets.cpu()), value_of(targets.gpu()))
    }
}

/// HTTP client for the monitoring endpoint. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SensorPoller {
    client: reqwest::Client,
    url: String,
    targets: TargetIdSet,
}

impl SensorPoller {
    pub fn new(url: impl Into<String>, targets: TargetIdSet, timeout: Duration) -> Result<Self, PollError> {
        // The endpoint is a local service; never route it through a proxy.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            targets,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, PollError> {
        Self::new(
            config.endpoint_url.clone(),
            config.target_ids(),
            config.request_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One request, propagating every failure.
    pub async fn fetch(&self) -> Result<Readings, PollError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status));
        }

        let body = response.bytes().await?;
        let tree = SensorTree::parse(&body)?;
        Ok(Readings::from_tree(&tree, &self.targets))
    }

    /// One request that always yields something to display.
    pub async fn poll(&self) -> Readings {
        match self.fetch().await {
            Ok(readings) => {
                tracing::debug!("{} | {}", readings.cpu, readings.gpu);
                readings
            }
            Err(e) => {
                tracing::error!("Error fetching data: {}", e);
                Readings::error()
            }
        }
    }
}

/// Tracks the in-flight poll so ticks never overlap.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    interval: Duration,
    in_flight: bool,
    completed: u64,
}

impl PollSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            in_flight: false,
            completed: 0,
        }
    }

    /// Mark a poll as started. Returns false if one is already running.
    pub fn begin(&mut self) -> bool {
        if self.in_flight {
            return false;
        }
        self.in_flight = true;
        true
    }

    /// Mark the running poll as finished and return the delay before the next
    /// one. Independent of whether the poll succeeded.
    pub fn complete(&mut self) -> Duration {
        self.in_flight = false;
        self.completed += 1;
        self.interval
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn targets() -> TargetIdSet {
        TargetIdSet::new(19, 61)
    }

    /// Serve a single canned HTTP response on a local port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}/data.json", addr)
    }

    /// A local address nothing is listening on.
    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/data.json", addr)
    }

    #[test]
    fn test_readings_from_tree() {
        let tree = SensorTree::parse(
            br#"{"id":1,"Children":[{"id":19,"Value":"45"},{"id":61,"Value":"60"}]}"#,
        )
        .unwrap();

        let readings = Readings::from_tree(&tree, &targets());
        assert_eq!(readings.cpu, "CPU: 45");
        assert_eq!(readings.gpu, "GPU: 60");
    }

    #[test]
    fn test_missing_cpu_shows_placeholder() {
        let tree = SensorTree::parse(br#"{"Children":[{"id":61,"Value":"60"}]}"#).unwrap();
        let readings = Readings::from_tree(&tree, &targets());
        assert_eq!(readings.cpu, "CPU: N/A");
        assert_eq!(readings.gpu, "GPU: 60");
    }

    #[test]
    fn test_node_without_value_shows_placeholder() {
        let tree = SensorTree::parse(br#"[{"id":19},{"id":61,"Value":"60"}]"#).unwrap();
        let readings = Readings::from_tree(&tree, &targets());
        assert_eq!(readings.cpu, "CPU: N/A");
    }

    #[test]
    fn test_fixed_labels() {
        assert_eq!(Readings::pending().cpu, "CPU: ...");
        assert_eq!(Readings::error().gpu, "GPU: Error");
    }

    #[test]
    fn test_schedule_always_reschedules() {
        let interval = Duration::from_millis(2500);
        let mut schedule = PollSchedule::new(interval);

        assert!(schedule.begin());
        assert!(!schedule.begin(), "overlapping poll must be refused");
        assert_eq!(schedule.complete(), interval);
        assert!(!schedule.in_flight());

        assert!(schedule.begin());
        assert_eq!(schedule.complete(), interval);
        assert_eq!(schedule.completed(), 2);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let url = serve_once(
            "200 OK",
            r#"{"id":1,"Children":[{"id":19,"Value":"45"},{"id":61,"Value":"60"}]}"#,
        )
        .await;
        let poller = SensorPoller::new(url, targets(), Duration::from_secs(5)).unwrap();

        let readings = poller.fetch().await.unwrap();
        assert_eq!(readings, Readings { cpu: "CPU: 45".into(), gpu: "GPU: 60".into() });
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_shows_error() {
        let url = closed_port().await;
        let poller = SensorPoller::new(url, targets(), Duration::from_secs(5)).unwrap();

        assert!(matches!(poller.fetch().await, Err(PollError::Http(_))));
        assert_eq!(poller.poll().await, Readings::error());
    }

    #[tokio::test]
    async fn test_malformed_body_shows_error() {
        let url = serve_once("200 OK", "<html>oops</html>").await;
        let poller = SensorPoller::new(url, targets(), Duration::from_secs(5)).unwrap();

        assert!(matches!(poller.fetch().await, Err(PollError::Decode(_))));
    }

    #[tokio::test]
    async fn test_error_status_shows_error() {
        let url = serve_once("500 Internal Server Error", "{}").await;
        let poller = SensorPoller::new(url, targets(), Duration::from_secs(5)).unwrap();

        assert_eq!(poller.poll().await, Readings::error());
    }
}
