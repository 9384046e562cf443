//! Blocking HTTP client for the Open-Meteo historical archive.
//!
//! - Blocking client using `ureq` (no async).
//! - One endpoint: `GET /v1/archive` with the hourly variables in
//!   [`crate::models::open_meteo::HOURLY_VARIABLES`].
//! - Transport failures, HTTP 429 and 5xx are retried with exponential backoff up to
//!   the configured attempt count; other failures surface immediately.

use chrono::NaiveDate;
use http::Response;
use log::{debug, warn};
use std::num::NonZeroU32;
use std::thread;
use std::time::Duration;
use ureq::Body;

use crate::models::open_meteo::{ApiErrorBody, ArchiveResponse, HOURLY_VARIABLES};
use crate::models::weather::HourlyReading;

pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
/// Several years of hourly columns easily exceed ureq's default 10 MiB body limit.
const MAX_BODY_BYTES: u64 = 128 * 1024 * 1024;

/// Network, API or payload failures while fetching observations.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },
    #[error("malformed payload at {path}: {message}")]
    Payload { path: String, message: String },
}

impl IngestError {
    fn is_retryable(&self) -> bool {
        match self {
            IngestError::Transport(_) => true,
            IngestError::Http { status, .. } => *status == 429 || *status >= 500,
            IngestError::Payload { .. } => false,
        }
    }
}

/// Point and period to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// `auto` resolves to the coordinate's local timezone.
    pub timezone: String,
}

impl ArchiveQuery {
    fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
            ("start_date", self.start_date.format("%Y-%m-%d").to_string()),
            ("end_date", self.end_date.format("%Y-%m-%d").to_string()),
            ("hourly", HOURLY_VARIABLES.join(",")),
            ("timezone", self.timezone.clone()),
        ]
    }
}

/// Source of hourly readings for a point and period.
pub trait ObservationSource {
    fn fetch_hourly(&self, query: &ArchiveQuery) -> Result<Vec<HourlyReading>, IngestError>;
}

pub struct OpenMeteoClient {
    agent: ureq::Agent,
    base_url: String,
    max_attempts: NonZeroU32,
}

impl OpenMeteoClient {
    pub fn new(timeout: Duration, max_attempts: NonZeroU32) -> Self {
        Self::with_base_url(ARCHIVE_URL, timeout, max_attempts)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration, max_attempts: NonZeroU32) -> Self {
        // Status codes are inspected by hand so the API's `reason` can be reported.
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        OpenMeteoClient {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url.into(),
            max_attempts,
        }
    }

    pub fn get_archive(&self, query: &ArchiveQuery) -> Result<ArchiveResponse, IngestError> {
        let attempts = self.max_attempts.get();
        let mut delay = INITIAL_BACKOFF;
        let mut attempt = 1;
        loop {
            match self.get_archive_once(query) {
                Ok(resp) => {
                    if attempt > 1 {
                        debug!("Archive request succeeded after {} attempt(s)", attempt);
                    }
                    return Ok(resp);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        "Archive request failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt, attempts, e, delay
                    );
                    thread::sleep(delay);
                    delay = (delay * 2).min(MAX_BACKOFF);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn get_archive_once(&self, query: &ArchiveQuery) -> Result<ArchiveResponse, IngestError> {
        let mut req = self.agent.get(self.base_url.as_str()).header("Accept", "application/json");
        for (k, v) in query.params() {
            req = req.query(k, v);
        }
        let resp = req.call().map_err(|e| IngestError::Transport(e.to_string()))?;
        read_archive(resp)
    }
}

impl ObservationSource for OpenMeteoClient {
    fn fetch_hourly(&self, query: &ArchiveQuery) -> Result<Vec<HourlyReading>, IngestError> {
        let archive = self.get_archive(query)?;
        debug!(
            "Archive resolved point ({:.4}, {:.4}) timezone={}",
            archive.latitude,
            archive.longitude,
            archive.timezone.as_deref().unwrap_or("-")
        );
        archive.into_readings().map_err(|m| IngestError::Payload {
            path: format!("hourly.{}", m.column),
            message: format!("expected {} values to match hourly.time, got {}", m.expected, m.actual),
        })
    }
}

fn read_archive(mut resp: Response<Body>) -> Result<ArchiveResponse, IngestError> {
    let status = resp.status();
    let body = resp
        .body_mut()
        .with_config()
        .limit(MAX_BODY_BYTES)
        .read_to_string()
        .map_err(|e| IngestError::Transport(e.to_string()))?;

    if !status.is_success() {
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .filter(|b| b.error)
            .and_then(|b| b.reason)
            .unwrap_or(body);
        return Err(IngestError::Http {
            status: status.as_u16(),
            message,
        });
    }

    parse_archive(&body)
}

/// Decode a successful archive body, reporting the JSON path of any mismatch.
pub fn parse_archive(body: &str) -> Result<ArchiveResponse, IngestError> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|e| IngestError::Payload {
        path: e.path().to_string(),
        message: e.inner().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers one connection per scripted `(status, body)` and counts requests.
    fn scripted_server(responses: Vec<(u16, String)>) -> (String, Arc<AtomicUsize>, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let url = format!("http://{}/v1/archive", listener.local_addr().expect("local addr"));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            for (status, body) in responses {
                let (stream, _) = listener.accept().expect("accept");
                counter.fetch_add(1, Ordering::SeqCst);
                let mut reader = BufReader::new(&stream);
                let mut line = String::new();
                loop {
                    line.clear();
                    let n = reader.read_line(&mut line).expect("read request");
                    if n == 0 || line == "\r\n" {
                        break;
                    }
                }
                let reason = match status {
                    200 => "OK",
                    400 => "Bad Request",
                    503 => "Service Unavailable",
                    _ => "Other",
                };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
                     Connection: close\r\n\r\n{}",
                    status,
                    reason,
                    body.len(),
                    body
                );
                (&stream).write_all(response.as_bytes()).expect("write response");
            }
        });
        (url, hits, handle)
    }

    fn client(url: &str, attempts: u32) -> OpenMeteoClient {
        OpenMeteoClient::with_base_url(
            url,
            Duration::from_secs(5),
            NonZeroU32::new(attempts).expect("non-zero"),
        )
    }

    fn sample_query() -> ArchiveQuery {
        ArchiveQuery {
            latitude: 32.51,
            longitude: 45.77,
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid"),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 2).expect("valid"),
            timezone: "auto".to_string(),
        }
    }

    fn fixture() -> String {
        std::fs::read_to_string("tests/data/archive-sample.json").expect("fixture present")
    }

    #[test]
    fn rejected_request_reports_api_reason() {
        let body = r#"{"error":true,"reason":"Parameter 'start_date' is out of allowed range"}"#.to_string();
        let (url, hits, server) = scripted_server(vec![(400, body)]);
        let err = client(&url, 3).fetch_hourly(&sample_query()).expect_err("400 is an error");
        server.join().expect("server thread");
        match err {
            IngestError::Http { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Parameter 'start_date' is out of allowed range");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_failure_is_retried_until_success() {
        let (url, hits, server) = scripted_server(vec![(503, "upstream busy".to_string()), (200, fixture())]);
        let readings = client(&url, 3).fetch_hourly(&sample_query()).expect("second attempt succeeds");
        server.join().expect("server thread");
        assert_eq!(readings.len(), 30);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn gives_up_after_configured_attempts() {
        let busy = (503, "upstream busy".to_string());
        let (url, hits, server) = scripted_server(vec![busy.clone(), busy.clone(), busy]);
        let err = client(&url, 3).fetch_hourly(&sample_query()).expect_err("every attempt fails");
        server.join().expect("server thread");
        match err {
            IngestError::Http { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream busy");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn query_params_cover_all_hourly_variables() {
        let query = ArchiveQuery {
            latitude: 32.51,
            longitude: 45.77,
            start_date: NaiveDate::from_ymd_opt(2019, 1, 1).expect("valid"),
            end_date: NaiveDate::from_ymd_opt(2019, 12, 31).expect("valid"),
            timezone: "auto".to_string(),
        };
        let params = query.params();
        let get = |k: &str| params.iter().find(|(n, _)| *n == k).map(|(_, v)| v.as_str());
        assert_eq!(get("latitude"), Some("32.51"));
        assert_eq!(get("start_date"), Some("2019-01-01"));
        assert_eq!(get("end_date"), Some("2019-12-31"));
        assert_eq!(
            get("hourly"),
            Some("temperature_2m,relative_humidity_2m,dew_point_2m,wind_speed_10m,precipitation")
        );
        assert_eq!(get("timezone"), Some("auto"));
    }

    #[test]
    fn payload_errors_carry_json_path() {
        let body = r#"{"latitude": 1.0, "longitude": 2.0, "hourly": {"time": [], "temperature_2m": "oops"}}"#;
        match parse_archive(body) {
            Err(IngestError::Payload { path, .. }) => assert_eq!(path, "hourly.temperature_2m"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_columns_are_payload_errors() {
        let body = r#"{"latitude": 1.0, "longitude": 2.0, "hourly": {"time": []}}"#;
        assert!(matches!(parse_archive(body), Err(IngestError::Payload { .. })));
    }

    #[test]
    fn retry_policy_only_covers_transient_failures() {
        assert!(IngestError::Transport("reset".into()).is_retryable());
        assert!(IngestError::Http { status: 503, message: String::new() }.is_retryable());
        assert!(IngestError::Http { status: 429, message: String::new() }.is_retryable());
        assert!(!IngestError::Http { status: 400, message: String::new() }.is_retryable());
        assert!(
            !IngestError::Payload {
                path: ".".into(),
                message: String::new()
            }
            .is_retryable()
        );
    }

    #[test]
    fn parses_fixture_body() {
        let body = std::fs::read_to_string("tests/data/archive-sample.json").expect("fixture present");
        let archive = parse_archive(&body).expect("valid body");
        assert_eq!(archive.utc_offset_seconds, Some(10800));
        assert_eq!(archive.hourly.time.len(), 30);
    }
}
