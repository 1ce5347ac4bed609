//! Test utilities shared by the integration tests.
//!
//! Provides:
//! - In-memory environment maps
//! - A recording outbound transport
//! - A log capture buffer usable as a console sink writer

#![allow(dead_code)]

use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use service_telemetry::observability::transport::{Transport, TransportResult};
use std::any::Any;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Collector address that refuses connections immediately.
pub const UNREACHABLE_COLLECTOR: &str = "127.0.0.1:1";

/// Build an environment map from key/value pairs.
pub fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Answers every request with 204 and remembers the headers it saw.
#[derive(Default)]
pub struct RecordingTransport {
    seen: Mutex<Vec<HeaderMap>>,
}

impl RecordingTransport {
    /// Headers of every request sent so far.
    pub fn seen(&self) -> Vec<HeaderMap> {
        self.seen.lock().unwrap().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, request: reqwest::Request) -> BoxFuture<'_, TransportResult> {
        self.seen.lock().unwrap().push(request.headers().clone());
        Box::pin(async {
            let response = axum::http::Response::builder()
                .status(204)
                .body("")
                .unwrap();
            Ok(reqwest::Response::from(response))
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Shared in-memory log output.
#[derive(Clone, Default)]
pub struct CaptureBuffer(Arc<Mutex<Vec<u8>>>);

impl CaptureBuffer {
    /// Everything written so far.
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureBuffer {
    type Writer = CaptureBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_builds_map() {
        let map = env(&[("A", "1"), ("B", "")]);
        assert_eq!(map.get("A").map(String::as_str), Some("1"));
        assert_eq!(map.get("B").map(String::as_str), Some(""));
    }
}
