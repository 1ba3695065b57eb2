// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destinations for flushed Line Protocol batches.
//!
//! The [`LineSink`] trait is the only thing the batch writer knows about
//! the store. Each call is one synchronous write of one whole batch.

use crate::error::{Error, Result};
use reqwest::Url;
use std::io::Write;
use std::time::Duration;

/// Something that accepts a batch of Line Protocol lines.
pub trait LineSink {
    /// Write the whole batch in one call.
    fn write_lines(&mut self, lines: &[String]) -> Result<()>;
}

impl<T: LineSink + ?Sized> LineSink for Box<T> {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        (**self).write_lines(lines)
    }
}

/// HTTP request timeout for a single batch write.
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Writes batches to InfluxDB over HTTP with nanosecond precision.
///
/// Uses the v2-compatible `/api/v2/write` endpoint, which InfluxDB 2.x and
/// 3.x both accept. The database name is sent as the bucket.
pub struct InfluxSink {
    client: reqwest::blocking::Client,
    write_url: Url,
    auth_header: String,
}

impl InfluxSink {
    /// Prepare a client for `host` (e.g., `http://127.0.0.1:8181`).
    ///
    /// No request is made until the first write. Fails on a blank token
    /// or a host that is not an `http`/`https` URL.
    pub fn connect(host: &str, database: &str, token: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(Error::MissingToken);
        }
        let write_url = write_url(host, database)?;
        let client = reqwest::blocking::Client::builder()
            .timeout(WRITE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            write_url,
            auth_header: format!("Token {}", token.trim()),
        })
    }

    /// Full write endpoint, including query parameters.
    pub fn write_url(&self) -> &str {
        self.write_url.as_str()
    }
}

impl LineSink for InfluxSink {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        let resp = self
            .client
            .post(self.write_url.clone())
            .header(reqwest::header::AUTHORIZATION, &self.auth_header)
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(lines.join("\n"))
            .send()?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().unwrap_or_default();
            Err(Error::WriteRejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

fn write_url(host: &str, database: &str) -> Result<Url> {
    let invalid =
        |reason: String| Error::InvalidConfig(format!("influxdb.host {:?}: {}", host, reason));
    let endpoint = format!("{}/api/v2/write", host.trim().trim_end_matches('/'));
    let url = Url::parse_with_params(&endpoint, &[("bucket", database), ("precision", "ns")])
        .map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme {:?}", other))),
    }
}

/// Keeps every batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Vec<Vec<String>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches in write order.
    pub fn batches(&self) -> &[Vec<String>] {
        &self.batches
    }

    /// All lines across batches, in write order.
    pub fn lines(&self) -> impl Iterator<Item = &String> {
        self.batches.iter().flatten()
    }
}

impl LineSink for MemorySink {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        self.batches.push(lines.to_vec());
        Ok(())
    }
}

/// Prints each line to stdout (dry runs).
#[derive(Debug, Default)]
pub struct StdoutSink;

impl LineSink for StdoutSink {
    fn write_lines(&mut self, lines: &[String]) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }
}
