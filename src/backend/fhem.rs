//! HTTP backend for the FHEM web interface

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::mpsc;
use url::Url;

use super::{Backend, BackendEvent};
use crate::error::{Error, Result};
use crate::registry::Device;

/// Pause before reopening a dropped change stream
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Change stream selection: status updates of every device as JSON lines
const INFORM: &str = "type=status;filter=.*;fmt=JSON";

/// FHEM web interface client with a write-through reading cache
pub struct FhemBackend {
    client: reqwest::Client,
    /// No total timeout; the change stream stays open
    stream_client: reqwest::Client,
    base: Url,
    auth: Option<(String, SecretString)>,
    /// Handshake outcome, `None` until the first handshake
    csrf: tokio::sync::RwLock<Option<Option<String>>>,
    readings: RwLock<HashMap<String, String>>,
}

impl FhemBackend {
    /// Create a client for `base`, e.g. `http://127.0.0.1:8083/fhem`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let stream_client = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            stream_client,
            base,
            auth: None,
            csrf: tokio::sync::RwLock::new(None),
            readings: RwLock::new(HashMap::new()),
        })
    }

    /// Use HTTP basic auth
    #[must_use]
    pub fn with_basic_auth(mut self, username: String, password: SecretString) -> Self {
        self.auth = Some((username, password));
        self
    }

    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, password)) => request.basic_auth(user, Some(password.expose_secret())),
            None => request,
        }
    }

    fn get(&self, url: Url) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    /// CSRF token announced by the web interface
    ///
    /// The outcome is kept until the hub rejects a request, including a hub
    /// that announces no token at all.
    async fn csrf_token(&self) -> Result<Option<String>> {
        if let Some(outcome) = self.csrf.read().await.as_ref() {
            return Ok(outcome.clone());
        }

        let mut csrf = self.csrf.write().await;
        if let Some(outcome) = csrf.as_ref() {
            return Ok(outcome.clone());
        }

        let mut url = self.base.clone();
        url.query_pairs_mut().append_pair("XHR", "1");
        let response = self.get(url).send().await?;
        let token = response
            .headers()
            .get("x-fhem-csrftoken")
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        match &token {
            Some(_) => tracing::debug!(base = %self.base, "got csrf token"),
            None => tracing::debug!(base = %self.base, "no csrf token announced"),
        }
        *csrf = Some(token.clone());
        Ok(token)
    }

    async fn forget_csrf_token(&self) {
        *self.csrf.write().await = None;
    }

    fn command_url(&self, command: &str, csrf: Option<&str>) -> Url {
        let mut query = format!("cmd={}", urlencoding::encode(command));
        if let Some(token) = csrf {
            query.push_str("&fwcsrf=");
            query.push_str(&urlencoding::encode(token));
        }
        query.push_str("&XHR=1");

        let mut url = self.base.clone();
        url.set_query(Some(&query));
        url
    }

    fn inform_url(&self, csrf: Option<&str>) -> Url {
        let mut query = format!("XHR=1&inform={INFORM}");
        if let Some(token) = csrf {
            query.push_str("&fwcsrf=");
            query.push_str(&urlencoding::encode(token));
        }

        let mut url = self.base.clone();
        url.set_query(Some(&query));
        url
    }

    /// Fetch every reading of a device via `jsonlist2`
    ///
    /// Returns `(pointer, value)` pairs and stores them in the cache.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the answer is not a device list
    pub async fn fetch_readings(&self, device: &str) -> Result<Vec<(String, String)>> {
        let raw = self.execute(&format!("jsonlist2 {device}")).await?;
        let list: JsonList = serde_json::from_str(&raw)?;

        let mut readings = Vec::new();
        for entry in list.results {
            for (reading, value) in entry.readings {
                let pointer = format!("{}-{reading}", entry.name);
                self.observe(&pointer, &value.value.to_string_lossy());
                readings.push((pointer, value.value.to_string_lossy()));
            }
        }
        tracing::debug!(device, readings = readings.len(), "fetched readings");
        Ok(readings)
    }

    /// Update the cache after a successful `set`
    fn write_through(&self, command: &str) {
        if command.contains(';') {
            return;
        }
        let mut words = command.split_whitespace();
        if words.next() != Some("set") {
            return;
        }
        let (Some(device), Some(first)) = (words.next(), words.next()) else {
            return;
        };
        let rest: Vec<&str> = words.collect();
        if rest.is_empty() {
            self.observe(&format!("{device}-state"), first);
        } else {
            self.observe(&format!("{device}-{first}"), &rest.join(" "));
        }
    }

    /// Follow the hub's change stream until the hub closes it
    ///
    /// Readings become [`BackendEvent::Reading`]. Defining one of `devices`
    /// adds it again and deleting any device removes it.
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be opened or breaks off
    pub async fn stream_once(
        &self,
        connection: &str,
        devices: &[Device],
        events: &mpsc::Sender<BackendEvent>,
    ) -> Result<()> {
        let csrf = self.csrf_token().await?;
        let url = self.inform_url(csrf.as_deref());
        let response = self.authorize(self.stream_client.get(url)).send().await?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::BAD_REQUEST {
                self.forget_csrf_token().await;
            }
            return Err(Error::Backend(format!("change stream: {status}")));
        }
        tracing::debug!(connection, "change stream open");

        let mut body = response.bytes_stream();
        let mut pending = Vec::new();
        while let Some(chunk) = body.next().await {
            pending.extend_from_slice(&chunk?);
            while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = pending.drain(..=end).collect();
                let Some(event) = parse_inform(&String::from_utf8_lossy(&line))
                    .and_then(|inform| inform.into_event(connection, devices))
                else {
                    continue;
                };
                if events.send(event).await.is_err() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Keep following the change stream, reopening it after it ends
    ///
    /// Every reopen reloads the connection's devices. Returns once the event
    /// receiver is gone.
    pub async fn watch(
        self: Arc<Self>,
        connection: String,
        devices: Vec<Device>,
        events: mpsc::Sender<BackendEvent>,
    ) {
        let mut reopened = false;
        loop {
            if reopened {
                let reload = BackendEvent::ConnectionReloaded {
                    connection: connection.clone(),
                    devices: devices.clone(),
                };
                if events.send(reload).await.is_err() {
                    return;
                }
            }

            match self.stream_once(&connection, &devices, &events).await {
                Ok(()) => tracing::debug!(%connection, "change stream closed"),
                Err(e) => tracing::warn!(%connection, error = %e, "change stream failed"),
            }
            if events.is_closed() {
                return;
            }
            reopened = true;
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }
}

/// One entry of the change stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inform {
    /// `<device>-<reading>` changed
    Reading { pointer: String, value: String },
    /// A device was defined
    Defined(String),
    /// A device was deleted
    Deleted(String),
}

impl Inform {
    fn into_event(self, connection: &str, devices: &[Device]) -> Option<BackendEvent> {
        match self {
            Self::Reading { pointer, value } => Some(BackendEvent::Reading {
                connection: connection.to_string(),
                pointer,
                value,
            }),
            Self::Defined(name) => devices
                .iter()
                .find(|d| d.name == name)
                .map(|d| BackendEvent::DeviceAdded(Box::new(d.clone()))),
            Self::Deleted(name) => Some(BackendEvent::DeviceRemoved {
                connection: connection.to_string(),
                name,
            }),
        }
    }
}

/// Parse one change stream line, `["<device>-<reading>","<value>","<html>"]`
///
/// Timestamps and device summaries are skipped. `global` events report
/// definitions and deletions.
#[must_use]
pub fn parse_inform(line: &str) -> Option<Inform> {
    let fields: Vec<String> = serde_json::from_str(line.trim()).ok()?;
    let (name, value) = (fields.first()?, fields.get(1)?);

    if name.contains('-') {
        if name.ends_with("-ts") {
            return None;
        }
        return Some(Inform::Reading {
            pointer: name.clone(),
            value: value.clone(),
        });
    }

    if name != "global" {
        return None;
    }
    match value.split_once(' ')? {
        ("DEFINED", device) => Some(Inform::Defined(device.trim().to_string())),
        ("DELETED", device) => Some(Inform::Deleted(device.trim().to_string())),
        _ => None,
    }
}

#[async_trait]
impl Backend for FhemBackend {
    fn cached_value(&self, pointer: &str) -> Option<String> {
        self.readings.read().ok()?.get(pointer).cloned()
    }

    async fn execute(&self, command: &str) -> Result<String> {
        let csrf = self.csrf_token().await?;
        let url = self.command_url(command, csrf.as_deref());
        tracing::debug!(base = %self.base, command, "executing");

        let response = self.get(url).send().await.map_err(|e| {
            tracing::error!(error = %e, "backend request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "backend error");
            if status == reqwest::StatusCode::BAD_REQUEST {
                // stale token, refetch on next call
                self.forget_csrf_token().await;
            }
            return Err(Error::Backend(format!("{status}: {body}")));
        }

        let body = response.text().await?;
        self.write_through(command);
        Ok(body.replace(['\r', '\n'], ""))
    }

    fn observe(&self, pointer: &str, value: &str) {
        if let Ok(mut readings) = self.readings.write() {
            readings.insert(pointer.to_string(), value.to_string());
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonList {
    #[serde(rename = "Results", default)]
    results: Vec<JsonListEntry>,
}

#[derive(Debug, Deserialize)]
struct JsonListEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Readings", default)]
    readings: HashMap<String, JsonReading>,
}

#[derive(Debug, Deserialize)]
struct JsonReading {
    #[serde(rename = "Value")]
    value: ReadingValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReadingValue {
    Text(String),
    Number(serde_json::Number),
}

impl ReadingValue {
    fn to_string_lossy(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
        }
    }
}
