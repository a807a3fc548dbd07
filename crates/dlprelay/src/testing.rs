//! Test utilities for dlprelay - pipeline doubles and a multipart decoder
//!
//! This module provides:
//! - In-process doubles for every pipeline stage with call counters
//! - A status sink that records every line it receives
//! - A small multipart/form-data decoder for asserting on captured uploads

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use url::Url;

use crate::relay::negotiator::SinkNegotiator;
use crate::relay::source::ByteSource;
use crate::relay::status::StatusSink;
use crate::relay::transmitters::Transmitter;
use crate::relay::types::{
    DestinationKind, FilePayload, NegotiatedTarget, RelayError, SourceDescriptor, UploadMethod,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Status sink that keeps every line for later inspection
#[derive(Debug, Default)]
pub struct RecordingStatus {
    lines: Mutex<Vec<String>>,
}

impl RecordingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl StatusSink for RecordingStatus {
    fn write(&self, text: &str) {
        lock(&self.lines).push(text.to_string());
    }
}

/// Byte source double serving fixed bytes (or a fixed failure)
#[derive(Debug)]
pub struct CountingSource {
    result: Result<(Vec<u8>, String), RelayError>,
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn serving(bytes: Vec<u8>, content_type: &str) -> Self {
        Self {
            result: Ok((bytes, content_type.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: RelayError) -> Self {
        Self {
            result: Err(error),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteSource for CountingSource {
    async fn acquire(&self, source: &SourceDescriptor) -> Result<FilePayload, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (bytes, content_type) = self.result.clone()?;
        Ok(FilePayload::new(bytes, content_type, source.display_name()))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Negotiator double handing out a fresh target per call
#[derive(Debug)]
pub struct CountingNegotiator {
    result: Result<(Url, UploadMethod, BTreeMap<String, String>), RelayError>,
    calls: AtomicUsize,
    hints: Mutex<Vec<Option<String>>>,
}

impl CountingNegotiator {
    fn with_result(result: Result<(Url, UploadMethod, BTreeMap<String, String>), RelayError>) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
            hints: Mutex::new(Vec::new()),
        }
    }

    fn parse_url(url: &str) -> Result<Url, RelayError> {
        Url::parse(url).map_err(|e| RelayError::negotiation(None, e.to_string()))
    }

    /// Targets for a raw PUT upload
    pub fn put(url: &str) -> Self {
        Self::with_result(Self::parse_url(url).map(|u| (u, UploadMethod::Put, BTreeMap::new())))
    }

    /// Targets for a multipart POST upload carrying `fields`
    pub fn post(url: &str, fields: BTreeMap<String, String>) -> Self {
        Self::with_result(Self::parse_url(url).map(|u| (u, UploadMethod::Post, fields)))
    }

    pub fn failing(error: RelayError) -> Self {
        Self::with_result(Err(error))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Filename hints received, in call order
    pub fn hints(&self) -> Vec<Option<String>> {
        lock(&self.hints).clone()
    }
}

#[async_trait]
impl SinkNegotiator for CountingNegotiator {
    async fn negotiate(
        &self,
        _kind: DestinationKind,
        hint: Option<&str>,
    ) -> Result<NegotiatedTarget, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.hints).push(hint.map(str::to_string));
        let (url, method, fields) = self.result.clone()?;
        Ok(NegotiatedTarget::new(url, method, fields, BTreeMap::new()))
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// What a [`RecordingTransmitter`] was asked to send
#[derive(Debug, Clone, PartialEq)]
pub struct SentRequest {
    pub url: Url,
    pub method: UploadMethod,
    pub fields: BTreeMap<String, String>,
    pub extra: BTreeMap<String, String>,
    pub payload: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

/// Transmitter double that records each request and returns a fixed reply
#[derive(Debug)]
pub struct RecordingTransmitter {
    name: &'static str,
    result: Result<Option<Value>, RelayError>,
    requests: Mutex<Vec<SentRequest>>,
}

impl RecordingTransmitter {
    pub fn succeeding(name: &'static str, body: Option<Value>) -> Self {
        Self {
            name,
            result: Ok(body),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(name: &'static str, error: RelayError) -> Self {
        Self {
            name,
            result: Err(error),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn last_request(&self) -> Option<SentRequest> {
        lock(&self.requests).last().cloned()
    }
}

#[async_trait]
impl Transmitter for RecordingTransmitter {
    async fn send(
        &self,
        payload: FilePayload,
        target: NegotiatedTarget,
        extra: &BTreeMap<String, String>,
    ) -> Result<Option<Value>, RelayError> {
        let (bytes, content_type, file_name) = payload.into_parts();
        lock(&self.requests).push(SentRequest {
            url: target.url().clone(),
            method: target.method(),
            fields: target.fields().clone(),
            extra: extra.clone(),
            payload: bytes.to_vec(),
            file_name,
            content_type,
        });
        self.result.clone()
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// One decoded multipart/form-data part
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartField {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl MultipartField {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// A decoded multipart/form-data body, parts in wire order
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartBody {
    pub fields: Vec<MultipartField>,
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

fn disposition_param(disposition: &str, param: &str) -> Option<String> {
    disposition.split(';').map(str::trim).find_map(|part| {
        part.strip_prefix(param)
            .and_then(|rest| rest.strip_prefix('='))
            .map(|value| value.trim_matches('"').to_string())
    })
}

fn parse_part(raw: &[u8]) -> Option<MultipartField> {
    let split = find(raw, b"\r\n\r\n", 0)?;
    let head = String::from_utf8_lossy(&raw[..split]);
    let mut data = &raw[split + 4..];
    if data.ends_with(b"\r\n") {
        data = &data[..data.len() - 2];
    }

    let mut name = None;
    let mut file_name = None;
    let mut content_type = None;
    for line in head.split("\r\n") {
        let Some((header, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if header.eq_ignore_ascii_case("content-disposition") {
            name = disposition_param(value, "name");
            file_name = disposition_param(value, "filename");
        } else if header.eq_ignore_ascii_case("content-type") {
            content_type = Some(value.to_string());
        }
    }

    Some(MultipartField {
        name: name?,
        file_name,
        content_type,
        data: data.to_vec(),
    })
}

impl MultipartBody {
    /// Decode `body` using the boundary named in `content_type`
    pub fn parse(content_type: &str, body: &[u8]) -> Option<Self> {
        let boundary = disposition_param(content_type, "boundary")?;
        let delimiter = format!("--{boundary}").into_bytes();

        let mut fields = Vec::new();
        let mut cursor = find(body, &delimiter, 0)? + delimiter.len();
        while let Some(next) = find(body, &delimiter, cursor) {
            let mut part = &body[cursor..next];
            if part.starts_with(b"\r\n") {
                part = &part[2..];
            }
            fields.push(parse_part(part)?);
            cursor = next + delimiter.len();
            if body[cursor..].starts_with(b"--") {
                break;
            }
        }
        Some(Self { fields })
    }

    pub fn get(&self, name: &str) -> Option<&MultipartField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.get(name).map(MultipartField::text)
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// All non-file parts as name -> text
    pub fn text_fields(&self) -> BTreeMap<String, String> {
        self.fields
            .iter()
            .filter(|f| f.file_name.is_none())
            .map(|f| (f.name.clone(), f.text()))
            .collect()
    }
}
