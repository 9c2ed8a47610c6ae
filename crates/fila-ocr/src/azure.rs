use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{
  StatusCode,
  header::{CONTENT_TYPE, LOCATION},
};
use serde::Deserialize;
use tokio::time::{Instant, interval_at, timeout};

use crate::{Error, Result, TextExtractor};

const KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const OPERATION_LOCATION: &str = "Operation-Location";
const MODEL: &str = "prebuilt-layout";

fn default_locale() -> String { "pt-BR".into() }
fn default_api_version() -> String { "2024-11-30".into() }
fn default_poll_interval_ms() -> u64 { 1_500 }
fn default_poll_timeout_ms() -> u64 { 120_000 }

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
  /// Service root, e.g. `https://name.cognitiveservices.azure.com`.
  pub endpoint:         String,
  pub api_key:          String,
  #[serde(default = "default_locale")]
  pub locale:           String,
  #[serde(default = "default_api_version")]
  pub api_version:      String,
  #[serde(default = "default_poll_interval_ms")]
  pub poll_interval_ms: u64,
  /// Ceiling on the whole polling phase.
  #[serde(default = "default_poll_timeout_ms")]
  pub poll_timeout_ms:  u64,
}

impl OcrConfig {
  pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
    Self {
      endpoint:         endpoint.into(),
      api_key:          api_key.into(),
      locale:           default_locale(),
      api_version:      default_api_version(),
      poll_interval_ms: default_poll_interval_ms(),
      poll_timeout_ms:  default_poll_timeout_ms(),
    }
  }

  /// Never zero, which `tokio::time::interval` rejects.
  fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms.max(1)) }

  fn poll_timeout(&self) -> Duration { Duration::from_millis(self.poll_timeout_ms) }
}

#[derive(Deserialize)]
struct Operation {
  status:         String,
  #[serde(rename = "analyzeResult", default)]
  analyze_result: Option<AnalyzeResult>,
}

#[derive(Deserialize)]
struct AnalyzeResult {
  #[serde(default)]
  content: String,
}

/// Layout analysis with markdown output.
#[derive(Clone)]
pub struct AzureDocIntel {
  config: OcrConfig,
  http:   reqwest::Client,
}

impl AzureDocIntel {
  pub fn new(config: OcrConfig) -> Self { Self::with_http(config, reqwest::Client::new()) }

  pub fn with_http(config: OcrConfig, http: reqwest::Client) -> Self { Self { config, http } }

  async fn submit(&self, bytes: Bytes, mime_type: &str) -> Result<String> {
    let url = format!(
      "{}/documentintelligence/documentModels/{MODEL}:analyze",
      self.config.endpoint.trim_end_matches('/'),
    );
    let res = self
      .http
      .post(url)
      .query(&[
        ("locale", self.config.locale.as_str()),
        ("api-version", self.config.api_version.as_str()),
        ("outputContentFormat", "markdown"),
      ])
      .header(CONTENT_TYPE, mime_type)
      .header(KEY_HEADER, &self.config.api_key)
      .body(bytes)
      .send()
      .await?;

    let status = res.status();
    if status != StatusCode::ACCEPTED {
      return Err(protocol(res).await);
    }
    res
      .headers()
      .get(OPERATION_LOCATION)
      .or_else(|| res.headers().get(LOCATION))
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned)
      .ok_or_else(|| Error::OcrProtocol {
        status: status.as_u16(),
        body:   "missing Operation-Location header".into(),
      })
  }

  async fn operation(&self, location: &str) -> Result<Operation> {
    let res = self
      .http
      .get(location)
      .header(KEY_HEADER, &self.config.api_key)
      .send()
      .await?;
    if res.status() != StatusCode::OK {
      return Err(protocol(res).await);
    }
    Ok(res.json().await?)
  }

  async fn poll(&self, location: &str) -> Result<String> {
    let every = self.config.poll_interval();
    let ceiling = self.config.poll_timeout();

    let polling = async {
      let mut ticker = interval_at(Instant::now() + every, every);
      loop {
        ticker.tick().await;
        let op = self.operation(location).await?;
        match op.status.as_str() {
          "succeeded" => {
            return Ok(op.analyze_result.map(|r| r.content).unwrap_or_default());
          }
          "failed" => return Err(Error::OcrFailed),
          "notStarted" | "running" => tracing::trace!(status = %op.status, "ocr pending"),
          other => {
            return Err(Error::OcrProtocol {
              status: StatusCode::OK.as_u16(),
              body:   format!("unexpected operation status {other:?}"),
            });
          }
        }
      }
    };

    match timeout(ceiling, polling).await {
      Ok(result) => result,
      Err(_) => Err(Error::OcrTimeout(ceiling)),
    }
  }
}

async fn protocol(res: reqwest::Response) -> Error {
  let status = res.status().as_u16();
  let body = res.text().await.unwrap_or_default();
  Error::OcrProtocol { status, body }
}

#[async_trait]
impl TextExtractor for AzureDocIntel {
  async fn extract_text(&self, bytes: Bytes, mime_type: &str) -> Result<String> {
    let size = bytes.len();
    let location = self.submit(bytes, mime_type).await?;
    tracing::debug!(size, mime_type, "ocr submitted");
    self.poll(&location).await
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
  };
  use serde_json::json;

  use super::*;

  #[derive(Clone, Default)]
  struct Fake {
    polls: Arc<AtomicUsize>,
  }

  async fn analyze(
    headers: HeaderMap,
    Query(query): Query<std::collections::HashMap<String, String>>,
    body: Bytes,
  ) -> Response {
    if headers.get(KEY_HEADER).and_then(|v| v.to_str().ok()) != Some("secret") {
      return (StatusCode::UNAUTHORIZED, "bad key").into_response();
    }
    assert_eq!(query.get("locale").map(String::as_str), Some("pt-BR"));
    assert_eq!(query.get("outputContentFormat").map(String::as_str), Some("markdown"));
    let host = headers
      .get(header::HOST)
      .and_then(|v| v.to_str().ok())
      .unwrap_or_default();
    let op = String::from_utf8_lossy(&body);
    (
      StatusCode::ACCEPTED,
      [(OPERATION_LOCATION, format!("http://{host}/operations/{op}"))],
    )
      .into_response()
  }

  async fn operation(State(fake): State<Fake>, Path(op): Path<String>) -> Response {
    let polls = fake.polls.fetch_add(1, Ordering::SeqCst);
    let status = match op.as_str() {
      "ok" if polls == 0 => "notStarted",
      "ok" if polls == 1 => "running",
      "ok" => "succeeded",
      "failed" => "failed",
      "weird" => "paused",
      "gone" => return (StatusCode::NOT_FOUND, "no such operation").into_response(),
      _ => "running",
    };
    Json(json!({
      "status": status,
      "analyzeResult": { "content": "# Requerimento\n\nTexto" },
    }))
    .into_response()
  }

  async fn extractor(timeout_ms: u64) -> (AzureDocIntel, Fake) {
    let fake = Fake::default();
    let router = Router::new()
      .route(
        "/documentintelligence/documentModels/{model}",
        post(analyze),
      )
      .route("/operations/{op}", get(operation))
      .with_state(fake.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    let mut config = OcrConfig::new(format!("http://{addr}/"), "secret");
    config.poll_interval_ms = 10;
    config.poll_timeout_ms = timeout_ms;
    (AzureDocIntel::new(config), fake)
  }

  async fn extract(ocr: &AzureDocIntel, op: &str) -> Result<String> {
    ocr
      .extract_text(Bytes::from(op.to_owned()), "application/pdf")
      .await
  }

  #[tokio::test]
  async fn polls_until_succeeded() {
    let (ocr, fake) = extractor(5_000).await;
    let text = extract(&ocr, "ok").await.unwrap();
    assert_eq!(text, "# Requerimento\n\nTexto");
    assert_eq!(fake.polls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn zero_poll_interval_still_polls() {
    let (mut ocr, fake) = extractor(5_000).await;
    ocr.config.poll_interval_ms = 0;
    assert_eq!(extract(&ocr, "ok").await.unwrap(), "# Requerimento\n\nTexto");
    assert_eq!(fake.polls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn failed_operation_is_ocr_failed() {
    let (ocr, _) = extractor(5_000).await;
    assert!(matches!(extract(&ocr, "failed").await, Err(Error::OcrFailed)));
  }

  #[tokio::test]
  async fn unknown_status_is_protocol_error() {
    let (ocr, _) = extractor(5_000).await;
    let err = extract(&ocr, "weird").await.unwrap_err();
    assert!(matches!(err, Error::OcrProtocol { status: 200, .. }), "{err}");
  }

  #[tokio::test]
  async fn non_ok_poll_is_protocol_error() {
    let (ocr, _) = extractor(5_000).await;
    let err = extract(&ocr, "gone").await.unwrap_err();
    assert!(matches!(err, Error::OcrProtocol { status: 404, .. }), "{err}");
  }

  #[tokio::test]
  async fn polling_has_a_ceiling() {
    let (ocr, _) = extractor(100).await;
    let err = extract(&ocr, "stuck").await.unwrap_err();
    assert!(matches!(err, Error::OcrTimeout(d) if d == Duration::from_millis(100)));
  }

  #[tokio::test]
  async fn rejected_submit_is_protocol_error() {
    let (mut ocr, _) = extractor(5_000).await;
    ocr.config.api_key = "wrong".into();
    let err = ocr
      .extract_text(Bytes::from_static(b"ok"), "application/pdf")
      .await
      .unwrap_err();
    match err {
      Error::OcrProtocol { status, body } => {
        assert_eq!(status, 401);
        assert_eq!(body, "bad key");
      }
      other => panic!("unexpected {other}"),
    }
  }

  #[test]
  fn config_defaults() {
    let config: OcrConfig =
      serde_json::from_value(json!({ "endpoint": "https://ocr", "api_key": "k" })).unwrap();
    assert_eq!(config.locale, "pt-BR");
    assert_eq!(config.api_version, "2024-11-30");
    assert_eq!(config.poll_interval(), Duration::from_millis(1_500));
    assert_eq!(config.poll_timeout(), Duration::from_secs(120));
  }
}
