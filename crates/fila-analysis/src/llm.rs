//! [`LlmClassifier`]: a [`Classifier`] backed by an OpenAI-compatible
//! chat-completions endpoint constrained to the verdict's JSON schema.

use std::fmt::Write as _;

use async_trait::async_trait;
use fila_cms::DocumentMetadata;
use fila_core::{BoxError, case::Document, classify::Classifier, verdict::Verdict};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::LlmError;

fn default_model() -> String { "gpt-4o-mini".into() }

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
  /// Base URL of the API; `/chat/completions` is appended.
  pub base_url: String,
  pub api_key:  String,
  #[serde(default = "default_model")]
  pub model:    String,
  /// Instructions sent as the system message.
  pub prompt:   String,
}

#[derive(Clone)]
pub struct LlmClassifier {
  config: LlmConfig,
  http:   reqwest::Client,
}

/// Render documents the way the classifier sees them. The output is stable
/// for equal input, so it also serves as a cache key.
pub fn render_documents(documents: &[Document]) -> String {
  let mut out = String::from("<documents>\n");
  for doc in documents {
    let metadata: DocumentMetadata =
      serde_json::from_value(doc.metadata.clone()).unwrap_or_default();
    let _ = writeln!(out, "<document>");
    let _ = writeln!(out, "Type: {}", doc.kind);
    let _ = writeln!(out, "Date: {}", metadata.date);
    let _ = writeln!(out, "Signatures:");
    for signature in &metadata.signatures {
      let _ = writeln!(out, "  - {} ({})", signature.name, signature.id);
    }
    let _ = writeln!(out, "Content:\n{}", doc.text);
    let _ = writeln!(out, "</document>");
  }
  out.push_str("</documents>\n");
  out
}

fn verdict_schema() -> Value {
  json!({
    "type": "object",
    "additionalProperties": false,
    "required": [
      "is_retirement", "requester_id", "request_date", "birth_date",
      "judicial", "invalidity", "diligence_responsible_id"
    ],
    "properties": {
      "is_retirement": {
        "type": "boolean",
        "description": "Whether the case is a complete retirement request"
      },
      "requester_id": {
        "type": "string",
        "description": "National id of the requester, digits only"
      },
      "request_date": {
        "type": "string",
        "description": "Date the requester asked for retirement, YYYY-MM-DD"
      },
      "birth_date": {
        "type": "string",
        "description": "Birth date of the requester, YYYY-MM-DD"
      },
      "judicial": {
        "type": "boolean",
        "description": "Whether the case was opened by a court order"
      },
      "invalidity": {
        "type": "boolean",
        "description": "Whether a medical report supports retirement by invalidity"
      },
      "diligence_responsible_id": {
        "type": ["string", "null"],
        "description": "National id of whoever must answer a pending diligence"
      }
    }
  })
}

#[derive(Deserialize)]
struct Completion {
  choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
  content: Option<String>,
}

impl LlmClassifier {
  pub fn new(config: LlmConfig) -> Self { Self::with_http(config, reqwest::Client::new()) }

  pub fn with_http(config: LlmConfig, http: reqwest::Client) -> Self { Self { config, http } }

  async fn complete(&self, documents: &[Document]) -> Result<Verdict, LlmError> {
    let rendered = render_documents(documents);
    let body = json!({
      "model": self.config.model,
      "messages": [
        { "role": "system", "content": self.config.prompt },
        { "role": "user", "content": rendered },
      ],
      "response_format": {
        "type": "json_schema",
        "json_schema": {
          "name": "retirement_verdict",
          "strict": true,
          "schema": verdict_schema(),
        },
      },
    });

    let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
    let res = self
      .http
      .post(url)
      .bearer_auth(&self.config.api_key)
      .json(&body)
      .send()
      .await?;
    let status = res.status();
    if status != StatusCode::OK {
      let body = res.text().await.unwrap_or_default();
      return Err(LlmError::Status {
        status: status.as_u16(),
        body,
      });
    }

    let completion: Completion = res.json().await?;
    let content = completion
      .choices
      .into_iter()
      .next()
      .and_then(|c| c.message.content)
      .filter(|c| !c.trim().is_empty())
      .ok_or(LlmError::EmptyResponse)?;
    Ok(serde_json::from_str(&content)?)
  }
}

#[async_trait]
impl Classifier for LlmClassifier {
  async fn classify(&self, documents: &[Document]) -> Result<Verdict, BoxError> {
    let verdict = self.complete(documents).await?;
    tracing::debug!(
      documents = documents.len(),
      is_retirement = verdict.is_retirement,
      "classified documents"
    );
    Ok(verdict)
  }
}

#[cfg(test)]
mod tests {
  use axum::{Json, Router, http::HeaderMap, routing::post};
  use chrono::Utc;
  use fila_cms::{Series, Signature};
  use uuid::Uuid;

  use super::*;

  fn document(number: &str, text: &str) -> Document {
    let metadata = DocumentMetadata {
      date: "01/02/2025".into(),
      series: Series {
        id:   "7".into(),
        name: "Requerimento".into(),
      },
      signatures: vec![Signature {
        name: "Fulana".into(),
        id: "12345678900".into(),
        ..Default::default()
      }],
      ..Default::default()
    };
    Document {
      document_id: 1,
      number: number.into(),
      case_id: Uuid::nil(),
      kind: "Requerimento".into(),
      unit: "AP/01".into(),
      access_link: String::new(),
      mime_type: "application/pdf".into(),
      text: text.into(),
      metadata: serde_json::to_value(metadata).unwrap(),
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn renders_type_date_signatures_and_text() {
    let out = render_documents(&[document("1", "Solicito aposentadoria.")]);
    assert!(out.contains("Type: Requerimento\n"));
    assert!(out.contains("Date: 01/02/2025\n"));
    assert!(out.contains("  - Fulana (12345678900)\n"));
    assert!(out.contains("Content:\nSolicito aposentadoria.\n"));
    assert_eq!(out, render_documents(&[document("1", "Solicito aposentadoria.")]));
  }

  async fn completions(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(
      headers.get("authorization").and_then(|v| v.to_str().ok()),
      Some("Bearer key")
    );
    assert_eq!(body["response_format"]["type"], "json_schema");
    assert_eq!(body["messages"][0]["content"], "classify");
    let user = body["messages"][1]["content"].as_str().unwrap_or_default();
    let is_retirement = user.contains("aposentadoria");
    let verdict = json!({
      "is_retirement": is_retirement,
      "requester_id": "12345678900",
      "request_date": "2025-01-01",
      "birth_date": "1955-01-01",
      "judicial": false,
      "invalidity": true,
      "diligence_responsible_id": null,
    });
    Json(json!({
      "choices": [{ "message": { "role": "assistant", "content": verdict.to_string() } }]
    }))
  }

  #[tokio::test]
  async fn parses_structured_verdict() {
    let router = Router::new().route("/v1/chat/completions", post(completions));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    let llm = LlmClassifier::new(LlmConfig {
      base_url: format!("http://{addr}/v1/"),
      api_key:  "key".into(),
      model:    default_model(),
      prompt:   "classify".into(),
    });

    let verdict = llm
      .classify(&[document("1", "Solicito aposentadoria.")])
      .await
      .unwrap();
    assert!(verdict.is_retirement);
    assert_eq!(verdict.birth_date, "1955-01-01");
    assert_eq!(verdict.diligence_responsible_id, None);

    let verdict = llm.classify(&[document("2", "Férias.")]).await.unwrap();
    assert!(!verdict.is_retirement);
  }
}
