use std::sync::Arc;

use async_trait::async_trait;
use axum::{
  body::{Body, Bytes, to_bytes},
  http::{Request, StatusCode, header},
  response::Response,
};
use chrono::NaiveDate;
use fila_analysis::{AnalysisService, DataLake, DataLakeService, OpenCase, RetirementService};
use fila_cms::{CaseInfo, Cms, DocumentMetadata, DocumentRow, Download, RemoteFault, UnitInfo};
use fila_core::{
  BoxError,
  case::{Document, Unit},
  classify::Classifier,
  retirement::{NewRetirementCase, NewStatusHistory, RetirementStatus},
  store::CaseRecords,
  verdict::Verdict,
};
use fila_store_sqlite::{SqliteQueue, SqliteStore};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use super::*;

/// Knows every case number starting with `1500`; nothing else.
struct StubCms;

fn unsupported() -> fila_cms::Error { fila_cms::Error::Malformed("not stubbed".into()) }

#[async_trait]
impl Cms for StubCms {
  async fn resolve_case(&self, number: &str) -> fila_cms::Result<CaseInfo> {
    if !number.starts_with("1500") {
      return Err(fila_cms::Error::Fault(RemoteFault {
        status:  500,
        code:    "Server".into(),
        message: "Processo não encontrado.".into(),
        detail:  Vec::new(),
      }));
    }
    Ok(CaseInfo {
      access_link: format!("https://sei.example/acesso?p={number}"),
      unit:        Unit {
        id:           "100".into(),
        abbreviation: "AP/01".into(),
      },
    })
  }

  async fn list_documents(&self, _access_link: &str) -> fila_cms::Result<Vec<DocumentRow>> {
    Err(unsupported())
  }

  async fn fetch_document_metadata(&self, _number: &str) -> fila_cms::Result<DocumentMetadata> {
    Err(unsupported())
  }

  async fn list_units(&self) -> fila_cms::Result<Vec<UnitInfo>> {
    Ok(vec![UnitInfo {
      id:           "100".into(),
      abbreviation: "AP/01".into(),
      description:  "Aposentadoria".into(),
    }])
  }

  async fn download(&self, _link: &str) -> fila_cms::Result<Download> { Err(unsupported()) }
}

struct NoOcr;

#[async_trait]
impl fila_ocr::TextExtractor for NoOcr {
  async fn extract_text(&self, _bytes: Bytes, _mime: &str) -> fila_ocr::Result<String> {
    Err(fila_ocr::Error::OcrFailed)
  }
}

struct NoClassifier;

#[async_trait]
impl Classifier for NoClassifier {
  async fn classify(&self, _documents: &[Document]) -> Result<Verdict, BoxError> {
    Err("not stubbed".into())
  }
}

/// Two units; one of them holds a single open case.
struct StubLake;

#[async_trait]
impl DataLake for StubLake {
  async fn list_open_cases(&self, unit: &str) -> Result<Vec<OpenCase>, BoxError> {
    if unit != "AP/01" {
      return Ok(Vec::new());
    }
    Ok(vec![OpenCase {
      number:      "15000009".into(),
      unit:        unit.to_owned(),
      received_at: "2025-03-01T12:00:00Z".parse().unwrap(),
      origin:      Unit {
        id:           "200".into(),
        abbreviation: "PROT".into(),
      },
    }])
  }

  async fn list_units(&self) -> Result<Vec<String>, BoxError> {
    Ok(vec!["AP/01".into(), "AP/02".into()])
  }
}

async fn app() -> (Router, SqliteStore) { app_with_lake(None).await }

async fn app_with_lake(lake: Option<Arc<dyn DataLake>>) -> (Router, SqliteStore) {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let cms: Arc<dyn Cms> = Arc::new(StubCms);
  let analysis: AnalysisService<SqliteStore, SqliteQueue> = AnalysisService::new(
    store.clone(),
    store.queue(),
    cms.clone(),
    Arc::new(NoOcr),
    Arc::new(NoClassifier),
  );
  let state = AppState {
    analysis: Arc::new(analysis),
    retirements: RetirementService::new(store.clone()),
    cms,
    datalake: lake.map(|lake| Arc::new(DataLakeService::new(lake, store.cache()))),
  };
  (router(state), store)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  let body = match body {
    Some(json) => {
      builder = builder.header(header::CONTENT_TYPE, "application/json");
      Body::from(json.to_string())
    }
    None => Body::empty(),
  };
  let resp: Response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
  let status = resp.status();
  let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
  (status, json)
}

// ── Cases ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_case_then_read_it() {
  let (app, _) = app().await;

  let (status, created) = send(&app, "POST", "/cases", Some(json!({ "number": " 15000001 " }))).await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(created["number"], "15000001");
  assert_eq!(created["status"], "PENDING");
  assert_eq!(created["unit"]["abbreviation"], "AP/01");

  let id = created["case_id"].as_str().unwrap();
  let (status, fetched) = send(&app, "GET", &format!("/cases/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(fetched, created);

  let (status, docs) = send(&app, "GET", &format!("/cases/{id}/documents"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(docs, json!([]));
}

#[tokio::test]
async fn duplicate_case_is_conflict() {
  let (app, _) = app().await;
  send(&app, "POST", "/cases", Some(json!({ "number": "15000002" }))).await;
  let (status, body) = send(&app, "POST", "/cases", Some(json!({ "number": "15000002" }))).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert!(body["error"].as_str().unwrap().contains("15000002"));
}

#[tokio::test]
async fn blank_number_is_bad_request() {
  let (app, _) = app().await;
  let (status, body) = send(&app, "POST", "/cases", Some(json!({ "number": "   " }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
}

#[tokio::test]
async fn unknown_cms_case_is_server_error() {
  let (app, store) = app().await;
  let (status, _) = send(&app, "POST", "/cases", Some(json!({ "number": "9999" }))).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert!(store.get_case_by_number("9999").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn missing_case_is_not_found() {
  let (app, _) = app().await;
  let id = uuid::Uuid::new_v4();
  for uri in [format!("/cases/{id}"), format!("/cases/{id}/documents")] {
    let (status, body) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    assert!(body["error"].is_string());
  }
  let (status, _) = send(&app, "POST", &format!("/cases/{id}/analyze"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn analyze_reports_whether_a_job_was_enqueued() {
  let (app, _) = app().await;
  let (_, created) = send(&app, "POST", "/cases", Some(json!({ "number": "15000003" }))).await;
  let id = created["case_id"].as_str().unwrap();

  let (status, body) = send(&app, "POST", &format!("/cases/{id}/analyze"), None).await;
  assert_eq!(status, StatusCode::ACCEPTED);
  assert_eq!(body, json!({ "enqueued": false }));
}

// ── Retirement cases ───────────────────────────────────────────────────────────

#[tokio::test]
async fn retirement_case_and_history() {
  let (app, store) = app().await;
  let (_, created) = send(&app, "POST", "/cases", Some(json!({ "number": "15000004" }))).await;
  let case_id = created["case_id"].as_str().unwrap().parse().unwrap();

  let (status, _) = send(&app, "GET", "/retirement-cases/15000004", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let retirement = store
    .save_retirement_case(NewRetirementCase {
      case_id,
      requester_id: "12345678900".into(),
      birth_date: NaiveDate::from_ymd_opt(1955, 1, 1).unwrap(),
      request_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
      invalidity: true,
      judicial: false,
      priority: false,
      score: 3,
      status: RetirementStatus::AnalysisPending,
      analyst_id: None,
      last_analyst_id: None,
    })
    .await
    .unwrap();
  store
    .save_status_history(NewStatusHistory::seed(
      retirement.retirement_id,
      RetirementStatus::AnalysisPending,
    ))
    .await
    .unwrap();

  let (status, body) = send(&app, "GET", "/retirement-cases/15000004", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "ANALYSIS_PENDING");
  assert_eq!(body["score"], 3);

  let (status, body) = send(&app, "GET", "/retirement-cases/15000004/history", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body.as_array().unwrap().len(), 1);
  assert_eq!(body[0]["previous_status"], Value::Null);
  assert_eq!(body[0]["new_status"], "ANALYSIS_PENDING");
}

#[tokio::test]
async fn lists_units() {
  let (app, _) = app().await;
  let (status, body) = send(&app, "GET", "/units", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body[0]["abbreviation"], "AP/01");
}

// ── Data lake ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn datalake_lookups_go_through_the_service() {
  let (app, _) = app_with_lake(Some(Arc::new(StubLake))).await;

  let (status, units) = send(&app, "GET", "/datalake/units", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(units, json!(["AP/01", "AP/02"]));

  let (status, cases) = send(&app, "GET", "/datalake/open-cases?unit=AP%2F01", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(cases.as_array().unwrap().len(), 1);
  assert_eq!(cases[0]["number"], "15000009");
  assert_eq!(cases[0]["origin"]["abbreviation"], "PROT");

  let (status, _) = send(&app, "GET", "/datalake/open-cases?unit=%20", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn datalake_without_backend_is_unavailable() {
  let (app, _) = app().await;
  let (status, body) = send(&app, "GET", "/datalake/units", None).await;
  assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
  assert!(body["error"].as_str().unwrap().contains("data lake"));
}
