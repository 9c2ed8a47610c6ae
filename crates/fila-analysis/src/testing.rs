//! In-memory collaborators for the pipeline's tests.

use std::{
  collections::{HashMap, HashSet},
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use fila_cms::{
  CaseInfo, Cms, DocumentMetadata, DocumentRow, Download, IssuingUnit, RemoteFault, Series,
  UnitInfo,
};
use fila_core::{BoxError, case::Document, case::Unit, classify::Classifier, verdict::Verdict};
use fila_ocr::TextExtractor;

// ─── CMS ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeCms {
  cases:          HashMap<String, (CaseInfo, Vec<DocumentRow>)>,
  documents:      HashMap<String, (DocumentMetadata, String)>,
  faults:         HashSet<String>,
  broken:         HashSet<String>,
  pub list_calls: AtomicUsize,
}

fn link(number: &str) -> String { format!("fake://documents/{number}") }

impl FakeCms {
  pub fn new() -> Self { Self::default() }

  /// A case at unit `100 AP/01` listing `documents` in order.
  pub fn with_case(mut self, number: &str, documents: &[&str]) -> Self {
    let info = CaseInfo {
      access_link: format!("fake://cases/{number}"),
      unit:        Unit {
        id:           "100".into(),
        abbreviation: "AP/01".into(),
      },
    };
    let rows = documents
      .iter()
      .map(|n| DocumentRow {
        number: n.to_string(),
        link:   link(n),
        kind:   "Requerimento".into(),
        date:   "01/02/2025".into(),
        unit:   "AP/01".into(),
      })
      .collect();
    self.cases.insert(number.to_owned(), (info, rows));
    self
  }

  pub fn with_document(mut self, number: &str, text: &str) -> Self {
    let metadata = DocumentMetadata {
      formatted_id: number.to_owned(),
      series: Series {
        id:   "7".into(),
        name: "Requerimento".into(),
      },
      date: "01/02/2025".into(),
      access_link: link(number),
      issuing_unit: IssuingUnit {
        id:           "100".into(),
        abbreviation: "AP/01".into(),
        description:  "Aposentadoria".into(),
      },
      ..Default::default()
    };
    self.documents.insert(number.to_owned(), (metadata, text.to_owned()));
    self
  }

  pub fn with_fault(mut self, number: &str) -> Self {
    self.faults.insert(number.to_owned());
    self
  }

  pub fn with_broken_download(mut self, number: &str) -> Self {
    self = self.with_document(number, "");
    self.broken.insert(number.to_owned());
    self
  }
}

fn fault(message: &str) -> fila_cms::Error {
  fila_cms::Error::Fault(RemoteFault {
    status:  500,
    code:    "Server".into(),
    message: message.into(),
    detail:  Vec::new(),
  })
}

#[async_trait]
impl Cms for FakeCms {
  async fn resolve_case(&self, number: &str) -> fila_cms::Result<CaseInfo> {
    self
      .cases
      .get(number)
      .map(|(info, _)| info.clone())
      .ok_or_else(|| fault("Processo não encontrado."))
  }

  async fn list_documents(&self, access_link: &str) -> fila_cms::Result<Vec<DocumentRow>> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    self
      .cases
      .values()
      .find(|(info, _)| info.access_link == access_link)
      .map(|(_, rows)| rows.clone())
      .ok_or_else(|| fila_cms::Error::Status {
        status: 404,
        body:   access_link.to_owned(),
      })
  }

  async fn fetch_document_metadata(&self, number: &str) -> fila_cms::Result<DocumentMetadata> {
    if self.faults.contains(number) {
      return Err(fault("Documento cancelado."));
    }
    self
      .documents
      .get(number)
      .map(|(metadata, _)| metadata.clone())
      .ok_or_else(|| fault("Documento não encontrado."))
  }

  async fn list_units(&self) -> fila_cms::Result<Vec<UnitInfo>> {
    Ok(vec![UnitInfo {
      id:           "100".into(),
      abbreviation: "AP/01".into(),
      description:  "Aposentadoria".into(),
    }])
  }

  async fn download(&self, link: &str) -> fila_cms::Result<Download> {
    let number = link.trim_start_matches("fake://documents/");
    match self.documents.get(number) {
      Some((_, text)) if !self.broken.contains(number) => Ok(Download {
        bytes:        text.clone().into_bytes().into(),
        content_type: "application/pdf".into(),
      }),
      _ => Err(fila_cms::Error::Status {
        status: 404,
        body:   "not found".into(),
      }),
    }
  }
}

// ─── OCR ─────────────────────────────────────────────────────────────────────

/// Returns the downloaded bytes as text.
#[derive(Default)]
pub struct FakeOcr {
  delay:     Option<Duration>,
  fail:      bool,
  in_flight: Arc<AtomicUsize>,
  pub peak:  Arc<AtomicUsize>,
  pub calls: Arc<AtomicUsize>,
}

impl FakeOcr {
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn failing(mut self) -> Self {
    self.fail = true;
    self
  }
}

#[async_trait]
impl TextExtractor for FakeOcr {
  async fn extract_text(&self, bytes: bytes::Bytes, _mime_type: &str) -> fila_ocr::Result<String> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    self.in_flight.fetch_sub(1, Ordering::SeqCst);
    if self.fail {
      return Err(fila_ocr::Error::OcrFailed);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
  }
}

// ─── Classifier ──────────────────────────────────────────────────────────────

pub fn positive_verdict() -> Verdict {
  Verdict {
    is_retirement:            true,
    requester_id:             "12345678900".into(),
    request_date:             "2025-01-01".into(),
    birth_date:               "1955-01-01".into(),
    judicial:                 false,
    invalidity:               true,
    diligence_responsible_id: None,
  }
}

pub fn negative_verdict() -> Verdict {
  Verdict {
    is_retirement:            false,
    requester_id:             String::new(),
    request_date:             String::new(),
    birth_date:               String::new(),
    judicial:                 false,
    invalidity:               false,
    diligence_responsible_id: None,
  }
}

/// Answers with a fixed verdict and records what it was shown.
pub struct FakeClassifier {
  verdict:  Mutex<Result<Verdict, String>>,
  pub seen: Mutex<Vec<Vec<String>>>,
}

impl FakeClassifier {
  pub fn answering(verdict: Verdict) -> Self {
    Self {
      verdict: Mutex::new(Ok(verdict)),
      seen:    Mutex::default(),
    }
  }

  pub fn failing(message: &str) -> Self {
    Self {
      verdict: Mutex::new(Err(message.to_owned())),
      seen:    Mutex::default(),
    }
  }

  pub fn answer(&self, verdict: Verdict) { *self.verdict.lock().unwrap() = Ok(verdict); }

  pub fn calls(&self) -> usize { self.seen.lock().unwrap().len() }
}

#[async_trait]
impl Classifier for FakeClassifier {
  async fn classify(&self, documents: &[Document]) -> Result<Verdict, BoxError> {
    self
      .seen
      .lock()
      .unwrap()
      .push(documents.iter().map(|d| d.number.clone()).collect());
    self.verdict.lock().unwrap().clone().map_err(Into::into)
  }
}
