//! Values returned by the CMS.

use bytes::Bytes;
use fila_core::case::Unit;
use serde::{Deserialize, Serialize};

/// Where a case lives in the CMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseInfo {
  pub access_link: String,
  /// The unit that opened the case.
  pub unit:        Unit,
}

/// One row of the document table on a case's access page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRow {
  pub number: String,
  pub link:   String,
  pub kind:   String,
  pub date:   String,
  pub unit:   String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
  pub id:   String,
  pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuingUnit {
  pub id:           String,
  pub abbreviation: String,
  pub description:  String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
  pub name:      String,
  pub role:      String,
  pub signed_at: String,
  /// The signer's national id.
  pub id:        String,
}

/// Everything the CMS reports about one document. Stored verbatim as the
/// document's metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
  pub document_id:  String,
  pub formatted_id: String,
  pub case_number:  String,
  pub series:       Series,
  /// The document's own number within its series; often empty.
  pub number:       String,
  pub date:         String,
  pub description:  String,
  pub access_link:  String,
  pub issuing_unit: IssuingUnit,
  pub signatures:   Vec<Signature>,
}

impl DocumentMetadata {
  /// Series name, followed by the document's number when it has one.
  pub fn kind(&self) -> String {
    if self.number.is_empty() {
      self.series.name.clone()
    } else {
      format!("{} {}", self.series.name, self.number)
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitInfo {
  pub id:           String,
  pub abbreviation: String,
  pub description:  String,
}

/// A downloaded document body.
#[derive(Debug, Clone)]
pub struct Download {
  pub bytes:        Bytes,
  pub content_type: String,
}
