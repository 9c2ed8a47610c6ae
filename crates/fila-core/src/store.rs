//! The `CaseStore` trait and its transaction handle.
//!
//! Storage backends (e.g. `fila-store-sqlite`) implement these. The analysis
//! service, the hooks and the HTTP edge depend on this abstraction, not on a
//! concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  Result,
  case::{Case, Document, NewCase, NewDocument},
  retirement::{NewRetirementCase, NewStatusHistory, RetirementCase, StatusHistory},
};

// ─── Records ─────────────────────────────────────────────────────────────────

/// Every persistent operation of the pipeline.
///
/// Implemented both by the store itself (each call is its own unit of work)
/// and by its transaction handle (each call joins the open transaction), so
/// code written against `CaseRecords` runs unchanged in either context.
///
/// Lookups fail with [`Error::NotFound`](crate::Error::NotFound). Unique
/// violations surface as the matching sentinel
/// ([`CaseNumberTaken`](crate::Error::CaseNumberTaken),
/// [`DocumentNumberTaken`](crate::Error::DocumentNumberTaken),
/// [`RetirementCaseExists`](crate::Error::RetirementCaseExists)).
pub trait CaseRecords: Send + Sync {
  // ── Cases ─────────────────────────────────────────────────────────────

  /// Persist a new case in `PENDING`. Identity and timestamps are assigned by
  /// the store.
  fn save_case(
    &self,
    input: NewCase,
  ) -> impl Future<Output = Result<Case>> + Send + '_;

  fn get_case(&self, case_id: Uuid) -> impl Future<Output = Result<Case>> + Send + '_;

  fn get_case_by_number<'a>(
    &'a self,
    number: &'a str,
  ) -> impl Future<Output = Result<Case>> + Send + 'a;

  /// Write every mutable column of `case` and refresh its `updated_at`.
  fn update_case<'a>(
    &'a self,
    case: &'a mut Case,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  // ── Documents ─────────────────────────────────────────────────────────

  fn save_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Document>> + Send + '_;

  fn get_document_by_number<'a>(
    &'a self,
    number: &'a str,
  ) -> impl Future<Output = Result<Document>> + Send + 'a;

  /// All documents of a case in insertion order.
  fn list_documents(
    &self,
    case_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Document>>> + Send + '_;

  // ── Retirement cases ──────────────────────────────────────────────────

  fn save_retirement_case(
    &self,
    input: NewRetirementCase,
  ) -> impl Future<Output = Result<RetirementCase>> + Send + '_;

  fn get_retirement_case(
    &self,
    retirement_id: i64,
  ) -> impl Future<Output = Result<RetirementCase>> + Send + '_;

  /// Look up a retirement case by the external number of its parent case.
  fn get_retirement_case_by_case_number<'a>(
    &'a self,
    number: &'a str,
  ) -> impl Future<Output = Result<RetirementCase>> + Send + 'a;

  fn update_retirement_case<'a>(
    &'a self,
    retirement: &'a mut RetirementCase,
  ) -> impl Future<Output = Result<()>> + Send + 'a;

  // ── Status history (append-only) ─────────────────────────────────────

  fn save_status_history(
    &self,
    input: NewStatusHistory,
  ) -> impl Future<Output = Result<StatusHistory>> + Send + '_;

  /// History of a retirement case, oldest first.
  fn list_status_history(
    &self,
    retirement_id: i64,
  ) -> impl Future<Output = Result<Vec<StatusHistory>>> + Send + '_;
}

// ─── Store and transactions ──────────────────────────────────────────────────

/// A [`CaseRecords`] backend that can open transactions.
pub trait CaseStore: CaseRecords + Clone + 'static {
  type Tx: CaseTx;

  /// Open a transaction. Dropping the handle without committing rolls it
  /// back.
  fn begin(&self) -> impl Future<Output = Result<Self::Tx>> + Send + '_;
}

/// An open transaction. Every [`CaseRecords`] call made through it belongs to
/// the transaction.
pub trait CaseTx: CaseRecords + 'static {
  fn commit(self) -> impl Future<Output = Result<()>> + Send;

  fn rollback(self) -> impl Future<Output = Result<()>> + Send;
}
