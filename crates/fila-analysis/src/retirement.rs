//! Retirement cases: the hook that materialises them from a positive verdict
//! and the queries over them.

use async_trait::async_trait;
use fila_core::{
  Error, Result,
  case::{Case, Document},
  hook::AnalyzeHook,
  retirement::{NewRetirementCase, NewStatusHistory, RetirementCase, RetirementStatus, StatusHistory},
  score::score,
  store::{CaseRecords, CaseStore, CaseTx},
  verdict::Verdict,
};

// ─── Hook ────────────────────────────────────────────────────────────────────

/// Creates the retirement case and its seed history row when a case is
/// classified as a retirement request. Running it again for a case that
/// already has one is a no-op, whatever that case's status.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetirementHook;

#[async_trait]
impl<Tx: CaseRecords + 'static> AnalyzeHook<Tx> for RetirementHook {
  fn name(&self) -> &'static str { "retirement" }

  async fn on_analyze_complete(
    &self,
    tx: &Tx,
    case: &Case,
    _documents: &[Document],
  ) -> Result<()> {
    match tx.get_retirement_case_by_case_number(&case.number).await {
      Ok(existing) => {
        tracing::debug!(
          case_id = %case.case_id,
          retirement_id = existing.retirement_id,
          status = %existing.status,
          "retirement case already exists"
        );
        return Ok(());
      }
      Err(e) if e.is_not_found() => {}
      Err(e) => return Err(e),
    }

    let metadata = case
      .classifier_metadata
      .clone()
      .ok_or(Error::MissingVerdict(case.case_id))?;
    let verdict: Verdict = serde_json::from_value(metadata)?;
    if !verdict.is_retirement {
      return Ok(());
    }

    let birth_date = verdict.birth_date()?;
    let request_date = verdict.request_date()?;
    let status = RetirementStatus::AnalysisPending;

    let saved = tx
      .save_retirement_case(NewRetirementCase {
        case_id: case.case_id,
        requester_id: verdict.requester_id,
        birth_date,
        request_date,
        invalidity: verdict.invalidity,
        judicial: verdict.judicial,
        priority: false,
        score: score(birth_date, verdict.invalidity),
        status,
        analyst_id: None,
        last_analyst_id: None,
      })
      .await;
    let retirement = match saved {
      Ok(retirement) => retirement,
      Err(Error::RetirementCaseExists(_)) => return Ok(()),
      Err(e) => return Err(e),
    };

    tx.save_status_history(NewStatusHistory::seed(retirement.retirement_id, status))
      .await?;

    tracing::info!(
      case_id = %case.case_id,
      retirement_id = retirement.retirement_id,
      score = retirement.score,
      "retirement case created"
    );
    Ok(())
  }
}

// ─── Queries ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RetirementService<S> {
  store: S,
}

impl<S: CaseStore> RetirementService<S> {
  pub fn new(store: S) -> Self { Self { store } }

  pub async fn get_by_case_number(&self, number: &str) -> Result<RetirementCase> {
    self.store.get_retirement_case_by_case_number(number).await
  }

  /// History of the retirement case of case `number`, oldest first.
  pub async fn list_history(&self, number: &str) -> Result<Vec<StatusHistory>> {
    let retirement = self.store.get_retirement_case_by_case_number(number).await?;
    self
      .store
      .list_status_history(retirement.retirement_id)
      .await
  }

  /// Move a retirement case to `new_status`, appending the matching history
  /// row in the same transaction.
  pub async fn change_status(
    &self,
    retirement_id: i64,
    new_status: RetirementStatus,
    user_id: Option<i64>,
    note: Option<String>,
  ) -> Result<RetirementCase> {
    let tx = self.store.begin().await?;
    let mut retirement = tx.get_retirement_case(retirement_id).await?;
    let history = retirement.transition(new_status, user_id, note);
    tx.update_retirement_case(&mut retirement).await?;
    tx.save_status_history(history).await?;
    tx.commit().await?;

    tracing::info!(retirement_id, status = %new_status, "retirement status changed");
    Ok(retirement)
  }
}
