use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tal_crypto::VerificationReport;
use tal_ledger::{
    AppendPipeline, DiscrepancyMonitor, DiscrepancyView, EntryFilter, InboxItem, LedgerReader,
    LedgerStore, LedgerSummary, LedgerValidator, NotificationInbox,
};
use tal_types::{Discrepancy, EntryId, EntryKind, LedgerEntry, TransactionEvent};

use crate::error::{ServerError, ServerResult};

/// Shared state for all handlers.
pub struct AppState {
    pub pipeline: AppendPipeline<dyn LedgerStore>,
    pub validator: LedgerValidator,
    pub inbox: Arc<NotificationInbox>,
    /// Flags simulated sales; HTTP appends are never rolled.
    pub discrepancies: Arc<DiscrepancyMonitor>,
    pub maintenance_mode: bool,
}

impl AppState {
    fn store(&self) -> &dyn LedgerStore {
        self.pipeline.store().as_ref()
    }
}

pub type SharedState = Arc<AppState>;

/// Health check handler.
pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Query parameters for `GET /v1/ledger`.
#[derive(Debug, Default, Deserialize)]
pub struct LedgerQuery {
    pub kind: Option<String>,
    pub actor: Option<String>,
    pub subject: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl LedgerQuery {
    fn into_filter(self) -> ServerResult<EntryFilter> {
        let kind = self
            .kind
            .filter(|k| !k.is_empty())
            .map(|k| k.parse::<EntryKind>())
            .transpose()
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;
        Ok(EntryFilter {
            kind,
            actor_id: self.actor.filter(|a| !a.is_empty()),
            subject_id: self.subject.filter(|s| !s.is_empty()),
            from: self.from,
            to: self.to,
        })
    }
}

/// Entries newest first, optionally filtered.
pub async fn list_entries(
    State(state): State<SharedState>,
    Query(query): Query<LedgerQuery>,
) -> ServerResult<Json<Vec<LedgerEntry>>> {
    let filter = query.into_filter()?;
    Ok(Json(filter.apply(state.store())?))
}

pub async fn append_entry(
    State(state): State<SharedState>,
    Json(event): Json<TransactionEvent>,
) -> ServerResult<(StatusCode, Json<LedgerEntry>)> {
    if state.maintenance_mode {
        return Err(ServerError::Maintenance);
    }
    let submitted = state.pipeline.submit(&event)?;
    Ok((StatusCode::CREATED, Json(submitted.entry)))
}

pub async fn get_entry(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ServerResult<Json<LedgerEntry>> {
    state
        .store()
        .get(&EntryId::new(id.clone()))?
        .map(Json)
        .ok_or(ServerError::NotFound(id))
}

pub async fn entries_by_subject(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> ServerResult<Json<Vec<LedgerEntry>>> {
    Ok(Json(state.store().by_subject(&subject_id)?))
}

/// Always 200: a broken chain is a report, not a failure.
pub async fn verify_ledger(State(state): State<SharedState>) -> ServerResult<Json<VerificationReport>> {
    Ok(Json(state.validator.verify(state.store())?))
}

pub async fn ledger_summary(State(state): State<SharedState>) -> ServerResult<Json<LedgerSummary>> {
    Ok(Json(LedgerSummary::of(state.store())?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationsResponse {
    pub unread_count: usize,
    pub items: Vec<InboxItem>,
}

pub async fn list_notifications(State(state): State<SharedState>) -> ServerResult<Json<NotificationsResponse>> {
    Ok(Json(NotificationsResponse {
        unread_count: state.inbox.unread_count()?,
        items: state.inbox.items()?,
    }))
}

pub async fn mark_notifications_read(State(state): State<SharedState>) -> ServerResult<StatusCode> {
    state.inbox.mark_all_read()?;
    Ok(StatusCode::NO_CONTENT)
}

/// Flagged discrepancies, newest first.
pub async fn list_discrepancies(State(state): State<SharedState>) -> ServerResult<Json<Vec<Discrepancy>>> {
    Ok(Json(state.discrepancies.all()?))
}

/// One discrepancy with its entry and that entry's subject history.
pub async fn get_discrepancy(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ServerResult<Json<DiscrepancyView>> {
    let discrepancy = state
        .discrepancies
        .get(&id)?
        .ok_or(ServerError::NotFound(id))?;
    Ok(Json(DiscrepancyView::load(state.store(), discrepancy)?))
}
