//! HTTP dispatch surface: a single entry point that routes by
//! path to an operation handler. Every operation accepts a JSON body and
//! returns a JSON body; unknown paths 404; validation/not-found/uniqueness
//!/system errors all surface as `500 {"error": "..."}` per spec §6/§7 —
//! the actor layer already distinguishes the four error kinds via
//! [`crate::error::ErrorKind`], so this layer just serializes whichever
//! one comes back rather than re-deriving the distinction.
//!
//! Routing is axum's `Router`, following the same request/response-JSON
//! shape as decapod's `core::rpc` envelope, but flattened: this crate has
//! no mandate/capsule/proof ceremony to carry, so a request is just its
//! typed body and a response is just its typed result.
//!
//! Per spec §9 ("async in source vs. target"): provider-delta application
//! and every other actor operation is synchronous with respect to the
//! actor's logical thread. The only real suspension points are the
//! outbound queue send, the registry statement, and the blob-store cycle
//! inside the deletion workflow — all three already return plain
//! `Result`s here rather than futures, so handlers call them inline
//! without `.await`.

use crate::actor::ActorRegistry;
use crate::availability::analytics::{
    cognitive_load, context_switch_report, deep_work_report, probabilistic_availability, risk_scores,
};
use crate::availability::compute_availability;
use crate::blob_store::BlobStore;
use crate::commitment::{self, NewCommitment};
use crate::constraint::{self, validate_config};
use crate::deletion::{self, DeletionOutcome};
use crate::error::{ErrorKind, TminusError};
use crate::ics_upgrade::{self, IcsUpgradeRequest};
use crate::model::commitment::CommitmentWindow;
use crate::model::constraint::ConstraintKind;
use crate::model::event::{CanonicalEvent, DeltaKind, EventFieldPatch};
use crate::model::relationship::{InteractionOutcome, RelationshipCategory};
use crate::queue::OutboundQueue;
use crate::relationship;
use crate::relationship::crud::{NewRelationship, RelationshipPatch};
use crate::store::{self, EventFilter, ProviderDelta};
use crate::time;
use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Everything a dispatch handler needs: the per-user actor registry plus
/// the three external collaborators the deletion workflow crosses.
#[derive(Clone)]
pub struct AppState {
    pub actors: ActorRegistry,
    pub registry_conn: Arc<Mutex<Connection>>,
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn OutboundQueue>,
    pub master_key: Arc<Vec<u8>>,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        // Spec §6 only pins validation errors to 500; not-found is a
        // normal return value and never reaches this path (handlers map
        // `Ok(None)` to a 200 JSON `null`), so every error kind that does
        // reach here is surface-and-abort per spec §7.
        ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Uniqueness | ErrorKind::System => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

struct ApiError(TminusError);

impl From<TminusError> for ApiError {
    fn from(e: TminusError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.0.kind());
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn run_actor<F, R>(state: &AppState, user_id: &str, f: F) -> Result<R, ApiError>
where
    F: FnOnce(&mut Connection) -> Result<R, TminusError>,
{
    Ok(state.actors.with_user_conn(user_id, f)?)
}

// ===== Canonical store & authority/conflict =====

#[derive(Deserialize)]
struct ApplyProviderDeltaRequest {
    user_id: String,
    origin_account_id: String,
    origin_event_id: String,
    kind: String,
    fields: EventFieldPatch,
}

async fn apply_provider_delta(State(state): State<AppState>, Json(req): Json<ApplyProviderDeltaRequest>) -> ApiResult<Value> {
    let kind = match req.kind.as_str() {
        "created" => DeltaKind::Created,
        "updated" => DeltaKind::Updated,
        "deleted" => DeltaKind::Deleted,
        "cancelled" => DeltaKind::Cancelled,
        other => return Err(TminusError::Validation(format!("unknown delta kind '{other}'")).into()),
    };
    let actor = crate::model::event::provider_authority(&req.origin_account_id);
    let outcome = run_actor(&state, &req.user_id, move |conn| {
        store::apply_provider_delta(
            conn,
            &ProviderDelta {
                origin_account_id: req.origin_account_id,
                origin_event_id: req.origin_event_id,
                kind,
                fields: req.fields,
            },
            &actor,
        )
    })?;
    Ok(Json(json!({ "event": outcome.event, "journal_entries": outcome.journal_entries })))
}

#[derive(Deserialize)]
struct UserScoped {
    user_id: String,
}

async fn get_canonical_event(
    State(state): State<AppState>,
    AxumPath(canonical_event_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Option<CanonicalEvent>> {
    let event = run_actor(&state, &req.user_id, |conn| store::get_event(conn, &canonical_event_id))?;
    Ok(Json(event))
}

#[derive(Deserialize, Default)]
struct ListCanonicalEventsRequest {
    user_id: String,
    account_id: Option<String>,
    window_start: Option<String>,
    window_end: Option<String>,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    100
}

async fn list_canonical_events(State(state): State<AppState>, Json(req): Json<ListCanonicalEventsRequest>) -> ApiResult<Vec<CanonicalEvent>> {
    let filter = EventFilter {
        account_id: req.account_id,
        window_start: req.window_start,
        window_end: req.window_end,
        limit: req.limit,
        offset: req.offset,
    };
    let events = run_actor(&state, &req.user_id, move |conn| store::list_events(conn, &filter))?;
    Ok(Json(events))
}

async fn get_account_events(State(state): State<AppState>, Json(mut req): Json<ListCanonicalEventsRequest>) -> ApiResult<Vec<CanonicalEvent>> {
    if req.account_id.is_none() {
        return Err(TminusError::Validation("account_id is required".to_string()).into());
    }
    req.limit = if req.limit == 0 { default_limit() } else { req.limit };
    list_canonical_events(State(state), Json(req)).await
}

async fn query_journal(
    State(state): State<AppState>,
    AxumPath(canonical_event_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let entries = run_actor(&state, &req.user_id, |conn| {
        crate::store::journal_query::query_journal(conn, &canonical_event_id)
    })?;
    Ok(Json(json!(entries)))
}

async fn get_event_conflicts(
    State(state): State<AppState>,
    AxumPath(canonical_event_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let entries = run_actor(&state, &req.user_id, |conn| {
        crate::store::journal_query::get_event_conflicts(conn, &canonical_event_id)
    })?;
    Ok(Json(json!(entries)))
}

/// Structured facts about one event for the AI briefing collaborator
/// — no prose generation happens here, only the data
/// contract that collaborator consumes.
async fn get_event_briefing(
    State(state): State<AppState>,
    AxumPath(canonical_event_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let briefing = run_actor(&state, &req.user_id, |conn| {
        let event = store::get_event(conn, &canonical_event_id)?
            .ok_or_else(|| TminusError::NotFound(format!("canonical event {canonical_event_id}")))?;
        let journal = crate::store::journal_query::query_journal(conn, &canonical_event_id)?;
        let conflicts = crate::store::journal_query::get_event_conflicts(conn, &canonical_event_id)?;
        Ok(json!({ "event": event, "journal": journal, "conflicts": conflicts }))
    })?;
    Ok(Json(briefing))
}

// ===== Constraint engine =====

#[derive(Deserialize)]
struct AddConstraintRequest {
    user_id: String,
    kind: String,
    config: Value,
    active_from: Option<String>,
    active_to: Option<String>,
}

fn parse_kind(s: &str) -> Result<ConstraintKind, TminusError> {
    ConstraintKind::parse(s).ok_or_else(|| TminusError::Validation(format!("unknown constraint kind '{s}'")))
}

async fn add_constraint(State(state): State<AppState>, Json(req): Json<AddConstraintRequest>) -> ApiResult<Value> {
    let kind = parse_kind(&req.kind)?;
    let constraint = run_actor(&state, &req.user_id, move |conn| {
        constraint::add_constraint(conn, kind, req.config, req.active_from, req.active_to)
    })?;
    Ok(Json(json!(constraint)))
}

#[derive(Deserialize)]
struct UpdateConstraintRequest {
    user_id: String,
    config: Value,
    active_from: Option<String>,
    active_to: Option<String>,
}

async fn update_constraint(
    State(state): State<AppState>,
    AxumPath(constraint_id): AxumPath<String>,
    Json(req): Json<UpdateConstraintRequest>,
) -> ApiResult<Value> {
    let outcome = run_actor(&state, &req.user_id, move |conn| {
        constraint::update_constraint(conn, &constraint_id, req.config, req.active_from, req.active_to)
    })?;
    Ok(Json(json!(outcome)))
}

async fn delete_constraint(
    State(state): State<AppState>,
    AxumPath(constraint_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let cleaned_mirrors = run_actor(&state, &req.user_id, move |conn| constraint::delete_constraint(conn, &constraint_id))?;
    for mirror in &cleaned_mirrors {
        state.queue.enqueue(crate::queue::QueueMessage::DeleteMirror {
            canonical_event_id: mirror.canonical_event_id.clone(),
            target_account_id: mirror.target_account_id.clone(),
            target_calendar_id: mirror.target_calendar_id.clone(),
        })?;
    }
    Ok(Json(json!({ "mirrors_cleaned": cleaned_mirrors.len() })))
}

async fn list_constraints(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let constraints = run_actor(&state, &req.user_id, |conn| constraint::list_constraints(conn))?;
    Ok(Json(json!(constraints)))
}

async fn get_constraint(
    State(state): State<AppState>,
    AxumPath(constraint_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let found = run_actor(&state, &req.user_id, move |conn| constraint::get_constraint(conn, &constraint_id))?;
    Ok(Json(json!(found)))
}

#[derive(Deserialize)]
struct ValidateConstraintConfigRequest {
    user_id: String,
    kind: String,
    config: Value,
}

async fn validate_constraint_config(State(state): State<AppState>, Json(req): Json<ValidateConstraintConfigRequest>) -> ApiResult<Value> {
    let kind = parse_kind(&req.kind)?;
    run_actor(&state, &req.user_id, move |_conn| validate_config(kind, &req.config))?;
    Ok(Json(json!({ "valid": true })))
}

// ===== Availability engine & analytics =====

#[derive(Deserialize)]
struct WindowRequest {
    user_id: String,
    window_start: String,
    window_end: String,
    #[serde(default)]
    account_ids: Option<Vec<String>>,
}

async fn compute_availability_handler(State(state): State<AppState>, Json(req): Json<WindowRequest>) -> ApiResult<Value> {
    let result = run_actor(&state, &req.user_id, move |conn| {
        compute_availability(conn, &req.window_start, &req.window_end, req.account_ids.as_deref())
    })?;
    Ok(Json(json!(result)))
}

#[derive(Deserialize)]
struct DeepWorkRequest {
    user_id: String,
    window_start: String,
    window_end: String,
    min_block_minutes: Option<i64>,
}

async fn get_deep_work(State(state): State<AppState>, Json(req): Json<DeepWorkRequest>) -> ApiResult<Value> {
    let report = run_actor(&state, &req.user_id, move |conn| {
        deep_work_report(conn, &req.window_start, &req.window_end, req.min_block_minutes)
    })?;
    Ok(Json(json!(report)))
}

async fn get_context_switches(State(state): State<AppState>, Json(req): Json<WindowRequest>) -> ApiResult<Value> {
    let report = run_actor(&state, &req.user_id, move |conn| {
        context_switch_report(conn, &req.window_start, &req.window_end)
    })?;
    Ok(Json(json!(report)))
}

async fn get_cognitive_load(State(state): State<AppState>, Json(req): Json<WindowRequest>) -> ApiResult<Value> {
    let load = run_actor(&state, &req.user_id, move |conn| cognitive_load(conn, &req.window_start, &req.window_end))?;
    Ok(Json(json!({ "cognitive_load": load })))
}

#[derive(Deserialize)]
struct RiskScoresRequest {
    user_id: String,
    weeks: i64,
}

async fn get_risk_scores(State(state): State<AppState>, Json(req): Json<RiskScoresRequest>) -> ApiResult<Value> {
    let scores = run_actor(&state, &req.user_id, move |conn| risk_scores(conn, req.weeks))?;
    Ok(Json(json!(scores)))
}

async fn get_probabilistic_availability(State(state): State<AppState>, Json(req): Json<WindowRequest>) -> ApiResult<Value> {
    let slots = run_actor(&state, &req.user_id, move |conn| {
        probabilistic_availability(conn, &req.window_start, &req.window_end)
    })?;
    Ok(Json(json!(slots)))
}

// ===== Relationship & reputation =====

#[derive(Deserialize)]
struct CreateRelationshipRequest {
    user_id: String,
    participant_hash: String,
    display_name: Option<String>,
    category: String,
    closeness_weight: Option<f64>,
    city: Option<String>,
    timezone: Option<String>,
    interaction_frequency_target: Option<i64>,
}

fn parse_category(s: &str) -> Result<RelationshipCategory, TminusError> {
    RelationshipCategory::parse(s).ok_or_else(|| TminusError::Validation(format!("unknown relationship category '{s}'")))
}

async fn create_relationship(State(state): State<AppState>, Json(req): Json<CreateRelationshipRequest>) -> ApiResult<Value> {
    let category = parse_category(&req.category)?;
    let relationship = run_actor(&state, &req.user_id, move |conn| {
        relationship::create_relationship(
            conn,
            NewRelationship {
                participant_hash: req.participant_hash,
                display_name: req.display_name,
                category,
                closeness_weight: req.closeness_weight,
                city: req.city,
                timezone: req.timezone,
                interaction_frequency_target: req.interaction_frequency_target,
            },
        )
    })?;
    Ok(Json(json!(relationship)))
}

async fn get_relationship(
    State(state): State<AppState>,
    AxumPath(relationship_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let found = run_actor(&state, &req.user_id, move |conn| relationship::get_relationship(conn, &relationship_id))?;
    Ok(Json(json!(found)))
}

#[derive(Deserialize, Default)]
struct UpdateRelationshipRequest {
    user_id: String,
    display_name: Option<String>,
    category: Option<String>,
    closeness_weight: Option<f64>,
    city: Option<String>,
    timezone: Option<String>,
    interaction_frequency_target: Option<i64>,
}

async fn update_relationship(
    State(state): State<AppState>,
    AxumPath(relationship_id): AxumPath<String>,
    Json(req): Json<UpdateRelationshipRequest>,
) -> ApiResult<Value> {
    let category = req.category.as_deref().map(parse_category).transpose()?;
    let updated = run_actor(&state, &req.user_id, move |conn| {
        relationship::crud::update_relationship(
            conn,
            &relationship_id,
            RelationshipPatch {
                display_name: req.display_name,
                category,
                closeness_weight: req.closeness_weight,
                city: req.city,
                timezone: req.timezone,
                interaction_frequency_target: req.interaction_frequency_target,
            },
        )
    })?;
    Ok(Json(json!(updated)))
}

async fn delete_relationship(
    State(state): State<AppState>,
    AxumPath(relationship_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let deleted = run_actor(&state, &req.user_id, move |conn| relationship::delete_relationship(conn, &relationship_id))?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn list_relationships(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let relationships = run_actor(&state, &req.user_id, |conn| relationship::list_relationships(conn))?;
    Ok(Json(json!(relationships)))
}

async fn list_relationships_with_reputation(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let enriched = run_actor(&state, &req.user_id, |conn| {
        let relationships = relationship::list_relationships(conn)?;
        let mut out = Vec::with_capacity(relationships.len());
        for r in relationships {
            let reliability = relationship::reputation::reliability_score(conn, &r.participant_hash)?;
            let reciprocity = relationship::reputation::reciprocity_score(conn, &r.participant_hash)?;
            out.push(json!({
                "relationship": r,
                "reputation": { "reliability_score": reliability, "reciprocity_score": reciprocity },
            }));
        }
        Ok(out)
    })?;
    Ok(Json(json!(enriched)))
}

#[derive(Deserialize)]
struct UpdateInteractionsRequest {
    user_id: String,
    participant_hashes: Vec<String>,
    ts: Option<String>,
}

async fn update_interactions(State(state): State<AppState>, Json(req): Json<UpdateInteractionsRequest>) -> ApiResult<Value> {
    let ts = req.ts.unwrap_or_else(time::now_iso);
    let updated = run_actor(&state, &req.user_id, move |conn| {
        relationship::crud::update_interactions(conn, &req.participant_hashes, &ts)
    })?;
    Ok(Json(json!({ "updated": updated })))
}

#[derive(Deserialize)]
struct MarkOutcomeRequest {
    user_id: String,
    participant_hash: String,
    outcome: String,
    canonical_event_id: Option<String>,
    note: Option<String>,
    ts: Option<String>,
}

async fn mark_outcome(State(state): State<AppState>, Json(req): Json<MarkOutcomeRequest>) -> ApiResult<Value> {
    let outcome = InteractionOutcome::parse(&req.outcome)
        .ok_or_else(|| TminusError::Validation(format!("unknown interaction outcome '{}'", req.outcome)))?;
    let entry = run_actor(&state, &req.user_id, move |conn| {
        relationship::crud::mark_outcome(conn, &req.participant_hash, outcome, req.canonical_event_id, req.note, req.ts)
    })?;
    Ok(Json(json!(entry)))
}

async fn list_outcomes(
    State(state): State<AppState>,
    AxumPath(participant_hash): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let outcomes = run_actor(&state, &req.user_id, move |conn| relationship::crud::list_outcomes(conn, &participant_hash))?;
    Ok(Json(json!(outcomes)))
}

async fn get_drift_report(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let report = run_actor(&state, &req.user_id, |conn| relationship::drift::drift_report(conn, chrono::Utc::now()))?;
    Ok(Json(json!(report)))
}

async fn store_drift_alerts(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let stored = run_actor(&state, &req.user_id, |conn| {
        let rows = relationship::drift::drift_report(conn, chrono::Utc::now())?;
        relationship::drift::store_drift_alerts(conn, &rows)?;
        Ok(rows.len())
    })?;
    Ok(Json(json!({ "stored": stored })))
}

async fn get_drift_alerts(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let alerts = run_actor(&state, &req.user_id, |conn| relationship::drift::get_drift_alerts(conn))?;
    Ok(Json(json!(alerts)))
}

#[derive(Deserialize)]
struct ReconnectionSuggestionsRequest {
    user_id: String,
    city: String,
    user_timezone: Option<String>,
    trip_window: Option<(String, String)>,
}

async fn get_reconnection_suggestions(State(state): State<AppState>, Json(req): Json<ReconnectionSuggestionsRequest>) -> ApiResult<Value> {
    let suggestions = run_actor(&state, &req.user_id, move |conn| {
        relationship::reconnection::reconnection_suggestions(conn, &req.city, req.user_timezone.as_deref(), req.trip_window)
    })?;
    Ok(Json(json!(suggestions)))
}

async fn get_reputation(
    State(state): State<AppState>,
    AxumPath(participant_hash): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let reputation = run_actor(&state, &req.user_id, move |conn| {
        let reliability = relationship::reputation::reliability_score(conn, &participant_hash)?;
        let reciprocity = relationship::reputation::reciprocity_score(conn, &participant_hash)?;
        Ok(json!({ "reliability_score": reliability, "reciprocity_score": reciprocity }))
    })?;
    Ok(Json(reputation))
}

// ===== Milestones =====

#[derive(Deserialize)]
struct CreateMilestoneRequest {
    user_id: String,
    participant_hash: String,
    kind: String,
    date: String,
    recurs_annually: bool,
    note: Option<String>,
}

async fn create_milestone(State(state): State<AppState>, Json(req): Json<CreateMilestoneRequest>) -> ApiResult<Value> {
    let kind = crate::model::milestone::MilestoneKind::parse(&req.kind)
        .ok_or_else(|| TminusError::Validation(format!("unknown milestone kind '{}'", req.kind)))?;
    let milestone = run_actor(&state, &req.user_id, move |conn| {
        relationship::milestone::create_milestone(conn, &req.participant_hash, kind, &req.date, req.recurs_annually, req.note)
    })?;
    Ok(Json(json!(milestone)))
}

async fn list_milestones(
    State(state): State<AppState>,
    AxumPath(participant_hash): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let milestones = run_actor(&state, &req.user_id, move |conn| relationship::milestone::list_milestones(conn, &participant_hash))?;
    Ok(Json(json!(milestones)))
}

async fn delete_milestone(
    State(state): State<AppState>,
    AxumPath(milestone_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let deleted = run_actor(&state, &req.user_id, move |conn| relationship::milestone::delete_milestone(conn, &milestone_id))?;
    Ok(Json(json!({ "deleted": deleted })))
}

// ===== Commitment tracking =====

#[derive(Deserialize)]
struct CreateCommitmentRequest {
    user_id: String,
    client_id: String,
    client_name: Option<String>,
    target_hours: f64,
    window_type: String,
    #[serde(default = "default_rolling_window_weeks")]
    rolling_window_weeks: i64,
    #[serde(default)]
    hard_minimum: bool,
    #[serde(default)]
    proof_required: bool,
}

fn default_rolling_window_weeks() -> i64 {
    4
}

async fn create_commitment(State(state): State<AppState>, Json(req): Json<CreateCommitmentRequest>) -> ApiResult<Value> {
    let window_type = CommitmentWindow::parse(&req.window_type)
        .ok_or_else(|| TminusError::Validation(format!("unknown window_type '{}'", req.window_type)))?;
    let commitment = run_actor(&state, &req.user_id, move |conn| {
        commitment::create_commitment(
            conn,
            NewCommitment {
                client_id: req.client_id,
                client_name: req.client_name,
                target_hours: req.target_hours,
                window_type,
                rolling_window_weeks: req.rolling_window_weeks,
                hard_minimum: req.hard_minimum,
                proof_required: req.proof_required,
            },
        )
    })?;
    Ok(Json(json!(commitment)))
}

async fn get_commitment(
    State(state): State<AppState>,
    AxumPath(commitment_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let found = run_actor(&state, &req.user_id, move |conn| commitment::get_commitment(conn, &commitment_id))?;
    Ok(Json(json!(found)))
}

async fn list_commitments(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let commitments = run_actor(&state, &req.user_id, |conn| commitment::list_commitments(conn))?;
    Ok(Json(json!(commitments)))
}

async fn delete_commitment(
    State(state): State<AppState>,
    AxumPath(commitment_id): AxumPath<String>,
    Json(req): Json<UserScoped>,
) -> ApiResult<Value> {
    let deleted = run_actor(&state, &req.user_id, move |conn| commitment::delete_commitment(conn, &commitment_id))?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Deserialize)]
struct CommitmentStatusRequest {
    user_id: String,
    as_of: Option<String>,
}

async fn get_commitment_status(
    State(state): State<AppState>,
    AxumPath(commitment_id): AxumPath<String>,
    Json(req): Json<CommitmentStatusRequest>,
) -> ApiResult<Value> {
    let as_of = match req.as_of {
        Some(ts) => time::parse_ts(&ts).map_err(TminusError::Validation)?,
        None => chrono::Utc::now(),
    };
    let report = run_actor(&state, &req.user_id, move |conn| commitment::get_commitment_status(conn, &commitment_id, as_of))?;
    Ok(Json(json!(report)))
}

#[derive(Deserialize)]
struct CreateAllocationRequest {
    user_id: String,
    canonical_event_id: String,
    client_id: String,
    allocation_type: String,
}

async fn create_allocation(State(state): State<AppState>, Json(req): Json<CreateAllocationRequest>) -> ApiResult<Value> {
    let allocation = run_actor(&state, &req.user_id, move |conn| {
        commitment::create_allocation(conn, &req.canonical_event_id, &req.client_id, &req.allocation_type)
    })?;
    Ok(Json(json!(allocation)))
}

// ===== ICS -> OAuth upgrade =====

#[derive(Deserialize)]
struct ExecuteUpgradeRequest {
    user_id: String,
    #[serde(flatten)]
    upgrade: IcsUpgradeRequest,
}

async fn execute_upgrade(State(state): State<AppState>, Json(req): Json<ExecuteUpgradeRequest>) -> ApiResult<Value> {
    let outcome = run_actor(&state, &req.user_id, move |conn| ics_upgrade::execute_upgrade(conn, &req.upgrade))?;
    Ok(Json(json!(outcome)))
}

// ===== Deletion workflow — individual idempotent steps 1-4 =====

async fn delete_all_events(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let deleted = run_actor(&state, &req.user_id, |conn| Ok(conn.execute("DELETE FROM canonical_events", [])? as i64))?;
    Ok(Json(json!({ "step": 1, "deleted": deleted, "ok": true })))
}

async fn delete_all_mirrors(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let deleted = run_actor(&state, &req.user_id, |conn| Ok(conn.execute("DELETE FROM event_mirrors", [])? as i64))?;
    Ok(Json(json!({ "step": 2, "deleted": deleted, "ok": true })))
}

async fn delete_journal(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let deleted = run_actor(&state, &req.user_id, |conn| Ok(conn.execute("DELETE FROM event_journal", [])? as i64))?;
    Ok(Json(json!({ "step": 3, "deleted": deleted, "ok": true })))
}

async fn delete_relationship_data(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let deleted = run_actor(&state, &req.user_id, |conn| {
        let mut total = 0i64;
        for table in ["interaction_ledger", "milestones", "policy_edges", "policies", "calendars", "constraints", "relationships"] {
            total += conn.execute(&format!("DELETE FROM {table}"), [])? as i64;
        }
        Ok(total)
    })?;
    Ok(Json(json!({ "step": 4, "deleted": deleted, "ok": true })))
}

#[derive(Deserialize)]
struct ExecuteDeletionRequest {
    request_id: String,
    user_id: String,
}

/// Runs all 9 steps in one call, the deletion workflow's own entry point
/// rather than one of the actor-scoped per-step operations above. Not
/// named in spec §6's representative list (that list enumerates the
/// four actor-local steps individually), but the workflow itself needs
/// some trigger, and this is the natural place to expose it.
async fn execute_deletion(State(state): State<AppState>, Json(req): Json<ExecuteDeletionRequest>) -> Result<Json<DeletionOutcome>, ApiError> {
    let registry_conn = state.registry_conn.lock().expect("registry connection lock poisoned");
    let outcome = deletion::execute_deletion(
        &state.actors,
        &registry_conn,
        state.blobs.as_ref(),
        state.queue.as_ref(),
        &state.master_key,
        &req.request_id,
        &req.user_id,
    )?;
    Ok(Json(outcome))
}

/// Per-user structural health summary: event/mirror/journal counts and
/// the most recent journal timestamp. Not a spec-defined computation in
/// its own right (§4.4's analytics views are all relationship/interval
/// derived); this is the plain operational-visibility op the dispatch
/// surface's representative list names as `getSyncHealth`.
async fn get_sync_health(State(state): State<AppState>, Json(req): Json<UserScoped>) -> ApiResult<Value> {
    let summary = run_actor(&state, &req.user_id, |conn| {
        let events: i64 = conn.query_row("SELECT count(*) FROM canonical_events", [], |r| r.get(0))?;
        let mirrors_synced: i64 = conn.query_row(
            "SELECT count(*) FROM event_mirrors WHERE state = 'SYNCED'",
            [],
            |r| r.get(0),
        )?;
        let mirrors_pending: i64 = conn.query_row(
            "SELECT count(*) FROM event_mirrors WHERE state = 'PENDING'",
            [],
            |r| r.get(0),
        )?;
        let mirrors_failed: i64 = conn.query_row(
            "SELECT count(*) FROM event_mirrors WHERE state = 'FAILED'",
            [],
            |r| r.get(0),
        )?;
        let last_journal_ts: Option<String> =
            conn.query_row("SELECT ts FROM event_journal ORDER BY ts DESC LIMIT 1", [], |r| r.get(0)).ok();
        Ok(json!({
            "events": events,
            "mirrors_synced": mirrors_synced,
            "mirrors_pending": mirrors_pending,
            "mirrors_failed": mirrors_failed,
            "last_journal_ts": last_journal_ts,
        }))
    })?;
    Ok(Json(summary))
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown operation" }))).into_response()
}

/// Builds the full operation router. Path-scoped ids use axum's `:param` segments; every
/// body additionally carries `user_id` so the handler knows which actor
/// to address (account/auth resolution is the external collaborator's
/// job per spec §1's non-goals).
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/applyProviderDelta", post(apply_provider_delta))
        .route("/getCanonicalEvent/{canonical_event_id}", post(get_canonical_event))
        .route("/listCanonicalEvents", post(list_canonical_events))
        .route("/getAccountEvents", post(get_account_events))
        .route("/queryJournal/{canonical_event_id}", post(query_journal))
        .route("/getEventConflicts/{canonical_event_id}", post(get_event_conflicts))
        .route("/getEventBriefing/{canonical_event_id}", post(get_event_briefing))
        .route("/addConstraint", post(add_constraint))
        .route("/updateConstraint/{constraint_id}", post(update_constraint))
        .route("/deleteConstraint/{constraint_id}", post(delete_constraint))
        .route("/listConstraints", post(list_constraints))
        .route("/getConstraint/{constraint_id}", post(get_constraint))
        .route("/validateConstraintConfig", post(validate_constraint_config))
        .route("/computeAvailability", post(compute_availability_handler))
        .route("/getDeepWork", post(get_deep_work))
        .route("/getContextSwitches", post(get_context_switches))
        .route("/getCognitiveLoad", post(get_cognitive_load))
        .route("/getRiskScores", post(get_risk_scores))
        .route("/getProbabilisticAvailability", post(get_probabilistic_availability))
        .route("/createRelationship", post(create_relationship))
        .route("/getRelationship/{relationship_id}", post(get_relationship))
        .route("/updateRelationship/{relationship_id}", post(update_relationship))
        .route("/deleteRelationship/{relationship_id}", post(delete_relationship))
        .route("/listRelationships", post(list_relationships))
        .route("/listRelationshipsWithReputation", post(list_relationships_with_reputation))
        .route("/updateInteractions", post(update_interactions))
        .route("/markOutcome", post(mark_outcome))
        .route("/listOutcomes/{participant_hash}", post(list_outcomes))
        .route("/getDriftReport", post(get_drift_report))
        .route("/storeDriftAlerts", post(store_drift_alerts))
        .route("/getDriftAlerts", post(get_drift_alerts))
        .route("/getReconnectionSuggestions", post(get_reconnection_suggestions))
        .route("/getReputation/{participant_hash}", post(get_reputation))
        .route("/createMilestone", post(create_milestone))
        .route("/listMilestones/{participant_hash}", post(list_milestones))
        .route("/deleteMilestone/{milestone_id}", post(delete_milestone))
        .route("/createCommitment", post(create_commitment))
        .route("/getCommitment/{commitment_id}", post(get_commitment))
        .route("/listCommitments", post(list_commitments))
        .route("/deleteCommitment/{commitment_id}", post(delete_commitment))
        .route("/getCommitmentStatus/{commitment_id}", post(get_commitment_status))
        .route("/createAllocation", post(create_allocation))
        .route("/executeUpgrade", post(execute_upgrade))
        .route("/deleteAllEvents", post(delete_all_events))
        .route("/deleteAllMirrors", post(delete_all_mirrors))
        .route("/deleteJournal", post(delete_journal))
        .route("/deleteRelationshipData", post(delete_relationship_data))
        .route("/executeDeletion", post(execute_deletion))
        .route("/getSyncHealth", post(get_sync_health))
        .with_state(state)
        .fallback(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob_store::FsBlobStore;
    use crate::config::TminusConfig;
    use crate::queue::InMemoryQueue;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TminusConfig::default();
        config.actors_dir = dir.path().join("actors");
        let actors = ActorRegistry::new(config);

        let mut registry_conn = Connection::open_in_memory().unwrap();
        crate::registry::ensure_migrated(&mut registry_conn).unwrap();

        let state = AppState {
            actors,
            registry_conn: Arc::new(Mutex::new(registry_conn)),
            blobs: Arc::new(FsBlobStore::new(dir.path().join("blobs"))),
            queue: Arc::new(InMemoryQueue::new()),
            master_key: Arc::new(b"test-key".to_vec()),
        };
        (state, dir)
    }

    async fn post_json(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(path)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let (state, _dir) = test_state();
        let router = build_router(state);
        let response = router
            .oneshot(Request::builder().method("POST").uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn apply_provider_delta_then_list_events() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        let (status, body) = post_json(
            &router,
            "/applyProviderDelta",
            json!({
                "user_id": "user_1",
                "origin_account_id": "acc-1",
                "origin_event_id": "ev-1",
                "kind": "created",
                "fields": { "title": "Standup", "start_ts": "2026-03-01T09:00:00Z", "end_ts": "2026-03-01T09:15:00Z" },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["event"]["title"], "Standup");

        let (status, body) = post_json(
            &router,
            "/listCanonicalEvents",
            json!({ "user_id": "user_1", "window_start": "2026-03-01T00:00:00Z", "window_end": "2026-03-01T23:59:59Z" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_interval_surfaces_as_500_with_error_body() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        let (status, body) = post_json(
            &router,
            "/applyProviderDelta",
            json!({
                "user_id": "user_1",
                "origin_account_id": "acc-1",
                "origin_event_id": "ev-1",
                "kind": "created",
                "fields": { "start_ts": "2026-03-01T10:00:00Z", "end_ts": "2026-03-01T09:00:00Z" },
            }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn create_relationship_unknown_category_is_validation_error() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        let (status, _body) = post_json(
            &router,
            "/createRelationship",
            json!({ "user_id": "user_1", "participant_hash": "hash1", "category": "NOT_A_CATEGORY" }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn milestone_create_list_delete_through_http() {
        let (state, _dir) = test_state();
        let router = build_router(state);

        let (status, body) = post_json(
            &router,
            "/createMilestone",
            json!({ "user_id": "user_1", "participant_hash": "hash1", "kind": "birthday", "date": "2026-05-01", "recurs_annually": true }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let milestone_id = body["milestone_id"].as_str().unwrap().to_string();

        let (status, body) = post_json(&router, "/listMilestones/hash1", json!({ "user_id": "user_1" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) =
            post_json(&router, &format!("/deleteMilestone/{milestone_id}"), json!({ "user_id": "user_1" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
    }
}
