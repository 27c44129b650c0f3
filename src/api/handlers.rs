use axum::{extract::{Path, State}, http::{HeaderMap, StatusCode}, Json};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::{CommitOutcome, GroupBuyOrder};
use crate::domain::pricing::ShippingRate;
use crate::engine::{CommitCommand, ProposalOutcome, ProposeCommand, QuoteCommand};
use super::dto::{AdvanceRequest, CommitRequest, CommitResponse, GroupBuyView, ProposeRequest, ProposeResponse, QuoteRequest, QuoteResponse, RejectRequest};
use super::error::ApiError;
use super::AppState;

/// Set by the gateway after authenticating the caller.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty()).map(String::from)
}

fn view(s: &AppState, order: &GroupBuyOrder) -> GroupBuyView {
    GroupBuyView::new(order, s.engine.now(), &s.engine.settings().urgency)
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy", "service": "opensase-groupbuy"}))
}

pub async fn active_group_buy(State(s): State<AppState>, Path(product_id): Path<String>) -> Result<Json<Option<GroupBuyView>>, ApiError> {
    let group = s.engine.active_group_buy(&product_id).await?;
    Ok(Json(group.map(|g| view(&s, &g))))
}

pub async fn propose(State(s): State<AppState>, Path(product_id): Path<String>, headers: HeaderMap, Json(r): Json<ProposeRequest>) -> Result<(StatusCode, Json<ProposeResponse>), ApiError> {
    let requester_id = header(&headers, USER_ID_HEADER).ok_or(ApiError::Unauthenticated)?;
    r.validate()?;
    let outcome = s.engine.propose(ProposeCommand { product_id, requester_id: Some(requester_id), desired_qty: r.desired_qty, message: r.message }).await?;
    Ok(match outcome {
        ProposalOutcome::Created { group_id } => (StatusCode::CREATED, Json(ProposeResponse::Created { group_id })),
        ProposalOutcome::Existing { existing_group_id } => (StatusCode::CONFLICT, Json(ProposeResponse::Existing { existing_group_id })),
    })
}

pub async fn get_group_buy(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<GroupBuyView>, ApiError> {
    let group = s.engine.group_buy(id).await?;
    Ok(Json(view(&s, &group)))
}

pub async fn commit(State(s): State<AppState>, Path(id): Path<Uuid>, headers: HeaderMap, Json(r): Json<CommitRequest>) -> Result<Json<CommitResponse>, ApiError> {
    let requester_id = header(&headers, USER_ID_HEADER).ok_or(ApiError::Unauthenticated)?;
    r.validate()?;
    let request_id = r.request_id.or_else(|| header(&headers, IDEMPOTENCY_KEY_HEADER));
    let result = s.engine.commit(CommitCommand { group_id: id, requester_id, quantity: r.quantity, request_id }).await?;
    Ok(Json(CommitResponse { applied: result.outcome != CommitOutcome::AlreadyApplied, group_buy: view(&s, &result.group_buy) }))
}

pub async fn approve(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<GroupBuyView>, ApiError> {
    let group = s.engine.approve(id).await?;
    Ok(Json(view(&s, &group)))
}

pub async fn reject(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<RejectRequest>) -> Result<Json<GroupBuyView>, ApiError> {
    r.validate()?;
    let group = s.engine.reject(id, &r.reason).await?;
    Ok(Json(view(&s, &group)))
}

pub async fn advance(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<AdvanceRequest>) -> Result<Json<GroupBuyView>, ApiError> {
    let group = s.engine.advance(id, r.action).await?;
    Ok(Json(view(&s, &group)))
}

pub async fn quote(State(s): State<AppState>, Json(r): Json<QuoteRequest>) -> Result<Json<QuoteResponse>, ApiError> {
    r.validate()?;
    let quote = s.engine.compute_price(QuoteCommand { product_id: r.product_id, selections: r.selections, shipping_method_id: r.shipping_method_id, quantity: r.quantity }).await?;
    Ok(Json(QuoteResponse::from(&quote)))
}

pub async fn shipping_rates(State(s): State<AppState>) -> Result<Json<Vec<ShippingRate>>, ApiError> {
    Ok(Json(s.engine.shipping_rates().await?))
}
