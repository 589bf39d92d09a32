//! Trade endpoints: create, accept, list and load.

use std::sync::Arc;

use axum::Json;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use common::{TradeId, UserId};
use saga::{CreateTradeRequest, TradeOfferView, TradePageView};
use serde::{Deserialize, Serialize};
use trade_store::Pagination;

use crate::Container;
use crate::error::ApiError;

/// Header carrying the authenticated caller.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the request's correlation id.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Caller identity and correlation id of a request.
///
/// The correlation id is generated when the client does not send one.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub caller: UserId,
    pub correlation_id: String,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(UserId::new)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {USER_ID_HEADER} header")))?;

        let correlation_id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Self {
            caller,
            correlation_id,
        })
    }
}

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub token: Option<String>,
    pub page_size: Option<usize>,
}

// -- Response types --

#[derive(Serialize)]
pub struct TradeCreatedResponse {
    pub id: TradeId,
}

// -- Handlers --

/// POST /trades: propose a trade owned by the caller.
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
pub async fn create(
    State(container): State<Arc<Container>>,
    ctx: RequestContext,
    Json(req): Json<CreateTradeRequest>,
) -> Result<(StatusCode, Json<TradeCreatedResponse>), ApiError> {
    let id = container
        .orchestrator
        .create(&ctx.correlation_id, &ctx.caller, req)
        .await?;

    Ok((StatusCode::CREATED, Json(TradeCreatedResponse { id })))
}

/// GET /trades: one page of the trades the caller is a party to.
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
pub async fn list(
    State(container): State<Arc<Container>>,
    ctx: RequestContext,
    Query(query): Query<ListQuery>,
) -> Result<Json<TradePageView>, ApiError> {
    let mut pagination = Pagination::new();
    if let Some(token) = query.token.filter(|t| !t.is_empty()) {
        pagination = pagination.after(token);
    }
    if let Some(page_size) = query.page_size {
        pagination = pagination.page_size(page_size);
    }

    let page = container
        .orchestrator
        .get(&ctx.correlation_id, &ctx.caller, &pagination)
        .await?;
    Ok(Json(page))
}

/// GET /trades/{id}: load one of the caller's trades.
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
pub async fn get(
    State(container): State<Arc<Container>>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<Json<TradeOfferView>, ApiError> {
    let trade_id = parse_trade_id(&id)?;
    let view = container
        .orchestrator
        .get_by_id(&ctx.correlation_id, &ctx.caller, trade_id)
        .await?;
    Ok(Json(view))
}

/// POST /trades/{id}/accept: accept a pending trade as its counter-party.
#[tracing::instrument(skip_all, fields(correlation_id = %ctx.correlation_id))]
pub async fn accept(
    State(container): State<Arc<Container>>,
    ctx: RequestContext,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let trade_id = parse_trade_id(&id)?;
    container
        .orchestrator
        .accept(&ctx.correlation_id, &ctx.caller, trade_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_trade_id(id: &str) -> Result<TradeId, ApiError> {
    id.parse::<TradeId>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid trade id '{id}': {e}")))
}
