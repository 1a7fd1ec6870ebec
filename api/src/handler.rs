use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::{
    models::{RateQuote, SwapHistory, SwapResult},
    Error as CommonError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::service::ExchangeService;

pub type SharedService = Arc<ExchangeService>;

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_LIMIT: u32 = 10;

// Wrapper so common::Error can be returned from handlers
pub struct ApiError(CommonError);

impl From<CommonError> for ApiError {
    fn from(err: CommonError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(CommonError::ValidationError(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(CommonError::ValidationError(rejection.body_text()))
    }
}

// Domain failures are the caller's problem (400); anything else is ours (500)
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_domain() {
            debug!("Request rejected: {}", self.0);
            StatusCode::BAD_REQUEST
        } else {
            error!("Request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };

        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RateParams {
    pub from: Option<String>,
    pub to: Option<String>,
}

// Current rate for a currency pair
pub async fn get_exchange_rate(
    State(service): State<SharedService>,
    query: Result<Query<RateParams>, QueryRejection>,
) -> Result<Json<RateQuote>, ApiError> {
    let Query(params) = query?;
    let (Some(from), Some(to)) = (params.from, params.to) else {
        return Err(CommonError::ValidationError(
            "Query parameters 'from' and 'to' are required".to_string(),
        )
        .into());
    };

    let quote = service.get_exchange_rate(&from, &to).await?;
    Ok(Json(quote))
}

/// Body of a swap request. The wallet fields carry currency codes; the
/// `fromWalletId`/`toWalletId` names are still accepted for older clients.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub email: String,
    #[serde(alias = "fromWalletId")]
    pub from_currency: String,
    #[serde(alias = "toWalletId")]
    pub to_currency: String,
    pub amount: Decimal,
}

// Swap between two of a user's wallets
pub async fn execute_swap(
    State(service): State<SharedService>,
    payload: Result<Json<SwapRequest>, JsonRejection>,
) -> Result<Json<SwapResult>, ApiError> {
    let Json(request) = payload?;

    let result = service
        .execute_swap(
            &request.email,
            &request.from_currency,
            &request.to_currency,
            request.amount,
        )
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

// Paged swap history for a user
pub async fn get_swap_history(
    State(service): State<SharedService>,
    Path(user_id): Path<String>,
    query: Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Json<SwapHistory>, ApiError> {
    let Query(params) = query?;
    let user_id = Uuid::parse_str(&user_id).map_err(|_| {
        CommonError::ValidationError(format!("Invalid user id: {}", user_id))
    })?;

    let history = service
        .get_user_swap_history(
            user_id,
            params.page.unwrap_or(DEFAULT_PAGE),
            params.limit.unwrap_or(DEFAULT_LIMIT),
        )
        .await?;
    Ok(Json(history))
}
