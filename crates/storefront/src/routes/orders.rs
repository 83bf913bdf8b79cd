//! Order route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use printshelf_core::{OrderId, OrderNumber, OrderStatus, PaymentStatus};

use super::{ApiJson, DataResponse, SuccessResponse};
use crate::error::{AppError, Result};
use crate::models::{Order, Pagination};
use crate::services::CheckoutRequest;
use crate::services::orders::StatusChange;
use crate::state::AppState;

/// Response for a placed order.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedOrderResponse {
    pub success: bool,
    pub order_number: OrderNumber,
    pub order: Order,
}

/// Order listing query.
///
/// Numbers are taken leniently: anything unparsable falls back to defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

/// Response for an order listing.
#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub success: bool,
    pub data: Vec<Order>,
    pub pagination: Pagination,
}

/// Status change body. Omitted fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateBody {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
}

/// Place an order.
///
/// POST /orders
#[instrument(skip(state, request))]
pub async fn create(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<CreatedOrderResponse>)> {
    let order = state.orders().create_order(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedOrderResponse {
            success: true,
            order_number: order.order_number.clone(),
            order,
        }),
    ))
}

/// List orders, newest first.
///
/// GET /orders?status=&page=&limit=
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<OrderListResponse>> {
    let page = query.page.as_deref().and_then(|p| p.trim().parse().ok());
    let limit = query.limit.as_deref().and_then(|l| l.trim().parse().ok());

    let (data, pagination) = state
        .orders()
        .list_orders(query.status.as_deref(), page, limit)
        .await?;

    Ok(Json(OrderListResponse {
        success: true,
        data,
        pagination,
    }))
}

/// Look up an order by number.
///
/// GET /orders/number/{order_number}
#[instrument(skip(state))]
pub async fn show_by_number(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> Result<Json<DataResponse<Order>>> {
    let order = state.orders().get_by_number(&order_number).await?;
    Ok(Json(DataResponse::new(order)))
}

/// Change an order's status and/or payment status.
///
/// PATCH /orders/{id}
#[instrument(skip(state, body))]
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusUpdateBody>,
) -> Result<Json<DataResponse<Order>>> {
    let change = StatusChange {
        status: parse_field::<OrderStatus>(body.status.as_deref())?,
        payment_status: parse_field::<PaymentStatus>(body.payment_status.as_deref())?,
    };

    let order = state
        .orders()
        .update_order_status(&OrderId::new(id), change)
        .await?;
    Ok(Json(DataResponse::new(order)))
}

/// Delete an order and its items.
///
/// DELETE /orders/{id}
#[instrument(skip(state))]
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>> {
    state.orders().delete_order(&OrderId::new(id)).await?;
    Ok(Json(SuccessResponse::ok()))
}

/// Parse an optional status field; blank counts as absent.
fn parse_field<T>(value: Option<&str>) -> Result<Option<T>>
where
    T: std::str::FromStr<Err = printshelf_core::UnknownStatus>,
{
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<T>().map_err(|e| AppError::BadRequest(e.to_string())))
        .transpose()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field::<OrderStatus>(Some("refunded")).unwrap(),
            Some(OrderStatus::Refunded)
        );
        assert_eq!(parse_field::<OrderStatus>(Some(" ")).unwrap(), None);
        assert_eq!(parse_field::<PaymentStatus>(None).unwrap(), None);
        assert!(parse_field::<PaymentStatus>(Some("LOST")).is_err());
    }
}
