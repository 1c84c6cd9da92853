use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::NaiveDate;
use reserva_booking::{CreateBookingCommand, IdempotencyDescriptor};
use reserva_core::booking::BookingFilter;
use reserva_core::repository::StoreError;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListBookingsQuery {
    pub resource_id: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    pub date: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/{user_id}", get(list_bookings))
        .route("/api/bookings/{booking_id}/cancel", patch(cancel_booking))
        .route("/api/resources/available", get(available_resources))
}

fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    // Strict YYYY-MM-DD: chrono alone would accept unpadded fields.
    if raw.len() != 10 {
        return Err(AppError::Validation(
            "date must be in YYYY-MM-DD format".to_string(),
        ));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation("date must be in YYYY-MM-DD format".to_string()))
}

async fn create_booking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Response, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }
    if req.resource_id.trim().is_empty() {
        return Err(AppError::Validation("resourceId is required".to_string()));
    }
    let date = parse_date(&req.date)?;

    let supplied_key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty());
    let descriptor =
        IdempotencyDescriptor::build(&req.user_id, &req.resource_id, date, supplied_key);

    let cmd = CreateBookingCommand {
        user_id: req.user_id,
        resource_id: req.resource_id,
        date,
    };

    let outcome = state
        .manager
        .create_booking(&cmd, &descriptor)
        .await
        .map_err(AppError::Booking)?;

    let status =
        StatusCode::from_u16(outcome.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Ok((status, Json(outcome.body)).into_response())
}

async fn list_bookings(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<ListBookingsQuery>,
) -> Result<Response, AppError> {
    let filter = BookingFilter {
        resource_id: query.resource_id,
        date: query.date.as_deref().map(parse_date).transpose()?,
    };

    let bookings = state
        .store
        .list_by_user(&user_id, &filter)
        .await
        .map_err(|e| AppError::Anyhow(e.into()))?;

    Ok(Json(json!({
        "success": true,
        "bookings": bookings,
    }))
    .into_response())
}

async fn cancel_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(req): Json<CancelBookingRequest>,
) -> Result<Response, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }

    let booking = state
        .store
        .cancel(booking_id, &req.user_id)
        .await
        .map_err(|e| match e {
            StoreError::NotFound => AppError::NotFound("Booking not found".to_string()),
            other => AppError::Anyhow(other.into()),
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "Booking cancelled successfully",
        "booking": booking,
    }))
    .into_response())
}

async fn available_resources(
    State(state): State<AppState>,
    Query(query): Query<AvailableQuery>,
) -> Result<Response, AppError> {
    let raw = query.date.ok_or_else(|| {
        AppError::Validation("Date query parameter is required".to_string())
    })?;
    let date = parse_date(&raw)?;

    let booked = state
        .store
        .booked_resources(date)
        .await
        .map_err(|e| AppError::Anyhow(e.into()))?;

    let available: Vec<&String> = state
        .rules
        .resources
        .iter()
        .filter(|resource| !booked.contains(resource))
        .collect();

    Ok(Json(json!({
        "success": true,
        "date": raw,
        "availableResources": available,
    }))
    .into_response())
}
