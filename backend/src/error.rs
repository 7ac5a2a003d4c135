use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};
use serde_json::json;
use tracing::error;
use validator::ValidationErrors;

use crate::chapa::ChapaError;

/// Error type shared by all handlers. Conversion into an HTTP response
/// happens in one place so every endpoint reports failures the same way:
/// field-level 400s for bad input, 404 for missing resources, 502 when the
/// payment gateway misbehaves, and an opaque 500 for everything internal.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("{field}: {message}")]
    Field {
        field: &'static str,
        message: String,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("database error: {0}")]
    Database(DieselError),
    #[error("database connection failed: {0}")]
    Connection(#[from] diesel::result::ConnectionError),
    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
    #[error("payment gateway error: {0}")]
    Gateway(#[from] ChapaError),
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<DieselError> for ApiError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => ApiError::NotFound("record"),
            other => ApiError::Database(other),
        }
    }
}

/// Maps a unique-constraint violation back to the field a client can fix.
/// Constraint names come from the migrations; the message fallback covers
/// errors surfaced without constraint metadata.
fn unique_violation_detail(
    info: &(dyn DatabaseErrorInformation + Send + Sync),
) -> (&'static str, &'static str) {
    let constraint = info.constraint_name().unwrap_or_else(|| info.message());
    if constraint.contains("bookings_unique_stay") {
        (
            "check_in_date",
            "a booking for this listing and date range already exists",
        )
    } else if constraint.contains("reviews_one_per_reviewer") {
        ("reviewer", "this user has already reviewed this listing")
    } else if constraint.contains("payments_booking_reference_key") {
        (
            "booking_reference",
            "a payment for this booking reference already exists",
        )
    } else if constraint.contains("payments_transaction_id_key") {
        (
            "transaction_id",
            "a payment with this transaction id already exists",
        )
    } else if constraint.contains("users_username_key") {
        ("username", "this username is already taken")
    } else {
        ("non_field_errors", "duplicate value violates a uniqueness constraint")
    }
}

fn field_error_body(field: &str, message: &str) -> serde_json::Value {
    let mut errors = serde_json::Map::new();
    errors.insert(field.to_string(), json!([message]));
    json!({ "errors": errors })
}

fn validation_error_body(errors: &ValidationErrors) -> serde_json::Value {
    let mut fields = serde_json::Map::new();
    for (field, failures) in errors.field_errors() {
        let messages: Vec<String> = failures
            .iter()
            .map(|failure| {
                failure
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("invalid value ({})", failure.code))
            })
            .collect();
        fields.insert(field.to_string(), json!(messages));
    }
    json!({ "errors": fields })
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(validation_error_body(&errors))).into_response()
            }
            ApiError::Field { field, message } => {
                (StatusCode::BAD_REQUEST, Json(field_error_body(field, &message))).into_response()
            }
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{what} not found") })),
            )
                .into_response(),
            ApiError::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": message })),
            )
                .into_response(),
            ApiError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": message }))).into_response()
            }
            ApiError::Database(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                info,
            )) => {
                let (field, message) = unique_violation_detail(info.as_ref());
                (StatusCode::BAD_REQUEST, Json(field_error_body(field, message))).into_response()
            }
            ApiError::Database(err) => {
                error!("database operation failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal server error" })),
                )
                    .into_response()
            }
            ApiError::Connection(err) => {
                error!("database connection failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "database connection failed" })),
                )
                    .into_response()
            }
            ApiError::Token(err) => {
                error!("token handling failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "could not issue token" })),
                )
                    .into_response()
            }
            ApiError::Gateway(err) => {
                error!("payment gateway call failed: {}", err);
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({ "error": err.to_string() })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_violation(message: &str) -> ApiError {
        ApiError::Database(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new(message.to_string()),
        ))
    }

    #[test]
    fn duplicate_booking_maps_to_date_field() {
        let err = unique_violation(
            "duplicate key value violates unique constraint \"bookings_unique_stay\"",
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn duplicate_review_names_the_reviewer_field() {
        let info: Box<String> = Box::new(
            "duplicate key value violates unique constraint \"reviews_one_per_reviewer\""
                .to_string(),
        );
        let (field, message) = unique_violation_detail(info.as_ref());
        assert_eq!(field, "reviewer");
        assert!(message.contains("already reviewed"));
    }

    #[test]
    fn unknown_constraint_falls_back_to_non_field_errors() {
        let info: Box<String> = Box::new("duplicate key value".to_string());
        let (field, _) = unique_violation_detail(info.as_ref());
        assert_eq!(field, "non_field_errors");
    }

    #[test]
    fn diesel_not_found_becomes_404() {
        let err = ApiError::from(DieselError::NotFound);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
