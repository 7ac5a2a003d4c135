use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::schema::{bookings, listings, payments, reviews, users};

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = listings)]
pub struct Listing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_per_night: BigDecimal,
    pub max_guests: i32,
    pub is_available: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = listings)]
pub struct NewListing {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub price_per_night: BigDecimal,
    pub max_guests: i32,
    pub is_available: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = bookings)]
pub struct Booking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: BigDecimal,
    pub is_confirmed: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = bookings)]
pub struct NewBooking {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub guest_id: Uuid,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: BigDecimal,
    pub is_confirmed: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = reviews)]
pub struct Review {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub reviewer_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reviews)]
pub struct NewReview {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub reviewer_id: Uuid,
    pub rating: i32,
    pub comment: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Selectable, Identifiable)]
#[diesel(table_name = payments)]
pub struct Payment {
    pub id: Uuid,
    pub booking_reference: String,
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub email: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = payments)]
pub struct NewPayment {
    pub id: Uuid,
    pub booking_reference: String,
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub email: String,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// Lifecycle states of a payment record. Stored as text in the `payments`
/// table; a row starts `PENDING` and moves to a terminal state exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(PaymentStatus::Pending),
            "SUCCESS" => Some(PaymentStatus::Success),
            "FAILED" => Some(PaymentStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

/// Rejects non-positive money amounts; `validator` has no decimal range rule.
pub fn require_positive(field: &'static str, value: &BigDecimal) -> Result<(), ApiError> {
    if *value <= BigDecimal::from(0) {
        return Err(ApiError::Field {
            field,
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn zero_and_negative_prices_are_rejected() {
        assert!(require_positive("price_per_night", &BigDecimal::from(0)).is_err());
        assert!(require_positive("price_per_night", &BigDecimal::from(-10)).is_err());
        assert!(require_positive("price_per_night", &BigDecimal::from_str("0.00").unwrap()).is_err());
    }

    #[test]
    fn smallest_valid_price_is_accepted() {
        assert!(require_positive("price_per_night", &BigDecimal::from_str("0.01").unwrap()).is_ok());
        assert!(require_positive("price_per_night", &BigDecimal::from_str("120.00").unwrap()).is_ok());
    }

    #[test]
    fn payment_status_round_trips_through_text() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Success,
            PaymentStatus::Failed,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn payment_status_rejects_unknown_text() {
        assert_eq!(PaymentStatus::parse("REFUNDED"), None);
        assert_eq!(PaymentStatus::parse("success"), None);
        assert_eq!(PaymentStatus::parse(""), None);
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Success.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }
}
