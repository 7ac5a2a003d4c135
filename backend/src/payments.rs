use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bigdecimal::BigDecimal;
use chrono::{NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::bookings::{self, BookingResponse, CreateBookingRequest};
use crate::chapa::GatewayStatus;
use crate::db;
use crate::error::ApiError;
use crate::models::{require_positive, NewPayment, Payment, PaymentStatus};
use crate::notifications::{EmailJob, Notifier};
use crate::schema::{bookings as bookings_table, payments};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct InitiatePaymentRequest {
    #[validate(length(min = 1, max = 100))]
    pub booking_reference: String,
    pub amount: BigDecimal,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub booking_reference: String,
    pub transaction_id: String,
    pub amount: BigDecimal,
    pub status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            booking_reference: payment.booking_reference,
            transaction_id: payment.transaction_id,
            amount: payment.amount,
            status: payment.status,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InitiatePaymentResponse {
    pub checkout_url: String,
    pub payment: PaymentResponse,
}

#[derive(Debug, Serialize)]
pub struct BookingPaymentResponse {
    pub booking: BookingResponse,
    pub checkout_url: String,
    pub payment: PaymentResponse,
}

/// Webhook body. Chapa posts the merchant transaction reference under
/// `trx_ref`; older payloads used `tx_ref`.
#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    #[serde(alias = "trx_ref", alias = "tx_ref")]
    pub transaction_id: String,
    pub status: String,
}

/// A terminal gateway status becomes a local transition target; `pending`
/// leaves the row alone.
fn transition_for(status: GatewayStatus) -> Option<PaymentStatus> {
    match status {
        GatewayStatus::Success => Some(PaymentStatus::Success),
        GatewayStatus::Failed => Some(PaymentStatus::Failed),
        GatewayStatus::Pending => None,
    }
}

/// Extracts the booking id from a payment reference of the form
/// `booking-<uuid>` (or a bare uuid). References that don't name a booking
/// are allowed; the confirmation flag just can't be set for them.
fn booking_id_from_reference(reference: &str) -> Option<Uuid> {
    let candidate = reference.strip_prefix("booking-").unwrap_or(reference);
    Uuid::parse_str(candidate).ok()
}

pub(crate) enum TransitionOutcome {
    Applied,
    AlreadyTerminal,
    Unknown,
}

/// Applies PENDING -> terminal exactly once. The UPDATE is conditioned on
/// the current status, so concurrent duplicate callbacks race on the row
/// and only the winner (1 row affected) confirms the booking and enqueues
/// the confirmation email.
pub(crate) fn apply_transition(
    conn: &mut PgConnection,
    notifier: &Notifier,
    transaction_id: &str,
    target: PaymentStatus,
) -> Result<TransitionOutcome, ApiError> {
    let updated = diesel::update(
        payments::table.filter(
            payments::transaction_id
                .eq(transaction_id)
                .and(payments::status.eq(PaymentStatus::Pending.as_str())),
        ),
    )
    .set((
        payments::status.eq(target.as_str()),
        payments::updated_at.eq(Utc::now().naive_utc()),
    ))
    .execute(conn)?;

    if updated == 0 {
        let exists: bool = diesel::select(diesel::dsl::exists(
            payments::table.filter(payments::transaction_id.eq(transaction_id)),
        ))
        .get_result(conn)?;
        return Ok(if exists {
            TransitionOutcome::AlreadyTerminal
        } else {
            TransitionOutcome::Unknown
        });
    }

    if target == PaymentStatus::Success {
        let payment: Payment = payments::table
            .filter(payments::transaction_id.eq(transaction_id))
            .select(Payment::as_select())
            .first(conn)?;

        // Booking confirmation happens before the email leaves the queue
        // handle, so a delivered email always refers to a confirmed stay.
        match booking_id_from_reference(&payment.booking_reference) {
            Some(booking_id) => {
                let confirmed = diesel::update(bookings_table::table.find(booking_id))
                    .set(bookings_table::is_confirmed.eq(true))
                    .execute(conn)?;
                if confirmed == 0 {
                    warn!(
                        "payment {} references missing booking {}",
                        transaction_id, booking_id
                    );
                }
            }
            None => warn!(
                "payment reference {} does not name a booking; confirmation flag not set",
                payment.booking_reference
            ),
        }

        notifier.enqueue(EmailJob::PaymentConfirmation {
            user_email: payment.email,
            booking_reference: payment.booking_reference,
            amount: payment.amount,
        });
    }

    Ok(TransitionOutcome::Applied)
}

fn insert_pending_payment(
    conn: &mut PgConnection,
    booking_reference: String,
    amount: BigDecimal,
    email: String,
) -> Result<Payment, ApiError> {
    let now = Utc::now().naive_utc();
    let new_payment = NewPayment {
        id: Uuid::new_v4(),
        booking_reference,
        transaction_id: format!("tx-{}", Uuid::new_v4()),
        amount,
        email,
        status: PaymentStatus::Pending.as_str().to_string(),
        created_at: now,
        updated_at: now,
    };
    let payment: Payment = diesel::insert_into(payments::table)
        .values(&new_payment)
        .returning(Payment::as_returning())
        .get_result(conn)?;
    Ok(payment)
}

/// Creates the PENDING payment row, then registers the transaction with the
/// gateway. A gateway failure leaves the row PENDING and surfaces as a 502.
pub async fn initiate_payment(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<InitiatePaymentRequest>,
) -> Result<(StatusCode, Json<InitiatePaymentResponse>), ApiError> {
    payload.validate()?;
    require_positive("amount", &payload.amount)?;
    let mut conn = db::connect(&state.config.database_url)?;

    let payment = insert_pending_payment(
        &mut conn,
        payload.booking_reference,
        payload.amount,
        payload.email,
    )?;
    info!(
        "payment {} created for reference {}",
        payment.transaction_id, payment.booking_reference
    );

    let session = state
        .chapa
        .initialize_payment(&payment.amount, &payment.email, &payment.transaction_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(InitiatePaymentResponse {
            checkout_url: session.checkout_url,
            payment: payment.into(),
        }),
    ))
}

/// Queries the gateway and reconciles the local row through the same
/// conditional transition as the callback, so a verify racing a callback
/// still yields exactly one email.
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(tx_ref): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;
    let exists: bool = diesel::select(diesel::dsl::exists(
        payments::table.filter(payments::transaction_id.eq(&tx_ref)),
    ))
    .get_result(&mut conn)?;
    if !exists {
        return Err(ApiError::NotFound("payment"));
    }

    let gateway_status = state.chapa.verify_payment(&tx_ref).await?;
    if let Some(target) = transition_for(gateway_status) {
        apply_transition(&mut conn, &state.notifier, &tx_ref, target)?;
    }

    let payment: Payment = payments::table
        .filter(payments::transaction_id.eq(&tx_ref))
        .select(Payment::as_select())
        .first(&mut conn)?;
    Ok(Json(payment.into()))
}

/// Gateway webhook. Delivery is at-least-once, so the handler acknowledges
/// with 200 no matter what: redundant, unknown, and malformed events are
/// logged, never bounced back for redelivery.
pub async fn payment_callback(
    State(state): State<AppState>,
    Json(payload): Json<CallbackPayload>,
) -> (StatusCode, Json<serde_json::Value>) {
    fn ack() -> (StatusCode, Json<serde_json::Value>) {
        (StatusCode::OK, Json(json!({ "status": "received" })))
    }

    let Some(gateway_status) = GatewayStatus::parse(&payload.status) else {
        warn!(
            "callback for {} carried unrecognised status {:?}; ignored",
            payload.transaction_id, payload.status
        );
        return ack();
    };
    let Some(target) = transition_for(gateway_status) else {
        info!(
            "callback for {} still pending; nothing to apply",
            payload.transaction_id
        );
        return ack();
    };

    let mut conn = match db::connect(&state.config.database_url) {
        Ok(conn) => conn,
        Err(e) => {
            error!("callback for {} not processed: {}", payload.transaction_id, e);
            return ack();
        }
    };
    match apply_transition(&mut conn, &state.notifier, &payload.transaction_id, target) {
        Ok(TransitionOutcome::Applied) => info!(
            "payment {} transitioned to {}",
            payload.transaction_id,
            target.as_str()
        ),
        Ok(TransitionOutcome::AlreadyTerminal) => info!(
            "redundant callback for {} ignored",
            payload.transaction_id
        ),
        Ok(TransitionOutcome::Unknown) => warn!(
            "callback for unknown transaction {}",
            payload.transaction_id
        ),
        Err(e) => error!(
            "callback for {} failed: {}",
            payload.transaction_id, e
        ),
    }

    ack()
}

/// Convenience endpoint: books the stay and opens the payment in one round
/// trip. The payment references the fresh booking as `booking-<id>` and is
/// charged to the guest's email.
pub async fn create_booking_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingPaymentResponse>), ApiError> {
    payload.validate()?;
    require_positive("total_price", &payload.total_price)?;
    let mut conn = db::connect(&state.config.database_url)?;

    let created = bookings::insert_booking(&mut conn, &user, &payload)?;
    state.notifier.enqueue(EmailJob::BookingConfirmation {
        customer_email: created.guest_email.clone(),
        booking_id: created.booking.id,
    });

    let payment = insert_pending_payment(
        &mut conn,
        format!("booking-{}", created.booking.id),
        created.booking.total_price.clone(),
        created.guest_email,
    )?;
    info!(
        "booking {} and payment {} created by {}",
        created.booking.id, payment.transaction_id, user.username
    );

    let session = state
        .chapa
        .initialize_payment(&payment.amount, &payment.email, &payment.transaction_id)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BookingPaymentResponse {
            booking: BookingResponse::from_parts(
                created.booking,
                created.listing_title,
                user.username,
            ),
            checkout_url: session.checkout_url,
            payment: payment.into(),
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_gateway_statuses_map_to_transitions() {
        assert_eq!(
            transition_for(GatewayStatus::Success),
            Some(PaymentStatus::Success)
        );
        assert_eq!(
            transition_for(GatewayStatus::Failed),
            Some(PaymentStatus::Failed)
        );
        assert_eq!(transition_for(GatewayStatus::Pending), None);
    }

    #[test]
    fn booking_reference_with_prefix_parses() {
        let id = Uuid::new_v4();
        assert_eq!(
            booking_id_from_reference(&format!("booking-{id}")),
            Some(id)
        );
    }

    #[test]
    fn bare_uuid_reference_parses() {
        let id = Uuid::new_v4();
        assert_eq!(booking_id_from_reference(&id.to_string()), Some(id));
    }

    #[test]
    fn free_form_reference_does_not_parse() {
        assert_eq!(booking_id_from_reference("invoice-1234"), None);
        assert_eq!(booking_id_from_reference(""), None);
    }

    #[test]
    fn callback_payload_accepts_both_reference_keys() {
        let payload: CallbackPayload =
            serde_json::from_str(r#"{"trx_ref": "tx-1", "status": "success"}"#).unwrap();
        assert_eq!(payload.transaction_id, "tx-1");
        let payload: CallbackPayload =
            serde_json::from_str(r#"{"tx_ref": "tx-2", "status": "failed"}"#).unwrap();
        assert_eq!(payload.transaction_id, "tx-2");
    }
}
