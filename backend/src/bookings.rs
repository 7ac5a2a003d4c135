use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::db;
use crate::error::ApiError;
use crate::models::{require_positive, Booking, NewBooking};
use crate::notifications::EmailJob;
use crate::schema::{bookings, listings, users};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub listing_id: Uuid,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: BigDecimal,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBookingRequest {
    pub listing_id: Option<Uuid>,
    pub check_in_date: Option<NaiveDate>,
    pub check_out_date: Option<NaiveDate>,
}

#[derive(AsChangeset)]
#[diesel(table_name = bookings)]
struct BookingChanges {
    listing_id: Option<Uuid>,
    check_in_date: Option<NaiveDate>,
    check_out_date: Option<NaiveDate>,
}

/// API representation with display context: the listing's title and the
/// guest's username ride along read-only. total_price, is_confirmed, and
/// created_at are server-controlled on write.
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub listing: Uuid,
    pub listing_title: String,
    pub guest: Uuid,
    pub guest_username: String,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub total_price: BigDecimal,
    pub is_confirmed: bool,
    pub created_at: NaiveDateTime,
}

impl BookingResponse {
    pub fn from_parts(booking: Booking, listing_title: String, guest_username: String) -> Self {
        Self {
            id: booking.id,
            listing: booking.listing_id,
            listing_title,
            guest: booking.guest_id,
            guest_username,
            check_in_date: booking.check_in_date,
            check_out_date: booking.check_out_date,
            total_price: booking.total_price,
            is_confirmed: booking.is_confirmed,
            created_at: booking.created_at,
        }
    }
}

pub(crate) struct CreatedBooking {
    pub booking: Booking,
    pub listing_title: String,
    pub guest_email: String,
}

/// Persists a booking for the authenticated guest. Shared with the combined
/// booking + payment endpoint. A duplicate (listing, check-in, check-out)
/// triple surfaces as a unique violation and maps to a 400.
pub(crate) fn insert_booking(
    conn: &mut PgConnection,
    user: &AuthUser,
    payload: &CreateBookingRequest,
) -> Result<CreatedBooking, ApiError> {
    let listing_title: String = listings::table
        .find(payload.listing_id)
        .select(listings::title)
        .first(conn)
        .optional()?
        .ok_or(ApiError::Field {
            field: "listing_id",
            message: "listing does not exist".to_string(),
        })?;
    let guest_email: String = users::table
        .find(user.id)
        .select(users::email)
        .first(conn)?;

    // TODO: derive total_price from nights * price_per_night once the
    // pricing policy is settled; the API currently trusts the client's
    // figure.
    let new_booking = NewBooking {
        id: Uuid::new_v4(),
        listing_id: payload.listing_id,
        guest_id: user.id,
        check_in_date: payload.check_in_date,
        check_out_date: payload.check_out_date,
        total_price: payload.total_price.clone(),
        is_confirmed: false,
        created_at: Utc::now().naive_utc(),
    };
    let booking: Booking = diesel::insert_into(bookings::table)
        .values(&new_booking)
        .returning(Booking::as_returning())
        .get_result(conn)?;

    Ok(CreatedBooking {
        booking,
        listing_title,
        guest_email,
    })
}

pub async fn list_bookings(
    State(state): State<AppState>,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;
    let rows = bookings::table
        .inner_join(listings::table)
        .inner_join(users::table)
        .order_by(bookings::created_at.desc())
        .select((Booking::as_select(), listings::title, users::username))
        .load::<(Booking, String, String)>(&mut conn)?;
    info!("fetched {} bookings", rows.len());
    Ok(Json(
        rows.into_iter()
            .map(|(booking, title, username)| BookingResponse::from_parts(booking, title, username))
            .collect(),
    ))
}

pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;
    let (booking, title, username) = bookings::table
        .inner_join(listings::table)
        .inner_join(users::table)
        .filter(bookings::id.eq(id))
        .select((Booking::as_select(), listings::title, users::username))
        .first::<(Booking, String, String)>(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("booking"))?;
    Ok(Json(BookingResponse::from_parts(booking, title, username)))
}

pub async fn create_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    payload.validate()?;
    require_positive("total_price", &payload.total_price)?;
    let mut conn = db::connect(&state.config.database_url)?;

    let created = insert_booking(&mut conn, &user, &payload)?;
    info!("booking {} created by {}", created.booking.id, user.username);

    // The insert is committed before the job leaves the request path.
    state.notifier.enqueue(EmailJob::BookingConfirmation {
        customer_email: created.guest_email,
        booking_id: created.booking.id,
    });

    Ok((
        StatusCode::CREATED,
        Json(BookingResponse::from_parts(
            created.booking,
            created.listing_title,
            user.username,
        )),
    ))
}

pub async fn update_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBookingRequest>,
) -> Result<Json<BookingResponse>, ApiError> {
    payload.validate()?;
    let mut conn = db::connect(&state.config.database_url)?;

    let booking: Booking = bookings::table
        .find(id)
        .select(Booking::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("booking"))?;
    if booking.guest_id != user.id {
        return Err(ApiError::Forbidden("only the guest may modify a booking"));
    }

    if let Some(listing_id) = payload.listing_id {
        let exists: bool = diesel::select(diesel::dsl::exists(
            listings::table.find(listing_id),
        ))
        .get_result(&mut conn)?;
        if !exists {
            return Err(ApiError::Field {
                field: "listing_id",
                message: "listing does not exist".to_string(),
            });
        }
    }

    let changes = BookingChanges {
        listing_id: payload.listing_id,
        check_in_date: payload.check_in_date,
        check_out_date: payload.check_out_date,
    };
    let no_changes = changes.listing_id.is_none()
        && changes.check_in_date.is_none()
        && changes.check_out_date.is_none();
    let booking = if no_changes {
        booking
    } else {
        diesel::update(bookings::table.find(id))
            .set(&changes)
            .returning(Booking::as_returning())
            .get_result(&mut conn)?
    };

    let listing_title: String = listings::table
        .find(booking.listing_id)
        .select(listings::title)
        .first(&mut conn)?;
    info!("booking {} updated by {}", booking.id, user.username);
    Ok(Json(BookingResponse::from_parts(
        booking,
        listing_title,
        user.username,
    )))
}

pub async fn delete_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;

    let guest_id: Uuid = bookings::table
        .find(id)
        .select(bookings::guest_id)
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("booking"))?;
    if guest_id != user.id {
        return Err(ApiError::Forbidden("only the guest may cancel a booking"));
    }

    diesel::delete(bookings::table.find(id)).execute(&mut conn)?;
    info!("booking {} deleted by {}", id, user.username);
    Ok(StatusCode::NO_CONTENT)
}
