use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use bigdecimal::BigDecimal;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::db;
use crate::error::ApiError;
use crate::models::{require_positive, Listing, NewListing};
use crate::schema::{listings, users};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateListingRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: String,
    pub price_per_night: BigDecimal,
    #[validate(range(min = 1))]
    pub max_guests: i32,
    pub is_available: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateListingRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_per_night: Option<BigDecimal>,
    #[validate(range(min = 1))]
    pub max_guests: Option<i32>,
    pub is_available: Option<bool>,
}

#[derive(AsChangeset)]
#[diesel(table_name = listings)]
struct ListingChanges {
    title: Option<String>,
    description: Option<String>,
    price_per_night: Option<BigDecimal>,
    max_guests: Option<i32>,
    is_available: Option<bool>,
}

/// API representation: the owner appears as a username, not a key, and
/// owner/created_at are never writable.
#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub id: Uuid,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub price_per_night: BigDecimal,
    pub max_guests: i32,
    pub is_available: bool,
    pub created_at: NaiveDateTime,
}

impl ListingResponse {
    pub fn from_parts(listing: Listing, owner: String) -> Self {
        Self {
            id: listing.id,
            owner,
            title: listing.title,
            description: listing.description,
            price_per_night: listing.price_per_night,
            max_guests: listing.max_guests,
            is_available: listing.is_available,
            created_at: listing.created_at,
        }
    }
}

pub async fn list_listings(
    State(state): State<AppState>,
) -> Result<Json<Vec<ListingResponse>>, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;
    let rows = listings::table
        .inner_join(users::table)
        .order_by(listings::created_at.desc())
        .select((Listing::as_select(), users::username))
        .load::<(Listing, String)>(&mut conn)?;
    info!("fetched {} listings", rows.len());
    Ok(Json(
        rows.into_iter()
            .map(|(listing, owner)| ListingResponse::from_parts(listing, owner))
            .collect(),
    ))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ListingResponse>, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;
    let (listing, owner) = listings::table
        .inner_join(users::table)
        .filter(listings::id.eq(id))
        .select((Listing::as_select(), users::username))
        .first::<(Listing, String)>(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("listing"))?;
    Ok(Json(ListingResponse::from_parts(listing, owner)))
}

pub async fn create_listing(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateListingRequest>,
) -> Result<(StatusCode, Json<ListingResponse>), ApiError> {
    payload.validate()?;
    require_positive("price_per_night", &payload.price_per_night)?;
    let mut conn = db::connect(&state.config.database_url)?;

    let new_listing = NewListing {
        id: Uuid::new_v4(),
        owner_id: user.id,
        title: payload.title,
        description: payload.description,
        price_per_night: payload.price_per_night,
        max_guests: payload.max_guests,
        is_available: payload.is_available.unwrap_or(true),
        created_at: Utc::now().naive_utc(),
    };
    let listing: Listing = diesel::insert_into(listings::table)
        .values(&new_listing)
        .returning(Listing::as_returning())
        .get_result(&mut conn)?;

    info!("listing {} created by {}", listing.id, user.username);
    Ok((
        StatusCode::CREATED,
        Json(ListingResponse::from_parts(listing, user.username)),
    ))
}

pub async fn update_listing(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateListingRequest>,
) -> Result<Json<ListingResponse>, ApiError> {
    payload.validate()?;
    if let Some(price) = &payload.price_per_night {
        require_positive("price_per_night", price)?;
    }
    let mut conn = db::connect(&state.config.database_url)?;

    let listing: Listing = listings::table
        .find(id)
        .select(Listing::as_select())
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("listing"))?;
    if listing.owner_id != user.id {
        return Err(ApiError::Forbidden("only the owner may modify a listing"));
    }

    let changes = ListingChanges {
        title: payload.title,
        description: payload.description,
        price_per_night: payload.price_per_night,
        max_guests: payload.max_guests,
        is_available: payload.is_available,
    };
    let no_changes = changes.title.is_none()
        && changes.description.is_none()
        && changes.price_per_night.is_none()
        && changes.max_guests.is_none()
        && changes.is_available.is_none();
    let listing = if no_changes {
        listing
    } else {
        diesel::update(listings::table.find(id))
            .set(&changes)
            .returning(Listing::as_returning())
            .get_result(&mut conn)?
    };

    info!("listing {} updated by {}", listing.id, user.username);
    Ok(Json(ListingResponse::from_parts(listing, user.username)))
}

pub async fn delete_listing(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;

    let owner_id: Uuid = listings::table
        .find(id)
        .select(listings::owner_id)
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("listing"))?;
    if owner_id != user.id {
        return Err(ApiError::Forbidden("only the owner may delete a listing"));
    }

    // Bookings and reviews go with it via ON DELETE CASCADE.
    diesel::delete(listings::table.find(id)).execute(&mut conn)?;
    info!("listing {} deleted by {}", id, user.username);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn listing_request_validates_guest_count() {
        let payload = CreateListingRequest {
            title: "Cozy Lakeside Cabin".to_string(),
            description: "A quiet retreat".to_string(),
            price_per_night: BigDecimal::from(120),
            max_guests: 0,
            is_available: None,
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("max_guests"));
    }

    #[test]
    fn listing_request_rejects_empty_title() {
        let payload = CreateListingRequest {
            title: String::new(),
            description: "A quiet retreat".to_string(),
            price_per_night: BigDecimal::from(120),
            max_guests: 2,
            is_available: None,
        };
        let errors = payload.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("title"));
    }

    #[test]
    fn valid_listing_request_passes_validation() {
        let payload = CreateListingRequest {
            title: "Cozy Lakeside Cabin".to_string(),
            description: "A quiet retreat".to_string(),
            price_per_night: BigDecimal::from_str("120.00").unwrap(),
            max_guests: 4,
            is_available: Some(true),
        };
        assert!(payload.validate().is_ok());
        assert!(require_positive("price_per_night", &payload.price_per_night).is_ok());
    }
}
