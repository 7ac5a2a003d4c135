use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::db;
use crate::error::ApiError;
use crate::models::{NewReview, Review};
use crate::schema::{listings, reviews, users};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReviewRequest {
    pub listing_id: Uuid,
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewListQuery {
    pub listing_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub id: Uuid,
    pub listing: Uuid,
    pub reviewer: String,
    pub rating: i32,
    pub comment: String,
    pub created_at: NaiveDateTime,
}

impl ReviewResponse {
    fn from_parts(review: Review, reviewer: String) -> Self {
        Self {
            id: review.id,
            listing: review.listing_id,
            reviewer,
            rating: review.rating,
            comment: review.comment,
            created_at: review.created_at,
        }
    }
}

pub async fn list_reviews(
    State(state): State<AppState>,
    Query(query): Query<ReviewListQuery>,
) -> Result<Json<Vec<ReviewResponse>>, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;
    let mut statement = reviews::table
        .inner_join(users::table)
        .order_by(reviews::created_at.desc())
        .select((Review::as_select(), users::username))
        .into_boxed();
    if let Some(listing_id) = query.listing_id {
        statement = statement.filter(reviews::listing_id.eq(listing_id));
    }
    let rows = statement.load::<(Review, String)>(&mut conn)?;
    info!("fetched {} reviews", rows.len());
    Ok(Json(
        rows.into_iter()
            .map(|(review, reviewer)| ReviewResponse::from_parts(review, reviewer))
            .collect(),
    ))
}

pub async fn get_review(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReviewResponse>, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;
    let (review, reviewer) = reviews::table
        .inner_join(users::table)
        .filter(reviews::id.eq(id))
        .select((Review::as_select(), users::username))
        .first::<(Review, String)>(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("review"))?;
    Ok(Json(ReviewResponse::from_parts(review, reviewer)))
}

/// One review per user per listing; the second attempt trips the unique
/// constraint and maps to a 400.
pub async fn create_review(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), ApiError> {
    payload.validate()?;
    let mut conn = db::connect(&state.config.database_url)?;

    let exists: bool = diesel::select(diesel::dsl::exists(
        listings::table.find(payload.listing_id),
    ))
    .get_result(&mut conn)?;
    if !exists {
        return Err(ApiError::Field {
            field: "listing_id",
            message: "listing does not exist".to_string(),
        });
    }

    let new_review = NewReview {
        id: Uuid::new_v4(),
        listing_id: payload.listing_id,
        reviewer_id: user.id,
        rating: payload.rating,
        comment: payload.comment,
        created_at: Utc::now().naive_utc(),
    };
    let review: Review = diesel::insert_into(reviews::table)
        .values(&new_review)
        .returning(Review::as_returning())
        .get_result(&mut conn)?;

    info!("review {} created by {}", review.id, user.username);
    Ok((
        StatusCode::CREATED,
        Json(ReviewResponse::from_parts(review, user.username)),
    ))
}

pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let mut conn = db::connect(&state.config.database_url)?;

    let reviewer_id: Uuid = reviews::table
        .find(id)
        .select(reviews::reviewer_id)
        .first(&mut conn)
        .optional()?
        .ok_or(ApiError::NotFound("review"))?;
    if reviewer_id != user.id {
        return Err(ApiError::Forbidden("only the reviewer may delete a review"));
    }

    diesel::delete(reviews::table.find(id)).execute(&mut conn)?;
    info!("review {} deleted by {}", id, user.username);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_rating(rating: i32) -> CreateReviewRequest {
        CreateReviewRequest {
            listing_id: Uuid::new_v4(),
            rating,
            comment: "Lovely stay".to_string(),
        }
    }

    #[test]
    fn ratings_outside_one_to_five_are_rejected() {
        assert!(request_with_rating(0).validate().is_err());
        assert!(request_with_rating(6).validate().is_err());
        assert!(request_with_rating(-1).validate().is_err());
    }

    #[test]
    fn boundary_ratings_are_accepted() {
        assert!(request_with_rating(1).validate().is_ok());
        assert!(request_with_rating(5).validate().is_ok());
    }
}
