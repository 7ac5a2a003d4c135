//! Seeds the database with a demo owner and sample listings.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::Utc;
use diesel::prelude::*;
use tracing::info;
use uuid::Uuid;

use travel_booking_backend::config::AppConfig;
use travel_booking_backend::models::{NewListing, NewUser, User};
use travel_booking_backend::schema::{listings, users};
use travel_booking_backend::{db, init_tracing};

const SAMPLE_LISTINGS: [(&str, &str, &str, i32); 4] = [
    (
        "Cozy Lakeside Cabin",
        "A quiet retreat nestled by the water, perfect for a peaceful getaway.",
        "120.00",
        4,
    ),
    (
        "Modern Downtown Loft",
        "Stunning city views and walking distance to all major attractions.",
        "250.50",
        2,
    ),
    (
        "Spacious Suburban Home",
        "Ideal for large families with a big backyard and close to parks.",
        "185.75",
        8,
    ),
    (
        "Beachfront Villa",
        "Wake up to the sound of the ocean in this luxury villa.",
        "450.00",
        6,
    ),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::load()?;
    let mut conn = db::connect(&config.database_url)?;

    let new_owner = NewUser {
        id: Uuid::new_v4(),
        username: "seeder_admin".to_string(),
        email: "admin@example.com".to_string(),
        created_at: Utc::now().naive_utc(),
    };
    let owner: User = diesel::insert_into(users::table)
        .values(&new_owner)
        .on_conflict(users::username)
        .do_update()
        .set(users::email.eq("admin@example.com"))
        .returning(User::as_returning())
        .get_result(&mut conn)?;
    info!("using {} as listing owner", owner.username);

    // Clear existing listings to allow for clean re-seeding.
    let cleared = diesel::delete(listings::table).execute(&mut conn)?;
    info!("cleared {} existing listing records", cleared);

    for (index, (title, description, price, guests)) in SAMPLE_LISTINGS.iter().enumerate() {
        let listing = NewListing {
            id: Uuid::new_v4(),
            owner_id: owner.id,
            title: (*title).to_string(),
            description: (*description).to_string(),
            price_per_night: BigDecimal::from_str(price)?,
            max_guests: *guests,
            is_available: index != 3,
            created_at: Utc::now().naive_utc(),
        };
        diesel::insert_into(listings::table)
            .values(&listing)
            .execute(&mut conn)?;
    }
    info!("seeded {} listing records", SAMPLE_LISTINGS.len());

    Ok(())
}
