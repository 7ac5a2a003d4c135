use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use diesel::prelude::*;
use tracing::info;

use travel_booking_backend::chapa::ChapaClient;
use travel_booking_backend::config::AppConfig;
use travel_booking_backend::notifications::SmtpMailer;
use travel_booking_backend::{
    auth, bookings, db, init_tracing, listings, notifications, payments, reviews, AppState,
};

async fn home() -> &'static str {
    "Hello, Travel Booking!"
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::load()?;
    info!("loaded config for port {}", config.port);

    let mut conn = db::connect(&config.database_url)
        .map_err(|e| format!("Failed to connect to database: {}", e))?;
    let test_query: i32 =
        diesel::select(diesel::dsl::sql::<diesel::sql_types::Integer>("1")).get_result(&mut conn)?;
    info!("database test query result: {}", test_query);

    let chapa = ChapaClient::new(&config.chapa_base_url, &config.chapa_secret_key)?;
    let mailer = Arc::new(SmtpMailer::new(
        config.smtp_server.clone(),
        config.smtp_port,
        config.smtp_username.clone(),
        config.smtp_password.clone(),
        config.default_from_email.clone(),
    ));
    let notifier = notifications::spawn_worker(mailer);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let state = AppState {
        config,
        chapa,
        notifier,
    };

    let app = Router::new()
        .route("/", get(home))
        .route("/api/auth/login", post(auth::login))
        .route(
            "/api/listings",
            get(listings::list_listings).post(listings::create_listing),
        )
        .route(
            "/api/listings/:id",
            get(listings::get_listing)
                .put(listings::update_listing)
                .patch(listings::update_listing)
                .delete(listings::delete_listing),
        )
        .route(
            "/api/bookings",
            get(bookings::list_bookings).post(bookings::create_booking),
        )
        .route(
            "/api/bookings/:id",
            get(bookings::get_booking)
                .put(bookings::update_booking)
                .patch(bookings::update_booking)
                .delete(bookings::delete_booking),
        )
        .route(
            "/api/bookings/create-payment",
            post(payments::create_booking_payment),
        )
        .route(
            "/api/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route(
            "/api/reviews/:id",
            get(reviews::get_review).delete(reviews::delete_review),
        )
        .route("/api/payments/initiate", post(payments::initiate_payment))
        .route("/api/payments/verify/:tx_ref", get(payments::verify_payment))
        .route("/api/payments/callback", post(payments::payment_callback))
        .with_state(state);

    info!("starting server on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;

    Ok(())
}
