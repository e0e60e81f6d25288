use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod channel;
mod router;

use booking_cell::ReservationManager;
use calendar_client::CalendarClient;
use chat_cell::{ConversationEngine, SessionRouter};
use scheduling_cell::{AvailabilityEngine, SchedulingConfig};
use shared_config::AppConfig;

use channel::HttpMessagingChannel;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting citaflow bot");

    // Load configuration; refuse to accept sessions with an incomplete one.
    let config = AppConfig::from_env();
    anyhow::ensure!(
        config.is_configured(),
        "missing required configuration (CALENDAR_API_URL, MESSAGING_API_URL, PROVIDER_CALENDARS)"
    );
    let directory = Arc::new(config.directory().context("invalid provider table")?);
    let rules =
        SchedulingConfig::from_app_config(&config).context("invalid scheduling configuration")?;
    info!(
        "Configured {} providers, office hours {}..{} ({})",
        directory.len(),
        rules.office_start,
        rules.office_end,
        rules.timezone.name()
    );

    // Construct clients and services once; everything downstream receives
    // them by injection.
    let calendar = Arc::new(CalendarClient::new(&config));
    let availability = Arc::new(AvailabilityEngine::new(Arc::clone(&calendar), rules));
    let reservations = Arc::new(ReservationManager::new(
        Arc::clone(&calendar),
        Arc::clone(&availability),
        Arc::clone(&directory),
        config.max_listed_reservations,
    ));
    let engine = ConversationEngine::new(
        reservations,
        availability,
        directory,
        config.operator_chat_id,
    );
    let messaging = Arc::new(HttpMessagingChannel::new(&config));
    let sessions = Arc::new(SessionRouter::new(
        engine,
        messaging,
        config.operator_chat_id,
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(sessions)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.bind_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
