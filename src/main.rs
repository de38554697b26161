use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use courtbook::config::AppConfig;
use courtbook::db;
use courtbook::handlers;
use courtbook::services::messaging::twilio::TwilioSmsProvider;
use courtbook::services::messaging::{LogOnlyProvider, MessagingProvider};
use courtbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    config.validate()?;

    let conn = db::init_db(&config.database_url)?;

    let messaging: Arc<dyn MessagingProvider> = match TwilioSmsProvider::from_config(&config) {
        Some(twilio) => {
            tracing::info!("sending booking notifications via Twilio");
            Arc::new(twilio)
        }
        None => {
            tracing::warn!("Twilio credentials not set, notifications will only be logged");
            Arc::new(LogOnlyProvider)
        }
    };

    let state = Arc::new(AppState::new(conn, config.clone(), messaging));
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        utc_offset_hours = config.utc_offset_hours,
        "starting server on {addr}"
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
