mod bot_logic;
mod config;
mod database;
mod error;
mod messenger;

use std::sync::Arc;

use axum::{routing::get, Router};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bot_logic::{spawn_event_loop, DispatchSettings, Dispatcher};
use config::Config;
use database::PgStore;
use messenger::{spawn_delivery_loop, MessengerClient, WebhookState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    let pool = PgPool::connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("database connected");

    let client = MessengerClient::new(&config.graph_api_base, &config.page_access_token);
    let (scheduler, _delivery) = spawn_delivery_loop(Arc::new(client.clone()));

    let dispatcher = Dispatcher::new(PgStore::new(pool), client, DispatchSettings::from(&config));
    let (events, _event_loop) = spawn_event_loop(dispatcher, scheduler);

    let state = WebhookState { verify_token: config.verify_token.clone(), events };
    let app = Router::new()
        .route(
            "/webhook",
            get(messenger::handle_verify_webhook).post(messenger::handle_receive_event),
        )
        .with_state(state);

    info!(addr = %config.bind_addr, "webhook server listening");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
