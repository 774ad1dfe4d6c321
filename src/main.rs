use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use storefront_bot::bot;
use storefront_bot::commerce::CommerceClient;
use storefront_bot::config::AppConfig;
use storefront_bot::dispatch::Controller;
use storefront_bot::gateway::TelegramGateway;
use storefront_bot::observability;
use storefront_bot::session_store::{init_session_schema, PgSessionStore};
use teloxide::prelude::*;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Pull in .env before anything reads the environment
    dotenvy::dotenv().ok();

    // Logging comes up first so every later step can report
    observability::init_tracing()?;

    // Refuse to start on invalid configuration
    let config = AppConfig::from_env()?;
    config.validate()?;
    info!("{}", config.summary());

    // Postgres pool backing the session store
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    init_session_schema(&pool).await?;

    // The health checks hold their own Arc; the store keeps the plain pool
    let shared_pool = Arc::new(pool.clone());

    // Metrics and health listeners run for the life of the process
    observability::init_metrics_and_health(
        &config.server,
        Some(Arc::clone(&shared_pool)),
        Some(config.bot.token.clone()),
    )
    .await?;

    let commerce = Arc::new(CommerceClient::new(&config.commerce)?);

    // Telegram client with an explicit request timeout
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.bot.http_timeout_secs))
        .build()?;
    let bot = Bot::with_client(config.bot.token.clone(), client);

    let gateway = Arc::new(TelegramGateway::new(bot.clone()));
    let store = Arc::new(PgSessionStore::new(pool));

    let controller = Arc::new(Controller::new(store, commerce, gateway));

    info!("bot wired up, entering long polling");

    // Route messages and button presses to the shared controller
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let controller = Arc::clone(&controller);
            move |msg: Message| {
                let controller = Arc::clone(&controller);
                async move { bot::message_handler(msg, controller).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let controller = Arc::clone(&controller);
            move |bot: Bot, q: CallbackQuery| {
                let controller = Arc::clone(&controller);
                async move { bot::callback_handler(bot, q, controller).await }
            }
        }));

    Dispatcher::builder(bot, handler)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
