use anyhow::Result;
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use meal_planner::bot;
use meal_planner::catalog::CatalogStore;
use meal_planner::config::Config;
use meal_planner::db;
use meal_planner::dialogue::AddMealDialogueState;
use meal_planner::localization::init_localization;
use meal_planner::memory_store::InMemoryStore;
use meal_planner::planner::MealPlanner;
use meal_planner::selection::SelectionStore;
use meal_planner::sheets::{ServiceAccountKey, SheetsClient};
use meal_planner::sync::{self, SyncCoordinator};
use meal_planner::week::{Clock, SystemClock};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Initialize logging
    init_tracing();

    info!("Starting Meal Planner Telegram Bot");

    let config = Config::from_env()?;
    config.ensure_credentials_exist()?;
    init_localization()?;

    let key = ServiceAccountKey::from_file(&config.credentials_path)?;
    let source = Arc::new(SheetsClient::new(key, config.sheet.clone(), config.external_timeout)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(config.timezone));

    match config.database_url.as_deref() {
        Some(database_url) => {
            let pool = db::connect(
                database_url,
                config.database_max_connections,
                config.external_timeout,
            )
            .await?;

            // Closes the pool itself when the schema cannot be created
            let store = Arc::new(db::open_store(pool, config.external_timeout).await?);
            let result = serve(&config, Arc::clone(&store), source, clock).await;

            // Release connections whether or not the bot exited cleanly
            store.close().await;
            result
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory store; selections are lost on restart");
            serve(&config, Arc::new(InMemoryStore::new()), source, clock).await
        }
    }
}

async fn serve<S>(
    config: &Config,
    store: Arc<S>,
    source: Arc<SheetsClient>,
    clock: Arc<dyn Clock>,
) -> Result<()>
where
    S: CatalogStore + SelectionStore + 'static,
{
    let coordinator = Arc::new(SyncCoordinator::new(
        Arc::clone(&source),
        Arc::clone(&store),
        Arc::clone(&clock),
        config.external_timeout,
    ));

    // Initial sync on startup, before any user interaction
    match coordinator.run().await {
        Ok(outcome) => info!(outcome = ?outcome, "Initial meal sync finished"),
        Err(e) => error!(error = %e, "Initial meal sync failed"),
    }
    let daily_sync = sync::spawn_daily(Arc::clone(&coordinator), config.timezone, config.sync_time);

    let planner = Arc::new(MealPlanner::new(
        store,
        source,
        clock,
        config.admin_user_ids.clone(),
    ));
    let handler = bot::schema(planner);

    // Initialize the bot
    let bot = Bot::new(&config.telegram_token);

    info!("Bot is running. Polling for messages...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![InMemStorage::<AddMealDialogueState>::new()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    daily_sync.abort();
    info!("Bot stopped");
    Ok(())
}
