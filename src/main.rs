use anyhow::{Context, Result};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use calories::bot::{callback_handler, message_handler, BotState};
use calories::config::{AnalysisMode, BotConfig, LogFormat};
use calories::dispatcher::Command;
use calories::localization::init_localization;
use calories::webhook::{self, WebhookState};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let mut config = BotConfig::from_env().context("Invalid bot configuration")?;
    init_tracing(config.log_format);
    init_localization();

    info!(
        require_registration = config.require_registration,
        rich_welcome = config.rich_welcome,
        forwarding = matches!(config.analysis, AnalysisMode::Forward { .. }),
        "Starting Calories.fun Telegram Bot"
    );

    let api_url = reqwest::Url::parse(&config.telegram_api_url)
        .with_context(|| format!("Invalid TELEGRAM_API_URL {}", config.telegram_api_url))?;
    let bot = Bot::new(config.bot_token.clone()).set_api_url(api_url);

    if config.bot_username.is_none() {
        match bot.get_me().await {
            Ok(me) => config.bot_username = me.user.username.clone(),
            Err(e) => warn!(error = %e, "Could not resolve bot username, using placeholder for referral links"),
        }
    }

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "Failed to register bot commands");
    }

    if let Some(addr) = config.webhook_addr {
        let webhook_state = WebhookState::from_config(&config);
        tokio::spawn(async move {
            if let Err(e) = webhook::serve(addr, webhook_state).await {
                error!(error = %e, "Webhook receiver failed");
            }
        });
    }

    let state = Arc::new(BotState::new(config).context("Failed to initialize photo analysis")?);

    info!("Bot initialized, starting dispatcher");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Calories.fun bot stopped");
    Ok(())
}
