//! Message Handler module for processing incoming Telegram messages

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, PhotoSize};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};

use crate::analysis::{
    file_download_url, simulate_calorie_analysis, AnalysisError, Analyzer, PhotoSubmission,
    PhotoVariant,
};
use crate::dispatcher::{
    analysis_failed_reply, estimate_reply, Command, Effect, EventKind, InboundEvent, Outcome,
    Reply,
};

use super::ui_builder::create_welcome_keyboard;
use super::BotState;

/// Convert a Telegram photo size into a transport-neutral variant
pub fn photo_variant(photo: &PhotoSize) -> PhotoVariant {
    PhotoVariant {
        file_id: photo.file.id.0.clone(),
        file_unique_id: photo.file.unique_id.0.clone(),
        width: photo.width,
        height: photo.height,
        file_size: Some(photo.file.size),
    }
}

/// Reduce a Telegram message to an event for the dispatcher.
///
/// Texts that do not parse as a known command are plain text.
pub fn event_from_message(msg: &Message, bot_username: &str) -> InboundEvent {
    let kind = if let Some(text) = msg.text() {
        match Command::parse(text, bot_username) {
            Ok(command) => EventKind::Command(command),
            Err(_) => EventKind::Text(text.to_string()),
        }
    } else if let Some(photos) = msg.photo() {
        EventKind::Photo(photos.iter().map(photo_variant).collect())
    } else {
        EventKind::Other
    };

    InboundEvent {
        user_id: msg.from.as_ref().map(|user| user.id.0),
        chat_id: msg.chat.id.0,
        kind,
    }
}

async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply, state: &BotState) -> Result<()> {
    match reply {
        Reply::Text(text) => {
            bot.send_message(chat_id, text).await?;
        }
        Reply::WelcomeCard { caption } => {
            let keyboard = create_welcome_keyboard(&state.config.website_url);
            match reqwest::Url::parse(&state.config.welcome_image_url) {
                Ok(image_url) => {
                    bot.send_photo(chat_id, InputFile::url(image_url))
                        .caption(caption)
                        .reply_markup(keyboard)
                        .await?;
                }
                Err(e) => {
                    warn!(
                        image_url = %state.config.welcome_image_url,
                        error = %e,
                        "Invalid welcome image URL, sending text welcome"
                    );
                    bot.send_message(chat_id, caption)
                        .reply_markup(keyboard)
                        .await?;
                }
            }
        }
    }
    Ok(())
}

/// Resolve the download URL of a Telegram file
pub async fn resolve_file_url(
    bot: &Bot,
    file_id: &str,
    api_url: &str,
) -> Result<String, AnalysisError> {
    let file = bot
        .get_file(FileId(file_id.to_string()))
        .await
        .map_err(|e| AnalysisError::FileUrl {
            file_id: file_id.to_string(),
            reason: e.to_string(),
        })?;

    Ok(file_download_url(api_url, bot.token(), &file.path))
}

/// Run the analysis backend. Returns the estimate when the bot has to answer
/// itself, `None` when the photo was handed to the forwarding service.
async fn analyze_photo(
    bot: &Bot,
    state: &BotState,
    chat_id: i64,
    user_id: u64,
    photo: PhotoVariant,
) -> Result<Option<u32>, AnalysisError> {
    match &state.analyzer {
        Analyzer::Stub => Ok(Some(simulate_calorie_analysis(&photo))),
        Analyzer::Forward(client) => {
            let file_url =
                resolve_file_url(bot, &photo.file_id, &state.config.telegram_api_url).await?;
            let submission = PhotoSubmission {
                chat_id,
                user_id,
                photo,
                file_url,
            };
            client.forward(&submission).await?;
            Ok(None)
        }
    }
}

async fn run_effect(bot: &Bot, chat_id: ChatId, effect: Effect, state: &BotState) -> Result<()> {
    match effect {
        Effect::AnalyzePhoto {
            chat_id: event_chat_id,
            user_id,
            photo,
        } => match analyze_photo(bot, state, event_chat_id, user_id, photo).await {
            Ok(Some(calories)) => {
                info!(user_id, calories, "Sending calorie estimate");
                send_reply(bot, chat_id, &estimate_reply(calories), state).await?;
            }
            Ok(None) => {
                debug!(user_id, "Photo handed to analysis service");
            }
            Err(e) => {
                error!(user_id, error = %e, "Error processing photo");
                send_reply(bot, chat_id, &analysis_failed_reply(), state).await?;
            }
        },
    }
    Ok(())
}

/// Send the replies of `outcome` in order, then run its effect
pub async fn execute_outcome(
    bot: &Bot,
    chat_id: ChatId,
    outcome: Outcome,
    state: &BotState,
) -> Result<()> {
    for reply in &outcome.replies {
        send_reply(bot, chat_id, reply, state).await?;
    }

    if let Some(effect) = outcome.effect {
        run_effect(bot, chat_id, effect, state).await?;
    }

    Ok(())
}

pub async fn message_handler(bot: Bot, msg: Message, state: Arc<BotState>) -> Result<()> {
    let event = event_from_message(&msg, state.command_username());
    debug!(
        user_id = ?event.user_id,
        chat_id = event.chat_id,
        "Received message from user"
    );

    let outcome = state.dispatcher.handle(&event);
    execute_outcome(&bot, msg.chat.id, outcome, &state).await
}
