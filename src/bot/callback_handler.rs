//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{debug, error};

use crate::dispatcher::{EventKind, InboundEvent};

use super::message_handler::execute_outcome;
use super::BotState;

/// Handle callback queries from inline keyboards
pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: Arc<BotState>) -> Result<()> {
    debug!(user_id = %q.from.id, "Received callback query from user");

    let result = if let Some(msg) = &q.message {
        let chat_id = msg.chat().id;
        let event = InboundEvent {
            user_id: Some(q.from.id.0),
            chat_id: chat_id.0,
            kind: EventKind::Callback(q.data.clone().unwrap_or_default()),
        };

        let outcome = state.dispatcher.handle(&event);
        execute_outcome(&bot, chat_id, outcome, &state).await
    } else {
        debug!(user_id = %q.from.id, "Callback query without a message, ignoring");
        Ok(())
    };

    if let Err(e) = &result {
        error!(user_id = %q.from.id, error = %e, "Failed to answer callback");
    }

    // The loading state is removed even when the reply could not be sent
    bot.answer_callback_query(q.id).await?;

    result
}
