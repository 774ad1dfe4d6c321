//! Bot module for handling Telegram interactions
//!
//! This module is split into two submodules:
//! - `handlers`: one function per conversation state
//! - `ui`: creates keyboards and formats messages
//!
//! The endpoints here translate raw Telegram updates into normalized
//! events and hand them to the dispatch controller. Per-event failures
//! never escape past this boundary, so one bad update cannot stop the
//! polling loop.

pub mod handlers;
pub mod ui;

use std::sync::Arc;

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::MaybeInaccessibleMessage;
use tracing::debug;

use crate::dispatch::Controller;
use crate::errors::{BotError, BotResult};
use crate::observability;
use crate::state::Event;

/// Translate a Telegram message into a conversation event
///
/// Only text messages carry a payload the conversation understands;
/// anything else (photos, stickers, voice notes) is malformed here.
pub fn event_from_message(msg: &Message) -> BotResult<Event> {
    let text = msg.text().ok_or(BotError::MalformedEvent)?;
    Ok(Event::text(msg.chat.id.0, msg.id.0, text))
}

pub async fn message_handler(msg: Message, controller: Arc<Controller>) -> Result<()> {
    observability::record_telegram_update("message");

    let event = match event_from_message(&msg) {
        Ok(event) => event,
        Err(_) => {
            debug!(chat_id = %msg.chat.id, "Ignoring message without text payload");
            return Ok(());
        }
    };

    // Dispatch failures are already logged and counted by the controller.
    let _ = controller.process(&event).await;
    Ok(())
}

pub async fn callback_handler(bot: Bot, q: CallbackQuery, controller: Arc<Controller>) -> Result<()> {
    observability::record_telegram_update("callback");

    // Use the chat ID from the original message that contained the inline keyboard
    let (chat_id, message_id) = match &q.message {
        Some(MaybeInaccessibleMessage::Regular(msg)) => (msg.chat.id, Some(msg.id.0)),
        Some(MaybeInaccessibleMessage::Inaccessible(_)) | None => (ChatId::from(q.from.id), None),
    };

    match &q.data {
        Some(data) => {
            let event = Event::button(chat_id.0, message_id, data);
            let _ = controller.process(&event).await;
        }
        None => {
            debug!(chat_id = %chat_id, "Ignoring callback query without data");
        }
    }

    // Answer the callback query to remove the loading state
    bot.answer_callback_query(q.id).await?;

    Ok(())
}
