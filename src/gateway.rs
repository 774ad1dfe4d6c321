//! Outbound chat operations
//!
//! The handlers talk to the chat platform through [`ChatGateway`], a small
//! trait covering the three operations the conversation actually uses:
//! sending text, sending a photo with caption, and deleting a message.
//! Keyboards are expressed transport-neutrally and converted to Telegram
//! inline keyboards at the edge, so handler tests can assert on button
//! payloads without touching teloxide types.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId};

use crate::errors::{error_logging, BotError, BotResult};

/// One inline button: visible label plus the payload sent back on press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

impl Button {
    pub fn new(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Button {
            label: label.into(),
            payload: payload.into(),
        }
    }
}

/// Rows of inline buttons attached to an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new(rows: Vec<Vec<Button>>) -> Self {
        Keyboard { rows }
    }
}

/// Seam between the state handlers and the chat platform.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    /// Send a text message, optionally with an inline keyboard.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()>;

    /// Send a photo by URL with a caption, optionally with an inline keyboard.
    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()>;

    /// Delete a previously sent message.
    async fn delete_message(&self, chat_id: i64, message_id: i32) -> BotResult<()>;
}

fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.rows.iter().map(|row| {
        row.iter()
            .map(|button| {
                InlineKeyboardButton::callback(button.label.clone(), button.payload.clone())
            })
            .collect::<Vec<_>>()
    }))
}

/// Telegram implementation of [`ChatGateway`].
pub struct TelegramGateway {
    bot: Bot,
}

impl TelegramGateway {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }

        match request.await {
            Ok(_) => Ok(()),
            Err(err) => {
                let mapped = BotError::from(err);
                error_logging::log_gateway_error(&mapped, "send_message", chat_id);
                Err(mapped)
            }
        }
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo_url: &str,
        caption: &str,
        keyboard: Option<&Keyboard>,
    ) -> BotResult<()> {
        let url = reqwest::Url::parse(photo_url)
            .map_err(|err| BotError::Gateway(format!("invalid photo url: {}", err)))?;

        let mut request = self
            .bot
            .send_photo(ChatId(chat_id), InputFile::url(url))
            .caption(caption.to_string());
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(to_markup(keyboard));
        }

        match request.await {
            Ok(_) => Ok(()),
            Err(err) => {
                let mapped = BotError::from(err);
                error_logging::log_gateway_error(&mapped, "send_photo", chat_id);
                Err(mapped)
            }
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> BotResult<()> {
        match self
            .bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let mapped = BotError::from(err);
                error_logging::log_gateway_error(&mapped, "delete_message", chat_id);
                Err(mapped)
            }
        }
    }
}
