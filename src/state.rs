//! # Conversation State Types
//!
//! Types describing where a chat currently sits in the conversation and the
//! small per-chat scratch data carried alongside. State names are persisted
//! as fixed literal strings; parsing an unknown literal is an error rather
//! than a silent reset so corrupted rows surface in the logs.

use serde::{Deserialize, Serialize};

/// Closed set of conversation states. Each variant maps 1:1 to a persisted
/// literal and to exactly one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateName {
    Start,
    Echo,
    HandleMenu,
    HandleDescription,
    ShowCart,
    HandleCart,
    WaitingEmail,
}

impl StateName {
    /// Every state, in handler-table order.
    pub const ALL: [StateName; 7] = [
        StateName::Start,
        StateName::Echo,
        StateName::HandleMenu,
        StateName::HandleDescription,
        StateName::ShowCart,
        StateName::HandleCart,
        StateName::WaitingEmail,
    ];

    /// The literal stored in the session row for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::Start => "START",
            StateName::Echo => "ECHO",
            StateName::HandleMenu => "HANDLE_MENU",
            StateName::HandleDescription => "HANDLE_DESCRIPTION",
            StateName::ShowCart => "SHOW_CART",
            StateName::HandleCart => "HANDLE_CART",
            StateName::WaitingEmail => "WAITING_EMAIL",
        }
    }

    /// Parse a persisted literal. Returns `None` for anything outside the
    /// closed set; callers decide how loudly to fail.
    pub fn parse(value: &str) -> Option<StateName> {
        match value {
            "START" => Some(StateName::Start),
            "ECHO" => Some(StateName::Echo),
            "HANDLE_MENU" => Some(StateName::HandleMenu),
            "HANDLE_DESCRIPTION" => Some(StateName::HandleDescription),
            "SHOW_CART" => Some(StateName::ShowCart),
            "HANDLE_CART" => Some(StateName::HandleCart),
            "WAITING_EMAIL" => Some(StateName::WaitingEmail),
            _ => None,
        }
    }
}

impl std::fmt::Display for StateName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One menu entry remembered from the last catalog render. Quantity buttons
/// carry bare amounts, so the selected product must survive between turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuEntry {
    pub id: String,
    pub name: String,
}

/// Ordered snapshot of the products shown on the last menu render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuSnapshot {
    pub entries: Vec<MenuEntry>,
}

/// Per-chat scratch data persisted next to the state name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scratch {
    /// Product the chat is currently viewing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_product_id: Option<String>,
    /// Menu snapshot from the last catalog render, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub menu: Option<MenuSnapshot>,
}

/// A chat's stored conversation position.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub chat_id: i64,
    pub state: StateName,
    pub scratch: Scratch,
}

/// Successful handler outcome: where the chat goes next and the scratch to
/// persist along with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub next: StateName,
    pub scratch: Scratch,
}

impl Transition {
    pub fn new(next: StateName, scratch: Scratch) -> Self {
        Transition { next, scratch }
    }
}

/// Payload of an inbound chat event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Reserved command, text starting with `/`.
    Command(String),
    /// Plain text message typed by the user.
    Text(String),
    /// Data attached to a pressed inline button.
    ButtonPress(String),
}

impl EventPayload {
    /// The payload string, regardless of how it arrived.
    pub fn text(&self) -> &str {
        match self {
            EventPayload::Command(c) => c,
            EventPayload::Text(t) => t,
            EventPayload::ButtonPress(d) => d,
        }
    }
}

/// One inbound event, normalized away from transport specifics.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub chat_id: i64,
    /// Message the event originated from. For button presses this is the
    /// message carrying the keyboard.
    pub message_id: Option<i32>,
    pub payload: EventPayload,
}

impl Event {
    pub fn text(chat_id: i64, message_id: i32, text: impl Into<String>) -> Self {
        let text = text.into();
        let payload = if text.starts_with('/') {
            EventPayload::Command(text)
        } else {
            EventPayload::Text(text)
        };

        Event {
            chat_id,
            message_id: Some(message_id),
            payload,
        }
    }

    pub fn button(chat_id: i64, message_id: Option<i32>, data: impl Into<String>) -> Self {
        Event {
            chat_id,
            message_id,
            payload: EventPayload::ButtonPress(data.into()),
        }
    }
}
