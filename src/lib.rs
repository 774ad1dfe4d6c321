//! # Storefront Telegram Bot
//!
//! A Telegram bot that sells a product catalog through an inline-keyboard
//! conversation, keeping each chat's position in the flow in PostgreSQL
//! and driving carts and checkout through an external commerce API.

pub mod bot;
pub mod cache;
pub mod commerce;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod gateway;
pub mod observability;
pub mod session_store;
pub mod state;
pub mod validation;

// Re-export types for easier access
pub use state::{Event, EventPayload, Scratch, Session, StateName, Transition};
