//! Conversation flow tests
//!
//! Drive the dispatch controller through complete conversations over fake
//! commerce and gateway backends, asserting on persisted state, scratch
//! contents and outbound traffic.


use std::sync::Arc;

use anyhow::Result;
use storefront_bot::bot::message_handler;
use storefront_bot::errors::BotError;
use storefront_bot::session_store::SessionStore;
use storefront_bot::state::{Scratch, StateName};
use test_helpers::*;

const CHAT: i64 = 4242;

fn payloads(buttons: &[String]) -> Vec<&str> {
    buttons.iter().map(String::as_str).collect()
}

#[tokio::test]
async fn test_start_sends_menu_and_advances() -> Result<()> {
    let bot = build_bot(sample_products());

    let next = bot.controller.process(&text(CHAT, "/start")).await?;
    assert_eq!(next, StateName::HandleMenu);

    let outbox = bot.gateway.outbox();
    assert_eq!(outbox.len(), 1);
    match &outbox[0] {
        Sent::Message {
            chat_id,
            text,
            buttons,
        } => {
            assert_eq!(*chat_id, CHAT);
            assert_eq!(text, "Please choose:");
            assert_eq!(payloads(buttons), vec!["prod-coffee", "prod-grinder", "cart"]);
        }
        other => panic!("expected menu message, got {:?}", other),
    }

    let session = bot.store.get(CHAT).await?.expect("session stored");
    assert_eq!(session.state, StateName::HandleMenu);
    let menu = session.scratch.menu.expect("menu snapshot stored");
    assert_eq!(menu.entries.len(), 2);

    Ok(())
}

#[tokio::test]
async fn test_product_press_shows_detail_and_deletes_menu() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;

    let next = bot.controller.process(&press(CHAT, "prod-coffee")).await?;
    assert_eq!(next, StateName::HandleDescription);

    let outbox = bot.gateway.outbox();
    assert_eq!(outbox.len(), 3);
    match &outbox[1] {
        Sent::Photo {
            url,
            caption,
            buttons,
            ..
        } => {
            assert_eq!(url, "https://files.test/file-coffee");
            assert_eq!(caption, "Coffee Beans\n\n$12.00 per unit\n\nDark roast, 250g");
            assert_eq!(payloads(buttons), vec!["1", "5", "10", "cart", "back"]);
        }
        other => panic!("expected product photo, got {:?}", other),
    }
    // The menu message that carried the button is dropped
    assert_eq!(
        outbox[2],
        Sent::Deleted {
            chat_id: CHAT,
            message_id: 10
        }
    );

    let session = bot.store.get(CHAT).await?.expect("session stored");
    assert_eq!(
        session.scratch.selected_product_id.as_deref(),
        Some("prod-coffee")
    );
    assert!(session.scratch.menu.is_some());

    Ok(())
}

#[tokio::test]
async fn test_product_without_image_falls_back_to_text() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;

    let next = bot.controller.process(&press(CHAT, "prod-grinder")).await?;
    assert_eq!(next, StateName::HandleDescription);

    match &bot.gateway.outbox()[1] {
        Sent::Message { text, buttons, .. } => {
            assert_eq!(text, "Hand Grinder\n\n$45.00 per unit\n\nCeramic burr");
            assert_eq!(payloads(buttons), vec!["1", "5", "10", "cart", "back"]);
        }
        other => panic!("expected text detail, got {:?}", other),
    }

    Ok(())
}

/// Repeated quantity presses accumulate in the same cart line.
#[tokio::test]
async fn test_quantity_presses_accumulate_in_cart() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "prod-coffee")).await?;

    for quantity in ["5", "10", "1"] {
        let next = bot.controller.process(&press(CHAT, quantity)).await?;
        assert_eq!(next, StateName::HandleDescription);
    }

    assert_eq!(
        bot.commerce.cart_quantities(&CHAT.to_string()),
        vec![("prod-coffee".to_string(), 16)]
    );

    Ok(())
}

#[tokio::test]
async fn test_unknown_payload_in_description_is_ignored() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "prod-coffee")).await?;
    let sends_before = bot.gateway.outbox().len();

    let next = bot.controller.process(&press(CHAT, "seven")).await?;

    assert_eq!(next, StateName::HandleDescription);
    assert!(bot.commerce.cart_quantities(&CHAT.to_string()).is_empty());
    assert_eq!(bot.gateway.outbox().len(), sends_before);

    Ok(())
}

/// A message with no usable payload is dropped whole: nothing goes out
/// and no session row appears.
#[tokio::test]
async fn test_textless_message_is_ignored() -> Result<()> {
    let bot = build_bot(sample_products());
    let controller = Arc::new(bot.controller);

    // Telegram wire shape for a photo-only message.
    let update = serde_json::json!({
        "message_id": 11,
        "date": 1_693_000_000,
        "chat": {"id": CHAT, "type": "private", "first_name": "Shopper"},
        "from": {"id": 42, "is_bot": false, "first_name": "Shopper"},
        "photo": [{
            "file_id": "photo-1",
            "file_unique_id": "photo-1-u",
            "width": 90,
            "height": 51
        }]
    });
    let msg: teloxide::types::Message = serde_json::from_value(update)?;

    message_handler(msg, controller).await?;

    assert!(bot.store.is_empty(), "no session row for an ignored update");
    assert!(bot.gateway.outbox().is_empty());
    assert_eq!(bot.commerce.calls("list_products"), 0);

    Ok(())
}

/// Going back to the menu reuses the snapshot instead of refetching.
#[tokio::test]
async fn test_back_returns_to_menu_without_refetch() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "prod-coffee")).await?;

    let next = bot.controller.process(&press(CHAT, "back")).await?;
    assert_eq!(next, StateName::HandleMenu);
    assert_eq!(bot.commerce.calls("list_products"), 1);

    match bot.gateway.last() {
        Some(Sent::Message { text, .. }) => assert_eq!(text, "Please choose:"),
        other => panic!("expected menu message, got {:?}", other),
    }

    let session = bot.store.get(CHAT).await?.expect("session stored");
    assert_eq!(session.scratch.selected_product_id, None);

    Ok(())
}

/// The `cart` payload short-circuits the stored state from any screen.
#[tokio::test]
async fn test_cart_shortcut_shows_cart_from_menu() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;

    let next = bot.controller.process(&press(CHAT, "cart")).await?;
    assert_eq!(next, StateName::HandleCart);

    match bot.gateway.last() {
        Some(Sent::Message { text, buttons, .. }) => {
            assert_eq!(text, "Total: $0.00");
            assert_eq!(payloads(&buttons), vec!["menu", "pay"]);
        }
        other => panic!("expected cart message, got {:?}", other),
    }

    let session = bot.store.get(CHAT).await?.expect("session stored");
    assert_eq!(session.state, StateName::HandleCart);

    Ok(())
}

/// Repeated `cart` presses stay in cart-viewing states and never drift
/// toward checkout.
#[tokio::test]
async fn test_cart_shortcut_is_idempotent() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "prod-coffee")).await?;

    let first = bot.controller.process(&press(CHAT, "cart")).await?;
    let second = bot.controller.process(&press(CHAT, "cart")).await?;

    assert_eq!(first, StateName::HandleCart);
    assert_eq!(second, StateName::HandleCart);
    assert_eq!(bot.commerce.calls("get_cart"), 2);

    // The shortcut must keep the browsing scratch intact
    let session = bot.store.get(CHAT).await?.expect("session stored");
    assert!(session.scratch.menu.is_some());

    Ok(())
}

/// A complete purchase: menu, detail, add, cart, pay, email, confirmation.
#[tokio::test]
async fn test_full_purchase_flow() -> Result<()> {
    let bot = build_bot(sample_products());

    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "prod-coffee")).await?;
    bot.controller.process(&press(CHAT, "5")).await?;

    let next = bot.controller.process(&press(CHAT, "cart")).await?;
    assert_eq!(next, StateName::HandleCart);
    match bot.gateway.last() {
        Some(Sent::Message { text, .. }) => {
            assert!(text.starts_with("Coffee Beans\n"));
            assert!(text.contains("5 in cart for $60.00"));
            assert!(text.ends_with("Total: $60.00"));
        }
        other => panic!("expected cart message, got {:?}", other),
    }

    let next = bot.controller.process(&press(CHAT, "pay")).await?;
    assert_eq!(next, StateName::WaitingEmail);
    assert_eq!(
        bot.gateway.texts().last().map(String::as_str),
        Some("Please send your email:")
    );

    // An invalid email re-prompts and stays put
    let next = bot.controller.process(&text(CHAT, "not an email")).await?;
    assert_eq!(next, StateName::WaitingEmail);
    assert_eq!(
        bot.gateway.texts().last().map(String::as_str),
        Some("'not an email' does not look like a valid email. Please try again.")
    );
    assert!(bot.commerce.customers().is_empty());

    // A valid email creates the customer and confirms
    let next = bot
        .controller
        .process(&text(CHAT, " buyer@example.com "))
        .await?;
    assert_eq!(next, StateName::ShowCart);
    assert_eq!(bot.commerce.customers(), vec!["buyer@example.com"]);
    assert_eq!(
        bot.gateway.texts().last().map(String::as_str),
        Some("You sent me this email: buyer@example.com")
    );

    // The next message lands on the cart view again
    let next = bot.controller.process(&text(CHAT, "anything")).await?;
    assert_eq!(next, StateName::HandleCart);

    Ok(())
}

/// `/start` resets the conversation from any state and rebuilds the menu.
#[tokio::test]
async fn test_start_resets_mid_flow() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "prod-coffee")).await?;

    let next = bot.controller.process(&text(CHAT, "/start")).await?;
    assert_eq!(next, StateName::HandleMenu);

    // Reset refetches the catalog rather than trusting the snapshot
    assert_eq!(bot.commerce.calls("list_products"), 2);

    let session = bot.store.get(CHAT).await?.expect("session stored");
    assert_eq!(session.state, StateName::HandleMenu);
    assert_eq!(session.scratch.selected_product_id, None);

    Ok(())
}

/// A chat without a session is an error for ordinary payloads, never a
/// silent reset.
#[tokio::test]
async fn test_missing_session_is_error_not_reset() -> Result<()> {
    let bot = build_bot(sample_products());

    let err = bot
        .controller
        .process(&text(CHAT, "hello"))
        .await
        .expect_err("dispatch must fail without a session");

    assert_eq!(err, BotError::MissingSession { chat_id: CHAT });
    assert!(bot.store.is_empty());
    assert!(bot.gateway.outbox().is_empty());

    Ok(())
}

/// Scenario: the commerce backend fails, the chat stays where it was and
/// recovers once the backend does.
#[tokio::test]
async fn test_commerce_failure_keeps_state() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;

    bot.commerce.fail_on("get_product");
    let err = bot
        .controller
        .process(&press(CHAT, "prod-coffee"))
        .await
        .expect_err("handler failure must surface");
    assert!(matches!(err, BotError::ExternalService { .. }));

    let session = bot.store.get(CHAT).await?.expect("session kept");
    assert_eq!(session.state, StateName::HandleMenu);
    assert!(session.scratch.menu.is_some());

    bot.commerce.recover("get_product");
    let next = bot.controller.process(&press(CHAT, "prod-coffee")).await?;
    assert_eq!(next, StateName::HandleDescription);

    Ok(())
}

#[tokio::test]
async fn test_gateway_failure_prevents_state_advance() -> Result<()> {
    let bot = build_bot(sample_products());

    bot.gateway.fail_sends(true);
    let err = bot
        .controller
        .process(&text(CHAT, "/start"))
        .await
        .expect_err("send failure must surface");
    assert!(matches!(err, BotError::Gateway(_)));
    assert!(bot.store.is_empty());

    bot.gateway.fail_sends(false);
    let next = bot.controller.process(&text(CHAT, "/start")).await?;
    assert_eq!(next, StateName::HandleMenu);

    Ok(())
}

/// Removing a product with no cart line is an external-service failure,
/// exactly like the backend rejecting the call.
#[tokio::test]
async fn test_remove_absent_product_is_external_error() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "cart")).await?;

    let err = bot
        .controller
        .process(&press(CHAT, "prod-coffee"))
        .await
        .expect_err("removal of an absent product must fail");
    assert!(matches!(
        err,
        BotError::ExternalService {
            status: Some(404),
            ..
        }
    ));

    let session = bot.store.get(CHAT).await?.expect("session kept");
    assert_eq!(session.state, StateName::HandleCart);

    Ok(())
}

#[tokio::test]
async fn test_remove_present_product_empties_cart() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "prod-coffee")).await?;
    bot.controller.process(&press(CHAT, "5")).await?;
    bot.controller.process(&press(CHAT, "cart")).await?;

    let next = bot.controller.process(&press(CHAT, "prod-coffee")).await?;
    assert_eq!(next, StateName::HandleCart);
    assert!(bot.commerce.cart_quantities(&CHAT.to_string()).is_empty());

    Ok(())
}

#[tokio::test]
async fn test_menu_button_returns_from_cart() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&press(CHAT, "cart")).await?;

    let next = bot.controller.process(&press(CHAT, "menu")).await?;
    assert_eq!(next, StateName::HandleMenu);
    match bot.gateway.last() {
        Some(Sent::Message { text, .. }) => assert_eq!(text, "Please choose:"),
        other => panic!("expected menu message, got {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_echo_state_repeats_text() -> Result<()> {
    let bot = build_bot(sample_products());
    bot.store
        .set(CHAT, StateName::Echo, &Scratch::default())
        .await?;

    let next = bot.controller.process(&text(CHAT, "hello there")).await?;
    assert_eq!(next, StateName::Echo);
    assert_eq!(
        bot.gateway.last(),
        Some(Sent::Message {
            chat_id: CHAT,
            text: "hello there".to_string(),
            buttons: Vec::new(),
        })
    );

    Ok(())
}

/// Different chats never share sessions or carts.
#[tokio::test]
async fn test_chats_are_isolated() -> Result<()> {
    let bot = build_bot(sample_products());
    let other = CHAT + 1;

    bot.controller.process(&text(CHAT, "/start")).await?;
    bot.controller.process(&text(other, "/start")).await?;
    bot.controller.process(&press(CHAT, "prod-coffee")).await?;
    bot.controller.process(&press(CHAT, "5")).await?;

    assert_eq!(
        bot.commerce.cart_quantities(&CHAT.to_string()),
        vec![("prod-coffee".to_string(), 5)]
    );
    assert!(bot.commerce.cart_quantities(&other.to_string()).is_empty());

    let session = bot.store.get(other).await?.expect("other session stored");
    assert_eq!(session.state, StateName::HandleMenu);
    assert_eq!(session.scratch.selected_product_id, None);

    Ok(())
}
