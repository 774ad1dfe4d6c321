//! State handlers
//!
//! One async function per conversation state. Each handler performs its
//! side effects through the commerce and gateway seams and returns the
//! [`Transition`] to persist. Handlers never write the session themselves;
//! on any error the controller leaves the stored state untouched.

use tracing::{debug, info};

use crate::bot::ui;
use crate::commerce::CommerceApi;
use crate::errors::BotResult;
use crate::gateway::ChatGateway;
use crate::state::{Event, MenuEntry, MenuSnapshot, Scratch, StateName, Transition};
use crate::validation;

/// Fetch the catalog and reduce it to menu entries.
async fn fetch_entries(commerce: &dyn CommerceApi) -> BotResult<Vec<MenuEntry>> {
    let products = commerce.list_products().await?;
    Ok(products
        .into_iter()
        .map(|product| MenuEntry {
            id: product.id,
            name: product.name,
        })
        .collect())
}

/// Send the product menu, preferring the snapshot taken on the last render
/// and falling back to a catalog refetch when none is stored.
async fn render_menu(
    commerce: &dyn CommerceApi,
    gateway: &dyn ChatGateway,
    chat_id: i64,
    scratch: &Scratch,
) -> BotResult<Scratch> {
    let entries = match &scratch.menu {
        Some(snapshot) => snapshot.entries.clone(),
        None => fetch_entries(commerce).await?,
    };

    gateway
        .send_message(chat_id, ui::MENU_PROMPT, Some(&ui::menu_keyboard(&entries)))
        .await?;

    Ok(Scratch {
        selected_product_id: None,
        menu: Some(MenuSnapshot { entries }),
    })
}

/// Fetch the cart for a chat and send the rendered view with its keyboard.
async fn render_cart(
    commerce: &dyn CommerceApi,
    gateway: &dyn ChatGateway,
    chat_id: i64,
) -> BotResult<()> {
    let cart = commerce.get_cart(&chat_id.to_string()).await?;
    gateway
        .send_message(
            chat_id,
            &ui::cart_text(&cart),
            Some(&ui::cart_keyboard(&cart)),
        )
        .await
}

/// `/start` (and any event in the `Start` state): send a fresh product menu.
pub async fn start(
    commerce: &dyn CommerceApi,
    gateway: &dyn ChatGateway,
    event: &Event,
) -> BotResult<Transition> {
    let entries = fetch_entries(commerce).await?;
    gateway
        .send_message(
            event.chat_id,
            ui::MENU_PROMPT,
            Some(&ui::menu_keyboard(&entries)),
        )
        .await?;

    debug!(chat_id = %event.chat_id, products = entries.len(), "menu sent");

    Ok(Transition::new(
        StateName::HandleMenu,
        Scratch {
            selected_product_id: None,
            menu: Some(MenuSnapshot { entries }),
        },
    ))
}

/// Echo the payload back verbatim and stay.
pub async fn echo(
    gateway: &dyn ChatGateway,
    event: &Event,
    scratch: &Scratch,
) -> BotResult<Transition> {
    gateway
        .send_message(event.chat_id, event.payload.text(), None)
        .await?;
    Ok(Transition::new(StateName::Echo, scratch.clone()))
}

/// Menu screen: the payload is a product id. Show the product detail and
/// remember the selection.
pub async fn handle_menu(
    commerce: &dyn CommerceApi,
    gateway: &dyn ChatGateway,
    event: &Event,
    scratch: &Scratch,
) -> BotResult<Transition> {
    let product = commerce.get_product(event.payload.text()).await?;

    let caption = ui::product_caption(&product);
    let keyboard = ui::description_keyboard();

    match &product.main_image_id {
        Some(file_id) => {
            let url = commerce.get_image_url(file_id).await?;
            gateway
                .send_photo(event.chat_id, &url, &caption, Some(&keyboard))
                .await?;
        }
        None => {
            gateway
                .send_message(event.chat_id, &caption, Some(&keyboard))
                .await?;
        }
    }

    // One screen at a time: drop the menu message that carried the button.
    if let Some(message_id) = event.message_id {
        gateway.delete_message(event.chat_id, message_id).await?;
    }

    Ok(Transition::new(
        StateName::HandleDescription,
        Scratch {
            selected_product_id: Some(product.id),
            menu: scratch.menu.clone(),
        },
    ))
}

/// Product detail screen: navigate back, peek at the cart, or add the
/// selected product in the pressed quantity.
pub async fn handle_description(
    commerce: &dyn CommerceApi,
    gateway: &dyn ChatGateway,
    event: &Event,
    scratch: &Scratch,
) -> BotResult<Transition> {
    let payload = event.payload.text();

    if payload == "back" {
        let scratch = render_menu(commerce, gateway, event.chat_id, scratch).await?;
        return Ok(Transition::new(StateName::HandleMenu, scratch));
    }

    // Normally intercepted by the dispatch shortcut; kept so the handler
    // honors its contract when invoked directly.
    if payload == "cart" {
        render_cart(commerce, gateway, event.chat_id).await?;
        return Ok(Transition::new(StateName::HandleDescription, scratch.clone()));
    }

    if let Some(quantity) = validation::parse_quantity(payload) {
        match &scratch.selected_product_id {
            Some(product_id) => {
                commerce
                    .add_cart_item(&event.chat_id.to_string(), product_id, quantity)
                    .await?;
                debug!(
                    chat_id = %event.chat_id,
                    product_id = %product_id,
                    quantity = quantity,
                    "added to cart"
                );
            }
            None => {
                debug!(chat_id = %event.chat_id, "quantity pressed with no product selected");
            }
        }
        return Ok(Transition::new(StateName::HandleDescription, scratch.clone()));
    }

    debug!(chat_id = %event.chat_id, payload = %payload, "payload ignored");
    Ok(Transition::new(StateName::HandleDescription, scratch.clone()))
}

/// Cart screen: fetch and render the cart, then hand over to cart actions.
pub async fn show_cart(
    commerce: &dyn CommerceApi,
    gateway: &dyn ChatGateway,
    event: &Event,
    scratch: &Scratch,
) -> BotResult<Transition> {
    render_cart(commerce, gateway, event.chat_id).await?;
    Ok(Transition::new(StateName::HandleCart, scratch.clone()))
}

/// Cart actions: back to the menu, start checkout, or remove a line.
pub async fn handle_cart(
    commerce: &dyn CommerceApi,
    gateway: &dyn ChatGateway,
    event: &Event,
    scratch: &Scratch,
) -> BotResult<Transition> {
    let payload = event.payload.text();

    if payload == "menu" {
        let scratch = render_menu(commerce, gateway, event.chat_id, scratch).await?;
        return Ok(Transition::new(StateName::HandleMenu, scratch));
    }

    if payload == "pay" {
        gateway
            .send_message(event.chat_id, ui::EMAIL_PROMPT, None)
            .await?;
        return Ok(Transition::new(StateName::WaitingEmail, scratch.clone()));
    }

    // Anything else is a removal button carrying a product id.
    commerce
        .remove_cart_item(&event.chat_id.to_string(), payload)
        .await?;
    debug!(chat_id = %event.chat_id, product_id = %payload, "cart line removed");

    Ok(Transition::new(StateName::HandleCart, scratch.clone()))
}

/// Checkout: validate the typed email, create the customer record and
/// confirm.
pub async fn waiting_email(
    commerce: &dyn CommerceApi,
    gateway: &dyn ChatGateway,
    event: &Event,
    scratch: &Scratch,
) -> BotResult<Transition> {
    let text = event.payload.text();

    let email = match validation::validate_email(text) {
        Ok(email) => email,
        Err(reason) => {
            debug!(chat_id = %event.chat_id, reason = %reason, "email rejected");
            gateway
                .send_message(event.chat_id, &ui::email_reprompt(text), None)
                .await?;
            return Ok(Transition::new(StateName::WaitingEmail, scratch.clone()));
        }
    };

    let customer_id = commerce.create_customer(email).await?;
    info!(chat_id = %event.chat_id, customer_id = %customer_id, "customer created");

    gateway
        .send_message(event.chat_id, &ui::email_confirmation(email), None)
        .await?;

    Ok(Transition::new(StateName::ShowCart, scratch.clone()))
}
