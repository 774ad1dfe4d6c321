//! UI builder module for creating keyboards and formatting messages

use crate::commerce::{Cart, Product};
use crate::gateway::{Button, Keyboard};
use crate::state::MenuEntry;

/// Prompt shown above the product menu
pub const MENU_PROMPT: &str = "Please choose:";

/// Prompt asking for the checkout email
pub const EMAIL_PROMPT: &str = "Please send your email:";

/// Truncate long product names so they fit on a button
fn truncate_label(name: &str) -> String {
    if name.chars().count() > 30 {
        let short: String = name.chars().take(27).collect();
        format!("{}...", short)
    } else {
        name.to_string()
    }
}

/// Create the product menu keyboard: one button per product plus a fixed
/// cart button
pub fn menu_keyboard(entries: &[MenuEntry]) -> Keyboard {
    let mut rows = Vec::new();

    for entry in entries {
        rows.push(vec![Button::new(
            truncate_label(&entry.name),
            entry.id.clone(),
        )]);
    }

    rows.push(vec![Button::new("Cart", "cart")]);

    Keyboard::new(rows)
}

/// Format the product detail caption
pub fn product_caption(product: &Product) -> String {
    format!(
        "{}\n\n{} per unit\n\n{}",
        product.name, product.price, product.description
    )
}

/// Create the product detail keyboard: a quantity row with the cart
/// and back rows beneath it
pub fn description_keyboard() -> Keyboard {
    Keyboard::new(vec![
        vec![
            Button::new("1", "1"),
            Button::new("5", "5"),
            Button::new("10", "10"),
        ],
        vec![Button::new("Cart", "cart")],
        vec![Button::new("Back", "back")],
    ])
}

/// Format the cart contents as one text block per line item, ending with
/// the formatted total
pub fn cart_text(cart: &Cart) -> String {
    let mut text = String::new();

    for item in &cart.items {
        text.push_str(&format!(
            "{}\n{}\n{} per unit\n{} in cart for {}\n\n",
            item.name, item.description, item.unit_price, item.quantity, item.line_price
        ));
    }

    text.push_str(&format!("Total: {}", cart.total));
    text
}

/// Create the cart keyboard: one remove button per line item, keyed by
/// product id, plus fixed menu and pay buttons
pub fn cart_keyboard(cart: &Cart) -> Keyboard {
    let mut rows = Vec::new();

    for item in &cart.items {
        rows.push(vec![Button::new(
            format!("Remove {}", truncate_label(&item.name)),
            item.product_id.clone(),
        )]);
    }

    rows.push(vec![Button::new("Menu", "menu"), Button::new("Pay", "pay")]);

    Keyboard::new(rows)
}

/// Confirmation echoed back after a valid checkout email
pub fn email_confirmation(email: &str) -> String {
    format!("You sent me this email: {}", email)
}

/// Re-prompt shown when the typed email fails the shape check
pub fn email_reprompt(input: &str) -> String {
    format!(
        "'{}' does not look like a valid email. Please try again.",
        input.trim()
    )
}
