//! Validation module for common validation patterns
//!
//! This module consolidates input validation used by the state handlers:
//!
//! - Email addresses typed during checkout
//! - Quantity button payloads

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL_PATTERN: Regex =
        Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("Invalid email regex pattern");
}

/// Validates an email address typed by the user
///
/// # Arguments
/// * `input` - The raw text to validate
///
/// # Returns
/// * `Ok(&str)` - The trimmed email if valid
/// * `Err(&str)` - Error type: "empty", "too_long" or "invalid"
///
/// # Examples
/// ```
/// use storefront_bot::validation::validate_email;
///
/// assert_eq!(validate_email(" ada@example.com "), Ok("ada@example.com"));
/// assert_eq!(validate_email(""), Err("empty"));
/// assert_eq!(validate_email("not-an-email"), Err("invalid"));
/// ```
pub fn validate_email(input: &str) -> Result<&str, &'static str> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err("empty");
    }

    if trimmed.len() > 254 {
        return Err("too_long");
    }

    if !EMAIL_PATTERN.is_match(trimmed) {
        return Err("invalid");
    }

    Ok(trimmed)
}

/// Parse a quantity button payload into a positive amount
///
/// # Arguments
/// * `payload` - The button payload to parse
///
/// # Returns
/// * `Some(u32)` - The parsed quantity
/// * `None` - Payload is not a positive integer
///
/// # Examples
/// ```
/// use storefront_bot::validation::parse_quantity;
///
/// assert_eq!(parse_quantity("5"), Some(5));
/// assert_eq!(parse_quantity("0"), None);
/// assert_eq!(parse_quantity("back"), None);
/// ```
pub fn parse_quantity(payload: &str) -> Option<u32> {
    match payload.trim().parse::<u32>() {
        Ok(qty) if qty > 0 => Some(qty),
        _ => None,
    }
}
