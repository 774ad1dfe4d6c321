//! Commerce API client
//!
//! REST client for the storefront backend: catalog, per-chat carts and
//! customer creation. Every call authenticates with a short-lived bearer
//! token obtained through the implicit grant; the current token lives in a
//! [`TokenCache`](crate::cache::TokenCache) and is refreshed ahead of expiry.
//! A `401` from the API drops the cached token and retries the call once, so
//! callers never observe a stale token.
//!
//! The [`CommerceApi`] trait is the seam the conversation controller talks
//! through; tests substitute an in-process fake for the HTTP client.

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cache::TokenCache;
use crate::config::CommerceConfig;
use crate::errors::{error_logging, BotError, BotResult};
use crate::observability;

/// One sellable product as the handlers see it.
#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Display price, already formatted with currency by the backend.
    pub price: String,
    /// File id of the main image, when the product has one.
    pub main_image_id: Option<String>,
}

/// One cart line.
#[derive(Debug, Clone, PartialEq)]
pub struct CartItem {
    /// Cart item id, distinct from the product id.
    pub id: String,
    /// Product this line holds.
    pub product_id: String,
    pub name: String,
    pub description: String,
    pub quantity: u32,
    /// Formatted price per unit.
    pub unit_price: String,
    /// Formatted price for the whole line.
    pub line_price: String,
}

/// Cart contents plus the formatted grand total.
#[derive(Debug, Clone, PartialEq)]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub total: String,
}

/// Operations the conversation controller needs from the storefront backend.
///
/// Cart references are caller-chosen strings; the bot uses the chat id so
/// every chat gets its own cart.
#[async_trait]
pub trait CommerceApi: Send + Sync {
    /// Fetch the full product list in catalog order.
    async fn list_products(&self) -> BotResult<Vec<Product>>;

    /// Fetch a single product by id.
    async fn get_product(&self, product_id: &str) -> BotResult<Product>;

    /// Resolve a file id to a downloadable URL.
    async fn get_image_url(&self, file_id: &str) -> BotResult<String>;

    /// Add `quantity` units of a product to a cart.
    async fn add_cart_item(&self, cart_id: &str, product_id: &str, quantity: u32)
        -> BotResult<()>;

    /// Fetch a cart's lines and formatted total.
    async fn get_cart(&self, cart_id: &str) -> BotResult<Cart>;

    /// Remove the cart line holding this product. A product with no line
    /// in the cart reports an external-service failure, same as the
    /// backend rejecting the delete.
    async fn remove_cart_item(&self, cart_id: &str, product_id: &str) -> BotResult<()>;

    /// Create a customer record for a checkout email. Returns the customer id.
    async fn create_customer(&self, email: &str) -> BotResult<String>;
}

// Wire shapes. The backend wraps every resource in a `data` envelope and
// nests formatted prices under `meta.display_price.with_tax`.

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct FormattedPrice {
    formatted: String,
}

#[derive(Debug, Deserialize)]
struct ProductPrice {
    with_tax: FormattedPrice,
}

#[derive(Debug, Deserialize)]
struct ProductMeta {
    display_price: ProductPrice,
}

#[derive(Debug, Deserialize)]
struct ResourceRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    data: Option<ResourceRef>,
}

#[derive(Debug, Deserialize, Default)]
struct ProductRelationships {
    main_image: Option<Relationship>,
}

#[derive(Debug, Deserialize)]
struct ProductResource {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    meta: ProductMeta,
    #[serde(default)]
    relationships: Option<ProductRelationships>,
}

impl From<ProductResource> for Product {
    fn from(resource: ProductResource) -> Self {
        let main_image_id = resource
            .relationships
            .and_then(|rel| rel.main_image)
            .and_then(|rel| rel.data)
            .map(|image| image.id);

        Product {
            id: resource.id,
            name: resource.name,
            description: resource.description,
            price: resource.meta.display_price.with_tax.formatted,
            main_image_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CartItemPrice {
    unit: FormattedPrice,
    value: FormattedPrice,
}

#[derive(Debug, Deserialize)]
struct CartItemPriceEnvelope {
    with_tax: CartItemPrice,
}

#[derive(Debug, Deserialize)]
struct CartItemMeta {
    display_price: CartItemPriceEnvelope,
}

#[derive(Debug, Deserialize)]
struct CartItemResource {
    id: String,
    product_id: String,
    name: String,
    #[serde(default)]
    description: String,
    quantity: u32,
    meta: CartItemMeta,
}

impl From<CartItemResource> for CartItem {
    fn from(resource: CartItemResource) -> Self {
        CartItem {
            id: resource.id,
            product_id: resource.product_id,
            name: resource.name,
            description: resource.description,
            quantity: resource.quantity,
            unit_price: resource.meta.display_price.with_tax.unit.formatted,
            line_price: resource.meta.display_price.with_tax.value.formatted,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CartMeta {
    display_price: ProductPrice,
}

// The cart items listing is the one response that carries a payload next
// to `data`: the cart's grand total rides in top-level `meta`.
#[derive(Debug, Deserialize)]
struct CartEnvelope {
    data: Vec<CartItemResource>,
    meta: CartMeta,
}

#[derive(Debug, Deserialize)]
struct FileLink {
    href: String,
}

#[derive(Debug, Deserialize)]
struct FileResource {
    link: FileLink,
}

/// HTTP implementation of [`CommerceApi`].
pub struct CommerceClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    token_ttl_margin: Duration,
    tokens: TokenCache,
}

impl CommerceClient {
    /// Build a client from configuration. All requests share one connection
    /// pool with bounded connect and overall timeouts.
    pub fn new(config: &CommerceConfig) -> BotResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            token_ttl_margin: Duration::from_secs(config.token_ttl_margin_secs),
            tokens: TokenCache::new(),
        })
    }

    /// Return a valid bearer token, fetching a fresh one when the cached
    /// token is absent or about to expire.
    async fn access_token(&self) -> BotResult<String> {
        if let Some(token) = self.tokens.get() {
            return Ok(token);
        }

        let url = format!("{}/oauth/access_token", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("grant_type", "implicit"),
            ])
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let body: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(body.expires_in)
            .saturating_sub(self.token_ttl_margin);

        debug!(expires_in = body.expires_in, "access token refreshed");
        self.tokens.store(body.access_token.clone(), lifetime);

        Ok(body.access_token)
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> BotResult<Response> {
        let token = self.access_token().await?;
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.request(method, &url).bearer_auth(&token);
        if let Some(json) = body {
            request = request.json(json);
        }

        Ok(request.send().await?)
    }

    async fn try_send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> BotResult<Response> {
        let first = self.send_once(method.clone(), path, body).await?;

        // The margin keeps cached tokens fresh, but the backend may still
        // revoke one early. Re-authenticate once before giving up.
        if first.status() == StatusCode::UNAUTHORIZED {
            debug!(path = %path, "bearer token rejected, re-authenticating");
            self.tokens.clear();
            let second = self.send_once(method, path, body).await?;
            return ensure_success(second).await;
        }

        ensure_success(first).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        operation: &'static str,
    ) -> BotResult<Response> {
        let started = Instant::now();
        let outcome = self.try_send(method, path, body).await;
        observability::record_commerce_duration(operation, started.elapsed());

        match outcome {
            Ok(response) => {
                observability::record_commerce_request(operation, "ok");
                Ok(response)
            }
            Err(err) => {
                let status = match &err {
                    BotError::ExternalService { status, .. } => *status,
                    _ => None,
                };
                error_logging::log_commerce_error(&err, operation, status);
                observability::record_commerce_request(operation, "error");
                Err(err)
            }
        }
    }
}

/// Pass successful responses through; turn anything else into a
/// [`BotError::ExternalService`] whose detail is the response body.
async fn ensure_success(response: Response) -> BotResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = match response.text().await {
        Ok(text) => cap_detail(&text),
        Err(_) => String::new(),
    };
    Err(BotError::ExternalService {
        status: Some(status.as_u16()),
        detail,
    })
}

/// Bound error bodies before they reach logs, cutting on a char boundary.
fn cap_detail(text: &str) -> String {
    const DETAIL_CAP: usize = 600;
    match text.char_indices().nth(DETAIL_CAP) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
impl CommerceApi for CommerceClient {
    async fn list_products(&self) -> BotResult<Vec<Product>> {
        let response = self
            .send(Method::GET, "/v2/products", None, "list_products")
            .await?;
        let body: DataEnvelope<Vec<ProductResource>> = response.json().await?;
        Ok(body.data.into_iter().map(Product::from).collect())
    }

    async fn get_product(&self, product_id: &str) -> BotResult<Product> {
        let path = format!("/v2/products/{}", product_id);
        let response = self.send(Method::GET, &path, None, "get_product").await?;
        let body: DataEnvelope<ProductResource> = response.json().await?;
        Ok(Product::from(body.data))
    }

    async fn get_image_url(&self, file_id: &str) -> BotResult<String> {
        let path = format!("/v2/files/{}", file_id);
        let response = self.send(Method::GET, &path, None, "get_image_url").await?;
        let body: DataEnvelope<FileResource> = response.json().await?;
        Ok(body.data.link.href)
    }

    async fn add_cart_item(
        &self,
        cart_id: &str,
        product_id: &str,
        quantity: u32,
    ) -> BotResult<()> {
        let path = format!("/v2/carts/{}/items", cart_id);
        let payload = serde_json::json!({
            "data": {
                "id": product_id,
                "type": "cart_item",
                "quantity": quantity,
            }
        });

        self.send(Method::POST, &path, Some(&payload), "add_cart_item")
            .await?;
        Ok(())
    }

    async fn get_cart(&self, cart_id: &str) -> BotResult<Cart> {
        let path = format!("/v2/carts/{}/items", cart_id);
        let response = self.send(Method::GET, &path, None, "get_cart").await?;
        let body: CartEnvelope = response.json().await?;

        Ok(Cart {
            items: body.data.into_iter().map(CartItem::from).collect(),
            total: body.meta.display_price.with_tax.formatted,
        })
    }

    async fn remove_cart_item(&self, cart_id: &str, product_id: &str) -> BotResult<()> {
        // The delete endpoint is keyed by cart item id, so resolve the
        // product to its line first.
        let items_path = format!("/v2/carts/{}/items", cart_id);
        let response = self
            .send(Method::GET, &items_path, None, "remove_cart_item")
            .await?;
        let items: DataEnvelope<Vec<CartItemResource>> = response.json().await?;

        let line = match items.data.into_iter().find(|item| item.product_id == product_id) {
            Some(item) => item,
            None => {
                let err = BotError::ExternalService {
                    status: Some(404),
                    detail: format!("cart {} holds no line for product {}", cart_id, product_id),
                };
                error_logging::log_commerce_error(&err, "remove_cart_item", Some(404));
                observability::record_commerce_request("remove_cart_item", "error");
                return Err(err);
            }
        };

        let path = format!("/v2/carts/{}/items/{}", cart_id, line.id);
        self.send(Method::DELETE, &path, None, "remove_cart_item")
            .await?;
        Ok(())
    }

    async fn create_customer(&self, email: &str) -> BotResult<String> {
        let payload = serde_json::json!({
            "data": {
                "type": "customer",
                "name": email,
                "email": email,
            }
        });

        let response = self
            .send(Method::POST, "/v2/customers", Some(&payload), "create_customer")
            .await?;
        let body: DataEnvelope<ResourceRef> = response.json().await?;
        Ok(body.data.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_resource_with_image() {
        let json = serde_json::json!({
            "id": "prod-1",
            "name": "Cold-smoked salmon",
            "description": "Brined and smoked over beech",
            "meta": {
                "display_price": {
                    "with_tax": { "amount": 1250, "currency": "USD", "formatted": "$12.50" }
                }
            },
            "relationships": {
                "main_image": { "data": { "type": "main_image", "id": "file-9" } }
            }
        });

        let resource: ProductResource = serde_json::from_value(json).unwrap();
        let product = Product::from(resource);

        assert_eq!(product.id, "prod-1");
        assert_eq!(product.price, "$12.50");
        assert_eq!(product.main_image_id.as_deref(), Some("file-9"));
    }

    #[test]
    fn test_product_resource_without_image() {
        let json = serde_json::json!({
            "id": "prod-2",
            "name": "Pickled herring",
            "meta": {
                "display_price": { "with_tax": { "formatted": "$4.20" } }
            }
        });

        let resource: ProductResource = serde_json::from_value(json).unwrap();
        let product = Product::from(resource);

        assert_eq!(product.main_image_id, None);
        assert_eq!(product.description, "");
    }

    #[test]
    fn test_cart_item_resource_prices() {
        let json = serde_json::json!({
            "id": "item-1",
            "product_id": "prod-1",
            "name": "Cold-smoked salmon",
            "description": "Brined and smoked over beech",
            "quantity": 5,
            "meta": {
                "display_price": {
                    "with_tax": {
                        "unit": { "formatted": "$12.50" },
                        "value": { "formatted": "$62.50" }
                    }
                }
            }
        });

        let resource: CartItemResource = serde_json::from_value(json).unwrap();
        let item = CartItem::from(resource);

        assert_eq!(item.product_id, "prod-1");
        assert_eq!(item.quantity, 5);
        assert_eq!(item.unit_price, "$12.50");
        assert_eq!(item.line_price, "$62.50");
    }

    #[test]
    fn test_cart_envelope_total_rides_beside_items() {
        let json = serde_json::json!({
            "data": [{
                "id": "item-1",
                "product_id": "prod-1",
                "name": "Cold-smoked salmon",
                "quantity": 2,
                "meta": {
                    "display_price": {
                        "with_tax": {
                            "unit": { "formatted": "$12.50" },
                            "value": { "formatted": "$25.00" }
                        }
                    }
                }
            }],
            "meta": {
                "display_price": { "with_tax": { "formatted": "$25.00" } }
            }
        });

        let envelope: CartEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(envelope.data.len(), 1);
        assert_eq!(envelope.data[0].product_id, "prod-1");
        assert_eq!(envelope.meta.display_price.with_tax.formatted, "$25.00");
    }

    #[test]
    fn test_detail_cap_respects_char_boundaries() {
        assert_eq!(cap_detail("tiny"), "tiny");

        let long = "х".repeat(2000);
        let capped = cap_detail(&long);
        assert_eq!(capped.chars().count(), 600);
    }

    #[test]
    fn test_token_response_shape() {
        let json = serde_json::json!({
            "access_token": "abc123",
            "token_type": "Bearer",
            "identifier": "implicit",
            "expires_in": 3600
        });

        let token: TokenResponse = serde_json::from_value(json).unwrap();
        assert_eq!(token.access_token, "abc123");
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn test_file_resource_href() {
        let json = serde_json::json!({
            "link": { "href": "https://files.example.com/file-9.png" }
        });

        let resource: FileResource = serde_json::from_value(json).unwrap();
        assert_eq!(resource.link.href, "https://files.example.com/file-9.png");
    }
}
