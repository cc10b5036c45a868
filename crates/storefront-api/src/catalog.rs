//! Catalog, cart and event-booking calls.
//!
//! These are thin typed wrappers; pricing, stock and booking rules live on
//! the server. Every call goes through the shared client and so carries the
//! installed `Authorization` header.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use storefront_core::User;

use crate::client::ApiClient;
use crate::error::ApiError;

/// A product listed in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A ticketed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    /// ISO-8601 timestamp as sent by the server.
    pub date: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

/// A product in the user's cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub product: Product,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
}

impl CartItem {
    /// Quantity shown for the item; missing means one.
    #[must_use]
    pub fn quantity_or_one(&self) -> u32 {
        self.quantity.unwrap_or(1)
    }
}

/// Sum of item prices, rounded to cents.
#[must_use]
pub fn cart_total(items: &[CartItem]) -> f64 {
    let sum: f64 = items.iter().map(|item| item.product.price).sum();
    (sum * 100.0).round() / 100.0
}

/// Shipping details submitted with an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderForm {
    pub name: String,
    pub email: String,
    pub address: String,
    pub phone: String,
    pub quantity: u32,
}

impl Default for OrderForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            address: String::new(),
            phone: String::new(),
            quantity: 1,
        }
    }
}

impl OrderForm {
    /// Form seeded with the signed-in user's name and email.
    #[must_use]
    pub fn prefilled(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone().unwrap_or_default(),
            ..Self::default()
        }
    }
}

/// Attendee details submitted with a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingForm {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub people: u32,
}

impl Default for BookingForm {
    fn default() -> Self {
        Self {
            name: String::new(),
            email: String::new(),
            phone: String::new(),
            people: 1,
        }
    }
}

impl BookingForm {
    /// Form seeded with the signed-in user's name and email.
    #[must_use]
    pub fn prefilled(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone().unwrap_or_default(),
            ..Self::default()
        }
    }
}

impl ApiClient {
    /// GET `/products`.
    ///
    /// # Errors
    /// Returns error if the request fails or the body does not decode.
    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        self.get_json("/products").await
    }

    /// GET `/events`.
    ///
    /// # Errors
    /// Returns error if the request fails or the body does not decode.
    pub async fn list_events(&self) -> Result<Vec<Event>, ApiError> {
        self.get_json("/events").await
    }

    /// GET `/me/cart`. Requires an authenticated session.
    ///
    /// # Errors
    /// Returns error if the request fails or the body does not decode.
    pub async fn my_cart(&self) -> Result<Vec<CartItem>, ApiError> {
        self.get_json("/me/cart").await
    }

    /// GET `/me/events`. Requires an authenticated session.
    ///
    /// # Errors
    /// Returns error if the request fails or the body does not decode.
    pub async fn my_events(&self) -> Result<Vec<Event>, ApiError> {
        self.get_json("/me/events").await
    }

    /// POST an order for `product_id`.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn add_to_cart(&self, product_id: &str, form: &OrderForm) -> Result<Value, ApiError> {
        self.post_json(&format!("/products/{product_id}/add-to-cart"), form)
            .await
    }

    /// POST a booking for `event_id`.
    ///
    /// # Errors
    /// Returns error if the request fails.
    pub async fn book_event(&self, event_id: &str, form: &BookingForm) -> Result<Value, ApiError> {
        self.post_json(&format!("/events/{event_id}/book"), form).await
    }
}
