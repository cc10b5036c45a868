//! HTTP client for the storefront API.
//!
//! Provides:
//! - `ApiClient` - `reqwest` client with a shared default-header map,
//!   implementing `ApiTransport`
//! - Catalog, cart and booking calls

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;

pub use catalog::{BookingForm, CartItem, Event, OrderForm, Product, cart_total};
pub use client::ApiClient;
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use error::ApiError;
