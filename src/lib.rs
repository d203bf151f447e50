//! OpenSASE Location Stock
//!
//! Multi-location stock for a self-hosted shop: the shop keeps one stock
//! figure per product, this service splits it across warehouses and stores.
//!
//! ## Features
//! - Per-(product, location) stock ledger
//! - Reconciliation of the shop's aggregate stock with the ledger sum
//! - Location managers scoped to their own location's stock and orders
//! - Shopper location selection and per-location stock visibility
//! - Order placement/cancellation/refund stock hooks
//!
//! Ledger writes are plain read-modify-write against one table with no row
//! locking: two requests adjusting the same (product, location) at once can
//! lose an update (last write wins).

use thiserror::Error;

pub mod access;
pub mod api;
pub mod config;
pub mod domain;
pub mod ledger;
pub mod lifecycle;
pub mod reconcile;
pub mod registry;
pub mod selection;
pub mod store;

pub use access::{Access, Actor, LocationScope, OrderFilter, Role};
pub use config::Config;
pub use domain::aggregates::{Location, Order, Product, Registry};
pub use domain::value_objects::{ActorId, LocationId, OrderId, ProductId, Quantity, StockDelta};
pub use ledger::{Adjustment, StockLedger};
pub use reconcile::{ReconcileReport, Reconciler};
pub use store::Backend;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StockError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("Product not found")]
    ProductNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Location not found")]
    LocationNotFound,

    #[error("Variable products are not tracked per location")]
    UnsupportedProduct,

    #[error("Storage error: {0}")]
    Persistence(String),
}

impl StockError {
    pub fn validation(message: impl std::fmt::Display) -> Self { Self::Validation(message.to_string()) }
    pub fn unauthorized(message: impl Into<String>) -> Self { Self::Unauthorized(message.into()) }
}

pub type Result<T> = std::result::Result<T, StockError>;
