//! Storage seams.
//!
//! The ledger table and the location settings are owned by this service. The
//! catalog, orders, users and carts belong to the host shop platform and are
//! reached through the same kind of trait so both backends can stand in for
//! it.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::access::{Actor, OrderFilter};
use crate::domain::aggregates::{Order, OrderLocationBinding, Product, Registry};
use crate::domain::value_objects::{ActorId, LocationId, OrderId, ProductId, Quantity};
use crate::Result;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// One ledger row.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StockRecord {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub quantity: Quantity,
    pub updated_at: DateTime<Utc>,
}

pub trait LedgerStore: Send + Sync {
    /// `None` when no row exists.
    fn quantity(&self, product: ProductId, location: &LocationId) -> impl Future<Output = Result<Option<Quantity>>> + Send;

    /// Insert or overwrite the row for (product, location).
    fn upsert(&self, product: ProductId, location: &LocationId, quantity: Quantity) -> impl Future<Output = Result<()>> + Send;

    /// Insert a zero row unless one exists. Returns whether a row was created.
    fn insert_if_absent(&self, product: ProductId, location: &LocationId) -> impl Future<Output = Result<bool>> + Send;

    /// Delete every row for a location. Returns the number of rows removed.
    fn delete_location(&self, location: &LocationId) -> impl Future<Output = Result<u64>> + Send;

    fn records_for_product(&self, product: ProductId) -> impl Future<Output = Result<Vec<StockRecord>>> + Send;
}

pub trait SettingsStore: Send + Sync {
    fn load_registry(&self) -> impl Future<Output = Result<Registry>> + Send;
    fn save_registry(&self, registry: &Registry) -> impl Future<Output = Result<()>> + Send;
    fn location_preference(&self, actor: ActorId) -> impl Future<Output = Result<Option<LocationId>>> + Send;
    fn set_location_preference(&self, actor: ActorId, location: &LocationId) -> impl Future<Output = Result<()>> + Send;
}

pub trait CatalogStore: Send + Sync {
    fn product(&self, id: ProductId) -> impl Future<Output = Result<Option<Product>>> + Send;

    /// Persist `manage_stock` and the aggregate stock quantity.
    fn save_stock(&self, product: &Product) -> impl Future<Output = Result<()>> + Send;

    /// Every product, ordered by name.
    fn products(&self) -> impl Future<Output = Result<Vec<Product>>> + Send;
}

pub trait OrderStore: Send + Sync {
    fn order(&self, id: OrderId) -> impl Future<Output = Result<Option<Order>>> + Send;
    fn save_binding(&self, id: OrderId, binding: &OrderLocationBinding) -> impl Future<Output = Result<()>> + Send;
    fn set_billing_city(&self, id: OrderId, city: &str) -> impl Future<Output = Result<()>> + Send;
    fn orders(&self, filter: &OrderFilter) -> impl Future<Output = Result<Vec<Order>>> + Send;
}

pub trait ActorStore: Send + Sync {
    fn actor(&self, id: ActorId) -> impl Future<Output = Result<Option<Actor>>> + Send;
}

pub trait CartStore: Send + Sync {
    /// Empty a session's cart. Returns the number of lines dropped.
    fn clear_cart(&self, session: &str) -> impl Future<Output = Result<usize>> + Send;
}

/// Everything the service needs from storage.
pub trait Backend: LedgerStore + SettingsStore + CatalogStore + OrderStore + ActorStore + CartStore + Clone + 'static {}

impl<T> Backend for T where T: LedgerStore + SettingsStore + CatalogStore + OrderStore + ActorStore + CartStore + Clone + 'static {}
