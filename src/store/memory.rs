//! In-memory backend.
//!
//! Used when no `DATABASE_URL` is configured and by the test suite. The host
//! platform side (products, orders, users, carts) is seeded through the
//! `insert_*` methods.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::access::{Actor, OrderFilter};
use crate::domain::aggregates::{Cart, Order, OrderLocationBinding, Product, Registry};
use crate::domain::value_objects::{ActorId, LocationId, OrderId, ProductId, Quantity};
use crate::store::{ActorStore, CartStore, CatalogStore, LedgerStore, OrderStore, SettingsStore, StockRecord};
use crate::{Result, StockError};

#[derive(Default)]
struct State {
    ledger: HashMap<(ProductId, LocationId), (Quantity, DateTime<Utc>)>,
    registry: Registry,
    preferences: HashMap<ActorId, LocationId>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    actors: HashMap<ActorId, Actor>,
    carts: HashMap<String, Cart>,
    fail_ledger_writes: bool,
    fail_ledger_reads: bool,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| StockError::Persistence("memory store lock poisoned".into()))
    }

    pub fn insert_product(&self, product: Product) -> Result<()> {
        self.state()?.products.insert(product.id(), product);
        Ok(())
    }

    pub fn insert_order(&self, order: Order) -> Result<()> {
        self.state()?.orders.insert(order.id(), order);
        Ok(())
    }

    pub fn insert_actor(&self, actor: Actor) -> Result<()> {
        self.state()?.actors.insert(actor.id, actor);
        Ok(())
    }

    pub fn insert_cart(&self, cart: Cart) -> Result<()> {
        self.state()?.carts.insert(cart.session_id().to_string(), cart);
        Ok(())
    }

    pub fn cart(&self, session: &str) -> Result<Option<Cart>> {
        Ok(self.state()?.carts.get(session).cloned())
    }

    /// Makes every ledger write fail, to exercise persistence error paths.
    pub fn fail_ledger_writes(&self, fail: bool) -> Result<()> {
        self.state()?.fail_ledger_writes = fail;
        Ok(())
    }

    /// Makes every ledger row read fail until switched back off.
    pub fn fail_ledger_reads(&self, fail: bool) -> Result<()> {
        self.state()?.fail_ledger_reads = fail;
        Ok(())
    }
}

impl LedgerStore for MemoryStore {
    async fn quantity(&self, product: ProductId, location: &LocationId) -> Result<Option<Quantity>> {
        let state = self.state()?;
        if state.fail_ledger_reads { return Err(StockError::Persistence("ledger read rejected".into())); }
        Ok(state.ledger.get(&(product, location.clone())).map(|(q, _)| *q))
    }

    async fn upsert(&self, product: ProductId, location: &LocationId, quantity: Quantity) -> Result<()> {
        let mut state = self.state()?;
        if state.fail_ledger_writes { return Err(StockError::Persistence("ledger write rejected".into())); }
        state.ledger.insert((product, location.clone()), (quantity, Utc::now()));
        Ok(())
    }

    async fn insert_if_absent(&self, product: ProductId, location: &LocationId) -> Result<bool> {
        let mut state = self.state()?;
        if state.fail_ledger_writes { return Err(StockError::Persistence("ledger write rejected".into())); }
        let key = (product, location.clone());
        if state.ledger.contains_key(&key) { return Ok(false); }
        state.ledger.insert(key, (Quantity::default(), Utc::now()));
        Ok(true)
    }

    async fn delete_location(&self, location: &LocationId) -> Result<u64> {
        let mut state = self.state()?;
        let before = state.ledger.len();
        state.ledger.retain(|(_, l), _| l != location);
        Ok((before - state.ledger.len()) as u64)
    }

    async fn records_for_product(&self, product: ProductId) -> Result<Vec<StockRecord>> {
        let state = self.state()?;
        if state.fail_ledger_reads { return Err(StockError::Persistence("ledger read rejected".into())); }
        let mut records: Vec<StockRecord> = state
            .ledger
            .iter()
            .filter(|((p, _), _)| *p == product)
            .map(|((p, l), (q, at))| StockRecord { product_id: *p, location_id: l.clone(), quantity: *q, updated_at: *at })
            .collect();
        records.sort_by(|a, b| a.location_id.cmp(&b.location_id));
        Ok(records)
    }
}

impl SettingsStore for MemoryStore {
    async fn load_registry(&self) -> Result<Registry> {
        Ok(self.state()?.registry.clone())
    }

    async fn save_registry(&self, registry: &Registry) -> Result<()> {
        self.state()?.registry = registry.clone();
        Ok(())
    }

    async fn location_preference(&self, actor: ActorId) -> Result<Option<LocationId>> {
        Ok(self.state()?.preferences.get(&actor).cloned())
    }

    async fn set_location_preference(&self, actor: ActorId, location: &LocationId) -> Result<()> {
        self.state()?.preferences.insert(actor, location.clone());
        Ok(())
    }
}

impl CatalogStore for MemoryStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state()?.products.get(&id).cloned())
    }

    async fn save_stock(&self, product: &Product) -> Result<()> {
        let mut state = self.state()?;
        let stored = state.products.get_mut(&product.id()).ok_or(StockError::ProductNotFound)?;
        *stored = Product::restore(
            product.id(), product.name().to_string(), product.kind(),
            product.manages_stock(), product.stock_quantity(), product.updated_at(),
        );
        Ok(())
    }

    async fn products(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self.state()?.products.values().cloned().collect();
        products.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(products)
    }
}

impl OrderStore for MemoryStore {
    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state()?.orders.get(&id).cloned())
    }

    async fn save_binding(&self, id: OrderId, binding: &OrderLocationBinding) -> Result<()> {
        let mut state = self.state()?;
        let order = state.orders.get_mut(&id).ok_or(StockError::OrderNotFound)?;
        *order = Order::restore(
            order.id(), order.status(), order.billing_address().clone(), order.items().to_vec(),
            binding.clone(), order.created_at(), Utc::now(),
        );
        Ok(())
    }

    async fn set_billing_city(&self, id: OrderId, city: &str) -> Result<()> {
        let mut state = self.state()?;
        state.orders.get_mut(&id).ok_or(StockError::OrderNotFound)?.set_billing_city(city);
        Ok(())
    }

    async fn orders(&self, filter: &OrderFilter) -> Result<Vec<Order>> {
        Ok(self.state()?.orders.values().rev().filter(|o| filter.matches(o)).cloned().collect())
    }
}

impl ActorStore for MemoryStore {
    async fn actor(&self, id: ActorId) -> Result<Option<Actor>> {
        Ok(self.state()?.actors.get(&id).cloned())
    }
}

impl CartStore for MemoryStore {
    async fn clear_cart(&self, session: &str) -> Result<usize> {
        let mut state = self.state()?;
        let Some(cart) = state.carts.get_mut(session) else { return Ok(0) };
        let dropped = cart.clear();
        tracing::debug!(cart = %cart.id(), session, dropped, "Cart emptied");
        Ok(dropped)
    }
}
