//! Order and product lifecycle hooks.
//!
//! Orders move between two binding states: unprocessed and stock-decremented.
//! Placement (also `processing`/`completed`) decrements the resolved
//! location once; cancellation or refund restores it and clears the flag.
//! A failed line item is logged and skipped, so an order can end up partially
//! applied.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{Order, Registry};
use crate::domain::events::EventPublisher;
use crate::domain::value_objects::{DeltaError, LocationId, OrderId, ProductId, StockDelta};
use crate::ledger::StockLedger;
use crate::reconcile::Reconciler;
use crate::selection::{LocationSelector, SelectionContext};
use crate::store::{Backend, CatalogStore, OrderStore};
use crate::{Result, StockError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderHook { Placed, Processing, Completed, Cancelled, Refunded }

impl OrderHook {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "placed" | "checkout" => Some(Self::Placed),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    pub fn restores_stock(&self) -> bool { matches!(self, Self::Cancelled | Self::Refunded) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LifecycleOutcome {
    /// Stock moved for `items` lines; `failed` lines were skipped.
    Processed { location_id: LocationId, items: usize, failed: usize },
    /// Placement on an order that already holds a decrement.
    AlreadyProcessed,
    /// Restoration on an order that holds no decrement.
    NotProcessed,
    /// No location could be resolved for the order.
    Unresolved,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InitReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct OrderLifecycle<S> {
    store: S,
    ledger: StockLedger<S>,
    reconciler: Reconciler<S>,
    selector: LocationSelector<S>,
    events: EventPublisher,
}

impl<S: Backend> OrderLifecycle<S> {
    pub fn new(store: S, cookie_days: i64) -> Self {
        Self {
            ledger: StockLedger::new(store.clone()),
            reconciler: Reconciler::new(store.clone()),
            selector: LocationSelector::new(store.clone(), cookie_days),
            store,
            events: EventPublisher::disabled(),
        }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.ledger = self.ledger.with_events(events.clone());
        self.reconciler = self.reconciler.with_events(events.clone());
        self.events = events;
        self
    }

    pub async fn handle(&self, registry: &Registry, hook: OrderHook, order: OrderId, ctx: &SelectionContext) -> Result<LifecycleOutcome> {
        if hook.restores_stock() {
            self.on_order_restored(registry, order).await
        } else {
            self.on_order_placed(registry, order, ctx).await
        }
    }

    pub async fn on_order_placed(&self, registry: &Registry, order_id: OrderId, ctx: &SelectionContext) -> Result<LifecycleOutcome> {
        let mut order = self.load(order_id).await?;
        if order.is_stock_processed() {
            tracing::debug!(order = %order_id, "Order stock already processed");
            return Ok(LifecycleOutcome::AlreadyProcessed);
        }

        let location = match registry.find_by_name(order.billing_city()) {
            Some(location) => location.id.clone(),
            None => {
                let Some(selected) = self.selector.selected(registry, ctx).await? else {
                    tracing::debug!(order = %order_id, city = order.billing_city(), "No location for order, stock left untouched");
                    return Ok(LifecycleOutcome::Unresolved);
                };
                if let Some(name) = registry.get(&selected).map(|l| l.name.clone()) {
                    self.store.set_billing_city(order_id, &name).await?;
                    order.set_billing_city(name);
                }
                selected
            }
        };

        let (items, failed) = self.move_stock(registry, &order, &location, StockDelta::remove).await;
        order.mark_stock_decremented(location.clone());
        self.store.save_binding(order_id, order.binding()).await?;
        self.events.publish(order.take_events()).await;
        tracing::info!(order = %order_id, %location, items, failed, "Order stock decremented");
        Ok(LifecycleOutcome::Processed { location_id: location, items, failed })
    }

    /// Cancellation and refund.
    pub async fn on_order_restored(&self, registry: &Registry, order_id: OrderId) -> Result<LifecycleOutcome> {
        let mut order = self.load(order_id).await?;
        if !order.is_stock_processed() {
            tracing::debug!(order = %order_id, "Order holds no stock decrement");
            return Ok(LifecycleOutcome::NotProcessed);
        }

        let bound = order.binding().location_id.clone().filter(|id| registry.contains(id));
        let Some(location) = bound.or_else(|| registry.find_by_name(order.billing_city()).map(|l| l.id.clone())) else {
            tracing::debug!(order = %order_id, city = order.billing_city(), "No location to restore order stock to");
            return Ok(LifecycleOutcome::Unresolved);
        };

        let (items, failed) = self.move_stock(registry, &order, &location, StockDelta::restore).await;
        order.mark_stock_restored(location.clone());
        self.store.save_binding(order_id, order.binding()).await?;
        self.events.publish(order.take_events()).await;
        tracing::info!(order = %order_id, %location, items, failed, "Order stock restored");
        Ok(LifecycleOutcome::Processed { location_id: location, items, failed })
    }

    /// Creates zero rows at every location for a stock-managed simple product.
    /// Returns how many locations were initialized.
    pub async fn on_product_saved(&self, registry: &Registry, product_id: ProductId) -> Result<usize> {
        let product = self.store.product(product_id).await?.ok_or(StockError::ProductNotFound)?;
        if !product.is_ledger_tracked() { return Ok(0); }
        let mut initialized = 0;
        for location in registry.ids() {
            if self.ledger.ensure_record_exists(product_id, location).await { initialized += 1; }
        }
        Ok(initialized)
    }

    /// Runs [`on_product_saved`](Self::on_product_saved) over the whole catalog.
    pub async fn initialize_all(&self, registry: &Registry) -> Result<InitReport> {
        let products = self.store.products().await?;
        let mut report = InitReport::default();
        for product in products.iter().filter(|p| p.is_ledger_tracked()) {
            report.processed += 1;
            match self.on_product_saved(registry, product.id()).await {
                Ok(n) if n == registry.len() => report.succeeded += 1,
                Ok(_) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(product = %product.id(), error = %e, "Stock initialization failed");
                }
            }
        }
        tracing::info!(processed = report.processed, succeeded = report.succeeded, failed = report.failed, "Initialized location stock");
        Ok(report)
    }

    async fn load(&self, id: OrderId) -> Result<Order> {
        self.store.order(id).await?.ok_or(StockError::OrderNotFound)
    }

    /// Applies one delta per line item, reconciling each product after its
    /// write. Returns (lines moved, lines failed).
    async fn move_stock(
        &self,
        registry: &Registry,
        order: &Order,
        location: &LocationId,
        delta_for: fn(u32) -> std::result::Result<StockDelta, DeltaError>,
    ) -> (usize, usize) {
        let (mut moved, mut failed) = (0, 0);
        for item in order.items() {
            let Ok(delta) = delta_for(item.quantity) else { continue };
            match self.ledger.apply_delta(item.product_id, location, delta).await {
                Ok(_) => moved += 1,
                Err(e) => {
                    failed += 1;
                    tracing::warn!(order = %order.id(), product = %item.product_id, %location, error = %e, "Order line stock update failed");
                    continue;
                }
            }
            if let Err(e) = self.reconciler.reconcile(registry, item.product_id).await {
                tracing::debug!(product = %item.product_id, error = %e, "Skipped reconcile");
            }
        }
        (moved, failed)
    }
}
