//! Reconciliation of the aggregate stock with the ledger.
//!
//! The product's aggregate stock quantity is a cached projection: the sum of
//! its ledger rows over the registered locations. [`Reconciler::reconcile`] is
//! the only place that writes it. Between a ledger write and the next
//! reconcile the two can differ; [`Reconciler::check`] reports that without
//! correcting it.

use serde::Serialize;

use crate::domain::aggregates::{Product, Registry};
use crate::domain::events::EventPublisher;
use crate::domain::value_objects::{ProductId, Quantity};
use crate::ledger::StockLedger;
use crate::store::{CatalogStore, LedgerStore};
use crate::{Result, StockError};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Products visited.
    pub total: usize,
    pub synced: usize,
    pub errors: usize,
}

/// Cached aggregate versus the live ledger sum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StockConsistency {
    pub cached: Option<Quantity>,
    pub live: Quantity,
    pub in_sync: bool,
}

#[derive(Clone)]
pub struct Reconciler<S> {
    store: S,
    ledger: StockLedger<S>,
    events: EventPublisher,
}

impl<S: LedgerStore + CatalogStore + Clone> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { ledger: StockLedger::new(store.clone()), store, events: EventPublisher::disabled() }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.ledger = self.ledger.with_events(events.clone());
        self.events = events;
        self
    }

    /// Sum of the product's quantities over every registered location.
    /// Unreadable rows count as zero.
    pub async fn live_total(&self, registry: &Registry, product: ProductId) -> Quantity {
        let mut total: i64 = 0;
        for location in registry.ids() {
            total = total.saturating_add(i64::from(self.ledger.get_quantity(product, location).await.value()));
        }
        Quantity::clamped(total)
    }

    /// Like [`live_total`](Self::live_total) but fails on the first
    /// unreadable row, so a partial sum is never stored.
    async fn exact_total(&self, registry: &Registry, product: ProductId) -> Result<Quantity> {
        let mut total: i64 = 0;
        for location in registry.ids() {
            let quantity = self.store.quantity(product, location).await?.unwrap_or_default();
            total = total.saturating_add(i64::from(quantity.value()));
        }
        Ok(Quantity::clamped(total))
    }

    /// Recompute and store the aggregate stock for one product.
    pub async fn reconcile(&self, registry: &Registry, product_id: ProductId) -> Result<Quantity> {
        let mut product = self.store.product(product_id).await?.ok_or(StockError::ProductNotFound)?;
        if product.is_composite() { return Err(StockError::UnsupportedProduct); }
        let total = match self.exact_total(registry, product_id).await {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!(product = %product_id, error = %e, "Ledger unreadable, aggregate left unchanged");
                return Err(e);
            }
        };
        product.set_aggregate_stock(total);
        self.store.save_stock(&product).await?;
        tracing::debug!(product = %product_id, total = total.value(), "Aggregate stock reconciled");
        self.events.publish(product.take_events()).await;
        Ok(total)
    }

    /// Reconcile every stock-managed simple product. One product failing does
    /// not stop the rest.
    pub async fn reconcile_all(&self, registry: &Registry) -> Result<ReconcileReport> {
        let products = self.store.products().await?;
        let mut report = ReconcileReport::default();
        for product in products.iter().filter(|p| p.is_ledger_tracked()) {
            report.total += 1;
            match self.reconcile(registry, product.id()).await {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(product = %product.id(), error = %e, "Reconcile failed");
                }
            }
        }
        tracing::info!(total = report.total, synced = report.synced, errors = report.errors, "Reconciled all products");
        Ok(report)
    }

    pub async fn check(&self, registry: &Registry, product: &Product) -> StockConsistency {
        let live = self.live_total(registry, product.id()).await;
        let cached = product.stock_quantity();
        StockConsistency { cached, live, in_sync: cached == Some(live) }
    }
}
