//! Stock ledger.
//!
//! Per-(product, location) quantities. A missing row reads as zero. Writes are
//! read-modify-write without locking, so concurrent adjustments of the same
//! row can lose an update.

use serde::Serialize;

use crate::domain::events::{DomainEvent, EventPublisher, StockEvent};
use crate::domain::value_objects::{LocationId, ProductId, Quantity, StockDelta};
use crate::store::LedgerStore;
use crate::Result;

/// Result of a relative adjustment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Adjustment {
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub old_quantity: Quantity,
    pub new_quantity: Quantity,
    pub delta: StockDelta,
}

#[derive(Clone)]
pub struct StockLedger<S> {
    store: S,
    events: EventPublisher,
}

impl<S: LedgerStore> StockLedger<S> {
    pub fn new(store: S) -> Self { Self { store, events: EventPublisher::disabled() } }

    pub fn with_events(mut self, events: EventPublisher) -> Self { self.events = events; self }

    /// Stored quantity, or zero when the row is missing or unreadable.
    pub async fn get_quantity(&self, product: ProductId, location: &LocationId) -> Quantity {
        match self.store.quantity(product, location).await {
            Ok(q) => q.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(%product, %location, error = %e, "Failed to read location stock");
                Quantity::default()
            }
        }
    }

    /// Absolute write. Negative input is stored as zero. Failures are logged
    /// and reported as `false`.
    pub async fn set_quantity(&self, product: ProductId, location: &LocationId, quantity: i64) -> bool {
        let quantity = Quantity::clamped(quantity);
        match self.store.upsert(product, location, quantity).await {
            Ok(()) => {
                tracing::debug!(%product, %location, quantity = quantity.value(), "Location stock set");
                true
            }
            Err(e) => {
                tracing::warn!(%product, %location, quantity = quantity.value(), error = %e, "Failed to write location stock");
                false
            }
        }
    }

    /// `set_quantity(max(0, current + delta))`.
    ///
    /// Unlike [`get_quantity`](Self::get_quantity), a failed read aborts the
    /// adjustment so an unreadable row is never overwritten.
    pub async fn apply_delta(&self, product: ProductId, location: &LocationId, delta: StockDelta) -> Result<Adjustment> {
        let old_quantity = self.store.quantity(product, location).await?.unwrap_or_default();
        let new_quantity = old_quantity.apply(delta);
        if let Err(e) = self.store.upsert(product, location, new_quantity).await {
            tracing::warn!(%product, %location, %delta, old = old_quantity.value(), error = %e, "Failed to adjust location stock");
            return Err(e);
        }
        tracing::info!(%product, %location, %delta, old = old_quantity.value(), new = new_quantity.value(), "Location stock adjusted");
        self.events.publish(vec![DomainEvent::Stock(StockEvent::Adjusted {
            product_id: product,
            location_id: location.clone(),
            old_quantity: old_quantity.value(),
            new_quantity: new_quantity.value(),
        })]).await;
        Ok(Adjustment { product_id: product, location_id: location.clone(), old_quantity, new_quantity, delta })
    }

    /// Creates a zero row if none exists. Idempotent.
    pub async fn ensure_record_exists(&self, product: ProductId, location: &LocationId) -> bool {
        match self.store.insert_if_absent(product, location).await {
            Ok(created) => {
                if created { tracing::debug!(%product, %location, "Initialized location stock row"); }
                true
            }
            Err(e) => {
                tracing::warn!(%product, %location, error = %e, "Failed to initialize location stock row");
                false
            }
        }
    }

    /// Drops every row of a deleted location.
    pub async fn remove_location(&self, location: &LocationId) -> Result<u64> {
        let rows = self.store.delete_location(location).await?;
        tracing::info!(%location, rows, "Removed location stock");
        self.events.publish(vec![DomainEvent::Stock(StockEvent::LocationPurged { location_id: location.clone(), rows })]).await;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::StockError;

    fn p(n: i64) -> ProductId { ProductId::new(n).unwrap() }
    fn loc(s: &str) -> LocationId { LocationId::new(s).unwrap() }
    fn d(n: i64) -> StockDelta { StockDelta::new(n).unwrap() }

    #[tokio::test]
    async fn test_missing_row_is_zero_and_not_created() {
        let store = MemoryStore::new();
        let ledger = StockLedger::new(store.clone());
        for (product, location) in [(1, "a"), (2, "b"), (99, "store-1")] {
            assert_eq!(ledger.get_quantity(p(product), &loc(location)).await, Quantity::default());
        }
        assert!(store.records_for_product(p(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let ledger = StockLedger::new(MemoryStore::new());
        for q in [0, 1, 7, 1000] {
            assert!(ledger.set_quantity(p(1), &loc("a"), q).await);
            assert_eq!(ledger.get_quantity(p(1), &loc("a")).await.value() as i64, q);
        }
        assert!(ledger.set_quantity(p(1), &loc("a"), -5).await);
        assert_eq!(ledger.get_quantity(p(1), &loc("a")).await.value(), 0);
    }

    #[tokio::test]
    async fn test_apply_delta_clamps_at_zero() {
        let ledger = StockLedger::new(MemoryStore::new());
        for (start, delta) in [(5, 3), (5, -3), (5, -5), (5, -9), (0, 4)] {
            ledger.set_quantity(p(1), &loc("a"), start).await;
            let adj = ledger.apply_delta(p(1), &loc("a"), d(delta)).await.unwrap();
            let expected = (start + delta).max(0) as u32;
            assert_eq!(adj.old_quantity.value() as i64, start);
            assert_eq!(adj.new_quantity.value(), expected);
            assert_eq!(ledger.get_quantity(p(1), &loc("a")).await.value(), expected);
        }
    }

    #[tokio::test]
    async fn test_apply_delta_extreme_magnitudes() {
        let ledger = StockLedger::new(MemoryStore::new());
        ledger.set_quantity(p(1), &loc("a"), 5).await;
        let adj = ledger.apply_delta(p(1), &loc("a"), StockDelta::parse("+9223372036854775807").unwrap()).await.unwrap();
        assert_eq!(adj.new_quantity, Quantity::clamped(i64::MAX));
        assert_eq!(ledger.get_quantity(p(1), &loc("a")).await.value(), u32::MAX);

        ledger.set_quantity(p(1), &loc("a"), 5).await;
        let adj = ledger.apply_delta(p(1), &loc("a"), StockDelta::parse("-9223372036854775807").unwrap()).await.unwrap();
        assert_eq!(adj.new_quantity.value(), 0);

        let adj = ledger.apply_delta(p(2), &loc("a"), d(i64::MIN)).await.unwrap();
        assert!(adj.new_quantity.is_zero());
    }

    #[tokio::test]
    async fn test_apply_delta_creates_row() {
        let ledger = StockLedger::new(MemoryStore::new());
        let adj = ledger.apply_delta(p(3), &loc("b"), d(6)).await.unwrap();
        assert_eq!(adj.old_quantity.value(), 0);
        assert_eq!(ledger.get_quantity(p(3), &loc("b")).await.value(), 6);
    }

    #[tokio::test]
    async fn test_write_failure_reported() {
        let store = MemoryStore::new();
        let ledger = StockLedger::new(store.clone());
        ledger.set_quantity(p(1), &loc("a"), 4).await;
        store.fail_ledger_writes(true).unwrap();
        assert!(!ledger.set_quantity(p(1), &loc("a"), 9).await);
        assert!(!ledger.ensure_record_exists(p(2), &loc("a")).await);
        assert!(matches!(ledger.apply_delta(p(1), &loc("a"), d(1)).await, Err(StockError::Persistence(_))));
        store.fail_ledger_writes(false).unwrap();
        assert_eq!(ledger.get_quantity(p(1), &loc("a")).await.value(), 4);
    }

    #[tokio::test]
    async fn test_ensure_record_is_idempotent() {
        let store = MemoryStore::new();
        let ledger = StockLedger::new(store.clone());
        ledger.set_quantity(p(1), &loc("a"), 8).await;
        assert!(ledger.ensure_record_exists(p(1), &loc("a")).await);
        assert!(ledger.ensure_record_exists(p(1), &loc("b")).await);
        assert!(ledger.ensure_record_exists(p(1), &loc("b")).await);
        assert_eq!(ledger.get_quantity(p(1), &loc("a")).await.value(), 8);
        assert_eq!(store.records_for_product(p(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_location() {
        let ledger = StockLedger::new(MemoryStore::new());
        ledger.set_quantity(p(1), &loc("a"), 2).await;
        ledger.set_quantity(p(2), &loc("a"), 3).await;
        ledger.set_quantity(p(1), &loc("b"), 4).await;
        assert_eq!(ledger.remove_location(&loc("a")).await.unwrap(), 2);
        assert_eq!(ledger.get_quantity(p(2), &loc("a")).await.value(), 0);
        assert_eq!(ledger.get_quantity(p(1), &loc("b")).await.value(), 4);
    }
}
