//! Domain events raised by ledger and order transitions.
//!
//! Events are published to NATS when a client is configured and are always
//! logged.

use crate::domain::value_objects::{LocationId, OrderId, ProductId};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Stock(StockEvent),
    Order(OrderEvent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StockEvent {
    Adjusted { product_id: ProductId, location_id: LocationId, old_quantity: u32, new_quantity: u32 },
    Reconciled { product_id: ProductId, total: u32 },
    LocationPurged { location_id: LocationId, rows: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    StockDecremented { order_id: OrderId, location_id: LocationId },
    StockRestored { order_id: OrderId, location_id: LocationId },
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Stock(StockEvent::Adjusted { .. }) => "stock.adjusted",
            Self::Stock(StockEvent::Reconciled { .. }) => "stock.reconciled",
            Self::Stock(StockEvent::LocationPurged { .. }) => "stock.location_purged",
            Self::Order(OrderEvent::StockDecremented { .. }) => "stock.order_decremented",
            Self::Order(OrderEvent::StockRestored { .. }) => "stock.order_restored",
        }
    }
}

/// Fan-out for domain events. Cheap to clone.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Log-only publisher.
    pub fn disabled() -> Self { Self { nats: None } }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        for event in events {
            tracing::info!(subject = event.subject(), event = ?event, "Domain event");
            let Some(client) = &self.nats else { continue };
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => { tracing::warn!(error = %e, "Failed to encode event"); continue; }
            };
            if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
                tracing::warn!(subject = event.subject(), error = %e, "Failed to publish event");
            }
        }
    }
}
