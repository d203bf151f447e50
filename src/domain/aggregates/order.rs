//! Order Aggregate
//!
//! Orders belong to the host platform. The stock service reads the billing
//! city and line items and owns only the [`OrderLocationBinding`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{LocationId, OrderId, ProductId};

#[derive(Clone, Debug)]
pub struct Order {
    id: OrderId,
    status: OrderStatus,
    billing_address: Address,
    items: Vec<LineItem>,
    binding: OrderLocationBinding,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, Serialize, Deserialize)] pub struct LineItem { pub product_id: ProductId, pub name: String, pub quantity: u32 }
#[derive(Clone, Debug, Default, Serialize, Deserialize)] pub struct Address { pub name: String, pub street1: String, pub city: String, pub zip: String, pub country: String }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Processing, OnHold, Completed, Cancelled, Refunded, Failed }

impl OrderStatus {
    pub fn parse(s: &str) -> Self {
        match s.trim_start_matches("wc-") {
            "processing" => Self::Processing,
            "on-hold" | "on_hold" => Self::OnHold,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            "refunded" => Self::Refunded,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Processing => "processing", Self::OnHold => "on-hold",
            Self::Completed => "completed", Self::Cancelled => "cancelled", Self::Refunded => "refunded", Self::Failed => "failed",
        }
    }
}

/// Which location an order drew stock from and whether it currently holds a
/// decrement.
///
/// A single flag covers both directions: restoring stock clears it, so a later
/// completion event would decrement again.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLocationBinding {
    pub location_id: Option<LocationId>,
    pub stock_processed: bool,
}

impl Order {
    pub fn create(id: OrderId, billing_address: Address) -> Self {
        let now = Utc::now();
        Self {
            id, status: OrderStatus::Pending, billing_address, items: vec![],
            binding: OrderLocationBinding::default(), created_at: now, updated_at: now, events: vec![],
        }
    }

    /// Rehydrates a stored order.
    pub fn restore(id: OrderId, status: OrderStatus, billing_address: Address, items: Vec<LineItem>, binding: OrderLocationBinding, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        Self { id, status, billing_address, items, binding, created_at, updated_at, events: vec![] }
    }

    pub fn id(&self) -> OrderId { self.id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn billing_address(&self) -> &Address { &self.billing_address }
    pub fn billing_city(&self) -> &str { &self.billing_address.city }
    pub fn items(&self) -> &[LineItem] { &self.items }
    pub fn binding(&self) -> &OrderLocationBinding { &self.binding }
    pub fn is_stock_processed(&self) -> bool { self.binding.stock_processed }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn add_item(&mut self, item: LineItem) { self.items.push(item); self.touch(); }

    pub fn set_billing_city(&mut self, city: impl Into<String>) {
        self.billing_address.city = city.into();
        self.touch();
    }

    pub fn mark_stock_decremented(&mut self, location: LocationId) {
        self.binding = OrderLocationBinding { location_id: Some(location.clone()), stock_processed: true };
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StockDecremented { order_id: self.id, location_id: location }));
    }

    /// Clears the processed flag; the location stays recorded.
    pub fn mark_stock_restored(&mut self, location: LocationId) {
        self.binding = OrderLocationBinding { location_id: Some(location.clone()), stock_processed: false };
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StockRestored { order_id: self.id, location_id: location }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}
