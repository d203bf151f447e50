//! Product Aggregate
//!
//! The host platform's view of a product as far as stock is concerned. The
//! aggregate stock quantity is a cached projection of the ledger and is only
//! written through [`Product::set_aggregate_stock`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::events::{DomainEvent, StockEvent};
use crate::domain::value_objects::{ProductId, Quantity};

#[derive(Clone, Debug)]
pub struct Product {
    id: ProductId,
    name: String,
    kind: ProductKind,
    manage_stock: bool,
    stock_quantity: Option<Quantity>,
    updated_at: DateTime<Utc>,
    events: Vec<DomainEvent>,
}

/// Variable products carry their stock on variations and are not tracked by
/// the ledger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductKind { #[default] Simple, Variable }

impl ProductKind {
    pub fn parse(s: &str) -> Self {
        match s { "variable" => Self::Variable, _ => Self::Simple }
    }
    pub fn as_str(&self) -> &'static str {
        match self { Self::Simple => "simple", Self::Variable => "variable" }
    }
}

impl Product {
    pub fn create(id: ProductId, name: impl Into<String>, kind: ProductKind) -> Self {
        Self { id, name: name.into(), kind, manage_stock: false, stock_quantity: None, updated_at: Utc::now(), events: vec![] }
    }

    /// Rehydrates a stored product.
    pub fn restore(id: ProductId, name: String, kind: ProductKind, manage_stock: bool, stock_quantity: Option<Quantity>, updated_at: DateTime<Utc>) -> Self {
        Self { id, name, kind, manage_stock, stock_quantity, updated_at, events: vec![] }
    }

    pub fn with_managed_stock(mut self, quantity: u32) -> Self {
        self.manage_stock = true;
        self.stock_quantity = Some(Quantity::new(quantity));
        self
    }

    pub fn id(&self) -> ProductId { self.id }
    pub fn name(&self) -> &str { &self.name }
    pub fn kind(&self) -> ProductKind { self.kind }
    pub fn manages_stock(&self) -> bool { self.manage_stock }
    pub fn stock_quantity(&self) -> Option<Quantity> { self.stock_quantity }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_composite(&self) -> bool { self.kind == ProductKind::Variable }

    /// Stock-managed simple products get ledger rows.
    pub fn is_ledger_tracked(&self) -> bool { self.manage_stock && !self.is_composite() }

    /// Writes the reconciled total and turns on stock management.
    pub fn set_aggregate_stock(&mut self, total: Quantity) {
        self.manage_stock = true;
        self.stock_quantity = Some(total);
        self.touch();
        self.raise_event(DomainEvent::Stock(StockEvent::Reconciled { product_id: self.id, total: total.value() }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_stock() {
        let mut p = Product::create(ProductId::new(1).unwrap(), "Widget", ProductKind::Simple);
        assert!(!p.is_ledger_tracked());
        p.set_aggregate_stock(Quantity::new(9));
        assert!(p.is_ledger_tracked());
        assert_eq!(p.stock_quantity(), Some(Quantity::new(9)));
        assert_eq!(p.take_events().len(), 1);
        assert!(p.take_events().is_empty());
    }

    #[test]
    fn test_variable_not_tracked() {
        let p = Product::create(ProductId::new(2).unwrap(), "Shirt", ProductKind::parse("variable")).with_managed_stock(3);
        assert!(p.is_composite());
        assert!(!p.is_ledger_tracked());
    }
}
