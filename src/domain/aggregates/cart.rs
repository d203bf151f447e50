//! Cart Aggregate
//!
//! A shopper's in-progress cart. Carts are tied to the location that was
//! selected when items were added; switching location empties the cart.

use uuid::Uuid;
use crate::domain::value_objects::ProductId;

#[derive(Clone, Debug)]
pub struct Cart {
    id: Uuid,
    session_id: String,
    items: Vec<CartItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl Cart {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { id: Uuid::now_v7(), session_id: session_id.into(), items: vec![] }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn session_id(&self) -> &str { &self.session_id }

    /// Empties the cart and returns how many lines were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.items.len();
        self.items.clear();
        dropped
    }
}

// Carts are filled by the storefront; the service only ever empties them.
#[cfg(test)]
impl Cart {
    pub fn add_item(&mut self, item: CartItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            existing.quantity += item.quantity;
        } else {
            self.items.push(item);
        }
    }

    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
}
