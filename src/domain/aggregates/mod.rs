//! Aggregates module
pub mod location;
pub mod product;
pub mod order;
pub mod cart;

pub use location::{Location, Registry, RegistryError};
pub use product::{Product, ProductKind};
pub use order::{Address, LineItem, Order, OrderLocationBinding, OrderStatus};
pub use cart::{Cart, CartItem};
