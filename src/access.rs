//! Access scoping.
//!
//! Maps an actor to at most one location and decides, per request, what that
//! actor may change and see. Everything here is a pure function of the actor
//! and the [`Registry`]; nothing is cached between requests.

use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{Location, Order, Registry};
use crate::domain::value_objects::{ActorId, LocationId};
use crate::{Result, StockError};

/// Admin pages served by this service.
pub const SETTINGS_PAGE: &str = "wcmls-settings";
pub const STOCK_PAGE: &str = "wcmls-stock";

const MANAGER_POST_TYPES: &[&str] = &["product", "shop_order"];
const MANAGER_HIDDEN_SCREENS: &[&str] = &[
    "index.php", "edit-comments.php", "themes.php", "plugins.php", "users.php", "tools.php", "options-general.php",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role { Administrator, ShopManager, LocationManager, Customer }

impl Role {
    pub fn parse(s: &str) -> Self {
        match s {
            "administrator" => Self::Administrator,
            "shop_manager" => Self::ShopManager,
            "location_manager" => Self::LocationManager,
            _ => Self::Customer,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::ShopManager => "shop_manager",
            Self::LocationManager => "location_manager",
            Self::Customer => "customer",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability { ManageLocations, EditProducts, EditShopOrders }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub display_name: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: ActorId, display_name: impl Into<String>, role: Role) -> Self {
        Self { id, display_name: display_name.into(), role }
    }

    pub fn can(&self, capability: Capability) -> bool {
        match capability {
            Capability::ManageLocations => matches!(self.role, Role::Administrator | Role::ShopManager),
            Capability::EditProducts | Capability::EditShopOrders => {
                matches!(self.role, Role::Administrator | Role::ShopManager | Role::LocationManager)
            }
        }
    }

    /// Elevated actors are never location-scoped.
    pub fn is_elevated(&self) -> bool { self.can(Capability::ManageLocations) }
    pub fn is_location_manager(&self) -> bool { self.role == Role::LocationManager }

    pub fn require(&self, capability: Capability) -> Result<()> {
        if self.can(capability) { Ok(()) } else { Err(StockError::unauthorized("You do not have permission to do this.")) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access { Allow, Deny }

impl Access {
    pub fn or_deny(self, message: &str) -> Result<()> {
        match self { Self::Allow => Ok(()), Self::Deny => Err(StockError::unauthorized(message)) }
    }
}

/// Which location columns an actor may see.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocationScope { All, Only(LocationId), Nothing }

impl LocationScope {
    pub fn includes(&self, id: &LocationId) -> bool {
        match self { Self::All => true, Self::Only(own) => own == id, Self::Nothing => false }
    }

    pub fn visible<'a>(&self, registry: &'a Registry) -> Vec<&'a Location> {
        registry.locations().iter().filter(|l| self.includes(&l.id)).collect()
    }
}

/// Which orders an actor may list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderFilter { All, BillingCity(String), Nothing }

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        match self { Self::All => true, Self::BillingCity(city) => order.billing_city() == city, Self::Nothing => false }
    }
}

pub fn resolve_actor_location(registry: &Registry, actor: ActorId) -> Option<LocationId> {
    registry.managed_by(actor).map(|l| l.id.clone())
}

pub fn authorize_mutation(registry: &Registry, actor: &Actor, target: &LocationId) -> Access {
    if !actor.can(Capability::EditProducts) { return Access::Deny; }
    if actor.is_elevated() { return Access::Allow; }
    match resolve_actor_location(registry, actor.id) {
        Some(own) if actor.is_location_manager() && &own == target => Access::Allow,
        _ => Access::Deny,
    }
}

pub fn authorize_view(registry: &Registry, actor: &Actor) -> LocationScope {
    if !actor.can(Capability::EditProducts) { return LocationScope::Nothing; }
    if actor.is_elevated() { return LocationScope::All; }
    match resolve_actor_location(registry, actor.id) {
        Some(own) if actor.is_location_manager() => LocationScope::Only(own),
        _ => LocationScope::Nothing,
    }
}

pub fn order_filter(registry: &Registry, actor: &Actor) -> OrderFilter {
    if !actor.can(Capability::EditShopOrders) { return OrderFilter::Nothing; }
    if actor.is_elevated() { return OrderFilter::All; }
    match registry.managed_by(actor.id) {
        Some(location) => OrderFilter::BillingCity(location.name.clone()),
        None => OrderFilter::Nothing,
    }
}

/// An admin screen request: the screen file (`admin.php`, `edit.php`, ...),
/// the `page` query parameter and the post type being listed or edited.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AdminPage {
    pub screen: String,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub post_type: Option<String>,
}

pub fn admin_page_allowed(actor: &Actor, request: &AdminPage) -> Access {
    let page = request.page.as_deref().unwrap_or("");
    if page == SETTINGS_PAGE && !actor.can(Capability::ManageLocations) { return Access::Deny; }
    if page == STOCK_PAGE && !actor.can(Capability::EditProducts) { return Access::Deny; }
    if !actor.is_location_manager() { return Access::Allow; }

    if MANAGER_HIDDEN_SCREENS.contains(&request.screen.as_str()) { return Access::Deny; }
    if request.screen == "admin.php" && !page.is_empty() && page != STOCK_PAGE
        && (page.starts_with("wc-") || page.contains("woocommerce"))
    {
        return Access::Deny;
    }
    if matches!(request.screen.as_str(), "edit.php" | "post.php" | "post-new.php") {
        if let Some(post_type) = request.post_type.as_deref().filter(|t| !t.is_empty()) {
            if !MANAGER_POST_TYPES.contains(&post_type) { return Access::Deny; }
        }
    }
    Access::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Address, Location};
    use crate::domain::value_objects::OrderId;

    fn id(s: &str) -> LocationId { LocationId::new(s).unwrap() }

    fn registry() -> Registry {
        let mut reg = Registry::default();
        reg.add(Location::new(id("warehouse-a"), "Almaty").managed_by(ActorId::new(10))).unwrap();
        reg.add(Location::new(id("warehouse-b"), "Astana").managed_by(ActorId::new(11))).unwrap();
        reg
    }

    fn manager(n: u64) -> Actor { Actor::new(ActorId::new(n), "Manager", Role::LocationManager) }

    #[test]
    fn test_scoped_actor_denied_foreign_location() {
        let reg = registry();
        assert_eq!(authorize_mutation(&reg, &manager(10), &id("warehouse-b")), Access::Deny);
        assert_eq!(authorize_mutation(&reg, &manager(10), &id("warehouse-a")), Access::Allow);
    }

    #[test]
    fn test_elevated_actor_allowed_everywhere() {
        let reg = registry();
        let admin = Actor::new(ActorId::new(1), "Admin", Role::Administrator);
        assert_eq!(authorize_mutation(&reg, &admin, &id("warehouse-a")), Access::Allow);
        assert_eq!(authorize_mutation(&reg, &admin, &id("warehouse-b")), Access::Allow);
        assert_eq!(authorize_view(&reg, &admin), LocationScope::All);
    }

    #[test]
    fn test_unscoped_actors_denied() {
        let reg = registry();
        assert_eq!(authorize_mutation(&reg, &manager(99), &id("warehouse-a")), Access::Deny);
        assert_eq!(authorize_view(&reg, &manager(99)), LocationScope::Nothing);
        let customer = Actor::new(ActorId::new(10), "Shopper", Role::Customer);
        assert_eq!(authorize_mutation(&reg, &customer, &id("warehouse-a")), Access::Deny);
    }

    #[test]
    fn test_view_scope() {
        let reg = registry();
        let scope = authorize_view(&reg, &manager(11));
        assert_eq!(scope, LocationScope::Only(id("warehouse-b")));
        let visible = scope.visible(&reg);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Astana");
    }

    #[test]
    fn test_order_filter_by_city() {
        let reg = registry();
        let filter = order_filter(&reg, &manager(10));
        let almaty = Order::create(OrderId::new(1).unwrap(), Address { city: "Almaty".into(), ..Default::default() });
        let astana = Order::create(OrderId::new(2).unwrap(), Address { city: "Astana".into(), ..Default::default() });
        assert!(filter.matches(&almaty));
        assert!(!filter.matches(&astana));
        assert_eq!(order_filter(&reg, &manager(50)), OrderFilter::Nothing);
    }

    #[test]
    fn test_admin_page_gate() {
        let lm = manager(10);
        let page = |screen: &str, page: Option<&str>, post_type: Option<&str>| AdminPage {
            screen: screen.into(), page: page.map(Into::into), post_type: post_type.map(Into::into),
        };
        assert_eq!(admin_page_allowed(&lm, &page("admin.php", Some(STOCK_PAGE), None)), Access::Allow);
        assert_eq!(admin_page_allowed(&lm, &page("admin.php", Some("wc-settings"), None)), Access::Deny);
        assert_eq!(admin_page_allowed(&lm, &page("admin.php", Some(SETTINGS_PAGE), None)), Access::Deny);
        assert_eq!(admin_page_allowed(&lm, &page("edit.php", None, Some("shop_order"))), Access::Allow);
        assert_eq!(admin_page_allowed(&lm, &page("edit.php", None, Some("page"))), Access::Deny);
        assert_eq!(admin_page_allowed(&lm, &page("plugins.php", None, None)), Access::Deny);

        let admin = Actor::new(ActorId::new(1), "Admin", Role::Administrator);
        assert_eq!(admin_page_allowed(&admin, &page("admin.php", Some("wc-settings"), None)), Access::Allow);
        assert_eq!(admin_page_allowed(&admin, &page("admin.php", Some(SETTINGS_PAGE), None)), Access::Allow);
    }
}
