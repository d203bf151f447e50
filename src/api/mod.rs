//! HTTP surface.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::config::Config;
use crate::domain::events::EventPublisher;
use crate::ledger::StockLedger;
use crate::lifecycle::OrderLifecycle;
use crate::reconcile::Reconciler;
use crate::registry::LocationAdmin;
use crate::selection::LocationSelector;
use crate::store::Backend;

pub mod error;
pub mod extract;
pub mod handlers;

pub use error::{ApiError, Success};
pub use extract::RequestIdentity;

#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub events: EventPublisher,
    pub config: Arc<Config>,
}

impl<S: Backend> AppState<S> {
    pub fn new(store: S, events: EventPublisher, config: Config) -> Self {
        Self { store, events, config: Arc::new(config) }
    }

    pub fn ledger(&self) -> StockLedger<S> { StockLedger::new(self.store.clone()).with_events(self.events.clone()) }

    pub fn reconciler(&self) -> Reconciler<S> { Reconciler::new(self.store.clone()).with_events(self.events.clone()) }

    pub fn selector(&self) -> LocationSelector<S> { LocationSelector::new(self.store.clone(), self.config.cookie_days) }

    pub fn lifecycle(&self) -> OrderLifecycle<S> {
        OrderLifecycle::new(self.store.clone(), self.config.cookie_days).with_events(self.events.clone())
    }

    pub fn location_admin(&self) -> LocationAdmin<S> { LocationAdmin::new(self.store.clone()).with_events(self.events.clone()) }
}

pub fn router<S: Backend>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/stock", get(handlers::list_stock::<S>))
        .route("/api/v1/stock/adjust", post(handlers::adjust_stock::<S>))
        .route("/api/v1/stock/reconcile", post(handlers::reconcile_all::<S>))
        .route("/api/v1/stock/initialize", post(handlers::initialize_stock::<S>))
        .route("/api/v1/products/:id/stock", get(handlers::product_stock::<S>))
        .route("/api/v1/location/select", post(handlers::select_location::<S>))
        .route("/api/v1/location/selected", get(handlers::selected_location::<S>))
        .route("/api/v1/checkout/validate", post(handlers::validate_checkout::<S>))
        .route("/api/v1/locations", get(handlers::list_locations::<S>).post(handlers::save_locations::<S>))
        .route("/api/v1/orders", get(handlers::list_orders::<S>))
        .route("/api/v1/hooks/orders/:id/:event", post(handlers::order_hook::<S>))
        .route("/api/v1/hooks/products/:id/saved", post(handlers::product_saved_hook::<S>))
        .route("/api/v1/admin/access", get(handlers::admin_access::<S>))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::access::{Actor, Role};
    use crate::domain::aggregates::{Address, Cart, CartItem, LineItem, Location, Order, Product, ProductKind, Registry};
    use crate::domain::value_objects::{ActorId, LocationId, OrderId, ProductId};
    use crate::store::{CatalogStore, MemoryStore, OrderStore, SettingsStore};

    const ADMIN: u64 = 1;
    const MANAGER_A: u64 = 10;
    const MANAGER_B: u64 = 11;

    fn loc(s: &str) -> LocationId { LocationId::new(s).unwrap() }
    fn p(n: i64) -> ProductId { ProductId::new(n).unwrap() }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_actor(Actor::new(ActorId::new(ADMIN), "Admin", Role::Administrator)).unwrap();
        store.insert_actor(Actor::new(ActorId::new(MANAGER_A), "Aigerim", Role::LocationManager)).unwrap();
        store.insert_actor(Actor::new(ActorId::new(MANAGER_B), "Bolat", Role::LocationManager)).unwrap();
        let mut reg = Registry::default();
        reg.add(Location::new(loc("store-a"), "Almaty").managed_by(ActorId::new(MANAGER_A))).unwrap();
        reg.add(Location::new(loc("store-b"), "Astana").managed_by(ActorId::new(MANAGER_B))).unwrap();
        reg.set_default(&loc("store-a")).unwrap();
        store.save_registry(&reg).await.unwrap();
        store.insert_product(Product::create(p(1), "Widget", ProductKind::Simple).with_managed_stock(0)).unwrap();
        store
    }

    const HOOK_SECRET: &str = "hook-s3cret";

    fn app(store: &MemoryStore) -> Router {
        let config = Config { hook_secret: Some(HOOK_SECRET.into()), ..Config::default() };
        router(AppState::new(store.clone(), EventPublisher::disabled(), config))
    }

    fn post_json(uri: &str, actor: Option<u64>, body: Value) -> Request<Body> {
        let mut req = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-wcmls-nonce", "tok")
            .header(header::COOKIE, "wcmls_nonce=tok; wcmls_session=sess; wcmls_selected_location=store-a");
        if let Some(id) = actor { req = req.header("x-actor-id", id.to_string()); }
        req.body(Body::from(body.to_string())).unwrap()
    }

    fn get_as(uri: &str, actor: u64) -> Request<Body> {
        Request::get(uri).header("x-actor-id", actor.to_string()).body(Body::empty()).unwrap()
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let store = MemoryStore::new();
        let (status, body) = send(app(&store), Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_manager_adjusts_own_location() {
        let store = seeded().await;
        let body = json!({ "product_id": 1, "location_id": "store-a", "delta": "+7" });
        let (status, body) = send(app(&store), post_json("/api/v1/stock/adjust", Some(MANAGER_A), body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["location_quantity"], 7);
        assert_eq!(body["data"]["old_quantity"], 0);
        assert_eq!(body["data"]["aggregate"], 7);
        assert_eq!(store.product(p(1)).await.unwrap().unwrap().stock_quantity().unwrap().value(), 7);
    }

    #[tokio::test]
    async fn test_manager_denied_foreign_location() {
        let store = seeded().await;
        let body = json!({ "product_id": 1, "location_id": "store-b", "delta": "5" });
        let (status, body) = send(app(&store), post_json("/api/v1/stock/adjust", Some(MANAGER_A), body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);
        assert_eq!(StockLedger::new(store.clone()).get_quantity(p(1), &loc("store-b")).await.value(), 0);
    }

    #[tokio::test]
    async fn test_adjust_rejections() {
        let store = seeded().await;
        let malformed = json!({ "product_id": 1, "location_id": "store-a", "delta": "abc" });
        let (status, _) = send(app(&store), post_json("/api/v1/stock/adjust", Some(ADMIN), malformed)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let zero = json!({ "product_id": 1, "location_id": "store-a", "delta": "0" });
        let (status, _) = send(app(&store), post_json("/api/v1/stock/adjust", Some(ADMIN), zero)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let unknown = json!({ "product_id": 1, "location_id": "store-z", "delta": "1" });
        let (status, _) = send(app(&store), post_json("/api/v1/stock/adjust", Some(ADMIN), unknown)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let anonymous = json!({ "product_id": 1, "location_id": "store-a", "delta": "1" });
        let (status, _) = send(app(&store), post_json("/api/v1/stock/adjust", None, anonymous)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_nonce_rejected() {
        let store = seeded().await;
        let req = Request::post("/api/v1/stock/adjust")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-actor-id", ADMIN.to_string())
            .body(Body::from(json!({ "product_id": 1, "location_id": "store-a", "delta": "1" }).to_string()))
            .unwrap();
        let (status, body) = send(app(&store), req).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["data"], "Security check failed.");
    }

    #[tokio::test]
    async fn test_stock_listing_is_scoped() {
        let store = seeded().await;
        let ledger = StockLedger::new(store.clone());
        ledger.set_quantity(p(1), &loc("store-a"), 3).await;
        ledger.set_quantity(p(1), &loc("store-b"), 4).await;

        let (_, admin) = send(app(&store), get_as("/api/v1/stock", ADMIN)).await;
        assert_eq!(admin["data"]["locations"].as_array().unwrap().len(), 2);
        assert_eq!(admin["data"]["rows"][0]["live_total"], 7);
        assert_eq!(admin["data"]["rows"][0]["in_sync"], false);

        let (_, manager) = send(app(&store), get_as("/api/v1/stock", MANAGER_B)).await;
        let columns = manager["data"]["rows"][0]["locations"].as_array().unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0]["location_id"], "store-b");
        assert_eq!(columns[0]["quantity"], 4);
        assert!(columns[0]["updated_at"].is_string());
        assert!(manager["data"]["locations"][0].get("manager").is_none());
    }

    #[tokio::test]
    async fn test_stock_listing_marks_missing_rows() {
        let store = seeded().await;
        store.insert_product(Product::create(p(2), "Zeta gadget", ProductKind::Simple).with_managed_stock(0)).unwrap();
        StockLedger::new(store.clone()).set_quantity(p(2), &loc("store-a"), 6).await;

        let (status, body) = send(app(&store), get_as("/api/v1/stock?search=zeta", ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        let columns = body["data"]["rows"][0]["locations"].as_array().unwrap();
        assert_eq!(columns[0]["location_id"], "store-a");
        assert_eq!(columns[0]["quantity"], 6);
        assert!(columns[0]["updated_at"].is_string());
        assert_eq!(columns[1]["location_id"], "store-b");
        assert_eq!(columns[1]["quantity"], 0);
        assert!(columns[1]["updated_at"].is_null());
    }

    #[tokio::test]
    async fn test_select_location_sets_cookie_and_clears_cart() {
        let store = seeded().await;
        let mut cart = Cart::new("sess");
        cart.add_item(CartItem { product_id: p(1), quantity: 1 });
        store.insert_cart(cart).unwrap();

        let res = app(&store).oneshot(post_json("/api/v1/location/select", None, json!({ "location_id": "store-b" }))).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let cookie = res.headers().get(header::SET_COOKIE).unwrap().to_str().unwrap().to_string();
        assert!(cookie.starts_with("wcmls_selected_location=store-b;"));
        assert!(cookie.contains("Max-Age=2592000"));
        let body: Value = serde_json::from_slice(&to_bytes(res.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["data"]["location_name"], "Astana");
        assert_eq!(body["data"]["cart_cleared"], true);
        assert!(store.cart("sess").unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_order_hooks_move_stock() {
        let store = seeded().await;
        StockLedger::new(store.clone()).set_quantity(p(1), &loc("store-b"), 10).await;
        let mut order = Order::create(OrderId::new(500).unwrap(), Address { city: "Astana".into(), ..Default::default() });
        order.add_item(LineItem { product_id: p(1), name: "Widget".into(), quantity: 4 });
        store.insert_order(order).unwrap();

        let hook = |event: &str| {
            Request::post(format!("/api/v1/hooks/orders/500/{event}"))
                .header("x-wcmls-hook-secret", HOOK_SECRET)
                .body(Body::empty())
                .unwrap()
        };
        let (status, body) = send(app(&store), hook("placed")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "processed");
        assert_eq!(StockLedger::new(store.clone()).get_quantity(p(1), &loc("store-b")).await.value(), 6);

        let (_, body) = send(app(&store), hook("completed")).await;
        assert_eq!(body["data"]["outcome"], "already_processed");

        send(app(&store), hook("cancelled")).await;
        assert_eq!(StockLedger::new(store.clone()).get_quantity(p(1), &loc("store-b")).await.value(), 10);

        let (status, _) = send(app(&store), hook("shipped")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_hooks_reject_unauthenticated_callers() {
        let store = seeded().await;
        StockLedger::new(store.clone()).set_quantity(p(1), &loc("store-b"), 10).await;
        let mut order = Order::create(OrderId::new(501).unwrap(), Address { city: "Astana".into(), ..Default::default() });
        order.add_item(LineItem { product_id: p(1), name: "Widget".into(), quantity: 4 });
        store.insert_order(order).unwrap();

        let anonymous = Request::post("/api/v1/hooks/orders/501/placed").body(Body::empty()).unwrap();
        let (status, body) = send(app(&store), anonymous).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["success"], false);

        let wrong_secret = Request::post("/api/v1/hooks/orders/501/placed")
            .header("x-wcmls-hook-secret", "guess")
            .body(Body::empty())
            .unwrap();
        assert_eq!(send(app(&store), wrong_secret).await.0, StatusCode::FORBIDDEN);

        // A manager with a valid nonce still lacks the location capability.
        let (status, _) = send(app(&store), post_json("/api/v1/hooks/orders/501/placed", Some(MANAGER_B), json!({}))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let product_hook = Request::post("/api/v1/hooks/products/1/saved").body(Body::empty()).unwrap();
        assert_eq!(send(app(&store), product_hook).await.0, StatusCode::FORBIDDEN);

        assert_eq!(StockLedger::new(store.clone()).get_quantity(p(1), &loc("store-b")).await.value(), 10);
        assert!(!store.order(OrderId::new(501).unwrap()).await.unwrap().unwrap().is_stock_processed());

        // An administrator passing the anti-forgery check may drive the hook.
        let (status, body) = send(app(&store), post_json("/api/v1/hooks/orders/501/placed", Some(ADMIN), json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["outcome"], "processed");
        assert_eq!(StockLedger::new(store.clone()).get_quantity(p(1), &loc("store-b")).await.value(), 6);
    }

    #[tokio::test]
    async fn test_orders_filtered_by_billing_city() {
        let store = seeded().await;
        store.insert_order(Order::create(OrderId::new(1).unwrap(), Address { city: "Almaty".into(), ..Default::default() })).unwrap();
        store.insert_order(Order::create(OrderId::new(2).unwrap(), Address { city: "Astana".into(), ..Default::default() })).unwrap();

        let (_, admin) = send(app(&store), get_as("/api/v1/orders", ADMIN)).await;
        assert_eq!(admin["data"].as_array().unwrap().len(), 2);
        let (_, manager) = send(app(&store), get_as("/api/v1/orders", MANAGER_A)).await;
        let orders = manager["data"].as_array().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["billing_city"], "Almaty");
    }

    #[tokio::test]
    async fn test_settings_save_requires_elevated() {
        let store = seeded().await;
        let form = json!({ "new_location": { "id": "store-c", "name": "Shymkent" } });
        let (status, _) = send(app(&store), post_json("/api/v1/locations", Some(MANAGER_A), form.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(app(&store), post_json("/api/v1/locations", Some(ADMIN), form)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["locations"].as_array().unwrap().len(), 3);
        assert_eq!(store.load_registry().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_admin_page_gate() {
        let store = seeded().await;
        let (status, _) = send(app(&store), get_as("/api/v1/admin/access?screen=admin.php&page=wc-settings", MANAGER_A)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(app(&store), get_as("/api/v1/admin/access?screen=admin.php&page=wcmls-stock", MANAGER_A)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send(app(&store), get_as("/api/v1/admin/access?screen=admin.php&page=wc-settings", ADMIN)).await;
        assert_eq!(status, StatusCode::OK);
    }
}
