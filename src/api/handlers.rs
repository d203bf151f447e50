//! Route handlers.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::access::{self, AdminPage, Capability, LocationScope};
use crate::domain::aggregates::Location;
use crate::domain::value_objects::{ActorId, LocationId, OrderId, ProductId, Quantity, StockDelta};
use crate::lifecycle::{InitReport, LifecycleOutcome, OrderHook};
use crate::reconcile::ReconcileReport;
use crate::registry::{SettingsForm, SettingsOutcome};
use crate::selection::BillingCityField;
use crate::store::{ActorStore, Backend, CatalogStore, LedgerStore, OrderStore, SettingsStore, StockRecord};
use crate::{Actor, Registry, StockError};

use super::error::{ApiError, ApiResult, Success};
use super::extract::RequestIdentity;
use super::AppState;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy", "service": "opensase-location-stock" }))
}

// =============================================================================
// Stock
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct AdjustRequest {
    pub product_id: i64,
    #[validate(length(min = 1, max = 50))]
    pub location_id: String,
    /// `+N`, `-N` or `N`.
    pub delta: String,
}

#[derive(Debug, Serialize)]
pub struct AdjustResponse {
    pub location_quantity: Quantity,
    pub aggregate: Quantity,
    pub old_quantity: Quantity,
    pub delta: StockDelta,
}

pub async fn adjust_stock<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
    Json(req): Json<AdjustRequest>,
) -> ApiResult<AdjustResponse> {
    identity.verify_nonce()?;
    let actor = state.current_actor(&identity).await?;
    req.validate().map_err(StockError::validation)?;

    let product_id = ProductId::new(req.product_id).ok_or_else(|| StockError::validation("Invalid product."))?;
    let location = LocationId::new(req.location_id.trim()).map_err(|e| StockError::validation(format!("Invalid location: {e}")))?;
    let delta = StockDelta::parse(&req.delta).map_err(StockError::validation)?;

    let registry = state.registry().await?;
    if !registry.contains(&location) { return Err(StockError::LocationNotFound.into()); }
    access::authorize_mutation(&registry, &actor, &location)
        .or_deny("You do not have permission to manage stock at this location.")?;

    let product = state.store.product(product_id).await?.ok_or(StockError::ProductNotFound)?;
    if product.is_composite() { return Err(StockError::UnsupportedProduct.into()); }

    let adjustment = state.ledger().apply_delta(product_id, &location, delta).await?;
    let aggregate = state.reconciler().reconcile(&registry, product_id).await?;
    tracing::info!(actor = %actor.id, product = %product_id, %location, %delta, aggregate = aggregate.value(), "Stock adjusted from admin");

    Ok(Success(AdjustResponse {
        location_quantity: adjustment.new_quantity,
        aggregate,
        old_quantity: adjustment.old_quantity,
        delta,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct StockListParams {
    pub search: Option<String>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LocationQuantity {
    pub location_id: LocationId,
    pub quantity: Quantity,
    /// Last write to the row; `None` when the location has no row yet.
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct StockRow {
    pub product_id: ProductId,
    pub name: String,
    pub aggregate: Option<Quantity>,
    pub live_total: Quantity,
    pub in_sync: bool,
    pub locations: Vec<LocationQuantity>,
}

#[derive(Debug, Serialize)]
pub struct StockListing {
    pub locations: Vec<LocationView>,
    pub rows: Vec<StockRow>,
    pub total: usize,
    pub page: usize,
}

pub async fn list_stock<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
    Query(params): Query<StockListParams>,
) -> ApiResult<StockListing> {
    let actor = state.current_actor(&identity).await?;
    actor.require(Capability::EditProducts)?;
    let registry = state.registry().await?;
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).clamp(1, 100);

    let scope = access::authorize_view(&registry, &actor);
    if matches!(scope, LocationScope::Nothing) {
        tracing::debug!(actor = %actor.id, "Location manager has no location assigned");
        return Ok(Success(StockListing { locations: vec![], rows: vec![], total: 0, page }));
    }
    let visible = scope.visible(&registry);

    let needle = params.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_lowercase);
    let products: Vec<_> = state.store.products().await?.into_iter()
        .filter(|p| p.is_ledger_tracked())
        .filter(|p| needle.as_ref().map_or(true, |n| p.name().to_lowercase().contains(n)))
        .collect();
    let total = products.len();

    let reconciler = state.reconciler();
    let mut rows = Vec::new();
    for product in products.iter().skip((page - 1) * per_page).take(per_page) {
        let mut records: HashMap<LocationId, StockRecord> = state.store.records_for_product(product.id()).await?
            .into_iter()
            .map(|r| (r.location_id.clone(), r))
            .collect();
        let locations = visible.iter().map(|location| match records.remove(&location.id) {
            Some(record) => LocationQuantity { location_id: record.location_id, quantity: record.quantity, updated_at: Some(record.updated_at) },
            None => LocationQuantity { location_id: location.id.clone(), quantity: Quantity::default(), updated_at: None },
        }).collect();
        let check = reconciler.check(&registry, product).await;
        rows.push(StockRow {
            product_id: product.id(),
            name: product.name().to_string(),
            aggregate: check.cached,
            live_total: check.live,
            in_sync: check.in_sync,
            locations,
        });
    }

    let elevated = actor.is_elevated();
    let locations = visible.into_iter().map(|l| LocationView::of(l, elevated)).collect();
    Ok(Success(StockListing { locations, rows, total, page }))
}

pub async fn reconcile_all<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
) -> ApiResult<ReconcileReport> {
    identity.verify_nonce()?;
    let actor = state.current_actor(&identity).await?;
    actor.require(Capability::ManageLocations)?;
    let registry = state.registry().await?;
    Ok(Success(state.reconciler().reconcile_all(&registry).await?))
}

pub async fn initialize_stock<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
) -> ApiResult<InitReport> {
    identity.verify_nonce()?;
    let actor = state.current_actor(&identity).await?;
    actor.require(Capability::ManageLocations)?;
    let registry = state.registry().await?;
    Ok(Success(state.lifecycle().initialize_all(&registry).await?))
}

#[derive(Debug, Serialize)]
pub struct ProductStock {
    pub product_id: ProductId,
    pub quantity: Option<Quantity>,
    pub in_stock: bool,
}

/// Stock as the current shopper sees it.
pub async fn product_stock<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
    Path(id): Path<i64>,
) -> ApiResult<ProductStock> {
    let product_id = ProductId::new(id).ok_or(StockError::ProductNotFound)?;
    let product = state.store.product(product_id).await?.ok_or(StockError::ProductNotFound)?;
    let registry = state.registry().await?;
    let ctx = identity.selection_context();
    let selector = state.selector();

    let platform = product.stock_quantity();
    let platform_in_stock = !product.manages_stock() || platform.is_some_and(|q| !q.is_zero());
    let quantity = selector.stock_quantity_for(&registry, &ctx, product_id, platform).await?;
    let in_stock = selector.is_in_stock(&registry, &ctx, product_id, platform_in_stock).await?;
    Ok(Success(ProductStock { product_id, quantity, in_stock }))
}

// =============================================================================
// Shopper location
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SelectRequest {
    pub location_id: String,
}

pub async fn select_location<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
    Json(req): Json<SelectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    identity.verify_nonce()?;
    let registry = state.registry().await?;
    let selection = state.selector().select(&registry, &identity.selection_context(), &req.location_id).await?;
    let body = json!({
        "message": format!("Location changed to {}", selection.location_name),
        "location_id": selection.location_id,
        "location_name": selection.location_name,
        "cart_cleared": selection.cart_cleared,
    });
    Ok(([(header::SET_COOKIE, selection.cookie.header_value())], Success(body)))
}

#[derive(Debug, Serialize)]
pub struct SelectedLocation {
    pub location_id: Option<LocationId>,
    pub location_name: Option<String>,
    pub billing_city: BillingCityField,
}

pub async fn selected_location<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
) -> ApiResult<SelectedLocation> {
    let registry = state.registry().await?;
    let ctx = identity.selection_context();
    let selector = state.selector();
    let location_id = selector.selected(&registry, &ctx).await?;
    let location_name = location_id.as_ref().and_then(|id| registry.get(id)).map(|l| l.name.clone());
    let billing_city = selector.billing_city_field(&registry, &ctx).await?;
    Ok(Success(SelectedLocation { location_id, location_name, billing_city }))
}

pub async fn validate_checkout<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
) -> ApiResult<serde_json::Value> {
    let registry = state.registry().await?;
    let location = state.selector().validate_checkout(&registry, &identity.selection_context()).await?;
    Ok(Success(json!({ "location_id": location })))
}

// =============================================================================
// Location settings
// =============================================================================

#[derive(Debug, Serialize)]
pub struct LocationView {
    pub id: LocationId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<ActorId>,
}

impl LocationView {
    /// Manager assignments are only shown to elevated actors.
    fn of(location: &Location, with_manager: bool) -> Self {
        Self {
            id: location.id.clone(),
            name: location.name.clone(),
            manager: if with_manager { location.manager } else { None },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LocationList {
    pub locations: Vec<LocationView>,
    pub default_location: Option<LocationId>,
}

pub async fn list_locations<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
) -> ApiResult<LocationList> {
    let registry = state.registry().await?;
    let elevated = match identity.actor {
        Some(id) => state.store.actor(id).await?.is_some_and(|a| a.is_elevated()),
        None => false,
    };
    Ok(Success(LocationList {
        locations: registry.locations().iter().map(|l| LocationView::of(l, elevated)).collect(),
        default_location: registry.default_location().cloned(),
    }))
}

pub async fn save_locations<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
    Json(form): Json<SettingsForm>,
) -> ApiResult<SettingsOutcome> {
    identity.verify_nonce()?;
    let actor = state.current_actor(&identity).await?;
    Ok(Success(state.location_admin().save_settings(&actor, form).await?))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub status: &'static str,
    pub billing_city: String,
    pub location_id: Option<LocationId>,
    pub stock_processed: bool,
    pub items: usize,
    pub created_at: DateTime<Utc>,
}

pub async fn list_orders<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
) -> ApiResult<Vec<OrderView>> {
    let actor = state.current_actor(&identity).await?;
    actor.require(Capability::EditShopOrders)?;
    let registry = state.registry().await?;
    let filter = access::order_filter(&registry, &actor);
    let orders = state.store.orders(&filter).await?;
    Ok(Success(orders.iter().map(|o| OrderView {
        id: o.id(),
        status: o.status().as_str(),
        billing_city: o.billing_city().to_string(),
        location_id: o.binding().location_id.clone(),
        stock_processed: o.is_stock_processed(),
        items: o.items().len(),
        created_at: o.created_at(),
    }).collect()))
}

// =============================================================================
// Host platform hooks
// =============================================================================

pub async fn order_hook<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
    Path((id, event)): Path<(i64, String)>,
) -> ApiResult<LifecycleOutcome> {
    state.authorize_hook(&identity).await?;
    let order_id = OrderId::new(id).ok_or(StockError::OrderNotFound)?;
    let hook = OrderHook::parse(&event).ok_or_else(|| StockError::validation(format!("Unknown order event {event:?}.")))?;
    let registry = state.registry().await?;
    let outcome = state.lifecycle().handle(&registry, hook, order_id, &identity.selection_context()).await?;
    Ok(Success(outcome))
}

pub async fn product_saved_hook<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
    Path(id): Path<i64>,
) -> ApiResult<serde_json::Value> {
    state.authorize_hook(&identity).await?;
    let product_id = ProductId::new(id).ok_or(StockError::ProductNotFound)?;
    let registry = state.registry().await?;
    let initialized = state.lifecycle().on_product_saved(&registry, product_id).await?;
    Ok(Success(json!({ "initialized": initialized })))
}

// =============================================================================
// Admin screens
// =============================================================================

pub async fn admin_access<S: Backend>(
    State(state): State<AppState<S>>,
    identity: RequestIdentity,
    Query(page): Query<AdminPage>,
) -> ApiResult<serde_json::Value> {
    let actor = state.current_actor(&identity).await?;
    access::admin_page_allowed(&actor, &page).or_deny("You do not have permission to access this page.")?;
    Ok(Success(json!({ "allowed": true })))
}

impl<S: Backend> AppState<S> {
    /// The authenticated actor, or 403 for anonymous and unknown callers.
    async fn current_actor(&self, identity: &RequestIdentity) -> Result<Actor, ApiError> {
        let id = identity.actor.ok_or_else(|| ApiError::forbidden("Authentication required."))?;
        self.store.actor(id).await?.ok_or_else(|| ApiError::forbidden("Authentication required."))
    }

    /// Hooks come from the host platform with the shared secret, or from an
    /// elevated actor passing the anti-forgery check.
    async fn authorize_hook(&self, identity: &RequestIdentity) -> Result<(), ApiError> {
        if identity.carries_hook_secret(self.config.hook_secret.as_deref()) { return Ok(()); }
        identity.verify_nonce()?;
        self.current_actor(identity).await?.require(Capability::ManageLocations)?;
        Ok(())
    }

    async fn registry(&self) -> Result<Registry, ApiError> {
        Ok(self.store.load_registry().await?)
    }
}
