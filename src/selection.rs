//! Shopper location selection and per-location stock visibility.

use serde::Serialize;

use crate::domain::aggregates::Registry;
use crate::domain::value_objects::{ActorId, LocationId, ProductId, Quantity};
use crate::ledger::StockLedger;
use crate::store::{CartStore, LedgerStore, SettingsStore};
use crate::{Result, StockError};

pub const SELECTED_LOCATION_COOKIE: &str = "wcmls_selected_location";

/// What a request knows about the shopper.
#[derive(Clone, Debug, Default)]
pub struct SelectionContext {
    /// Raw value of the selection cookie, if sent.
    pub cookie: Option<String>,
    /// Authenticated user, if any.
    pub actor: Option<ActorId>,
    /// Cart session key.
    pub session: Option<String>,
    /// Request renders an admin screen.
    pub admin_screen: bool,
    /// Request is an AJAX call.
    pub ajax: bool,
}

impl SelectionContext {
    /// Admin screens show the platform's own stock, except AJAX calls.
    pub fn shows_location_stock(&self) -> bool { !self.admin_screen || self.ajax }
}

/// cookie > user preference > configured default.
pub fn resolve_selected_location(
    cookie: Option<&LocationId>,
    preference: Option<&LocationId>,
    default: Option<&LocationId>,
) -> Option<LocationId> {
    cookie.or(preference).or(default).cloned()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectionCookie {
    pub name: &'static str,
    pub value: String,
    pub max_age_secs: i64,
}

impl SelectionCookie {
    pub fn header_value(&self) -> String {
        format!("{}={}; Max-Age={}; Path=/; SameSite=Lax", self.name, self.value, self.max_age_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub location_id: LocationId,
    pub location_name: String,
    pub cart_cleared: bool,
    #[serde(skip)]
    pub cookie: SelectionCookie,
}

/// The checkout billing-city dropdown built from location names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BillingCityField {
    pub options: Vec<String>,
    pub default: Option<String>,
}

#[derive(Clone)]
pub struct LocationSelector<S> {
    store: S,
    cookie_days: i64,
}

impl<S: SettingsStore + LedgerStore + CartStore + Clone> LocationSelector<S> {
    pub fn new(store: S, cookie_days: i64) -> Self { Self { store, cookie_days } }

    /// The shopper's active location. A cookie or preference naming a location
    /// that is no longer registered is ignored.
    pub async fn selected(&self, registry: &Registry, ctx: &SelectionContext) -> Result<Option<LocationId>> {
        let cookie = ctx.cookie.as_deref()
            .and_then(|raw| LocationId::sanitize(raw).ok())
            .filter(|id| registry.contains(id));
        let preference = match (cookie.is_none(), ctx.actor) {
            (true, Some(actor)) => self.store.location_preference(actor).await?.filter(|id| registry.contains(id)),
            _ => None,
        };
        Ok(resolve_selected_location(cookie.as_ref(), preference.as_ref(), registry.default_location()))
    }

    /// Switch the shopper to `raw_location`. Persists the user preference and
    /// empties the cart when the location actually changes.
    pub async fn select(&self, registry: &Registry, ctx: &SelectionContext, raw_location: &str) -> Result<Selection> {
        let location_id = LocationId::sanitize(raw_location).map_err(|_| StockError::validation("Invalid location."))?;
        let location = registry.get(&location_id).ok_or_else(|| StockError::validation("Invalid location."))?;
        let previous = self.selected(registry, ctx).await?;

        if let Some(actor) = ctx.actor {
            self.store.set_location_preference(actor, &location_id).await?;
        }
        let mut cart_cleared = false;
        if previous.as_ref() != Some(&location_id) {
            if let Some(session) = ctx.session.as_deref() {
                let dropped = self.store.clear_cart(session).await?;
                cart_cleared = dropped > 0;
                tracing::info!(session, dropped, location = %location_id, "Cart cleared on location change");
            }
        }
        Ok(Selection {
            location_name: location.name.clone(),
            cookie: SelectionCookie {
                name: SELECTED_LOCATION_COOKIE,
                value: location_id.to_string(),
                max_age_secs: self.cookie_days.saturating_mul(86_400),
            },
            location_id,
            cart_cleared,
        })
    }

    /// Stock quantity shown for a product. Falls back to the platform value
    /// on admin screens or when no location is selected.
    pub async fn stock_quantity_for(
        &self,
        registry: &Registry,
        ctx: &SelectionContext,
        product: ProductId,
        platform: Option<Quantity>,
    ) -> Result<Option<Quantity>> {
        if !ctx.shows_location_stock() { return Ok(platform); }
        match self.selected(registry, ctx).await? {
            Some(location) => Ok(Some(StockLedger::new(self.store.clone()).get_quantity(product, &location).await)),
            None => Ok(platform),
        }
    }

    pub async fn is_in_stock(&self, registry: &Registry, ctx: &SelectionContext, product: ProductId, platform: bool) -> Result<bool> {
        if !ctx.shows_location_stock() { return Ok(platform); }
        match self.selected(registry, ctx).await? {
            Some(location) => Ok(!StockLedger::new(self.store.clone()).get_quantity(product, &location).await.is_zero()),
            None => Ok(platform),
        }
    }

    /// Checkout requires a selected location.
    pub async fn validate_checkout(&self, registry: &Registry, ctx: &SelectionContext) -> Result<LocationId> {
        self.selected(registry, ctx).await?
            .ok_or_else(|| StockError::validation("Please select your location before checking out."))
    }

    pub async fn billing_city_field(&self, registry: &Registry, ctx: &SelectionContext) -> Result<BillingCityField> {
        let options = registry.locations().iter().map(|l| l.name.clone()).collect();
        let default = self.selected(registry, ctx).await?
            .and_then(|id| registry.get(&id).map(|l| l.name.clone()));
        Ok(BillingCityField { options, default })
    }
}
