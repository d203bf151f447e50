//! Location registry settings.
//!
//! The settings form updates names and managers, adds one location, removes
//! locations and picks the default, all in one submission. The whole form is
//! applied to a copy of the registry and stored only if every step is valid.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::access::{Actor, Capability, Role};
use crate::domain::aggregates::{Location, Registry};
use crate::domain::events::EventPublisher;
use crate::domain::value_objects::{ActorId, LocationId};
use crate::ledger::StockLedger;
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::store::{ActorStore, Backend, SettingsStore};
use crate::{Result, StockError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub locations: Vec<LocationUpdate>,
    #[serde(default)]
    pub new_location: Option<NewLocation>,
    #[serde(default)]
    pub remove_locations: Vec<String>,
    #[serde(default)]
    pub default_location: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LocationUpdate {
    pub id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// `None` or `0` means unassigned.
    #[serde(default)]
    pub manager: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewLocation {
    #[validate(length(min = 1, max = 50))]
    pub id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub manager: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemovedLocation {
    pub location_id: LocationId,
    pub rows: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsOutcome {
    pub locations: Vec<Location>,
    pub default_location: Option<LocationId>,
    pub removed: Vec<RemovedLocation>,
    /// Present when removals changed the aggregate sums.
    pub reconcile: Option<ReconcileReport>,
}

#[derive(Clone)]
pub struct LocationAdmin<S> {
    store: S,
    ledger: StockLedger<S>,
    reconciler: Reconciler<S>,
}

impl<S: Backend> LocationAdmin<S> {
    pub fn new(store: S) -> Self {
        Self { ledger: StockLedger::new(store.clone()), reconciler: Reconciler::new(store.clone()), store }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.ledger = self.ledger.with_events(events.clone());
        self.reconciler = self.reconciler.with_events(events);
        self
    }

    pub async fn load(&self) -> Result<Registry> { self.store.load_registry().await }

    pub async fn save_settings(&self, actor: &Actor, form: SettingsForm) -> Result<SettingsOutcome> {
        actor.require(Capability::ManageLocations)?;
        let mut registry = self.load().await?;

        let mut updates = Vec::with_capacity(form.locations.len());
        for update in &form.locations {
            update.validate().map_err(StockError::validation)?;
            let id = parse_id(&update.id)?;
            if !registry.contains(&id) { continue; }
            let manager = self.check_manager(update.manager).await?;
            updates.push((id, update.name.trim(), manager));
        }
        // Unassign first so managers can move between updated locations.
        for (id, _, _) in &updates {
            registry.assign_manager(id, None).map_err(StockError::validation)?;
        }
        for (id, name, manager) in updates {
            registry.rename(&id, name).map_err(StockError::validation)?;
            registry.assign_manager(&id, manager).map_err(StockError::validation)?;
        }

        if let Some(new) = &form.new_location {
            new.validate().map_err(StockError::validation)?;
            let location = Location { id: parse_id(&new.id)?, name: new.name.trim().to_string(), manager: self.check_manager(new.manager).await? };
            registry.add(location).map_err(StockError::validation)?;
        }

        let mut removed_ids = Vec::new();
        for raw in &form.remove_locations {
            let id = parse_id(raw)?;
            if registry.remove(&id).is_some() { removed_ids.push(id); }
        }

        if let Some(raw) = form.default_location.as_deref().filter(|s| !s.trim().is_empty()) {
            registry.set_default(&parse_id(raw)?).map_err(StockError::validation)?;
        }

        self.store.save_registry(&registry).await?;
        tracing::info!(actor = %actor.id, locations = registry.len(), removed = removed_ids.len(), "Location settings saved");

        let mut removed = Vec::with_capacity(removed_ids.len());
        for id in removed_ids {
            let rows = self.ledger.remove_location(&id).await?;
            removed.push(RemovedLocation { location_id: id, rows });
        }
        let reconcile = if removed.is_empty() { None } else { Some(self.reconciler.reconcile_all(&registry).await?) };

        Ok(SettingsOutcome {
            locations: registry.locations().to_vec(),
            default_location: registry.default_location().cloned(),
            removed,
            reconcile,
        })
    }

    async fn check_manager(&self, manager: Option<u64>) -> Result<Option<ActorId>> {
        let Some(id) = manager.filter(|id| *id != 0).map(ActorId::new) else { return Ok(None) };
        match self.store.actor(id).await? {
            Some(actor) if actor.role == Role::LocationManager => Ok(Some(id)),
            _ => Err(StockError::Validation(format!("User {id} is not a location manager."))),
        }
    }
}

fn parse_id(raw: &str) -> Result<LocationId> {
    LocationId::sanitize(raw).map_err(|e| StockError::Validation(format!("Invalid location id {raw:?}: {e}")))
}
