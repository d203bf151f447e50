//! Location Registry Aggregate

use serde::{Deserialize, Serialize};
use crate::domain::value_objects::{ActorId, LocationId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    #[serde(default)]
    pub manager: Option<ActorId>,
}

impl Location {
    pub fn new(id: LocationId, name: impl Into<String>) -> Self {
        Self { id, name: name.into(), manager: None }
    }

    pub fn managed_by(mut self, manager: ActorId) -> Self { self.manager = Some(manager); self }
}

/// The registered locations, in insertion order, and the default location.
///
/// Loaded once per request and passed explicitly to the components that need
/// it. Invariants: ids are unique, an actor manages at most one location, and
/// the default (if any) names a registered location.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Registry {
    locations: Vec<Location>,
    default_location: Option<LocationId>,
}

impl Registry {
    /// Rebuilds a registry from stored values, dropping entries that would
    /// break an invariant.
    pub fn from_parts(locations: Vec<Location>, default_location: Option<LocationId>) -> Self {
        let mut registry = Self::default();
        for location in locations {
            if let Err(e) = registry.add(location) {
                tracing::warn!(error = %e, "Dropping stored location");
            }
        }
        if let Some(id) = default_location {
            let _ = registry.set_default(&id);
        }
        registry
    }

    pub fn locations(&self) -> &[Location] { &self.locations }
    pub fn ids(&self) -> impl Iterator<Item = &LocationId> { self.locations.iter().map(|l| &l.id) }
    pub fn len(&self) -> usize { self.locations.len() }
    pub fn is_empty(&self) -> bool { self.locations.is_empty() }
    pub fn default_location(&self) -> Option<&LocationId> { self.default_location.as_ref() }

    pub fn get(&self, id: &LocationId) -> Option<&Location> { self.locations.iter().find(|l| &l.id == id) }
    pub fn contains(&self, id: &LocationId) -> bool { self.get(id).is_some() }

    /// Exact display-name match, used to bind orders by billing city.
    pub fn find_by_name(&self, name: &str) -> Option<&Location> {
        if name.is_empty() { return None; }
        self.locations.iter().find(|l| l.name == name)
    }

    /// Linear scan for the location managed by `actor`.
    pub fn managed_by(&self, actor: ActorId) -> Option<&Location> {
        self.locations.iter().find(|l| l.manager == Some(actor))
    }

    pub fn add(&mut self, location: Location) -> Result<(), RegistryError> {
        if location.name.trim().is_empty() { return Err(RegistryError::EmptyName(location.id)); }
        if self.contains(&location.id) { return Err(RegistryError::Duplicate(location.id)); }
        if let Some(manager) = location.manager {
            self.check_manager_free(manager, &location.id)?;
        }
        self.locations.push(location);
        Ok(())
    }

    pub fn rename(&mut self, id: &LocationId, name: impl Into<String>) -> Result<(), RegistryError> {
        let name = name.into();
        if name.trim().is_empty() { return Err(RegistryError::EmptyName(id.clone())); }
        let location = self.get_mut(id)?;
        location.name = name;
        Ok(())
    }

    pub fn assign_manager(&mut self, id: &LocationId, manager: Option<ActorId>) -> Result<(), RegistryError> {
        if let Some(manager) = manager {
            self.check_manager_free(manager, id)?;
        }
        self.get_mut(id)?.manager = manager;
        Ok(())
    }

    /// Removes a location, clearing the default if it pointed there.
    pub fn remove(&mut self, id: &LocationId) -> Option<Location> {
        let index = self.locations.iter().position(|l| &l.id == id)?;
        if self.default_location.as_ref() == Some(id) { self.default_location = None; }
        Some(self.locations.remove(index))
    }

    pub fn set_default(&mut self, id: &LocationId) -> Result<(), RegistryError> {
        if !self.contains(id) { return Err(RegistryError::UnknownLocation(id.clone())); }
        self.default_location = Some(id.clone());
        Ok(())
    }

    pub fn clear_default(&mut self) { self.default_location = None; }

    fn get_mut(&mut self, id: &LocationId) -> Result<&mut Location, RegistryError> {
        self.locations.iter_mut().find(|l| &l.id == id).ok_or_else(|| RegistryError::UnknownLocation(id.clone()))
    }

    fn check_manager_free(&self, manager: ActorId, target: &LocationId) -> Result<(), RegistryError> {
        match self.managed_by(manager) {
            Some(existing) if &existing.id != target => Err(RegistryError::ManagerTaken { manager, location: existing.id.clone() }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Duplicate(LocationId),
    UnknownLocation(LocationId),
    EmptyName(LocationId),
    ManagerTaken { manager: ActorId, location: LocationId },
}
impl std::error::Error for RegistryError {}
impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate(id) => write!(f, "location {id} already exists"),
            Self::UnknownLocation(id) => write!(f, "location {id} does not exist"),
            Self::EmptyName(id) => write!(f, "location {id} needs a name"),
            Self::ManagerTaken { manager, location } => write!(f, "user {manager} already manages location {location}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> LocationId { LocationId::new(s).unwrap() }

    #[test]
    fn test_registry_crud() {
        let mut reg = Registry::default();
        reg.add(Location::new(id("store-1"), "Almaty")).unwrap();
        reg.add(Location::new(id("store-2"), "Astana").managed_by(ActorId::new(7))).unwrap();
        assert_eq!(reg.add(Location::new(id("store-1"), "Again")), Err(RegistryError::Duplicate(id("store-1"))));

        reg.rename(&id("store-1"), "Almaty Central").unwrap();
        assert_eq!(reg.find_by_name("Almaty Central").unwrap().id, id("store-1"));
        assert!(reg.find_by_name("Almaty").is_none());
        assert_eq!(reg.managed_by(ActorId::new(7)).unwrap().id, id("store-2"));
    }

    #[test]
    fn test_manager_bound_once() {
        let mut reg = Registry::default();
        reg.add(Location::new(id("a"), "A").managed_by(ActorId::new(3))).unwrap();
        reg.add(Location::new(id("b"), "B")).unwrap();
        assert!(matches!(reg.assign_manager(&id("b"), Some(ActorId::new(3))), Err(RegistryError::ManagerTaken { .. })));
        // Reassigning to the same location is fine.
        reg.assign_manager(&id("a"), Some(ActorId::new(3))).unwrap();
    }

    #[test]
    fn test_remove_clears_default() {
        let mut reg = Registry::default();
        reg.add(Location::new(id("a"), "A")).unwrap();
        reg.set_default(&id("a")).unwrap();
        assert!(reg.set_default(&id("zz")).is_err());
        assert!(reg.remove(&id("a")).is_some());
        assert!(reg.default_location().is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_from_parts_drops_invalid() {
        let reg = Registry::from_parts(
            vec![Location::new(id("a"), "A"), Location::new(id("a"), "dup"), Location::new(id("b"), " ")],
            Some(id("missing")),
        );
        assert_eq!(reg.len(), 1);
        assert!(reg.default_location().is_none());
    }
}
