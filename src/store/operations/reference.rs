//! Reference data picked by operators when entering a weighing: vehicles,
//! cargo types, seasons, destinations (origins share the same table),
//! fields and sources.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};
use crate::validation::validate_name;

/// Common plumbing for every reference table.
pub trait ReferenceEntity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const ENTITY: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn tree(store: &Store) -> &sled::Tree;

    /// Label shown in history rows and report cells.
    fn display_name(&self) -> String;

    fn validate(&self) -> Result<(), String>;
}

fn join_non_blank<'a>(parts: impl IntoIterator<Item = Option<&'a str>>) -> String {
    parts
        .into_iter()
        .flatten()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" | ")
}

fn require_name(name: &str) -> Result<(), String> {
    validate_name(name).map_err(str::to_string)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub number: Option<String>,
    /// Empty weight, used as the default tare for new weighings.
    #[serde(default)]
    pub tare_weight: f64,
    #[serde(default)]
    pub description: Option<String>,
}

impl ReferenceEntity for Vehicle {
    const ENTITY: &'static str = "vehicle";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn tree(store: &Store) -> &sled::Tree {
        &store.vehicles
    }
    fn display_name(&self) -> String {
        self.name.clone()
    }
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name)?;
        if !self.tare_weight.is_finite() || self.tare_weight < 0.0 {
            return Err("Tare weight cannot be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CargoType {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub variety: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

impl ReferenceEntity for CargoType {
    const ENTITY: &'static str = "cargo_type";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn tree(store: &Store) -> &sled::Tree {
        &store.cargo_types
    }
    /// `name | kind | variety`, blanks skipped.
    fn display_name(&self) -> String {
        join_non_blank([
            Some(self.name.as_str()),
            self.kind.as_deref(),
            self.variety.as_deref(),
        ])
    }
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name)
    }
}

fn default_created_at() -> DateTime<Utc> {
    Utc::now()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default = "default_created_at")]
    pub created_at: DateTime<Utc>,
}

impl ReferenceEntity for Season {
    const ENTITY: &'static str = "season";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn tree(store: &Store) -> &sled::Tree {
        &store.seasons
    }
    fn display_name(&self) -> String {
        self.name.clone()
    }
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DestinationCategory {
    #[default]
    Other,
    Field,
    Storage,
    Export,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub category: DestinationCategory,
    /// Set when `category` is `Field`.
    #[serde(default)]
    pub field_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Destination {
    pub fn from_field(field: &Field) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: field.display_name(),
            category: DestinationCategory::Field,
            field_id: Some(field.id.clone()),
            location: field.location.clone(),
            description: None,
        }
    }
}

impl ReferenceEntity for Destination {
    const ENTITY: &'static str = "destination";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn tree(store: &Store) -> &sled::Tree {
        &store.destinations
    }
    fn display_name(&self) -> String {
        let name = self.name.trim();
        let label = match self.category {
            DestinationCategory::Other => return name.to_string(),
            DestinationCategory::Field => "Field",
            DestinationCategory::Storage => "Storage",
            DestinationCategory::Export => "Export",
        };
        if name.is_empty() {
            label.to_string()
        } else {
            format!("{label}: {name}")
        }
    }
    fn validate(&self) -> Result<(), String> {
        match self.category {
            DestinationCategory::Other => require_name(&self.name),
            DestinationCategory::Field if self.field_id.is_none() && self.name.trim().is_empty() => {
                Err("A field destination needs a field or a name".to_string())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub number: Option<i32>,
    #[serde(default)]
    pub name: Option<String>,
    /// Hectares, for yield calculations.
    #[serde(default)]
    pub area_ha: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ReferenceEntity for Field {
    const ENTITY: &'static str = "field";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn tree(store: &Store) -> &sled::Tree {
        &store.fields
    }
    fn display_name(&self) -> String {
        let number = self.number.map(|n| format!("Field #{n}"));
        let area = self.area_ha.map(format_hectares);
        join_non_blank([number.as_deref(), self.name.as_deref(), area.as_deref()])
    }
    fn validate(&self) -> Result<(), String> {
        if self.number.is_none() && self.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            return Err("A field needs a number or a name".to_string());
        }
        if let Some(area) = self.area_ha {
            if !area.is_finite() || area <= 0.0 {
                return Err("Field area must be positive".to_string());
            }
        }
        Ok(())
    }
}

/// One decimal place, trailing `.0` dropped.
fn format_hectares(area: f64) -> String {
    let rounded = (area * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{rounded:.0} ha")
    } else {
        format!("{rounded:.1} ha")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl ReferenceEntity for Source {
    const ENTITY: &'static str = "source";

    fn id(&self) -> &str {
        &self.id
    }
    fn set_id(&mut self, id: String) {
        self.id = id;
    }
    fn tree(store: &Store) -> &sled::Tree {
        &store.sources
    }
    fn display_name(&self) -> String {
        self.name.clone()
    }
    fn validate(&self) -> Result<(), String> {
        require_name(&self.name)
    }
}

impl Store {
    /// Inserts or replaces an entity. A blank id gets a fresh UUID.
    pub fn put_reference<T: ReferenceEntity>(&self, entity: &mut T) -> Result<(), StoreError> {
        entity.validate().map_err(StoreError::Validation)?;
        if entity.id().trim().is_empty() {
            entity.set_id(uuid::Uuid::new_v4().to_string());
        }
        let key = keys::reference_key(T::ENTITY, entity.id())?;
        T::tree(self).insert(key.as_bytes(), Self::serialize(entity)?)?;
        Ok(())
    }

    pub fn get_reference<T: ReferenceEntity>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let key = keys::reference_key(T::ENTITY, id)?;
        match T::tree(self).get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn reference_exists<T: ReferenceEntity>(&self, id: &str) -> Result<bool, StoreError> {
        let key = keys::reference_key(T::ENTITY, id)?;
        Ok(T::tree(self).contains_key(key.as_bytes())?)
    }

    pub fn list_references<T: ReferenceEntity>(&self) -> Result<Vec<T>, StoreError> {
        let mut items = Vec::new();
        for item in T::tree(self).iter() {
            let (_, value) = item?;
            items.push(Self::deserialize::<T>(&value)?);
        }
        Ok(items)
    }

    /// Returns `false` when nothing was stored under `id`.
    pub fn delete_reference<T: ReferenceEntity>(&self, id: &str) -> Result<bool, StoreError> {
        let key = keys::reference_key(T::ENTITY, id)?;
        Ok(T::tree(self).remove(key.as_bytes())?.is_some())
    }

    /// id -> display name, for resolving records in bulk.
    pub fn reference_names<T: ReferenceEntity>(&self) -> Result<HashMap<String, String>, StoreError> {
        Ok(self
            .list_references::<T>()?
            .into_iter()
            .map(|entity| (entity.id().to_string(), entity.display_name()))
            .collect())
    }

    /// The most recently created season, which data entry and history default to.
    pub fn latest_season(&self) -> Result<Option<Season>, StoreError> {
        Ok(self
            .list_references::<Season>()?
            .into_iter()
            .max_by_key(|season| season.created_at))
    }
}
