//! Local entities and remote records.

use crate::ids::{EntityId, RemoteId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field name → value.
pub type FieldMap = BTreeMap<String, Value>;

/// A local entity as seen by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Entity type, e.g. `node` or `user`.
    pub entity_type: String,
    /// Bundle within the type.
    pub bundle: String,
    /// Id; `None` until first saved.
    pub id: Option<EntityId>,
    /// Field values.
    pub fields: FieldMap,
}

impl Entity {
    /// Creates an unsaved entity.
    pub fn new(entity_type: impl Into<String>, bundle: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            id: None,
            fields: FieldMap::new(),
        }
    }

    /// Sets the id.
    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Gets a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

/// A snapshot of one remote record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remote id.
    pub id: RemoteId,
    /// Remote object type.
    pub object_type: String,
    /// Unix time the remote last modified the record.
    pub modified: u64,
    /// Field values.
    pub fields: FieldMap,
}

impl RemoteRecord {
    /// Creates a record snapshot with no fields.
    pub fn new(id: impl Into<RemoteId>, object_type: impl Into<String>, modified: u64) -> Self {
        Self {
            id: id.into(),
            object_type: object_type.into(),
            modified,
            fields: FieldMap::new(),
        }
    }

    /// Sets a field value.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Gets a field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
