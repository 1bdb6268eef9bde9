//! Mappings between local entity types and remote object types.

use crate::ids::MappingId;
use crate::item::{PullOp, PushOp};
use crate::record::{Entity, FieldMap, RemoteRecord};
use serde::{Deserialize, Serialize};

/// Which way a field flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Local → remote only.
    Push,
    /// Remote → local only.
    Pull,
    /// Both ways.
    Sync,
}

impl Direction {
    fn pushes(self) -> bool {
        matches!(self, Direction::Push | Direction::Sync)
    }

    fn pulls(self) -> bool {
        matches!(self, Direction::Pull | Direction::Sync)
    }
}

/// One field correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Local field name.
    pub local: String,
    /// Remote field name.
    pub remote: String,
    /// Direction of flow.
    pub direction: Direction,
}

impl FieldMapping {
    /// Creates a correspondence.
    pub fn new(local: impl Into<String>, remote: impl Into<String>, direction: Direction) -> Self {
        Self {
            local: local.into(),
            remote: remote.into(),
            direction,
        }
    }
}

/// Which entity and record events trigger synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTriggers {
    /// Push on local create.
    pub push_create: bool,
    /// Push on local update.
    pub push_update: bool,
    /// Push on local delete.
    pub push_delete: bool,
    /// Create local entities for unmatched remote records.
    pub pull_create: bool,
    /// Update local entities from changed remote records.
    pub pull_update: bool,
    /// Delete local entities whose remote record was deleted.
    pub pull_delete: bool,
}

impl SyncTriggers {
    /// Every trigger enabled.
    pub fn all() -> Self {
        Self {
            push_create: true,
            push_update: true,
            push_delete: true,
            pull_create: true,
            pull_update: true,
            pull_delete: true,
        }
    }

    /// Every trigger disabled.
    pub fn none() -> Self {
        Self {
            push_create: false,
            push_update: false,
            push_delete: false,
            pull_create: false,
            pull_update: false,
            pull_delete: false,
        }
    }

    /// Returns true if a local change of this kind should be pushed.
    pub fn pushes(&self, op: PushOp) -> bool {
        match op {
            PushOp::Create => self.push_create,
            PushOp::Update => self.push_update,
            PushOp::Delete => self.push_delete,
        }
    }

    /// Returns true if any pull trigger is on.
    pub fn pulls(&self) -> bool {
        self.pull_create || self.pull_update || self.pull_delete
    }

    /// Returns true if a remote change of this kind should be pulled.
    pub fn pulls_op(&self, op: PullOp) -> bool {
        match op {
            PullOp::Upsert => self.pull_create || self.pull_update,
            PullOp::Delete => self.pull_delete,
        }
    }
}

impl Default for SyncTriggers {
    fn default() -> Self {
        Self::all()
    }
}

/// One synchronization configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    /// Machine name.
    pub id: MappingId,
    /// Local entity type.
    pub entity_type: String,
    /// Local bundle.
    pub bundle: String,
    /// Remote object type.
    pub remote_object_type: String,
    /// Remote field holding the last-modified timestamp.
    pub pull_trigger_field: String,
    /// Field correspondences.
    pub fields: Vec<FieldMapping>,
    /// Enabled triggers.
    #[serde(default)]
    pub triggers: SyncTriggers,
    /// Pull may be driven by the standalone endpoint.
    #[serde(default)]
    pub pull_standalone: bool,
    /// Push may be driven by the standalone endpoint.
    #[serde(default)]
    pub push_standalone: bool,
    /// Maximum push items claimed per run; 0 uses the global default.
    #[serde(default)]
    pub push_limit: u32,
    /// Run order among mappings; lower runs first.
    #[serde(default)]
    pub weight: i32,
}

impl Mapping {
    /// Creates a mapping with every trigger on and no fields.
    pub fn new(
        id: impl Into<MappingId>,
        entity_type: impl Into<String>,
        bundle: impl Into<String>,
        remote_object_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            bundle: bundle.into(),
            remote_object_type: remote_object_type.into(),
            pull_trigger_field: "LastModifiedDate".to_string(),
            fields: Vec::new(),
            triggers: SyncTriggers::all(),
            pull_standalone: false,
            push_standalone: false,
            push_limit: 0,
            weight: 0,
        }
    }

    /// Adds a field correspondence.
    pub fn with_field(
        mut self,
        local: impl Into<String>,
        remote: impl Into<String>,
        direction: Direction,
    ) -> Self {
        self.fields.push(FieldMapping::new(local, remote, direction));
        self
    }

    /// Sets the triggers.
    pub fn with_triggers(mut self, triggers: SyncTriggers) -> Self {
        self.triggers = triggers;
        self
    }

    /// Sets the standalone flags.
    pub fn with_standalone(mut self, pull: bool, push: bool) -> Self {
        self.pull_standalone = pull;
        self.push_standalone = push;
        self
    }

    /// Sets the per-run push limit.
    pub fn with_push_limit(mut self, limit: u32) -> Self {
        self.push_limit = limit;
        self
    }

    /// Returns true if this mapping covers the given entity.
    pub fn applies_to(&self, entity: &Entity) -> bool {
        self.entity_type == entity.entity_type && self.bundle == entity.bundle
    }

    /// Remote field names read on pull.
    pub fn pull_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.direction.pulls())
            .map(|f| f.remote.as_str())
    }

    /// Builds the remote field set for an entity.
    pub fn push_values(&self, entity: &Entity) -> FieldMap {
        self.fields
            .iter()
            .filter(|f| f.direction.pushes())
            .filter_map(|f| {
                entity
                    .field(&f.local)
                    .map(|value| (f.remote.clone(), value.clone()))
            })
            .collect()
    }

    /// Copies pulled values from a record onto an entity.
    pub fn apply_pull(&self, record: &RemoteRecord, entity: &mut Entity) {
        for f in self.fields.iter().filter(|f| f.direction.pulls()) {
            if let Some(value) = record.field(&f.remote) {
                entity.fields.insert(f.local.clone(), value.clone());
            }
        }
    }
}
