//! Pull query builder.
//!
//! A [`PullQuery`] is built per mapping, handed by value through each
//! query-alter hook, then frozen with [`PullQuery::finalize`]. Transports
//! only ever see the frozen [`FinalizedQuery`].

use crate::error::{ProtocolError, ProtocolResult};
use crate::ids::MappingId;
use crate::mapping::Mapping;
use std::collections::BTreeSet;

/// A mutable pull query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullQuery {
    mapping: MappingId,
    object_type: String,
    fields: BTreeSet<String>,
    modified_field: String,
    modified_since: Option<u64>,
    limit: Option<u32>,
}

impl PullQuery {
    /// Creates the default query for a mapping: every pulled field plus
    /// the id and trigger field.
    pub fn for_mapping(mapping: &Mapping) -> Self {
        let mut fields: BTreeSet<String> = mapping.pull_fields().map(str::to_string).collect();
        fields.insert("Id".to_string());
        fields.insert(mapping.pull_trigger_field.clone());

        Self {
            mapping: mapping.id.clone(),
            object_type: mapping.remote_object_type.clone(),
            fields,
            modified_field: mapping.pull_trigger_field.clone(),
            modified_since: None,
            limit: None,
        }
    }

    /// Mapping the query was built for.
    pub fn mapping(&self) -> &MappingId {
        &self.mapping
    }

    /// Selected fields so far.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.fields
    }

    /// Adds a selected field.
    pub fn add_field(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into());
        self
    }

    /// Restricts to records modified strictly after `since`.
    pub fn modified_since(mut self, since: u64) -> Self {
        self.modified_since = Some(since);
        self
    }

    /// Caps the number of records returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Freezes the query.
    pub fn finalize(self) -> ProtocolResult<FinalizedQuery> {
        if self.object_type.is_empty() {
            return Err(ProtocolError::invalid("object_type", "must not be empty"));
        }
        if self.limit == Some(0) {
            return Err(ProtocolError::invalid("limit", "must be positive"));
        }
        Ok(FinalizedQuery { inner: self })
    }
}

/// A frozen pull query, ready for a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedQuery {
    inner: PullQuery,
}

impl FinalizedQuery {
    /// Mapping the query was built for.
    pub fn mapping(&self) -> &MappingId {
        &self.inner.mapping
    }

    /// Remote object type.
    pub fn object_type(&self) -> &str {
        &self.inner.object_type
    }

    /// Selected fields.
    pub fn fields(&self) -> &BTreeSet<String> {
        &self.inner.fields
    }

    /// Field compared against `modified_since`.
    pub fn modified_field(&self) -> &str {
        &self.inner.modified_field
    }

    /// Lower bound (exclusive) on the modified timestamp.
    pub fn since(&self) -> Option<u64> {
        self.inner.modified_since
    }

    /// Row cap.
    pub fn row_limit(&self) -> Option<u32> {
        self.inner.limit
    }
}
