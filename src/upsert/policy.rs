use crate::record::CREATED_ON;
use lazy_static::lazy_static;
use std::collections::BTreeSet;

lazy_static! {
    /// Fields never written by the update branch of any upsert.
    pub static ref DEFAULT_UPDATE_EXCLUDE: BTreeSet<String> =
        [CREATED_ON.to_string()].into_iter().collect();
}

/// Per record type upsert configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertPolicy {
    conflict_target: BTreeSet<String>,
    update_exclude: BTreeSet<String>,
}

impl UpsertPolicy {
    pub fn new(conflict_target: BTreeSet<String>, update_exclude: BTreeSet<String>) -> Self {
        Self {
            conflict_target,
            update_exclude,
        }
    }

    /// Columns of the ON CONFLICT target. Must be non-empty to upsert.
    pub fn conflict_target(&self) -> &BTreeSet<String> {
        &self.conflict_target
    }

    /// Exclusions configured for this type only.
    pub fn update_exclude(&self) -> &BTreeSet<String> {
        &self.update_exclude
    }

    /// Configured exclusions merged with [`DEFAULT_UPDATE_EXCLUDE`].
    pub fn effective_exclusions(&self) -> BTreeSet<String> {
        self.update_exclude
            .union(&*DEFAULT_UPDATE_EXCLUDE)
            .cloned()
            .collect()
    }
}
