// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{Level, event};

use crate::{Error, Group, Loader, Result};

/// A directory of groups addressable by name.
///
/// Registries are ordinary values: a process usually creates one at startup and shares it
/// behind an [`Arc`] with everything that needs to resolve groups by name, such as the
/// server answering peers. Independent registries never see each other's groups.
///
/// Group names are unique within a registry. Registering a second group under a taken name
/// fails with [`Error::DuplicateGroup`] and leaves the existing group in place.
#[derive(Debug, Default)]
pub struct GroupRegistry {
    groups: RwLock<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a group and registers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateGroup`] if the name is taken.
    pub fn new_group(&self, name: impl Into<String>, cache_bytes: u64, loader: impl Loader + 'static) -> Result<Arc<Group>> {
        let group = Group::builder(name).cache_bytes(cache_bytes).loader(loader).build()?;
        self.insert(group)
    }

    /// Registers a group built elsewhere.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateGroup`] if the name is taken.
    pub fn insert(&self, group: Group) -> Result<Arc<Group>> {
        match self.groups.write().entry(group.name().to_owned()) {
            Entry::Occupied(entry) => {
                event!(Level::ERROR, message = "group registered more than once", group = %entry.key());
                Err(Error::DuplicateGroup { name: entry.key().clone() })
            }
            Entry::Vacant(entry) => {
                event!(Level::INFO, message = "group registered", group = %entry.key(), cache_bytes = group.cache_capacity());
                Ok(Arc::clone(entry.insert(Arc::new(group))))
            }
        }
    }

    /// Returns the group called `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.read().get(name).cloned()
    }

    /// Removes the group called `name` and detaches it from its peer routing.
    ///
    /// A picker shared with other groups, such as a transport pool serving the whole
    /// registry, keeps serving them.
    pub fn destroy(&self, name: &str) -> Option<Arc<Group>> {
        let group = self.groups.write().remove(name)?;
        group.stop();
        event!(Level::INFO, message = "group destroyed", group = name);
        Some(group)
    }

    /// Destroys every group.
    pub fn clear(&self) {
        let groups: Vec<_> = self.groups.write().drain().map(|(_, group)| group).collect();
        for group in groups {
            group.stop();
            event!(Level::INFO, message = "group destroyed", group = group.name());
        }
    }

    /// Returns the names of all registered groups, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.groups.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.read().len()
    }

    /// Returns `true` if no group is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.read().is_empty()
    }
}
