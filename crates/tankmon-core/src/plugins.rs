//! Plugin filtering and ordering.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::PluginState;

/// Default class-name markers for plugins the tool manages.
pub const DEFAULT_MANAGED_MARKERS: &[&str] = &[".microbot.", ".babytank"];

/// Class-name markers identifying drop-party helpers.
pub const DROP_PARTY_MARKERS: &[&str] = &["dropparty", "drop_party", "babydropparty"];

/// Case-insensitive substring markers selecting managed plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagedMarkers(Vec<String>);

impl Default for ManagedMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_MANAGED_MARKERS.iter().copied())
    }
}

impl ManagedMarkers {
    pub fn new<S: AsRef<str>>(markers: impl IntoIterator<Item = S>) -> Self {
        Self(
            markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        )
    }

    pub fn is_managed(&self, class_name: &str) -> bool {
        let lower = class_name.to_lowercase();
        self.0.iter().any(|m| lower.contains(m.as_str()))
    }

    pub fn filter<'a>(&'a self, plugins: &'a [PluginState]) -> impl Iterator<Item = &'a PluginState> {
        plugins.iter().filter(|p| self.is_managed(&p.class_name))
    }

    /// Class names of managed plugins that are currently active.
    pub fn active_class_names(&self, plugins: &[PluginState]) -> Vec<String> {
        self.filter(plugins)
            .filter(|p| p.active)
            .map(|p| p.class_name.clone())
            .collect()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

/// True when an active plugin looks like a drop-party helper.
pub fn drop_party_active(plugins: &[PluginState]) -> bool {
    plugins.iter().any(|p| {
        let lower = p.class_name.to_lowercase();
        p.active && DROP_PARTY_MARKERS.iter().any(|m| lower.contains(m))
    })
}

/// Favorites first, then the rest; each group by case-insensitive name.
pub fn order_plugins<'a>(
    plugins: impl IntoIterator<Item = &'a PluginState>,
    favorites: &HashSet<String>,
) -> Vec<&'a PluginState> {
    let mut ordered: Vec<&PluginState> = plugins.into_iter().collect();
    ordered.sort_by_cached_key(|p| {
        (
            !favorites.contains(&p.class_name),
            p.name.to_lowercase(),
        )
    });
    ordered
}
