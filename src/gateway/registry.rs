//! Registry of installed plugins keyed by menu number.
//!
//! Built once at startup, before the gateway serves traffic, and shared
//! read-only afterwards. Registration conflicts are fatal.

use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::errors::GatewayError;
use crate::plugin::Plugin;

#[derive(Clone, Default)]
pub struct PluginRegistry {
    by_menu: BTreeMap<u32, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its metadata's menu number.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), GatewayError> {
        let meta = plugin.metadata();
        if meta.menu_number == 0 {
            return Err(GatewayError::InvalidPluginMetadata(format!(
                "'{}' has menu number 0",
                meta.name
            )));
        }
        if meta.name.trim().is_empty() {
            return Err(GatewayError::InvalidPluginMetadata(
                "plugin name cannot be empty".to_string(),
            ));
        }
        if let Some(existing) = self.by_menu.get(&meta.menu_number) {
            return Err(GatewayError::DuplicateMenuNumber {
                menu_number: meta.menu_number,
                existing: existing.metadata().name.clone(),
            });
        }
        if self
            .by_menu
            .values()
            .any(|p| p.metadata().name == meta.name)
        {
            return Err(GatewayError::DuplicatePluginName(meta.name.clone()));
        }
        debug!(
            "Registered plugin '{}' at menu #{}",
            meta.name, meta.menu_number
        );
        self.by_menu.insert(meta.menu_number, plugin);
        Ok(())
    }

    /// Builder-style registration for startup code.
    pub fn with(mut self, plugin: Arc<dyn Plugin>) -> Result<Self, GatewayError> {
        self.register(plugin)?;
        Ok(self)
    }

    pub fn lookup_by_menu(&self, menu_number: u32) -> Option<Arc<dyn Plugin>> {
        self.by_menu.get(&menu_number).cloned()
    }

    /// All plugins in ascending menu-number order.
    pub fn list_ordered(&self) -> Vec<Arc<dyn Plugin>> {
        self.by_menu.values().cloned().collect()
    }

    pub fn menu_numbers(&self) -> Vec<u32> {
        self.by_menu.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_menu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_menu.is_empty()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.by_menu
                    .iter()
                    .map(|(n, p)| (n, p.metadata().name.as_str())),
            )
            .finish()
    }
}
