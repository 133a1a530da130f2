//! Module registry
//!
//! Modules are stored as registered; the registry keeps their metadata next to
//! the instance and one circuit breaker per module name.

use crate::error::CommandError;
use crate::module::ControlModule;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;
use uuid::Uuid;
use warden_core_resilience::{CircuitBreaker, CircuitBreakerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(Uuid);

impl ModuleId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Registration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleOptions {
    /// Commands the module accepts; empty falls back to the module's own list
    pub capabilities: Vec<String>,

    /// Lower runs first in broadcasts and listings
    ///
    /// **Default:** 5
    pub priority: u8,

    /// Unhealthy essential modules mark the whole center degraded
    pub essential: bool,
}

impl Default for ModuleOptions {
    fn default() -> Self {
        Self {
            capabilities: Vec::new(),
            priority: 5,
            essential: false,
        }
    }
}

impl ModuleOptions {
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn essential(mut self) -> Self {
        self.essential = true;
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub name: String,
    pub capabilities: Vec<String>,
    pub priority: u8,
    pub essential: bool,
    pub registered_at: DateTime<Utc>,
}

impl ModuleInfo {
    pub fn supports(&self, command: &str) -> bool {
        self.capabilities.is_empty() || self.capabilities.iter().any(|c| c == command)
    }
}

pub(crate) struct ModuleEntry {
    pub info: ModuleInfo,
    pub module: Arc<dyn ControlModule>,
    pub breaker: CircuitBreaker,
}

#[derive(Default)]
pub(crate) struct ModuleRegistry {
    modules: RwLock<HashMap<String, Arc<ModuleEntry>>>,
    breaker_config: CircuitBreakerConfig,
}

impl ModuleRegistry {
    pub fn new(breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            modules: RwLock::new(HashMap::new()),
            breaker_config,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<ModuleEntry>>> {
        self.modules.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<ModuleEntry>>> {
        self.modules.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn is_poisoned(&self) -> bool {
        self.modules.is_poisoned()
    }

    pub fn register(
        &self,
        name: &str,
        module: Arc<dyn ControlModule>,
        options: ModuleOptions,
    ) -> Result<ModuleInfo, CommandError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CommandError::Validation("module name is empty".to_string()));
        }

        let mut modules = self.write();
        if modules.contains_key(name) {
            return Err(CommandError::ModuleExists(name.to_string()));
        }

        let capabilities = if options.capabilities.is_empty() {
            module.capabilities()
        } else {
            options.capabilities
        };
        let info = ModuleInfo {
            id: ModuleId::new(),
            name: name.to_string(),
            capabilities,
            priority: options.priority,
            essential: options.essential,
            registered_at: Utc::now(),
        };
        let entry = ModuleEntry {
            breaker: CircuitBreaker::new(format!("module:{}", name), self.breaker_config.clone()),
            info: info.clone(),
            module,
        };
        modules.insert(name.to_string(), Arc::new(entry));

        info!(
            "Registered module: {} ({}) priority={} essential={}",
            name, info.id, info.priority, info.essential
        );
        Ok(info)
    }

    /// Names are trimmed, as on registration
    pub fn unregister(&self, name: &str) -> Option<ModuleInfo> {
        let name = name.trim();
        let removed = self.write().remove(name)?;
        info!("Unregistered module: {}", name);
        Some(removed.info.clone())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModuleEntry>> {
        self.read().get(name.trim()).cloned()
    }

    /// All entries, by priority then name
    pub fn entries(&self) -> Vec<Arc<ModuleEntry>> {
        let mut entries: Vec<_> = self.read().values().cloned().collect();
        entries.sort_by(|a, b| {
            (a.info.priority, &a.info.name).cmp(&(b.info.priority, &b.info.name))
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }
}
