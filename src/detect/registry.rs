use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::{DetectionCapability, DetectorBackend};

/// Shared backend handle. `DetectorBackend::detect` takes `&mut self`, hence the `Mutex`.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Registry of detector backends.
pub struct BackendRegistry {
    backends: HashMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Registered backend names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that supports the requested capability.
    ///
    /// Prefers the default backend when it supports the capability.
    pub fn backend_for_capability(&self, capability: DetectionCapability) -> Result<SharedBackend> {
        if let Some(default_backend) = self.default_backend() {
            if supports(&default_backend, capability)? {
                return Ok(default_backend);
            }
        }

        for name in self.list() {
            let Some(backend) = self.get(&name) else {
                continue;
            };
            if supports(&backend, capability)? {
                return Ok(backend);
            }
        }

        Err(anyhow!(
            "no registered backend supports capability {:?}",
            capability
        ))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn supports(backend: &SharedBackend, capability: DetectionCapability) -> Result<bool> {
    let guard = backend
        .lock()
        .map_err(|_| anyhow!("backend lock poisoned"))?;
    Ok(guard.supports(capability))
}
