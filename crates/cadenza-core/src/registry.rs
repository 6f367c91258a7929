//! Processing-unit registry.
//!
//! Loads each named unit into the engine exactly once, however many call
//! sites ask for it. A name is only marked registered after the engine has
//! accepted the module, so failed registrations can be retried.

use crate::engine::{ModuleHandle, ModuleLoader, UnitModule};
use crate::error::RegistrationError;
use crate::unit::UnitDefinition;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

struct RegisteredUnit {
    definition: Arc<UnitDefinition>,
    handle: ModuleHandle,
}

#[derive(Default)]
struct RegistryState {
    units: HashMap<String, RegisteredUnit>,
    packaged: u64,
}

/// Registry of units loaded into one engine.
pub struct UnitRegistry {
    loader: Arc<dyn ModuleLoader>,
    state: Mutex<RegistryState>,
}

impl UnitRegistry {
    pub fn new(loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            loader,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Register a unit, returning its name.
    ///
    /// Registering an already registered name succeeds without loading
    /// anything. Concurrent registrations of the same name load it once.
    pub fn register(&self, definition: UnitDefinition) -> Result<String, RegistrationError> {
        let name = definition.name().to_string();
        let mut state = self.state.lock();
        if state.units.contains_key(&name) {
            return Ok(name);
        }

        state.packaged += 1;
        let definition = Arc::new(definition);
        let module = UnitModule::new(Arc::clone(&definition), state.packaged);

        match self.loader.load_module(module) {
            Ok(handle) => {
                tracing::debug!("Registered unit '{}' as {}", name, handle.url());
                state
                    .units
                    .insert(name.clone(), RegisteredUnit { definition, handle });
                Ok(name)
            }
            Err(source) => {
                tracing::warn!("Failed to register unit '{}': {}", name, source);
                Err(RegistrationError { name, source })
            }
        }
    }

    pub fn has_registered(&self, name: &str) -> bool {
        self.state.lock().units.contains_key(name)
    }

    pub fn definition(&self, name: &str) -> Option<Arc<UnitDefinition>> {
        self.state
            .lock()
            .units
            .get(name)
            .map(|u| Arc::clone(&u.definition))
    }

    /// Registered names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.lock().units.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.state.lock().units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every loaded module and forget all registrations.
    ///
    /// Nodes already created keep running; new nodes of a released unit need
    /// it registered again.
    pub fn dispose(&self) {
        let units = std::mem::take(&mut self.state.lock().units);
        for unit in units.into_values() {
            self.loader.release_module(&unit.handle);
        }
        tracing::debug!("Unit registry disposed");
    }
}

impl std::fmt::Debug for UnitRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitRegistry")
            .field("units", &self.registered_names())
            .finish_non_exhaustive()
    }
}
