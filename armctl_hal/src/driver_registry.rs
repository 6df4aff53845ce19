//! Registry of robot model factories.
//!
//! The control unit picks its robot by the `[robot] model` name. Factories
//! are registered at startup and the registry is passed by value; there is
//! no global state.

use crate::config::SimulationConfig;
use crate::drivers::simulation::SimulatedArm;
use armctl_common::robot::{RobotError, RobotModel};
use std::collections::HashMap;

/// Factory function building a model from the simulation section.
///
/// Hardware-backed factories ignore the simulation parameters and read
/// their own configuration.
pub type ModelFactory = fn(&SimulationConfig) -> Result<Box<dyn RobotModel>, RobotError>;

/// Registry of available robot models.
pub struct ModelRegistry {
    factories: HashMap<&'static str, ModelFactory>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with every model shipped in this crate.
    pub fn with_builtin_models() -> Self {
        let mut registry = Self::new();
        registry.factories.insert("simulation", simulation_factory);
        registry
    }

    /// Register a model factory.
    ///
    /// # Errors
    /// `RobotError::Config` if a model with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: ModelFactory) -> Result<(), RobotError> {
        if self.factories.contains_key(name) {
            return Err(RobotError::Config(format!(
                "robot model '{name}' is already registered"
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Create a model instance by name.
    ///
    /// # Errors
    /// `RobotError::ModelNotFound` if no model with the given name is registered.
    pub fn create(
        &self,
        name: &str,
        config: &SimulationConfig,
    ) -> Result<Box<dyn RobotModel>, RobotError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RobotError::ModelNotFound(name.to_string()))?;
        factory(config)
    }

    /// All registered model names, sorted.
    pub fn list_models(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_builtin_models()
    }
}

fn simulation_factory(config: &SimulationConfig) -> Result<Box<dyn RobotModel>, RobotError> {
    Ok(Box::new(SimulatedArm::new(config)?))
}
