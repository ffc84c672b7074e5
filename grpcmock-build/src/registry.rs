//! Mock strategies and the registry they are looked up in.

use std::{collections::HashMap, fmt::Debug};

use tracing::debug;

use crate::{
    error::{GeneratorError, GeneratorResult},
    golang::GoFile,
    model::ProtoFile,
};

/// A mock strategy produces a complete set of test doubles for the services of
/// a file in the idiom of one particular Go testing library.
pub trait MockStrategy {
    /// Name the strategy is registered under.
    fn name(&self) -> &'static str;

    /// Appends the doubles for every service of `file` to `out`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be mocked; the caller must discard `out`.
    fn mock(&self, file: &ProtoFile, out: &mut GoFile) -> GeneratorResult<()>;
}

/// Builds a fresh strategy for one generation run.
pub type StrategyConstructor = Box<dyn Fn() -> Box<dyn MockStrategy> + Send + Sync>;

/// Maps strategy names to their constructors.
///
/// Populated once at start up and only read afterwards, so a shared reference
/// can be handed to concurrent generation runs.
#[derive(Default)]
pub struct StrategyRegistry {
    constructors: HashMap<String, StrategyConstructor>,
}

impl StrategyRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `constructor` under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        constructor: impl Fn() -> Box<dyn MockStrategy> + Send + Sync + 'static,
    ) {
        let name = name.into();
        debug!(strategy = %name, "registering mock strategy");
        self.constructors.insert(name, Box::new(constructor));
    }

    /// Creates the strategy registered under exactly `name`.
    ///
    /// # Errors
    ///
    /// Will return [`GeneratorError::UnknownStrategy`] listing every registered
    /// name if there is no such strategy.
    pub fn resolve(&self, name: &str) -> GeneratorResult<Box<dyn MockStrategy>> {
        match self.constructors.get(name) {
            Some(constructor) => Ok(constructor()),
            None => Err(GeneratorError::UnknownStrategy {
                requested: name.to_string(),
                available: self.names(),
            }),
        }
    }

    /// Registered names in alphabetical order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}
