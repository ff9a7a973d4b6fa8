//! Task strategy registry.
//!
//! Maps task kind strings to oracle factories so callers pick a strategy
//! by name. Registration is explicit: strategies are seeded here or added
//! at startup via [`register_task`], never discovered by naming
//! convention.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::{debug, warn};

use mcts::{Oracle, SearchConfig};

use crate::client::CompletionClient;
use crate::math::MathOracle;

/// Builds the oracle for one task kind from the shared transport and the
/// search configuration.
pub type OracleFactory = fn(Arc<dyn CompletionClient>, &SearchConfig) -> Arc<dyn Oracle>;

static REGISTRY: Lazy<Mutex<HashMap<String, OracleFactory>>> = Lazy::new(|| {
    let mut map: HashMap<String, OracleFactory> = HashMap::new();
    map.insert("math".to_string(), math_factory);
    Mutex::new(map)
});

fn math_factory(client: Arc<dyn CompletionClient>, config: &SearchConfig) -> Arc<dyn Oracle> {
    Arc::new(MathOracle::new(client, config.clone()))
}

/// Register a strategy factory under a task kind. Re-registering a kind
/// replaces the previous factory.
pub fn register_task(kind: &str, factory: OracleFactory) {
    let mut registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    if registry.insert(kind.to_string(), factory).is_some() {
        warn!(kind, "task strategy factory replaced");
    } else {
        debug!(kind, "task strategy registered");
    }
}

/// Resolve a task kind to a ready oracle. Returns `None` for kinds with no
/// registered strategy.
pub fn create_oracle(
    kind: &str,
    client: Arc<dyn CompletionClient>,
    config: &SearchConfig,
) -> Option<Arc<dyn Oracle>> {
    let registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    registry.get(kind).map(|factory| factory(client, config))
}

/// Task kinds with a registered strategy, sorted for stable output.
pub fn list_registered_tasks() -> Vec<String> {
    let registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    let mut kinds: Vec<String> = registry.keys().cloned().collect();
    kinds.sort();
    kinds
}

pub fn is_registered(kind: &str) -> bool {
    let registry = REGISTRY.lock().unwrap_or_else(|e| e.into_inner());
    registry.contains_key(kind)
}
