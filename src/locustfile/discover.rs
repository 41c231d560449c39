use std::{collections::BTreeMap, sync::Arc};

use super::module::{Declaration, LoadedModule};
use crate::domain::{is_internal, ScenarioClass, LOCUST};

/// Name marking a declaration as private to its module.
const PRIVATE_PREFIX: char = '_';

/// Runnable scenarios of a loaded locustfile, by declared name.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCatalog {
    scenarios: BTreeMap<String, Arc<ScenarioClass>>,
}

impl ScenarioCatalog {
    pub fn get(&self, name: &str) -> Option<&Arc<ScenarioClass>> {
        self.scenarios.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scenarios.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenarios.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<ScenarioClass>)> {
        self.scenarios.iter().map(|(name, class)| (name.as_str(), class))
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

/// A public, user-defined class descending from `Locust`.
pub fn is_scenario(name: &str, declaration: &Declaration) -> bool {
    let Some(class) = declaration.as_class() else {
        return false;
    };
    class.is_subclass_of(&LOCUST) && !is_internal(class) && !name.starts_with(PRIVATE_PREFIX)
}

pub fn discover(module: &LoadedModule) -> ScenarioCatalog {
    let scenarios = module
        .declarations()
        .iter()
        .filter(|(name, declaration)| is_scenario(name, declaration))
        .filter_map(|(name, declaration)| {
            declaration
                .as_class()
                .map(|class| (name.clone(), class.clone()))
        })
        .collect::<BTreeMap<_, _>>();

    tracing::debug!(
        module = module.name(),
        scenarios = scenarios.len(),
        "scenario catalog built"
    );
    ScenarioCatalog { scenarios }
}
