use std::{collections::BTreeMap, sync::Arc};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Module name under which the harness exports its own base classes.
pub const HARNESS_MODULE: &str = "locust";

/// Wait between two tasks of a user when no class in the hierarchy sets one.
pub const DEFAULT_WAIT_MS: u64 = 1000;

/// Root of every runnable scenario.
pub static LOCUST: Lazy<Arc<ScenarioClass>> = Lazy::new(|| {
    Arc::new(ScenarioClass::new(
        "Locust",
        HARNESS_MODULE,
        Some("Base class for a simulated user.".to_string()),
        None,
        ClassAttributes {
            min_wait: Some(DEFAULT_WAIT_MS),
            max_wait: Some(DEFAULT_WAIT_MS),
            ..Default::default()
        },
    ))
});

/// Base for users that talk to an HTTP host.
pub static HTTP_LOCUST: Lazy<Arc<ScenarioClass>> = Lazy::new(|| {
    Arc::new(ScenarioClass::new(
        "HttpLocust",
        HARNESS_MODULE,
        Some("Simulated user with an HTTP client bound to `host`.".to_string()),
        Some(LOCUST.clone()),
        ClassAttributes::default(),
    ))
});

/// Look up a name exported by the harness module.
pub fn harness_export(name: &str) -> Option<Arc<ScenarioClass>> {
    match name {
        "Locust" => Some(LOCUST.clone()),
        "HttpLocust" => Some(HTTP_LOCUST.clone()),
        _ => None,
    }
}

/// True for the harness's own scaffolding classes. Compared by identity, so a
/// user class that merely reuses one of the names is not internal.
pub fn is_internal(class: &Arc<ScenarioClass>) -> bool {
    [&*LOCUST, &*HTTP_LOCUST]
        .into_iter()
        .any(|base| Arc::ptr_eq(base, class))
}

/// One weighted task of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

/// Attributes a class declares itself. Unset attributes are inherited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassAttributes {
    pub host: Option<String>,
    pub min_wait: Option<u64>,
    pub max_wait: Option<u64>,
    pub tasks: Option<Vec<TaskSpec>>,
    pub extra: BTreeMap<String, toml::Value>,
}

/// A class-like declaration loaded from a locustfile (or shipped by the harness).
#[derive(Debug)]
pub struct ScenarioClass {
    name: String,
    module: String,
    doc: Option<String>,
    parent: Option<Arc<ScenarioClass>>,
    attributes: ClassAttributes,
}

impl ScenarioClass {
    pub fn new(
        name: impl Into<String>,
        module: impl Into<String>,
        doc: Option<String>,
        parent: Option<Arc<ScenarioClass>>,
        attributes: ClassAttributes,
    ) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            doc,
            parent,
            attributes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.module, self.name)
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn parent(&self) -> Option<&Arc<ScenarioClass>> {
        self.parent.as_ref()
    }

    pub fn attributes(&self) -> &ClassAttributes {
        &self.attributes
    }

    /// The class itself followed by its parents, nearest first.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    pub fn is_subclass_of(&self, base: &ScenarioClass) -> bool {
        self.ancestors().any(|class| std::ptr::eq(class, base))
    }

    pub fn host(&self) -> Option<&str> {
        self.ancestors()
            .find_map(|class| class.attributes.host.as_deref())
    }

    pub fn min_wait(&self) -> u64 {
        self.ancestors()
            .find_map(|class| class.attributes.min_wait)
            .unwrap_or(DEFAULT_WAIT_MS)
    }

    pub fn max_wait(&self) -> u64 {
        self.ancestors()
            .find_map(|class| class.attributes.max_wait)
            .unwrap_or(DEFAULT_WAIT_MS)
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        self.ancestors()
            .find_map(|class| class.attributes.tasks.as_deref())
            .unwrap_or(&[])
    }

    pub fn attribute(&self, key: &str) -> Option<&toml::Value> {
        self.ancestors()
            .find_map(|class| class.attributes.extra.get(key))
    }

    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            name: self.name.clone(),
            module: self.module.clone(),
            host: self.host().map(str::to_owned),
            min_wait_ms: self.min_wait(),
            max_wait_ms: self.max_wait(),
            tasks: self.tasks().to_vec(),
        }
    }
}

pub struct Ancestors<'a> {
    next: Option<&'a ScenarioClass>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ScenarioClass;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}

/// Serializable view of a scenario for the web monitor.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub name: String,
    pub module: String,
    pub host: Option<String>,
    pub min_wait_ms: u64,
    pub max_wait_ms: u64,
    pub tasks: Vec<TaskSpec>,
}
