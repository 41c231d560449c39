//! In-memory form of a loaded locustfile.
//!
//! A locustfile is a TOML document. Top-level keys become declarations:
//! a table carrying `extends` is a class, anything else a plain value.
//! `doc` is the module docstring and `use` imports `module.Name` entries,
//! where module `locust` is the harness itself.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Deserialize;

use super::loader::Importer;
use crate::{
    domain::{harness_export, ClassAttributes, ScenarioClass, TaskSpec, HARNESS_MODULE},
    error::LoadError,
};

const DOC_KEY: &str = "doc";
const USE_KEY: &str = "use";
const EXTENDS_KEY: &str = "extends";

#[derive(Debug, Clone)]
pub enum Declaration {
    Class(Arc<ScenarioClass>),
    Value(toml::Value),
}

impl Declaration {
    pub fn as_class(&self) -> Option<&Arc<ScenarioClass>> {
        match self {
            Declaration::Class(class) => Some(class),
            Declaration::Value(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedModule {
    name: String,
    path: PathBuf,
    doc: Option<String>,
    declarations: BTreeMap<String, Declaration>,
}

impl LoadedModule {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn declarations(&self) -> &BTreeMap<String, Declaration> {
        &self.declarations
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    /// Build a module directly from declarations, bypassing the file format.
    pub fn from_declarations(
        name: impl Into<String>,
        doc: Option<String>,
        declarations: impl IntoIterator<Item = (String, Declaration)>,
    ) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::new(),
            doc,
            declarations: declarations.into_iter().collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ClassBody {
    extends: String,
    doc: Option<String>,
    host: Option<String>,
    min_wait: Option<u64>,
    max_wait: Option<u64>,
    tasks: Option<Vec<TaskSpec>>,
    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

/// Evaluate module `name` from `source`, importing dependencies through `importer`.
pub(crate) fn parse(
    name: &str,
    path: &Path,
    source: &str,
    importer: &mut Importer<'_>,
) -> Result<LoadedModule, LoadError> {
    let mut table: toml::Table = source.parse().map_err(|source| LoadError::Syntax {
        path: path.to_path_buf(),
        source,
    })?;

    let doc = match table.remove(DOC_KEY) {
        None => None,
        Some(toml::Value::String(doc)) => Some(doc),
        Some(_) => return Err(invalid_special(name, DOC_KEY, "a string")),
    };

    let imports = match table.remove(USE_KEY) {
        None => BTreeMap::new(),
        Some(entries) => import_all(name, entries, importer)?,
    };

    let mut bodies = BTreeMap::new();
    let mut values = BTreeMap::new();
    for (key, value) in table {
        match value {
            toml::Value::Table(body) if body.contains_key(EXTENDS_KEY) => {
                let body: ClassBody = toml::Value::Table(body).try_into().map_err(
                    |e: toml::de::Error| LoadError::InvalidClass {
                        module: name.to_string(),
                        class: key.clone(),
                        reason: e.message().to_string(),
                    },
                )?;
                bodies.insert(key, body);
            }
            other => {
                values.insert(key, other);
            }
        }
    }

    let mut builder = ClassBuilder {
        module: name,
        imports: &imports,
        values: &values,
        bodies: &bodies,
        built: BTreeMap::new(),
        visiting: Vec::new(),
    };
    for class in bodies.keys() {
        builder.build(class)?;
    }
    let classes = builder.built;

    let declarations = imports
        .into_iter()
        .chain(values.into_iter().map(|(k, v)| (k, Declaration::Value(v))))
        .chain(classes.into_iter().map(|(k, c)| (k, Declaration::Class(c))))
        .collect();

    Ok(LoadedModule {
        name: name.to_string(),
        path: path.to_path_buf(),
        doc,
        declarations,
    })
}

fn invalid_special(module: &str, key: &'static str, expected: &'static str) -> LoadError {
    LoadError::InvalidSpecial {
        module: module.to_string(),
        key,
        expected,
    }
}

fn import_all(
    module: &str,
    entries: toml::Value,
    importer: &mut Importer<'_>,
) -> Result<BTreeMap<String, Declaration>, LoadError> {
    let toml::Value::Array(entries) = entries else {
        return Err(invalid_special(module, USE_KEY, "an array of strings"));
    };

    let mut imports = BTreeMap::new();
    for entry in entries {
        let toml::Value::String(entry) = entry else {
            return Err(invalid_special(module, USE_KEY, "an array of strings"));
        };
        let Some((from, name)) = entry
            .rsplit_once('.')
            .filter(|(from, name)| !from.is_empty() && !name.is_empty())
        else {
            return Err(LoadError::MalformedImport {
                module: module.to_string(),
                entry: entry.clone(),
            });
        };

        let declaration = if from == HARNESS_MODULE {
            harness_export(name).map(Declaration::Class)
        } else {
            importer.import(from)?.get(name).cloned()
        };
        let declaration = declaration.ok_or_else(|| LoadError::ImportName {
            module: module.to_string(),
            name: name.to_string(),
            from: from.to_string(),
        })?;
        imports.insert(name.to_string(), declaration);
    }
    Ok(imports)
}

/// Resolves `extends` chains of one module, depth first.
struct ClassBuilder<'a> {
    module: &'a str,
    imports: &'a BTreeMap<String, Declaration>,
    values: &'a BTreeMap<String, toml::Value>,
    bodies: &'a BTreeMap<String, ClassBody>,
    built: BTreeMap<String, Arc<ScenarioClass>>,
    visiting: Vec<String>,
}

impl ClassBuilder<'_> {
    fn build(&mut self, class: &str) -> Result<Arc<ScenarioClass>, LoadError> {
        if let Some(done) = self.built.get(class) {
            return Ok(done.clone());
        }
        if self.visiting.iter().any(|c| c == class) {
            return Err(LoadError::InheritanceCycle {
                module: self.module.to_string(),
                class: class.to_string(),
            });
        }

        let bodies = self.bodies;
        let body = &bodies[class];
        self.visiting.push(class.to_string());
        let parent = self.parent(class, &body.extends);
        self.visiting.pop();
        let parent = parent?;

        let built = Arc::new(ScenarioClass::new(
            class,
            self.module,
            body.doc.clone(),
            Some(parent),
            ClassAttributes {
                host: body.host.clone(),
                min_wait: body.min_wait,
                max_wait: body.max_wait,
                tasks: body.tasks.clone(),
                extra: body.extra.clone(),
            },
        ));
        self.check(&built)?;

        self.built.insert(class.to_string(), built.clone());
        Ok(built)
    }

    fn parent(&mut self, class: &str, parent: &str) -> Result<Arc<ScenarioClass>, LoadError> {
        // A class extending its own name refers to the imported binding.
        if parent != class && self.bodies.contains_key(parent) {
            return self.build(parent);
        }
        match self.imports.get(parent) {
            Some(Declaration::Class(base)) => Ok(base.clone()),
            Some(Declaration::Value(_)) => Err(self.not_a_class(class, parent)),
            None if self.values.contains_key(parent) => Err(self.not_a_class(class, parent)),
            None => Err(LoadError::UnknownBase {
                module: self.module.to_string(),
                class: class.to_string(),
                parent: parent.to_string(),
            }),
        }
    }

    fn not_a_class(&self, class: &str, parent: &str) -> LoadError {
        LoadError::NotAClass {
            module: self.module.to_string(),
            class: class.to_string(),
            parent: parent.to_string(),
        }
    }

    fn check(&self, class: &ScenarioClass) -> Result<(), LoadError> {
        let invalid = |reason: String| LoadError::InvalidClass {
            module: self.module.to_string(),
            class: class.name().to_string(),
            reason,
        };
        if class.min_wait() > class.max_wait() {
            return Err(invalid(format!(
                "min_wait ({}) exceeds max_wait ({})",
                class.min_wait(),
                class.max_wait()
            )));
        }
        if let Some(task) = class.tasks().iter().find(|task| task.weight == 0) {
            return Err(invalid(format!("task '{}' has zero weight", task.name)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{HTTP_LOCUST, LOCUST},
        locustfile::SearchPath,
    };

    fn parse_str(source: &str) -> Result<LoadedModule, LoadError> {
        let search_path = SearchPath::default();
        let mut importer = Importer::new(&search_path);
        parse("shop", Path::new("/proj/shop.toml"), source, &mut importer)
    }

    #[test]
    fn test_parse_classes_values_and_doc() {
        let module = parse_str(
            r#"
            doc = "Shop scenarios"
            use = ["locust.HttpLocust"]
            answer = 42

            [Browser]
            extends = "HttpLocust"
            host = "http://shop.local"
            tasks = [{ name = "index", weight = 3 }, { name = "about" }]

            [Buyer]
            extends = "Browser"
            max_wait = 5000
            basket_size = 3
            "#,
        )
        .unwrap();

        assert_eq!(module.doc(), Some("Shop scenarios"));
        assert!(matches!(module.get("answer"), Some(Declaration::Value(_))));
        assert!(module
            .get("HttpLocust")
            .and_then(Declaration::as_class)
            .is_some_and(|c| Arc::ptr_eq(c, &HTTP_LOCUST)));

        let buyer = module.get("Buyer").and_then(Declaration::as_class).unwrap();
        assert!(buyer.is_subclass_of(&LOCUST));
        assert_eq!(buyer.parent().unwrap().name(), "Browser");
        assert_eq!(buyer.host(), Some("http://shop.local"));
        assert_eq!(buyer.max_wait(), 5000);
        assert_eq!(buyer.tasks()[0].weight, 3);
        assert_eq!(buyer.tasks()[1].weight, 1);
        assert_eq!(
            buyer.attribute("basket_size"),
            Some(&toml::Value::Integer(3))
        );
    }

    #[test]
    fn test_self_named_class_extends_import() {
        let module = parse_str(
            r#"
            use = ["locust.Locust"]
            [Locust]
            extends = "Locust"
            "#,
        )
        .unwrap();
        let class = module.get("Locust").and_then(Declaration::as_class).unwrap();
        assert!(!Arc::ptr_eq(class, &LOCUST));
        assert!(Arc::ptr_eq(class.parent().unwrap(), &LOCUST));
    }

    #[test]
    fn test_plain_table_is_a_value() {
        let module = parse_str("[settings]\nretries = 3\n").unwrap();
        assert!(matches!(module.get("settings"), Some(Declaration::Value(_))));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse_str("doc = 1"),
            Err(LoadError::InvalidSpecial { key: "doc", .. })
        ));
        assert!(matches!(
            parse_str("use = ['Locust']"),
            Err(LoadError::MalformedImport { .. })
        ));
        assert!(matches!(
            parse_str("use = ['locust.TaskSet']"),
            Err(LoadError::ImportName { .. })
        ));
        assert!(matches!(
            parse_str("use = ['elsewhere.Base']"),
            Err(LoadError::ModuleNotFound(m)) if m == "elsewhere"
        ));
        assert!(matches!(
            parse_str("[A]\nextends = 'Nope'"),
            Err(LoadError::UnknownBase { .. })
        ));
        assert!(matches!(
            parse_str("base = 1\n[A]\nextends = 'base'"),
            Err(LoadError::NotAClass { .. })
        ));
        assert!(matches!(
            parse_str("[A]\nextends = 'B'\n[B]\nextends = 'A'"),
            Err(LoadError::InheritanceCycle { .. })
        ));
        assert!(matches!(
            parse_str("use = ['locust.Locust']\n[A]\nextends = 'Locust'\nmin_wait = 10\nmax_wait = 5"),
            Err(LoadError::InvalidClass { .. })
        ));
        assert!(matches!(
            parse_str("[A]\nextends = 3"),
            Err(LoadError::InvalidClass { .. })
        ));
        assert!(matches!(parse_str("[A"), Err(LoadError::Syntax { .. })));
    }
}
