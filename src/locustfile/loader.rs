use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use super::{
    module::{self, LoadedModule},
    search_path::{SearchPath, MODULE_SEARCH_PATH},
    SOURCE_SUFFIX,
};
use crate::error::LoadError;

/// Imports modules by name through a search path, refusing import cycles.
/// Each module is evaluated once per importer, so a module reached along
/// several import paths yields the same class instances.
pub struct Importer<'a> {
    search_path: &'a SearchPath,
    stack: Vec<String>,
    loaded: BTreeMap<String, LoadedModule>,
}

impl<'a> Importer<'a> {
    pub fn new(search_path: &'a SearchPath) -> Self {
        Self {
            search_path,
            stack: Vec::new(),
            loaded: BTreeMap::new(),
        }
    }

    pub fn import(&mut self, name: &str) -> Result<LoadedModule, LoadError> {
        if let Some(module) = self.loaded.get(name) {
            return Ok(module.clone());
        }
        if self.stack.iter().any(|m| m == name) {
            return Err(LoadError::ImportCycle {
                module: self.stack.last().cloned().unwrap_or_default(),
                name: name.to_string(),
            });
        }

        let path = self
            .search_path
            .find_module(name)
            .ok_or_else(|| LoadError::ModuleNotFound(name.to_string()))?;
        debug!(module = name, path = %path.display(), "importing module");

        let source = std::fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;

        self.stack.push(name.to_string());
        let loaded = module::parse(name, &path, &source, self);
        self.stack.pop();
        let loaded = loaded?;
        self.loaded.insert(name.to_string(), loaded.clone());
        Ok(loaded)
    }
}

/// Load the locustfile at `path` through the process-wide search path.
pub fn load_locustfile(path: &Path) -> Result<LoadedModule, LoadError> {
    let mut search_path = MODULE_SEARCH_PATH.lock();
    load_locustfile_with(path, &mut search_path)
}

/// Load the locustfile at `path`, temporarily putting its directory at the
/// front of `search_path` so that it shadows same-named modules elsewhere.
/// `search_path` is restored before returning, on success and on failure.
pub fn load_locustfile_with(
    path: &Path,
    search_path: &mut SearchPath,
) -> Result<LoadedModule, LoadError> {
    let (dir, name) = split_module_path(path)?;
    let prepended = search_path.prepend(&dir);
    let loaded = Importer::new(&prepended).import(&name)?;
    info!(
        module = loaded.name(),
        path = %loaded.path().display(),
        declarations = loaded.declarations().len(),
        "locustfile loaded"
    );
    Ok(loaded)
}

/// Append configured directories to the process-wide search path.
pub fn extend_search_path<I, P>(dirs: I)
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    MODULE_SEARCH_PATH.lock().extend_unique(dirs);
}

/// `/proj/tasks.toml` → (`/proj`, `tasks`); `/proj/shop` → (`/proj`, `shop`).
fn split_module_path(path: &Path) -> Result<(PathBuf, String), LoadError> {
    let invalid = || LoadError::InvalidPath(path.to_path_buf());
    let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(invalid)?;
    let name = file_name.strip_suffix(SOURCE_SUFFIX).unwrap_or(file_name);
    if name.is_empty() {
        return Err(invalid());
    }
    let dir = path.parent().ok_or_else(invalid)?;
    Ok((dir.to_path_buf(), name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locustfile::{Declaration, PACKAGE_MARKER};
    use rstest::rstest;
    use std::fs;

    const USER: &str = "use = ['locust.Locust']\n[User]\nextends = 'Locust'\n";

    #[test]
    fn test_split_module_path() {
        assert_eq!(
            split_module_path(Path::new("/proj/tasks.toml")).unwrap(),
            (PathBuf::from("/proj"), "tasks".to_string())
        );
        assert_eq!(
            split_module_path(Path::new("/proj/shop")).unwrap(),
            (PathBuf::from("/proj"), "shop".to_string())
        );
        assert!(split_module_path(Path::new("/")).is_err());
    }

    #[rstest]
    #[case::valid(USER)]
    #[case::syntax_error("[User")]
    #[case::bad_import("use = ['missing.Base']")]
    fn test_search_path_restored_when_dir_absent(#[case] source: &str) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("locustfile.toml");
        fs::write(&file, source).unwrap();

        let mut search_path = SearchPath::new(["/opt/a", "/opt/b"]);
        let before = search_path.clone();
        let _ = load_locustfile_with(&file, &mut search_path);
        assert_eq!(search_path, before);
    }

    #[rstest]
    #[case::valid(USER)]
    #[case::syntax_error("[User")]
    fn test_search_path_restored_when_dir_not_in_front(#[case] source: &str) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("locustfile.toml");
        fs::write(&file, source).unwrap();

        let mut search_path = SearchPath::new([Path::new("/opt/a"), Path::new("/opt/b"), dir.path()]);
        let before = search_path.clone();
        let _ = load_locustfile_with(&file, &mut search_path);
        assert_eq!(search_path, before);
    }

    #[test]
    fn test_target_directory_shadows_same_named_module() {
        let bundled = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        fs::write(
            bundled.path().join("locustfile.toml"),
            "use = ['locust.Locust']\n[Bundled]\nextends = 'Locust'\n",
        )
        .unwrap();
        fs::write(project.path().join("locustfile.toml"), USER).unwrap();

        let mut search_path = SearchPath::new([bundled.path(), project.path()]);
        let module =
            load_locustfile_with(&project.path().join("locustfile.toml"), &mut search_path)
                .unwrap();

        assert!(module.get("User").is_some());
        assert!(module.get("Bundled").is_none());
        assert_eq!(module.path(), project.path().join("locustfile.toml"));
    }

    #[test]
    fn test_sibling_imports_resolve_from_locustfile_directory() {
        let project = tempfile::tempdir().unwrap();
        fs::write(
            project.path().join("common.toml"),
            "use = ['locust.HttpLocust']\n[Base]\nextends = 'HttpLocust'\nhost = 'http://api'\n",
        )
        .unwrap();
        fs::write(
            project.path().join("locustfile.toml"),
            "use = ['common.Base']\n[Api]\nextends = 'Base'\n",
        )
        .unwrap();

        let mut search_path = SearchPath::default();
        let module =
            load_locustfile_with(&project.path().join("locustfile.toml"), &mut search_path)
                .unwrap();
        let api = module.get("Api").and_then(Declaration::as_class).unwrap();
        assert_eq!(api.host(), Some("http://api"));
        assert!(search_path.entries().is_empty());
    }

    #[test]
    fn test_diamond_import_shares_one_base() {
        let project = tempfile::tempdir().unwrap();
        fs::write(
            project.path().join("common.toml"),
            "use = ['locust.HttpLocust']\n[Base]\nextends = 'HttpLocust'\n",
        )
        .unwrap();
        fs::write(
            project.path().join("mid.toml"),
            "use = ['common.Base']\n[Mid]\nextends = 'Base'\n",
        )
        .unwrap();
        fs::write(
            project.path().join("locustfile.toml"),
            "use = ['common.Base', 'mid.Mid']\n[Top]\nextends = 'Mid'\n",
        )
        .unwrap();

        let mut search_path = SearchPath::default();
        let module =
            load_locustfile_with(&project.path().join("locustfile.toml"), &mut search_path)
                .unwrap();
        let base = module.get("Base").and_then(Declaration::as_class).unwrap();
        let top = module.get("Top").and_then(Declaration::as_class).unwrap();
        assert!(top.is_subclass_of(base));
        assert!(std::sync::Arc::ptr_eq(top.parent().unwrap().parent().unwrap(), base));
    }

    #[test]
    fn test_import_cycle_is_reported() {
        let project = tempfile::tempdir().unwrap();
        fs::write(project.path().join("a.toml"), "use = ['b.X']").unwrap();
        fs::write(project.path().join("b.toml"), "use = ['a.Y']").unwrap();

        let mut search_path = SearchPath::default();
        let err = load_locustfile_with(&project.path().join("a.toml"), &mut search_path)
            .unwrap_err();
        assert!(matches!(err, LoadError::ImportCycle { .. }));
    }

    #[test]
    fn test_package_locustfile() {
        let project = tempfile::tempdir().unwrap();
        let package = project.path().join("shop");
        fs::create_dir(&package).unwrap();
        fs::write(package.join(PACKAGE_MARKER), USER).unwrap();

        let mut search_path = SearchPath::default();
        let module = load_locustfile_with(&package, &mut search_path).unwrap();
        assert_eq!(module.name(), "shop");
        assert!(module.get("User").is_some());
    }
}
