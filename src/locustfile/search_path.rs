use std::{
    ops::Deref,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::{PACKAGE_MARKER, SOURCE_SUFFIX};

/// Environment variable holding extra module directories, separated like `PATH`.
pub const SEARCH_PATH_ENV: &str = "LOCUST_PATH";

/// Process-wide module search path. Held locked for the whole of a load.
pub static MODULE_SEARCH_PATH: Lazy<Mutex<SearchPath>> =
    Lazy::new(|| Mutex::new(SearchPath::from_env()));

/// Ordered list of directories modules are imported from. First match wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPath {
    entries: Vec<PathBuf>,
}

impl SearchPath {
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_env() -> Self {
        match std::env::var_os(SEARCH_PATH_ENV) {
            Some(value) => Self::new(
                std::env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()),
            ),
            None => Self::default(),
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }

    pub fn position(&self, dir: &Path) -> Option<usize> {
        self.entries.iter().position(|entry| entry == dir)
    }

    /// Append directories that are not already present.
    pub fn extend_unique<I, P>(&mut self, dirs: I)
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        for dir in dirs {
            let dir = dir.into();
            if self.position(&dir).is_none() {
                self.entries.push(dir);
            }
        }
    }

    /// Source file of module `name` in the first entry that provides it.
    /// A package directory shadows a plain file in the same entry.
    pub fn find_module(&self, name: &str) -> Option<PathBuf> {
        self.entries.iter().find_map(|dir| {
            let package = dir.join(name).join(PACKAGE_MARKER);
            if package.is_file() {
                return Some(package);
            }
            let file = dir.join(format!("{name}{SOURCE_SUFFIX}"));
            file.is_file().then_some(file)
        })
    }

    /// Put `dir` at the front until the returned guard is dropped.
    ///
    /// An absent directory is inserted and later removed; a directory found
    /// further down is moved and later put back at its original index. The
    /// list is identical to its prior state once the guard is gone, however
    /// the guarded work ends.
    pub fn prepend(&mut self, dir: &Path) -> Prepended<'_> {
        let mutation = match self.position(dir) {
            None => {
                self.entries.insert(0, dir.to_path_buf());
                Mutation::Inserted
            }
            Some(0) => Mutation::Untouched,
            Some(index) => {
                let entry = self.entries.remove(index);
                self.entries.insert(0, entry);
                Mutation::Moved { from: index }
            }
        };
        tracing::trace!(dir = %dir.display(), ?mutation, "module search path prepended");
        Prepended {
            search_path: self,
            mutation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Untouched,
    Inserted,
    Moved { from: usize },
}

/// Scoped front-insertion into a [`SearchPath`], undone on drop.
#[derive(Debug)]
pub struct Prepended<'a> {
    search_path: &'a mut SearchPath,
    mutation: Mutation,
}

impl Deref for Prepended<'_> {
    type Target = SearchPath;

    fn deref(&self) -> &SearchPath {
        self.search_path
    }
}

impl Drop for Prepended<'_> {
    fn drop(&mut self) {
        let entries = &mut self.search_path.entries;
        match self.mutation {
            Mutation::Untouched => {}
            Mutation::Inserted => {
                entries.remove(0);
            }
            Mutation::Moved { from } => {
                let entry = entries.remove(0);
                entries.insert(from, entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::fs;

    fn sample() -> SearchPath {
        SearchPath::new(["/usr/lib/locust", "/home/me/shared", "/srv/tests"])
    }

    #[rstest]
    #[case::absent("/proj", vec!["/proj", "/usr/lib/locust", "/home/me/shared", "/srv/tests"])]
    #[case::already_front("/usr/lib/locust", vec!["/usr/lib/locust", "/home/me/shared", "/srv/tests"])]
    #[case::moved_from_middle("/home/me/shared", vec!["/home/me/shared", "/usr/lib/locust", "/srv/tests"])]
    #[case::moved_from_end("/srv/tests", vec!["/srv/tests", "/usr/lib/locust", "/home/me/shared"])]
    fn test_prepend_and_restore(#[case] dir: &str, #[case] during: Vec<&str>) {
        let mut search_path = sample();
        {
            let guard = search_path.prepend(Path::new(dir));
            assert_eq!(*guard, SearchPath::new(during));
        }
        assert_eq!(search_path, sample());
    }

    #[test]
    fn test_restore_on_panic() {
        let mut search_path = sample();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = search_path.prepend(Path::new("/srv/tests"));
            panic!("import blew up");
        }));
        assert!(result.is_err());
        assert_eq!(search_path, sample());
    }

    #[test]
    fn test_find_module_prefers_earlier_entry_and_packages() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(second.path().join("common.toml"), "").unwrap();
        fs::write(first.path().join("common.toml"), "").unwrap();
        fs::create_dir(first.path().join("common")).unwrap();
        fs::write(first.path().join("common").join(PACKAGE_MARKER), "").unwrap();

        let search_path = SearchPath::new([first.path(), second.path()]);
        assert_eq!(
            search_path.find_module("common"),
            Some(first.path().join("common").join(PACKAGE_MARKER))
        );

        let reversed = SearchPath::new([second.path(), first.path()]);
        assert_eq!(
            reversed.find_module("common"),
            Some(second.path().join("common.toml"))
        );
        assert_eq!(reversed.find_module("missing"), None);
    }

    #[test]
    fn test_extend_unique() {
        let mut search_path = sample();
        search_path.extend_unique(["/srv/tests", "/opt/extra"]);
        assert_eq!(search_path.entries().len(), 4);
        assert_eq!(search_path.entries()[3], PathBuf::from("/opt/extra"));
    }

    proptest! {
        #[test]
        fn prop_prepend_is_reversible(
            entries in proptest::collection::vec("[a-d]{1,2}", 0..8),
            target in "[a-d]{1,2}",
        ) {
            let mut search_path = SearchPath::new(entries.iter().map(|e| format!("/{e}")));
            let before = search_path.clone();
            let target = PathBuf::from(format!("/{target}"));
            {
                let guard = search_path.prepend(&target);
                prop_assert_eq!(&guard.entries()[0], &target);
            }
            prop_assert_eq!(search_path, before);
        }
    }
}
