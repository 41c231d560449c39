//! Locating the locustfile on disk.
//!
//! A locator with a directory component is tested as given (after `~`
//! expansion). A bare name is searched for in the start directory and then in
//! every ancestor, nearest first, stopping below the filesystem root.

use std::path::{Component, Path, PathBuf};

use super::{PACKAGE_MARKER, SOURCE_SUFFIX};

/// Filesystem probes the resolver needs.
pub trait FileSystem {
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathResolver<F = LocalFs> {
    fs: F,
}

impl PathResolver<LocalFs> {
    pub fn new() -> Self {
        Self { fs: LocalFs }
    }
}

impl<F: FileSystem> PathResolver<F> {
    pub fn with_fs(fs: F) -> Self {
        Self { fs }
    }

    /// Resolve `name` relative to `start_dir`. `None` once every candidate
    /// has been tried.
    pub fn resolve(&self, name: &str, start_dir: &Path) -> Option<PathBuf> {
        let names = candidate_names(name);
        let start_dir = absolute(start_dir);

        if has_dir_component(name) {
            return names.iter().find_map(|candidate| {
                let path = normalize(&start_dir.join(expand_home(candidate)));
                self.accepts(candidate, &path).then_some(path)
            });
        }

        let mut dir = normalize(&start_dir);
        while dir.file_name().is_some() {
            for candidate in &names {
                let path = dir.join(candidate);
                if self.accepts(candidate, &path) {
                    tracing::debug!(path = %path.display(), "locustfile candidate accepted");
                    return Some(path);
                }
            }
            if !dir.pop() {
                break;
            }
        }
        None
    }

    fn accepts(&self, candidate: &str, path: &Path) -> bool {
        self.fs.exists(path) && (candidate.ends_with(SOURCE_SUFFIX) || self.is_package(path))
    }

    fn is_package(&self, path: &Path) -> bool {
        self.fs.is_dir(path) && self.fs.is_file(&path.join(PACKAGE_MARKER))
    }
}

/// Resolve against the real filesystem.
pub fn resolve(name: &str, start_dir: &Path) -> Option<PathBuf> {
    PathResolver::new().resolve(name, start_dir)
}

/// The name as given, then with the source suffix when it lacks one.
pub fn candidate_names(name: &str) -> Vec<String> {
    let mut names = vec![name.to_string()];
    if !name.ends_with(SOURCE_SUFFIX) {
        names.push(format!("{name}{SOURCE_SUFFIX}"));
    }
    names
}

fn has_dir_component(name: &str) -> bool {
    Path::new(name)
        .parent()
        .is_some_and(|parent| !parent.as_os_str().is_empty())
}

fn expand_home(name: &str) -> PathBuf {
    let rest = if name == "~" {
        Some("")
    } else {
        name.strip_prefix("~/")
            .or_else(|| name.strip_prefix("~\\"))
    };
    match (rest, home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(name),
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Lexically remove `.` and `..` components without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if out.file_name().is_some() {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
