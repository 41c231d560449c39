//! Locustfile discovery: locate on disk, load in isolation, pick out scenarios.

pub mod discover;
pub mod loader;
pub mod module;
pub mod resolve;
pub mod search_path;

/// Suffix of locustfile sources.
pub const SOURCE_SUFFIX: &str = ".toml";

/// File marking a directory as a locustfile package.
pub const PACKAGE_MARKER: &str = "mod.toml";

/// Locator used when `-f` is not given.
pub const DEFAULT_LOCUSTFILE: &str = "locustfile";

pub use discover::{discover, is_scenario, ScenarioCatalog};
pub use loader::{extend_search_path, load_locustfile, load_locustfile_with};
pub use module::{Declaration, LoadedModule};
pub use resolve::{resolve, FileSystem, LocalFs, PathResolver};
pub use search_path::{SearchPath, MODULE_SEARCH_PATH};
