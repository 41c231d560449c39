use std::path::PathBuf;

use thiserror::Error;

use crate::runners::RunnerError;

/// Locustfile could not be located on disk.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Could not find any locustfile! (looked for '{name}')")]
    NotFound { name: String },
}

/// The resolved locustfile (or a module it imports) failed to load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("'{0}' does not name a loadable module")]
    InvalidPath(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Syntax {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no module named '{0}' on the module search path")]
    ModuleNotFound(String),

    #[error("{module}: import cycle through '{name}'")]
    ImportCycle { module: String, name: String },

    #[error("{module}: malformed import '{entry}', expected 'module.Name'")]
    MalformedImport { module: String, entry: String },

    #[error("{module}: cannot import name '{name}' from '{from}'")]
    ImportName {
        module: String,
        name: String,
        from: String,
    },

    #[error("{module}: '{key}' must be {expected}")]
    InvalidSpecial {
        module: String,
        key: &'static str,
        expected: &'static str,
    },

    #[error("{module}: class '{class}' extends unknown name '{parent}'")]
    UnknownBase {
        module: String,
        class: String,
        parent: String,
    },

    #[error("{module}: class '{class}' extends '{parent}', which is not a class")]
    NotAClass {
        module: String,
        class: String,
        parent: String,
    },

    #[error("{module}: inheritance cycle through class '{class}'")]
    InheritanceCycle { module: String, class: String },

    #[error("{module}: class '{class}': {reason}")]
    InvalidClass {
        module: String,
        class: String,
        reason: String,
    },
}

/// User input that is well-formed but not runnable.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("--master and --slave are mutually exclusive")]
    ConflictingTopology,

    #[error("No Locust specified. Use -l to list the available Locusts.")]
    MissingScenario,

    #[error("Unknown Locust: {0}")]
    UnknownScenario(String),

    #[error("{flag} must be at least 1")]
    BelowMinimum { flag: &'static str },
}

/// Every way a launch can fail. All of them map to a non-zero exit status.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Runner(#[from] RunnerError),

    #[error("failed to start web monitor on {addr}: {source}")]
    WebMonitor {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LaunchError {
    pub fn exit_code(&self) -> u8 {
        1
    }
}
