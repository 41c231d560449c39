//! Runner implementations the launcher hands control to.

pub mod local;
pub mod master;
pub mod slave;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use strum::Display;
use thiserror::Error;

use crate::config::Topology;

pub use local::LocalRunner;
pub use master::{MasterRunner, WorkerShare};
pub use slave::SlaveRunner;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunnerError {
    #[error("{field} must be at least 1")]
    InvalidParameter { field: &'static str },

    #[error("no slaves connected to the master")]
    NoWorkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RunnerState {
    Ready,
    Hatching,
    Running,
    Stopped,
}

/// What every topology's runner offers to the launcher and the web monitor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Runner: Send + Sync {
    fn topology(&self) -> Topology;

    fn state(&self) -> RunnerState;

    fn user_count(&self) -> u32;

    /// Begin ramping up. `None` keeps the value the runner was built with.
    async fn start_hatching(
        &self,
        num_clients: Option<u32>,
        hatch_rate: Option<u32>,
    ) -> Result<(), RunnerError>;

    async fn stop(&self);
}

/// The single runner of a launch.
#[derive(Clone)]
pub enum RunnerHandle {
    Local(Arc<LocalRunner>),
    Master(Arc<MasterRunner>),
    Slave(Arc<SlaveRunner>),
}

impl RunnerHandle {
    pub fn runner(&self) -> Arc<dyn Runner> {
        match self {
            RunnerHandle::Local(runner) => runner.clone(),
            RunnerHandle::Master(runner) => runner.clone(),
            RunnerHandle::Slave(runner) => runner.clone(),
        }
    }

    pub fn topology(&self) -> Topology {
        self.runner().topology()
    }
}

pub(crate) fn check_parameters(num_clients: u32, hatch_rate: u32) -> Result<(), RunnerError> {
    if num_clients == 0 {
        return Err(RunnerError::InvalidParameter {
            field: "num_clients",
        });
    }
    if hatch_rate == 0 {
        return Err(RunnerError::InvalidParameter {
            field: "hatch_rate",
        });
    }
    Ok(())
}
