use std::{future::Future, io::Write, net::SocketAddr, sync::Arc};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::{LaunchConfig, Topology},
    domain::ScenarioClass,
    error::LaunchError,
    runners::{LocalRunner, MasterRunner, RunnerHandle, SlaveRunner},
    stats::{self, RequestStats},
};

pub const FAREWELL: &str = "\nExiting, bye..\n";

/// Named tasks sharing one cancellation token.
pub struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            handles: Vec::new(),
        }
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        debug!(task = name, "spawning background task");
        self.handles.push((name, tokio::spawn(task)));
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handles.iter().map(|(name, _)| *name).collect()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel every task and wait for all of them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        let (names, handles): (Vec<_>, Vec<_>) = self.handles.into_iter().unzip();
        for (name, result) in names.into_iter().zip(join_all(handles).await) {
            if let Err(e) = result {
                warn!(task = name, error = %e, "background task ended abnormally");
            }
        }
    }
}

/// Brings up the runner and the tasks of one topology.
pub struct Bootstrap {
    config: LaunchConfig,
    scenario: Arc<ScenarioClass>,
    stats: RequestStats,
}

impl Bootstrap {
    pub fn new(config: LaunchConfig, scenario: Arc<ScenarioClass>, stats: RequestStats) -> Self {
        Self {
            config,
            scenario,
            stats,
        }
    }

    /// Runner first, then the web monitor, then the hatch trigger and stats printer.
    pub async fn start(self) -> Result<Running, LaunchError> {
        let Self {
            config,
            scenario,
            stats,
        } = self;
        let cancel = CancellationToken::new();
        let mut tasks = BackgroundTasks::new(cancel.clone());

        let runner = match config.topology {
            Topology::Standalone => RunnerHandle::Local(Arc::new(LocalRunner::new(
                scenario.clone(),
                config.hatch_rate,
                config.num_clients,
                config.hosts.clone(),
                stats.clone(),
                cancel.child_token(),
            ))),
            Topology::Master => RunnerHandle::Master(Arc::new(MasterRunner::new(
                scenario.clone(),
                config.hatch_rate,
                config.num_clients,
                config.endpoint.clone(),
            ))),
            Topology::Slave => RunnerHandle::Slave(Arc::new(SlaveRunner::new(
                scenario.clone(),
                config.hatch_rate,
                config.num_clients,
                config.endpoint.clone(),
                stats.clone(),
                cancel.child_token(),
            ))),
        };
        info!(topology = %config.topology, scenario = scenario.name(), "runner created");

        let web_addr = if config.web_enabled() {
            start_web_monitor(&config, &runner, &scenario, &stats, &mut tasks).await?
        } else {
            None
        };

        if config.topology == Topology::Standalone {
            if config.display.no_web {
                runner.runner().start_hatching(None, None).await?;
            }
            if config.stats_printer_enabled() {
                tasks.spawn(
                    "stats-printer",
                    stats::print_stats(stats.clone(), config.stats_interval, tasks.token()),
                );
            }
        }

        Ok(Running {
            runner,
            tasks,
            web_addr,
        })
    }
}

#[cfg(feature = "web")]
async fn start_web_monitor(
    config: &LaunchConfig,
    runner: &RunnerHandle,
    scenario: &Arc<ScenarioClass>,
    stats: &RequestStats,
    tasks: &mut BackgroundTasks,
) -> Result<Option<SocketAddr>, LaunchError> {
    use crate::api::{self, MonitorState};

    let listener = api::bind(&config.web.bind_addr()).await?;
    let addr = listener.local_addr()?;
    let state = MonitorState {
        runner: runner.runner(),
        scenario: scenario.clone(),
        stats: stats.clone(),
        num_clients: config.num_clients,
        hatch_rate: config.hatch_rate,
        started_at: chrono::Utc::now(),
    };
    tasks.spawn("web-monitor", api::serve(listener, state, tasks.token()));
    Ok(Some(addr))
}

#[cfg(not(feature = "web"))]
async fn start_web_monitor(
    _config: &LaunchConfig,
    _runner: &RunnerHandle,
    _scenario: &Arc<ScenarioClass>,
    _stats: &RequestStats,
    _tasks: &mut BackgroundTasks,
) -> Result<Option<SocketAddr>, LaunchError> {
    warn!("built without the web monitor; use --no-web to silence this");
    Ok(None)
}

/// A started launch, waiting for its shutdown signal.
pub struct Running {
    runner: RunnerHandle,
    tasks: BackgroundTasks,
    web_addr: Option<SocketAddr>,
}

impl Running {
    pub fn runner(&self) -> &RunnerHandle {
        &self.runner
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.names()
    }

    pub fn web_addr(&self) -> Option<SocketAddr> {
        self.web_addr
    }

    /// Block until `shutdown` resolves, then stop everything in order.
    pub async fn wait<S, W>(self, shutdown: S, out: &mut W) -> Result<(), LaunchError>
    where
        S: Future<Output = ()>,
        W: Write,
    {
        shutdown.await;
        info!(topology = %self.runner.topology(), "shutting down");

        self.tasks.token().cancel();
        self.runner.runner().stop().await;
        self.tasks.shutdown().await;

        out.write_all(FAREWELL.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}
