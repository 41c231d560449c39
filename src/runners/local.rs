use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{
    distributions::{Distribution, WeightedIndex},
    rngs::StdRng,
    Rng, SeedableRng,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{check_parameters, Runner, RunnerError, RunnerState};
use crate::{config::Topology, domain::ScenarioClass, stats::RequestStats};

/// Runs every simulated user inside this process.
pub struct LocalRunner {
    inner: Arc<Inner>,
}

struct Inner {
    scenario: Arc<ScenarioClass>,
    hosts: Vec<String>,
    stats: RequestStats,
    params: Mutex<HatchParams>,
    state: Mutex<RunnerState>,
    shutdown: CancellationToken,
    generation: Mutex<Generation>,
}

/// One batch of users: its cancellation token and how many it has spawned.
#[derive(Clone)]
struct Generation {
    token: CancellationToken,
    users: Arc<AtomicU32>,
}

impl Generation {
    fn new(shutdown: &CancellationToken) -> Self {
        Self {
            token: shutdown.child_token(),
            users: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct HatchParams {
    num_clients: u32,
    hatch_rate: u32,
}

impl LocalRunner {
    pub fn new(
        scenario: Arc<ScenarioClass>,
        hatch_rate: u32,
        num_clients: u32,
        hosts: Vec<String>,
        stats: RequestStats,
        shutdown: CancellationToken,
    ) -> Self {
        let generation = Generation::new(&shutdown);
        Self {
            inner: Arc::new(Inner {
                scenario,
                hosts,
                stats,
                params: Mutex::new(HatchParams {
                    num_clients,
                    hatch_rate,
                }),
                state: Mutex::new(RunnerState::Ready),
                shutdown,
                generation: Mutex::new(generation),
            }),
        }
    }

    pub fn scenario(&self) -> &Arc<ScenarioClass> {
        &self.inner.scenario
    }

    pub fn stats(&self) -> &RequestStats {
        &self.inner.stats
    }
}

impl Inner {
    /// Host of the `index`-th user: round-robin over `--hosts`, else the class's own.
    fn host_for(&self, index: u32) -> Option<String> {
        if self.hosts.is_empty() {
            return self.scenario.host().map(str::to_owned);
        }
        Some(self.hosts[index as usize % self.hosts.len()].clone())
    }

    /// Cancel the current users and start counting a fresh batch. A hatch
    /// loop still finishing for the old batch only touches the old counter.
    fn next_generation(&self) -> Generation {
        let next = Generation::new(&self.shutdown);
        let previous = std::mem::replace(&mut *self.generation.lock(), next.clone());
        previous.token.cancel();
        next
    }
}

#[async_trait]
impl Runner for LocalRunner {
    fn topology(&self) -> Topology {
        Topology::Standalone
    }

    fn state(&self) -> RunnerState {
        *self.inner.state.lock()
    }

    fn user_count(&self) -> u32 {
        self.inner.generation.lock().users.load(Ordering::SeqCst)
    }

    async fn start_hatching(
        &self,
        num_clients: Option<u32>,
        hatch_rate: Option<u32>,
    ) -> Result<(), RunnerError> {
        let params = {
            let mut params = self.inner.params.lock();
            let requested = HatchParams {
                num_clients: num_clients.unwrap_or(params.num_clients),
                hatch_rate: hatch_rate.unwrap_or(params.hatch_rate),
            };
            check_parameters(requested.num_clients, requested.hatch_rate)?;
            *params = requested;
            requested
        };

        let generation = self.inner.next_generation();
        *self.inner.state.lock() = RunnerState::Hatching;
        info!(
            scenario = self.inner.scenario.name(),
            num_clients = params.num_clients,
            hatch_rate = params.hatch_rate,
            "hatching"
        );
        tokio::spawn(hatch(self.inner.clone(), params, generation));
        Ok(())
    }

    async fn stop(&self) {
        let mut state = self.inner.state.lock();
        self.inner.next_generation();
        *state = RunnerState::Stopped;
        debug!("local runner stopped");
    }
}

async fn hatch(inner: Arc<Inner>, params: HatchParams, generation: Generation) {
    let Generation { token, users } = generation;
    let delay = Duration::from_secs_f64(1.0 / f64::from(params.hatch_rate));
    for index in 0..params.num_clients {
        if token.is_cancelled() {
            return;
        }
        tokio::spawn(run_user(
            inner.scenario.clone(),
            inner.host_for(index),
            inner.stats.clone(),
            token.child_token(),
        ));
        users.fetch_add(1, Ordering::SeqCst);

        if index + 1 < params.num_clients {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    let mut state = inner.state.lock();
    if !token.is_cancelled() {
        *state = RunnerState::Running;
        info!(users = params.num_clients, "all locusts hatched");
    }
}

async fn run_user(
    scenario: Arc<ScenarioClass>,
    host: Option<String>,
    stats: RequestStats,
    cancel: CancellationToken,
) {
    let tasks = scenario.tasks();
    let chooser = WeightedIndex::new(tasks.iter().map(|task| task.weight)).ok();
    let mut rng = StdRng::from_entropy();
    debug!(
        scenario = scenario.name(),
        host = host.as_deref().unwrap_or("-"),
        "user started"
    );

    loop {
        if let Some(chooser) = &chooser {
            let task = &tasks[chooser.sample(&mut rng)];
            stats.log_execution(&task.name);
        }
        let wait = rng.gen_range(scenario.min_wait()..=scenario.max_wait());
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_millis(wait)) => {}
        }
    }
}
