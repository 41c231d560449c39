use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{check_parameters, Runner, RunnerError, RunnerState};
use crate::{
    config::{CoordinationEndpoint, Topology},
    domain::ScenarioClass,
};

/// Coordinates slaves through the coordination endpoint. Message exchange
/// with the slaves is left to the transport behind the endpoint; this runner
/// owns the slave registry and the split of a hatch across it.
pub struct MasterRunner {
    scenario: Arc<ScenarioClass>,
    endpoint: CoordinationEndpoint,
    params: Mutex<(u32, u32)>,
    workers: RwLock<BTreeMap<Uuid, DateTime<Utc>>>,
    plan: Mutex<Vec<WorkerShare>>,
    state: Mutex<RunnerState>,
}

/// Portion of a hatch assigned to one slave.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerShare {
    pub worker_id: Uuid,
    pub num_clients: u32,
    pub hatch_rate: f64,
}

impl MasterRunner {
    pub fn new(
        scenario: Arc<ScenarioClass>,
        hatch_rate: u32,
        num_clients: u32,
        endpoint: CoordinationEndpoint,
    ) -> Self {
        info!(%endpoint, scenario = scenario.name(), "master runner waiting for slaves");
        Self {
            scenario,
            endpoint,
            params: Mutex::new((num_clients, hatch_rate)),
            workers: RwLock::new(BTreeMap::new()),
            plan: Mutex::new(Vec::new()),
            state: Mutex::new(RunnerState::Ready),
        }
    }

    pub fn endpoint(&self) -> &CoordinationEndpoint {
        &self.endpoint
    }

    pub fn scenario(&self) -> &Arc<ScenarioClass> {
        &self.scenario
    }

    pub fn register_worker(&self, worker_id: Uuid) {
        if self.workers.write().insert(worker_id, Utc::now()).is_none() {
            info!(%worker_id, workers = self.worker_count(), "slave connected");
        }
    }

    pub fn remove_worker(&self, worker_id: &Uuid) {
        if self.workers.write().remove(worker_id).is_some() {
            warn!(%worker_id, "slave removed");
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.read().len()
    }

    pub fn plan(&self) -> Vec<WorkerShare> {
        self.plan.lock().clone()
    }
}

/// Split `num_clients` evenly, remainder to the first slaves.
pub fn split_clients(num_clients: u32, workers: usize) -> Vec<u32> {
    if workers == 0 {
        return Vec::new();
    }
    let workers_u32 = workers as u32;
    let base = num_clients / workers_u32;
    let remainder = num_clients % workers_u32;
    (0..workers_u32)
        .map(|i| base + u32::from(i < remainder))
        .collect()
}

#[async_trait]
impl Runner for MasterRunner {
    fn topology(&self) -> Topology {
        Topology::Master
    }

    fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    fn user_count(&self) -> u32 {
        self.plan.lock().iter().map(|share| share.num_clients).sum()
    }

    async fn start_hatching(
        &self,
        num_clients: Option<u32>,
        hatch_rate: Option<u32>,
    ) -> Result<(), RunnerError> {
        let (num_clients, hatch_rate) = {
            let params = self.params.lock();
            (
                num_clients.unwrap_or(params.0),
                hatch_rate.unwrap_or(params.1),
            )
        };
        check_parameters(num_clients, hatch_rate)?;

        let workers: Vec<Uuid> = self.workers.read().keys().copied().collect();
        if workers.is_empty() {
            warn!("hatch requested but no slaves are connected");
            return Err(RunnerError::NoWorkers);
        }

        let per_worker_rate = f64::from(hatch_rate) / workers.len() as f64;
        let shares = split_clients(num_clients, workers.len());
        let plan: Vec<WorkerShare> = workers
            .into_iter()
            .zip(shares)
            .map(|(worker_id, clients)| WorkerShare {
                worker_id,
                num_clients: clients,
                hatch_rate: per_worker_rate,
            })
            .collect();

        for share in &plan {
            info!(
                worker_id = %share.worker_id,
                num_clients = share.num_clients,
                hatch_rate = share.hatch_rate,
                "assigning hatch share"
            );
        }

        *self.params.lock() = (num_clients, hatch_rate);
        *self.plan.lock() = plan;
        *self.state.lock() = RunnerState::Hatching;
        Ok(())
    }

    async fn stop(&self) {
        self.plan.lock().clear();
        *self.state.lock() = RunnerState::Stopped;
    }
}
