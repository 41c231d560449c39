use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use super::{LocalRunner, Runner, RunnerError, RunnerState};
use crate::{
    config::{CoordinationEndpoint, Topology},
    domain::ScenarioClass,
    stats::RequestStats,
};

/// Worker process: runs the share of users the master assigns to it.
pub struct SlaveRunner {
    id: Uuid,
    endpoint: CoordinationEndpoint,
    local: LocalRunner,
}

impl SlaveRunner {
    pub fn new(
        scenario: Arc<ScenarioClass>,
        hatch_rate: u32,
        num_clients: u32,
        endpoint: CoordinationEndpoint,
        stats: RequestStats,
        shutdown: CancellationToken,
    ) -> Self {
        let id = Uuid::new_v4();
        info!(slave_id = %id, %endpoint, scenario = scenario.name(), "slave waiting for master");
        Self {
            id,
            endpoint,
            local: LocalRunner::new(
                scenario,
                hatch_rate,
                num_clients,
                Vec::new(),
                stats,
                shutdown,
            ),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &CoordinationEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Runner for SlaveRunner {
    fn topology(&self) -> Topology {
        Topology::Slave
    }

    fn state(&self) -> RunnerState {
        self.local.state()
    }

    fn user_count(&self) -> u32 {
        self.local.user_count()
    }

    async fn start_hatching(
        &self,
        num_clients: Option<u32>,
        hatch_rate: Option<u32>,
    ) -> Result<(), RunnerError> {
        info!(slave_id = %self.id, "hatch share received");
        self.local.start_hatching(num_clients, hatch_rate).await
    }

    async fn stop(&self) {
        self.local.stop().await;
    }
}
