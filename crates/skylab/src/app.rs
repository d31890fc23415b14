use std::sync::Arc;

use skylab_client::{BuildbucketClient, InventoryClient, SwarmingClient, Transport, swarming};
use skylab_core::prelude::*;
use skylab_model::{RetryPolicy, SessionId};
use tracing::debug;

use crate::{
    cli::GlobalArgs,
    env::{self, Environment},
};

/// Lease core wired to the HTTP clients of one environment.
pub struct App {
    pub leaser: Leaser,
    pub env: Environment,
}

impl App {
    pub fn build(global: &GlobalArgs) -> anyhow::Result<Self> {
        let env = Environment::resolve(global.dev, &global.endpoints)?;
        let token = env::load_token(&global.endpoints)?;
        let transport = Transport::new(token)?;
        let policy = env::pool_policy(&global.endpoints);
        let caps = env::lease_caps(&global.endpoints);
        let retry = RetryPolicy::default();
        let session = SessionId::new();
        debug!(session = %session, env = ?env, "wiring lease core");

        let swarming = Arc::new(SwarmingClient::new(
            transport.clone(),
            env.swarming_service.as_str(),
        ));
        let builds = Arc::new(BuildbucketClient::new(
            transport.clone(),
            &env.buildbucket_host,
            env.builder.clone(),
        ));
        let inventory = Arc::new(InventoryClient::new(transport, &env.inventory_host));

        let leaser = Leaser::new(
            BotDirectory::new(swarming.clone(), policy.clone(), retry.clone()),
            InventoryLookup::new(inventory, retry.clone()),
            LeaseAdmission::new(swarming.clone(), caps, retry.clone()),
            LeaseDispatcher::new(builds, policy, session, retry.clone(), DispatchConfig::default()),
            swarming,
            retry,
        );
        Ok(Self { leaser, env })
    }

    /// Task list page with every task of this invocation.
    pub fn session_tasks_url(&self) -> String {
        swarming::task_list_url(
            &self.env.swarming_service,
            &[self.leaser.dispatcher().session().tag()],
        )
    }
}
