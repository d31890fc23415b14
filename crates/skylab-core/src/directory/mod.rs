//! Bridge between human-facing DUT names and scheduler bot ids.
use std::sync::Arc;

use skylab_model::{
    BotId, Dimensions, PoolPolicy, RetryPolicy,
    constants::{DIM_DUT_NAME, DIM_POOL},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    error::{CoreError, CoreResult},
    retry::call_with_retries,
    service::{BotService, BotState, BotSummary},
};

pub struct BotDirectory {
    bots: Arc<dyn BotService>,
    policy: PoolPolicy,
    retry: RetryPolicy,
}

impl BotDirectory {
    pub fn new(bots: Arc<dyn BotService>, policy: PoolPolicy, retry: RetryPolicy) -> Self {
        Self {
            bots,
            policy,
            retry,
        }
    }

    /// Finds the single bot serving `hostname` in the Skylab pool.
    #[instrument(level = "debug", skip(self, cancel))]
    pub async fn resolve_bot_id(
        &self,
        hostname: &str,
        cancel: &CancellationToken,
    ) -> CoreResult<BotId> {
        let mut dims = Dimensions::new();
        dims.insert(DIM_POOL, self.policy.skylab_pool.as_str());
        dims.insert(DIM_DUT_NAME, hostname);

        let bots = self.list_bots(&dims, BotState::Any, cancel).await?;
        match bots.as_slice() {
            [] => Err(CoreError::NotFound(format!(
                "no bot with dut_name {hostname} in pool {}",
                self.policy.skylab_pool
            ))),
            [bot] => {
                debug!(hostname, bot_id = %bot.bot_id, "resolved bot");
                Ok(bot.bot_id.clone())
            }
            many => {
                let ids: Vec<&str> = many.iter().map(|b| b.bot_id.as_str()).collect();
                Err(CoreError::Ambiguous(format!(
                    "{} bots with dut_name {hostname}: {}",
                    many.len(),
                    ids.join(", ")
                )))
            }
        }
    }

    /// Every bot matching all `dimensions`, following the cursor to the end.
    ///
    /// Each page request is retried on its own.
    pub async fn list_bots(
        &self,
        dimensions: &Dimensions,
        state: BotState,
        cancel: &CancellationToken,
    ) -> CoreResult<Vec<BotSummary>> {
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = call_with_retries(&self.retry, cancel, "list bots", || {
                self.bots.list_bots(dimensions, state, cursor.as_deref())
            })
            .await?;
            out.extend(page.items);
            match page.cursor.filter(|c| !c.is_empty()) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        debug!(dims = %dimensions, ?state, count = out.len(), "listed bots");
        Ok(out)
    }

    /// Reads exactly one value of dimension `key` from `bot`.
    pub fn lookup_dimension_value(bot: &BotSummary, key: &str) -> CoreResult<String> {
        match bot.values(key) {
            [] => Err(CoreError::NotFound(format!(
                "dimension {key} on bot {}",
                bot.bot_id
            ))),
            [value] => Ok(value.clone()),
            values => Err(CoreError::MultipleValues {
                bot: bot.bot_id.clone(),
                key: key.to_string(),
                values: values.to_vec(),
            }),
        }
    }

    /// DUT names of the bots matching `dimensions`, dead or alive.
    ///
    /// Bots without exactly one `dut_name` are skipped.
    pub async fn list_hosts(
        &self,
        dimensions: &Dimensions,
        cancel: &CancellationToken,
    ) -> CoreResult<Vec<String>> {
        let bots = self.list_bots(dimensions, BotState::Any, cancel).await?;
        let hosts = bots
            .iter()
            .filter_map(|bot| match Self::lookup_dimension_value(bot, DIM_DUT_NAME) {
                Ok(host) => Some(host),
                Err(e) => {
                    debug!(bot_id = %bot.bot_id, error = %e, "skipping bot");
                    None
                }
            })
            .collect();
        Ok(hosts)
    }
}
